//! Crema Core -- the machine simulation engine for a coffee-shop game.
//!
//! This crate models the equipment behind the counter: a bean grinder, a
//! ground-coffee doser and a multi-slot espresso machine. Each machine is a
//! small state machine with inventory, upgrade levels that change how the
//! player drives it, and fixed-point quantities so a session replays
//! identically on every platform.
//!
//! # Station Pipeline
//!
//! Every call on [`station::CoffeeStation`] runs the same three phases:
//!
//! 1. **Route** -- the host action or tick goes to the owning process.
//! 2. **Auto-brew** -- at automatic espresso levels, eligible slots start.
//! 3. **Flush** -- process outboxes drain into the [`event::EventBus`], which
//!    delivers to subscribed listeners.
//!
//! ```rust,ignore
//! let mut station = CoffeeStation::new(StationConfig::default())?;
//! station.apply(StationAction::AddBeans(3))?;
//! station.apply(StationAction::SpinCompleted(1))?;
//! station.tick(Fixed64::from_num(0.25));
//! ```
//!
//! # Key Types
//!
//! - [`station::CoffeeStation`] -- Host-loop facade and upgrade target.
//! - [`machine::Machine`] -- Shared lifecycle (`Idle`, `Ready`,
//!   `Processing`, `Complete`, `Error`) over a [`machine::MachineCore`].
//! - [`grinder::GrinderProcess`], [`dosing::DosingProcess`],
//!   [`brew::BrewProcess`] -- The three machines.
//! - [`behavior::BehaviorTable`] -- Per-level interaction mode and duration.
//! - [`quality::evaluate`] -- Scores a dispensed amount against its ideal.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic math.

pub mod behavior;
pub mod brew;
pub mod config;
pub mod dosing;
pub mod event;
pub mod fixed;
pub mod grinder;
pub mod id;
pub mod machine;
pub mod quality;
pub mod station;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
