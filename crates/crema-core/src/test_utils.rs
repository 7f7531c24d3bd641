//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::brew::BrewProcess;
use crate::config::{BrewConfig, DosingConfig, GrinderConfig, StationConfig};
use crate::dosing::DosingProcess;
use crate::event::{EventKind, MachineEvent};
use crate::fixed::Fixed64;
use crate::grinder::GrinderProcess;
use crate::id::{Level, MachineKind, SlotIndex};
use crate::machine::{Machine, UpgradeTarget};
use crate::station::CoffeeStation;
use std::cell::RefCell;
use std::rc::Rc;

// ===========================================================================
// Fixed-point helper
// ===========================================================================

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

// ===========================================================================
// Configurations
// ===========================================================================

/// Dosing config with ideal 18g, tolerance 1g, 100g capacity, 10 g/s hold.
pub fn standard_doser_config() -> DosingConfig {
    DosingConfig::default()
}

/// Brewing config with a 30ml base shot.
pub fn standard_brew_config() -> BrewConfig {
    BrewConfig::default()
}

// ===========================================================================
// Pre-filled processes
// ===========================================================================

/// Grinder at `level` holding `beans`, with its outbox drained.
pub fn grinder_with_beans(beans: u32, level: Level) -> GrinderProcess {
    let mut grinder = GrinderProcess::new(GrinderConfig {
        bean_capacity: beans.max(GrinderConfig::default().bean_capacity),
        ..GrinderConfig::default()
    });
    grinder.add_beans(beans);
    // Level after beans, so automatic levels start grinding straight away.
    let _ = grinder.set_upgrade_level(level);
    grinder.drain_events();
    grinder
}

/// Doser at `level` with `stored` grams and no portafilter.
pub fn doser_with_coffee(stored: f64, level: Level) -> DosingProcess {
    let mut doser = DosingProcess::new(standard_doser_config());
    let _ = doser.set_upgrade_level(level);
    doser.add_coffee(fixed(stored));
    doser.drain_events();
    doser
}

/// Brewer at `level` with slot `slot` loaded with a dose of `quality` and a
/// cup, ready to brew.
pub fn brewer_with_loaded_slot(slot: SlotIndex, quality: f64, level: Level) -> BrewProcess {
    let mut brewer = BrewProcess::new(standard_brew_config());
    let _ = brewer.set_upgrade_level(level);
    let _ = brewer.insert_portafilter(slot, Some(fixed(quality)));
    let _ = brewer.place_cup(slot);
    brewer.drain_events();
    brewer
}

/// Station with default configuration.
pub fn standard_station() -> CoffeeStation {
    match CoffeeStation::new(StationConfig::default()) {
        Ok(station) => station,
        Err(err) => panic!("default station config is invalid: {err}"),
    }
}

/// Station with every machine at `level`.
pub fn station_at_level(level: Level) -> CoffeeStation {
    let mut station = standard_station();
    for kind in MachineKind::ALL {
        if let Err(err) = station.apply_upgrade(&kind.id(), level) {
            panic!("cannot upgrade {kind} to {level}: {err}");
        }
    }
    station
}

// ===========================================================================
// Event capture
// ===========================================================================

/// Subscribe a recorder for `kind` and return the shared log it appends to.
pub fn record_events(station: &mut CoffeeStation, kind: EventKind) -> Rc<RefCell<Vec<MachineEvent>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    station.subscribe(
        kind,
        Box::new(move |e: &MachineEvent| sink.borrow_mut().push(e.clone())),
    );
    log
}
