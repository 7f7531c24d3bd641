//! The coffee station: one grinder, one doser, one espresso machine and the
//! event bus that fans their notifications out to listeners.
//!
//! The station is the host loop's single entry point. Each call follows the
//! same pipeline:
//!
//! 1. **Route** -- hand the action (or the tick) to the owning process.
//! 2. **Auto-brew** -- at espresso levels with `auto_trigger`, start every
//!    eligible slot.
//! 3. **Flush** -- drain every process outbox into the bus and deliver.
//!
//! Processes never see each other. Moving a portafilter from the doser to a
//! brew slot goes through [`CoffeeStation::move_portafilter_to_slot`].

use log::{debug, warn};

use crate::brew::{BrewOutcome, BrewProcess};
use crate::config::{ConfigError, StationConfig};
use crate::dosing::DosingProcess;
use crate::event::{EventBus, EventKind, Listener};
use crate::fixed::Fixed64;
use crate::grinder::GrinderProcess;
use crate::id::{Level, ListenerId, MachineId, MachineKind, SlotIndex};
use crate::machine::{
    FillOutcome, Item, Machine, MachineError, MachineState, Resource, UpgradeTarget,
};

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Where an item is placed or picked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    /// The grinder's output tray.
    GrinderOutput,
    /// Under the doser spout.
    Doser,
    /// A brewing slot on the espresso machine.
    Slot(SlotIndex),
}

/// A discrete input from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationAction {
    /// The player finished this many crank spins.
    SpinCompleted(u32),
    GrinderButton,
    DoserButton,
    /// Start one slot, or every eligible slot for `None`.
    BrewButton(Option<SlotIndex>),
    /// The doser lever was held for this many seconds.
    HoldTick(Fixed64),
    HoldReleased,
    ItemPlaced { item: Item, at: Location },
    ItemRemoved { item: Item, at: Location },
    AddBeans(u32),
    /// Grams of ground coffee poured into the doser hopper.
    AddCoffee(Fixed64),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StationError {
    #[error(transparent)]
    Machine(#[from] MachineError),

    #[error("a {item:?} cannot be placed at {at:?}")]
    CannotPlace { item: Item, at: Location },

    #[error("a {item:?} cannot be removed from {at:?}")]
    CannotRemove { item: Item, at: Location },
}

// ---------------------------------------------------------------------------
// Station
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct CoffeeStation {
    grinder: GrinderProcess,
    doser: DosingProcess,
    brewer: BrewProcess,
    bus: EventBus,
    /// Simulated seconds ticked so far.
    elapsed: Fixed64,
}

impl CoffeeStation {
    pub fn new(config: StationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let StationConfig {
            grinder,
            doser,
            brewer,
            event_capacity,
        } = config;
        Ok(Self {
            grinder: GrinderProcess::new(grinder),
            doser: DosingProcess::new(doser),
            brewer: BrewProcess::new(brewer),
            bus: EventBus::new(event_capacity),
            elapsed: Fixed64::ZERO,
        })
    }

    pub fn grinder(&self) -> &GrinderProcess {
        &self.grinder
    }

    pub fn doser(&self) -> &DosingProcess {
        &self.doser
    }

    pub fn brewer(&self) -> &BrewProcess {
        &self.brewer
    }

    pub fn machine(&self, kind: MachineKind) -> &dyn Machine {
        match kind {
            MachineKind::Grinder => &self.grinder,
            MachineKind::Doser => &self.doser,
            MachineKind::Espresso => &self.brewer,
        }
    }

    fn machine_mut(&mut self, kind: MachineKind) -> &mut dyn Machine {
        match kind {
            MachineKind::Grinder => &mut self.grinder,
            MachineKind::Doser => &mut self.doser,
            MachineKind::Espresso => &mut self.brewer,
        }
    }

    pub fn state(&self, kind: MachineKind) -> MachineState {
        self.machine(kind).state()
    }

    pub fn level(&self, kind: MachineKind) -> Level {
        self.machine(kind).level()
    }

    pub fn elapsed(&self) -> Fixed64 {
        self.elapsed
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Mutable bus access for suppression and filtered subscriptions.
    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    pub fn subscribe(&mut self, kind: EventKind, listener: Listener) -> ListenerId {
        self.bus.subscribe(kind, listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.bus.unsubscribe(id)
    }

    // -----------------------------------------------------------------------
    // Host loop
    // -----------------------------------------------------------------------

    /// Advance every machine by `dt` seconds. Returns the shots that finished.
    /// A negative `dt` is treated as zero.
    pub fn tick(&mut self, dt: Fixed64) -> Vec<BrewOutcome> {
        let dt = dt.max(Fixed64::ZERO);
        self.elapsed += dt;
        self.grinder.tick(dt);
        self.doser.tick(dt);
        let poured = self.brewer.update_brewing(dt);
        self.settle();
        poured
    }

    /// Route one host action to the machine it concerns.
    pub fn apply(&mut self, action: StationAction) -> Result<(), StationError> {
        let result = self.route(action);
        if let Err(err) = &result {
            warn!("station: {action:?} refused: {err}");
        }
        self.settle();
        result
    }

    fn route(&mut self, action: StationAction) -> Result<(), StationError> {
        match action {
            StationAction::SpinCompleted(count) => {
                self.grinder.spin(count)?;
            }
            StationAction::GrinderButton => self.grinder.press_button()?,
            StationAction::DoserButton => self.doser.press_button()?,
            StationAction::BrewButton(Some(slot)) => self.brewer.start_brewing(slot)?,
            StationAction::BrewButton(None) => {
                self.brewer.brew_all_ready();
            }
            StationAction::HoldTick(dt) => {
                self.doser.hold_tick(dt)?;
            }
            StationAction::HoldReleased => {
                self.doser.release_hold();
            }
            StationAction::ItemPlaced { item, at } => self.place(item, at)?,
            StationAction::ItemRemoved { item, at } => self.remove(item, at)?,
            StationAction::AddBeans(count) => {
                if self.grinder.add_beans(count) == FillOutcome::Rejected {
                    return Err(MachineError::AlreadyMaxCapacity(Resource::Beans).into());
                }
            }
            StationAction::AddCoffee(grams) => {
                if self.doser.add_coffee(grams) == FillOutcome::Rejected {
                    return Err(MachineError::AlreadyMaxCapacity(Resource::GroundCoffee).into());
                }
            }
        }
        Ok(())
    }

    fn place(&mut self, item: Item, at: Location) -> Result<(), StationError> {
        match (item, at) {
            (Item::Portafilter, Location::Doser) => self.doser.place_portafilter(Fixed64::ZERO)?,
            (Item::Portafilter, Location::Slot(slot)) => {
                self.brewer.insert_portafilter(slot, None)?
            }
            (Item::Cup, Location::Slot(slot)) => self.brewer.place_cup(slot)?,
            _ => return Err(StationError::CannotPlace { item, at }),
        }
        Ok(())
    }

    /// Removing something that is not there is a silent no-op.
    fn remove(&mut self, item: Item, at: Location) -> Result<(), StationError> {
        match (item, at) {
            (Item::GroundCoffee, Location::GrinderOutput) => {
                self.grinder.remove_ground_coffee();
            }
            (Item::Portafilter, Location::Doser) => {
                self.doser.remove_portafilter();
            }
            (Item::Portafilter, Location::Slot(slot)) => {
                self.brewer.remove_portafilter(slot)?;
            }
            (Item::Cup, Location::Slot(slot)) => {
                self.brewer.remove_cup(slot)?;
            }
            _ => return Err(StationError::CannotRemove { item, at }),
        }
        Ok(())
    }

    /// Carry the doser's portafilter into brew slot `slot`. The dose is
    /// scored on the way; an empty portafilter arrives without coffee.
    pub fn move_portafilter_to_slot(&mut self, slot: SlotIndex) -> Result<(), StationError> {
        let result = self.transfer_portafilter(slot);
        if let Err(err) = &result {
            warn!("station: portafilter move to slot {slot} refused: {err}");
        }
        self.settle();
        result
    }

    fn transfer_portafilter(&mut self, slot: SlotIndex) -> Result<(), StationError> {
        if !self.doser.has_portafilter() {
            return Err(MachineError::PortafilterMissing.into());
        }
        let target = self.brewer.slot(slot).ok_or(MachineError::InvalidSlotIndex {
            index: slot,
            available: self.brewer.slot_count(),
        })?;
        if target.has_portafilter {
            return Err(MachineError::ItemAlreadyPresent(Item::Portafilter).into());
        }

        let Some(grams) = self.doser.remove_portafilter() else {
            return Err(MachineError::PortafilterMissing.into());
        };
        let quality = (grams > Fixed64::ZERO)
            .then(|| self.doser.config().target().evaluate(grams).score);
        self.brewer.insert_portafilter(slot, quality)?;
        debug!("station: {grams}g portafilter moved to slot {slot}");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Faults
    // -----------------------------------------------------------------------

    pub fn inject_fault(&mut self, kind: MachineKind) {
        warn!("station: fault injected into {kind}");
        self.machine_mut(kind).inject_fault();
        self.settle();
    }

    pub fn clear_fault(&mut self, kind: MachineKind) {
        self.machine_mut(kind).clear_fault();
        self.settle();
    }

    // -----------------------------------------------------------------------
    // Pipeline
    // -----------------------------------------------------------------------

    fn settle(&mut self) {
        if self.brewer.auto_brew_enabled() {
            let started = self.brewer.brew_all_ready();
            if !started.is_empty() {
                debug!("station: auto-brew started slots {started:?}");
            }
        }
        self.flush();
    }

    fn flush(&mut self) {
        self.bus.emit_all(self.grinder.drain_events());
        self.bus.emit_all(self.doser.drain_events());
        self.bus.emit_all(self.brewer.drain_events());
        self.bus.deliver();
    }
}

impl UpgradeTarget for CoffeeStation {
    fn apply_upgrade(&mut self, machine: &MachineId, level: Level) -> Result<(), MachineError> {
        let Some(kind) = MachineKind::from_id(machine) else {
            warn!("station: upgrade for unknown machine {machine}");
            return Err(MachineError::UnknownMachine(machine.clone()));
        };
        let result = self.machine_mut(kind).set_upgrade_level(level);
        if let Err(err) = &result {
            warn!("station: {kind} upgrade to level {level} rejected: {err}");
        }
        self.settle();
        result
    }

    fn supported_max_level(&self, machine: &MachineId) -> Option<Level> {
        MachineKind::from_id(machine).map(|kind| self.machine(kind).max_level())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
