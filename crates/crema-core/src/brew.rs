//! Espresso machine with independent brewing slots.
//!
//! Each slot takes a portafilter (optionally loaded with a scored dose) and a
//! cup. A slot brews once it has all three inputs; slots advance on their own
//! and never block each other. The shot volume scales with dose quality:
//! `base_shot * lerp(0.7, 1.2, quality)`.
//!
//! The process never starts brewing by itself. At levels whose behaviour
//! sets `auto_trigger` the station calls [`BrewProcess::brew_all_ready`]
//! after every action and tick.

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::behavior::LevelBehavior;
use crate::config::BrewConfig;
use crate::event::MachineEvent;
use crate::fixed::{Fixed64, checked_div_64, clamp01, lerp};
use crate::id::{Level, MachineId, MachineKind, SlotIndex};
use crate::machine::{Item, Machine, MachineCore, MachineError, MachineState, UpgradeTarget};

/// Shot strength multiplier for a zero-quality dose.
const WEAKEST_SHOT: f64 = 0.7;
/// Shot strength multiplier for a perfect dose.
const STRONGEST_SHOT: f64 = 1.2;

/// One brewing position on the espresso machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrewSlot {
    pub has_portafilter: bool,
    pub has_cup: bool,
    pub has_ground_coffee: bool,
    /// Quality score of the loaded dose, `[0, 1]`.
    pub coffee_quality: Fixed64,
    pub is_active: bool,
    /// Fraction of the current shot brewed, `[0, 1]`.
    pub brew_progress: Fixed64,
    /// Millilitres in the cup.
    pub cup_volume: Fixed64,
}

impl BrewSlot {
    /// Portafilter with coffee, a cup, and not already brewing.
    pub fn is_eligible(&self) -> bool {
        self.has_portafilter && self.has_ground_coffee && self.has_cup && !self.is_active
    }
}

/// A shot that finished during [`BrewProcess::update_brewing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrewOutcome {
    pub slot: SlotIndex,
    /// Millilitres dispensed into the cup.
    pub volume: Fixed64,
    pub quality: Fixed64,
}

/// Volume of a shot brewed from a dose of the given quality.
pub fn shot_volume(base_shot: Fixed64, quality: Fixed64) -> Fixed64 {
    let strength = lerp(
        Fixed64::from_num(WEAKEST_SHOT),
        Fixed64::from_num(STRONGEST_SHOT),
        quality,
    );
    base_shot * strength
}

#[derive(Debug, Clone)]
pub struct BrewProcess {
    core: MachineCore,
    config: BrewConfig,
    slots: Vec<BrewSlot>,
}

impl BrewProcess {
    pub fn new(config: BrewConfig) -> Self {
        let core = MachineCore::new(MachineKind::Espresso, config.behavior.max_level());
        let slots = vec![BrewSlot::default(); config.slot_count(0)];
        Self {
            core,
            config,
            slots,
        }
    }

    pub fn config(&self) -> &BrewConfig {
        &self.config
    }

    pub fn behavior(&self) -> &LevelBehavior {
        self.config.behavior.get(self.core.level())
    }

    /// Seconds a shot takes at the current level.
    pub fn brew_duration(&self) -> Fixed64 {
        self.behavior().duration
    }

    /// Whether the owner should start eligible slots without a player action.
    pub fn auto_brew_enabled(&self) -> bool {
        self.behavior().auto_trigger
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, index: SlotIndex) -> Option<&BrewSlot> {
        self.slots.get(index)
    }

    pub fn slots(&self) -> &[BrewSlot] {
        &self.slots
    }

    pub fn is_eligible(&self, index: SlotIndex) -> bool {
        self.slots.get(index).is_some_and(BrewSlot::is_eligible)
    }

    pub fn active_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_active).count()
    }

    fn slot_mut(&mut self, index: SlotIndex) -> Result<&mut BrewSlot, MachineError> {
        let available = self.slots.len();
        self.slots
            .get_mut(index)
            .ok_or(MachineError::InvalidSlotIndex { index, available })
    }

    fn slot_changed(&mut self, index: SlotIndex) {
        self.core.emit(MachineEvent::SlotStateChanged { slot: index });
        self.refresh_state();
    }

    // -----------------------------------------------------------------------
    // Placement
    // -----------------------------------------------------------------------

    /// Seat a portafilter in `index`. `dose_quality` is the score of the
    /// coffee it carries, or `None` for an empty portafilter.
    pub fn insert_portafilter(
        &mut self,
        index: SlotIndex,
        dose_quality: Option<Fixed64>,
    ) -> Result<(), MachineError> {
        let slot = self.slot_mut(index)?;
        if slot.has_portafilter {
            return Err(MachineError::ItemAlreadyPresent(Item::Portafilter));
        }
        slot.has_portafilter = true;
        slot.has_ground_coffee = dose_quality.is_some();
        slot.coffee_quality = dose_quality.map(clamp01).unwrap_or(Fixed64::ZERO);
        self.slot_changed(index);
        Ok(())
    }

    /// Take the portafilter out of `index`. Returns whether one was there.
    /// Refused while the slot is brewing.
    pub fn remove_portafilter(&mut self, index: SlotIndex) -> Result<bool, MachineError> {
        let slot = self.slot_mut(index)?;
        if !slot.has_portafilter {
            return Ok(false);
        }
        if slot.is_active {
            return Err(MachineError::SlotBusy(index));
        }
        slot.has_portafilter = false;
        slot.has_ground_coffee = false;
        slot.coffee_quality = Fixed64::ZERO;
        self.slot_changed(index);
        Ok(true)
    }

    /// Put an empty cup under `index`.
    pub fn place_cup(&mut self, index: SlotIndex) -> Result<(), MachineError> {
        let slot = self.slot_mut(index)?;
        if slot.has_cup {
            return Err(MachineError::ItemAlreadyPresent(Item::Cup));
        }
        slot.has_cup = true;
        slot.cup_volume = Fixed64::ZERO;
        self.slot_changed(index);
        Ok(())
    }

    /// Take the cup from `index`, returning the millilitres it holds, or
    /// `None` if there was no cup. Refused while the slot is brewing.
    pub fn remove_cup(&mut self, index: SlotIndex) -> Result<Option<Fixed64>, MachineError> {
        let slot = self.slot_mut(index)?;
        if !slot.has_cup {
            return Ok(None);
        }
        if slot.is_active {
            return Err(MachineError::SlotBusy(index));
        }
        let volume = std::mem::take(&mut slot.cup_volume);
        slot.has_cup = false;
        self.slot_changed(index);
        Ok(Some(volume))
    }

    // -----------------------------------------------------------------------
    // Brewing
    // -----------------------------------------------------------------------

    pub fn start_brewing(&mut self, index: SlotIndex) -> Result<(), MachineError> {
        self.core.ensure_operational()?;
        let slot = self.slot_mut(index)?;
        if !slot.is_eligible() {
            return Err(MachineError::SlotNotEligible(index));
        }
        slot.is_active = true;
        slot.brew_progress = Fixed64::ZERO;
        debug!("espresso: slot {index} brewing");
        self.slot_changed(index);
        Ok(())
    }

    /// Start every eligible slot. Returns the slots that started.
    pub fn brew_all_ready(&mut self) -> Vec<SlotIndex> {
        if self.core.is_faulted() {
            return Vec::new();
        }
        let ready: Vec<SlotIndex> = (0..self.slots.len())
            .filter(|&i| self.slots[i].is_eligible())
            .collect();
        for &index in &ready {
            if let Err(err) = self.start_brewing(index) {
                debug!("espresso: slot {index} did not start: {err}");
            }
        }
        ready
    }

    /// Advance every active slot by `dt` seconds and finish the ones that
    /// reach full progress.
    pub fn update_brewing(&mut self, dt: Fixed64) -> Vec<BrewOutcome> {
        if self.core.is_faulted() || self.active_slots() == 0 {
            return Vec::new();
        }
        let step = checked_div_64(dt.max(Fixed64::ZERO), self.brew_duration())
            .unwrap_or(Fixed64::ONE);
        let base_shot = self.config.base_shot;

        let mut finished = Vec::new();
        let mut lead = Fixed64::ZERO;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if !slot.is_active {
                continue;
            }
            slot.brew_progress = clamp01(slot.brew_progress.saturating_add(step));
            if slot.brew_progress < Fixed64::ONE {
                lead = lead.max(slot.brew_progress);
                continue;
            }

            let quality = slot.coffee_quality;
            let volume = shot_volume(base_shot, quality);
            slot.cup_volume += volume;
            slot.has_ground_coffee = false;
            slot.coffee_quality = Fixed64::ZERO;
            slot.is_active = false;
            slot.brew_progress = Fixed64::ZERO;
            finished.push(BrewOutcome {
                slot: index,
                volume,
                quality,
            });
        }

        if self.active_slots() > 0 {
            trace!("espresso: lead slot at {lead}");
            self.core.update_progress(lead);
        }
        for outcome in &finished {
            debug!(
                "espresso: slot {} poured {}ml (quality {})",
                outcome.slot, outcome.volume, outcome.quality
            );
            self.core.emit(MachineEvent::BrewingCompleted {
                slot: outcome.slot,
                volume: outcome.volume,
                quality: outcome.quality,
            });
            self.core.emit(MachineEvent::SlotStateChanged { slot: outcome.slot });
        }
        if !finished.is_empty() {
            self.core.complete_processing();
        }
        self.refresh_state();
        finished
    }
}

impl Machine for BrewProcess {
    fn core(&self) -> &MachineCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut MachineCore {
        &mut self.core
    }

    fn refresh_state(&mut self) {
        let derived = if self.slots.iter().any(|s| s.is_active) {
            MachineState::Processing
        } else if self.slots.iter().any(BrewSlot::is_eligible) {
            MachineState::Ready
        } else {
            MachineState::Idle
        };
        self.core.settle(derived);
    }

    /// New slots appear when the level expands the machine. Active slots
    /// keep their progress fraction and continue at the new duration.
    fn on_level_changed(&mut self, level: Level) {
        let wanted = self.config.slot_count(level);
        if wanted > self.slots.len() {
            let first_new = self.slots.len();
            self.slots.resize(wanted, BrewSlot::default());
            debug!("espresso: expanded to {wanted} slots");
            for index in first_new..wanted {
                self.core.emit(MachineEvent::SlotStateChanged { slot: index });
            }
        }
    }

    fn start_processing(&mut self) -> bool {
        !self.brew_all_ready().is_empty()
    }

    fn tick(&mut self, dt: Fixed64) {
        self.update_brewing(dt);
    }
}

impl UpgradeTarget for BrewProcess {
    fn apply_upgrade(&mut self, machine: &MachineId, level: Level) -> Result<(), MachineError> {
        if MachineKind::from_id(machine) != Some(MachineKind::Espresso) {
            return Err(MachineError::UnknownMachine(machine.clone()));
        }
        self.set_upgrade_level(level)
    }

    fn supported_max_level(&self, machine: &MachineId) -> Option<Level> {
        (MachineKind::from_id(machine) == Some(MachineKind::Espresso)).then(|| self.max_level())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
