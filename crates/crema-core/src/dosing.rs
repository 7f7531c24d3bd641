//! Ground-coffee doser.
//!
//! The doser stores ground coffee and transfers it into a portafilter. Every
//! transfer moves mass from storage into the portafilter and nowhere else, so
//! `stored + portafilter` is conserved exactly across every operation. A
//! completed dose is scored against the configured ideal and tolerance.
//!
//! Dose triggers by interaction mode:
//!
//! - `ManualHold`: [`DosingProcess::hold_tick`] pours `hold_rate * dt` per
//!   tick while the lever is held; [`DosingProcess::release_hold`] finishes
//!   the dose.
//! - `Button`: [`DosingProcess::press_button`] starts a timed fill to the
//!   ideal amount.
//! - `Automatic`: a timed top-off starts by itself whenever a portafilter
//!   below the ideal amount sits under a non-empty hopper.

use log::{debug, trace};

use crate::behavior::{InteractionMode, LevelBehavior};
use crate::config::DosingConfig;
use crate::event::{MachineEvent, Notice};
use crate::fixed::{Fixed64, fraction};
use crate::id::{Level, MachineId, MachineKind};
use crate::machine::{
    FillOutcome, Item, Machine, MachineCore, MachineError, MachineState, Resource, UpgradeTarget,
};
use crate::quality::QualityResult;

/// How a timed dose settles when its timer runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoseKind {
    /// Button dose: bring the portafilter to the ideal amount. When storage
    /// cannot cover the shortfall the existing dose goes back into the
    /// hopper and the portafilter is refilled from everything stored.
    Fill,
    /// Automatic dose: add only the deficit, never disturbing what is
    /// already in the portafilter.
    TopOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TimedDose {
    kind: DoseKind,
    elapsed: Fixed64,
}

#[derive(Debug, Clone)]
pub struct DosingProcess {
    core: MachineCore,
    config: DosingConfig,
    stored: Fixed64,
    /// Grams in the portafilter; `None` when no portafilter is in place.
    portafilter: Option<Fixed64>,
    holding: bool,
    dose: Option<TimedDose>,
    /// Set when a dose completes, cleared when the portafilter leaves or the
    /// next dose begins.
    dosed: bool,
    last_quality: Option<QualityResult>,
}

impl DosingProcess {
    pub fn new(config: DosingConfig) -> Self {
        let core = MachineCore::new(MachineKind::Doser, config.behavior.max_level());
        Self {
            core,
            config,
            stored: Fixed64::ZERO,
            portafilter: None,
            holding: false,
            dose: None,
            dosed: false,
            last_quality: None,
        }
    }

    pub fn config(&self) -> &DosingConfig {
        &self.config
    }

    pub fn behavior(&self) -> &LevelBehavior {
        self.config.behavior.get(self.core.level())
    }

    pub fn stored_amount(&self) -> Fixed64 {
        self.stored
    }

    pub fn has_portafilter(&self) -> bool {
        self.portafilter.is_some()
    }

    /// Grams in the portafilter, 0 when none is in place.
    pub fn portafilter_amount(&self) -> Fixed64 {
        self.portafilter.unwrap_or(Fixed64::ZERO)
    }

    /// Storage plus portafilter contents.
    pub fn total_mass(&self) -> Fixed64 {
        self.stored + self.portafilter_amount()
    }

    pub fn is_holding(&self) -> bool {
        self.holding
    }

    pub fn active_dose(&self) -> Option<DoseKind> {
        self.dose.map(|d| d.kind)
    }

    /// Quality of the most recent completed dose.
    pub fn last_quality(&self) -> Option<&QualityResult> {
        self.last_quality.as_ref()
    }

    fn is_busy(&self) -> bool {
        self.holding || self.dose.is_some()
    }

    // -----------------------------------------------------------------------
    // Inventory
    // -----------------------------------------------------------------------

    /// Add ground coffee to storage, clamped to capacity. A full hopper
    /// rejects the whole amount.
    pub fn add_coffee(&mut self, amount: Fixed64) -> FillOutcome<Fixed64> {
        if amount <= Fixed64::ZERO {
            return FillOutcome::Accepted(Fixed64::ZERO);
        }
        let room = (self.config.capacity - self.stored).max(Fixed64::ZERO);
        if room == Fixed64::ZERO {
            self.core.notice(Notice::StorageFull);
            return FillOutcome::Rejected;
        }

        let accepted = amount.min(room);
        self.stored += accepted;
        self.core.emit(MachineEvent::CoffeeAmountChanged { amount: self.stored });
        debug!("doser: +{accepted}g ({}g stored)", self.stored);
        self.after_mutation();

        if accepted < amount {
            self.core.notice(Notice::StorageFull);
            FillOutcome::Clamped { accepted }
        } else {
            FillOutcome::Accepted(accepted)
        }
    }

    /// Put a portafilter holding `contents` grams under the spout.
    pub fn place_portafilter(&mut self, contents: Fixed64) -> Result<(), MachineError> {
        if self.portafilter.is_some() {
            return Err(MachineError::ItemAlreadyPresent(Item::Portafilter));
        }
        let contents = contents.max(Fixed64::ZERO);
        self.portafilter = Some(contents);
        self.dosed = false;
        self.core.emit(MachineEvent::PortafilterFillChanged { amount: contents });
        debug!("doser: portafilter placed with {contents}g");
        self.after_mutation();
        Ok(())
    }

    /// Take the portafilter away with whatever it holds. Cancels a hold or
    /// timed dose in flight; mass already poured stays in the portafilter.
    /// No-op when there is no portafilter.
    pub fn remove_portafilter(&mut self) -> Option<Fixed64> {
        let amount = self.portafilter.take()?;
        if self.is_busy() {
            debug!("doser: portafilter removed mid-dose, {amount}g kept");
        }
        self.holding = false;
        self.dose = None;
        self.dosed = false;
        self.core.update_progress(Fixed64::ZERO);
        self.core.emit(MachineEvent::PortafilterFillChanged {
            amount: Fixed64::ZERO,
        });
        self.after_mutation();
        Some(amount)
    }

    // -----------------------------------------------------------------------
    // Manual hold
    // -----------------------------------------------------------------------

    /// Pour for `dt` seconds of lever hold. Returns the grams transferred.
    pub fn hold_tick(&mut self, dt: Fixed64) -> Result<Fixed64, MachineError> {
        self.core.ensure_operational()?;
        self.require_mode(InteractionMode::ManualHold)?;
        if self.portafilter.is_none() {
            self.core.notice(Notice::NoPortafilter);
            return Err(MachineError::PortafilterMissing);
        }

        if !self.holding {
            self.holding = true;
            self.dosed = false;
            self.core.begin_processing();
            if self.stored == Fixed64::ZERO {
                self.core.notice(Notice::OutOfCoffee);
            }
        }

        let wanted = self.config.hold_rate * dt.max(Fixed64::ZERO);
        let moved = self.transfer(wanted);
        if moved > Fixed64::ZERO {
            let progress = fraction(self.portafilter_amount(), self.config.ideal);
            trace!("doser: hold poured {moved}g");
            self.core.update_progress(progress);
            if self.stored == Fixed64::ZERO {
                self.core.notice(Notice::OutOfCoffee);
            }
        }
        self.refresh_state();
        Ok(moved)
    }

    /// Let go of the lever. Completes the dose and returns its quality, or
    /// `None` if no hold was active.
    pub fn release_hold(&mut self) -> Option<QualityResult> {
        if !self.holding {
            return None;
        }
        self.holding = false;
        let result = self.complete_dose();
        self.after_mutation();
        result
    }

    // -----------------------------------------------------------------------
    // Timed doses
    // -----------------------------------------------------------------------

    /// Start a timed fill to the ideal amount.
    pub fn press_button(&mut self) -> Result<(), MachineError> {
        self.core.ensure_operational()?;
        if !self.behavior().is_timed() {
            return Err(MachineError::WrongInteraction {
                expected: InteractionMode::Button,
                actual: self.behavior().mode,
            });
        }
        if self.is_busy() {
            return Err(MachineError::Busy);
        }
        if self.portafilter.is_none() {
            self.core.notice(Notice::NoPortafilter);
            return Err(MachineError::PortafilterMissing);
        }
        if self.stored == Fixed64::ZERO {
            self.core.notice(Notice::OutOfCoffee);
            return Err(MachineError::InsufficientInventory(Resource::GroundCoffee));
        }
        self.begin_dose(DoseKind::Fill);
        self.refresh_state();
        Ok(())
    }

    fn begin_dose(&mut self, kind: DoseKind) {
        self.dose = Some(TimedDose {
            kind,
            elapsed: Fixed64::ZERO,
        });
        self.dosed = false;
        self.core.begin_processing();
        debug!("doser: {kind:?} dose started");
    }

    fn finish_dose(&mut self, kind: DoseKind) {
        let current = self.portafilter_amount();
        let deficit = (self.config.ideal - current).max(Fixed64::ZERO);
        match kind {
            DoseKind::Fill if self.stored < deficit && current > Fixed64::ZERO => {
                // Knock the partial dose back and refill from scratch.
                self.stored += current;
                self.portafilter = Some(Fixed64::ZERO);
                self.core.emit(MachineEvent::PortafilterFillChanged {
                    amount: Fixed64::ZERO,
                });
                let all = self.stored;
                self.transfer(all);
            }
            DoseKind::Fill | DoseKind::TopOff => {
                self.transfer(deficit);
            }
        }
        if self.stored == Fixed64::ZERO && self.portafilter_amount() < self.config.ideal {
            self.core.notice(Notice::OutOfCoffee);
        }
        self.core.update_progress(Fixed64::ONE);
        self.complete_dose();
    }

    /// Automatic level: top off a portafilter that is below the ideal amount.
    fn maybe_auto_start(&mut self) {
        if !self.behavior().auto_trigger || self.core.is_faulted() || self.is_busy() {
            return;
        }
        if let Some(amount) = self.portafilter
            && amount < self.config.ideal
            && self.stored > Fixed64::ZERO
        {
            self.begin_dose(DoseKind::TopOff);
        }
    }

    // -----------------------------------------------------------------------
    // Shared
    // -----------------------------------------------------------------------

    /// Move up to `amount` grams from storage into the portafilter.
    fn transfer(&mut self, amount: Fixed64) -> Fixed64 {
        let Some(current) = self.portafilter else {
            return Fixed64::ZERO;
        };
        let moved = amount.min(self.stored).max(Fixed64::ZERO);
        if moved == Fixed64::ZERO {
            return moved;
        }
        self.stored -= moved;
        let filled = current + moved;
        self.portafilter = Some(filled);
        self.core.emit(MachineEvent::CoffeeAmountChanged { amount: self.stored });
        self.core.emit(MachineEvent::PortafilterFillChanged { amount: filled });
        moved
    }

    fn complete_dose(&mut self) -> Option<QualityResult> {
        let amount = self.portafilter?;
        let result = self.config.target().evaluate(amount);
        debug!(
            "doser: dosed {amount}g, score {} ({})",
            result.score, result.description
        );
        self.core.emit(MachineEvent::QualityEvaluated {
            source: MachineKind::Doser,
            result: result.clone(),
        });
        self.last_quality = Some(result.clone());
        self.dosed = true;
        self.core.complete_processing();
        Some(result)
    }

    fn require_mode(&self, expected: InteractionMode) -> Result<(), MachineError> {
        let actual = self.behavior().mode;
        if actual == expected {
            Ok(())
        } else {
            Err(MachineError::WrongInteraction { expected, actual })
        }
    }

    fn after_mutation(&mut self) {
        self.maybe_auto_start();
        self.refresh_state();
    }
}

impl Machine for DosingProcess {
    fn core(&self) -> &MachineCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut MachineCore {
        &mut self.core
    }

    fn refresh_state(&mut self) {
        let derived = if self.is_busy() {
            MachineState::Processing
        } else if self.portafilter.is_none() {
            MachineState::Idle
        } else if self.dosed {
            MachineState::Complete
        } else if self.stored > Fixed64::ZERO {
            MachineState::Ready
        } else {
            MachineState::Idle
        };
        self.core.settle(derived);
    }

    fn on_level_changed(&mut self, level: Level) {
        if self.holding && !matches!(self.behavior().mode, InteractionMode::ManualHold) {
            debug!("doser: level {level} ends the manual hold");
            self.holding = false;
            self.complete_dose();
        }
        self.maybe_auto_start();
    }

    /// Inventory decides, not the derived state: a completed dose can be
    /// followed by another without removing the portafilter.
    fn can_process(&self) -> bool {
        !self.core.is_faulted()
            && self.stored > Fixed64::ZERO
            && self.portafilter.is_some()
            && !self.is_busy()
    }

    fn start_processing(&mut self) -> bool {
        self.can_process() && self.behavior().is_timed() && self.press_button().is_ok()
    }

    fn tick(&mut self, dt: Fixed64) {
        if self.core.is_faulted() {
            return;
        }
        let dt = dt.max(Fixed64::ZERO);
        if let Some(dose) = self.dose.as_mut() {
            dose.elapsed += dt;
            let TimedDose { kind, elapsed } = *dose;
            let duration = self.behavior().duration;
            if elapsed >= duration {
                self.dose = None;
                self.finish_dose(kind);
            } else {
                let progress = fraction(elapsed, duration);
                trace!("doser: progress {progress}");
                self.core.update_progress(progress);
            }
        }
        self.after_mutation();
    }

    fn clear_fault(&mut self) {
        self.core.clear_fault();
        self.after_mutation();
    }
}

impl UpgradeTarget for DosingProcess {
    fn apply_upgrade(&mut self, machine: &MachineId, level: Level) -> Result<(), MachineError> {
        if MachineKind::from_id(machine) != Some(MachineKind::Doser) {
            return Err(MachineError::UnknownMachine(machine.clone()));
        }
        self.set_upgrade_level(level)
    }

    fn supported_max_level(&self, machine: &MachineId) -> Option<Level> {
        (MachineKind::from_id(machine) == Some(MachineKind::Doser)).then(|| self.max_level())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
