//! Shared machine lifecycle: `Idle -> Ready -> Processing -> Complete`, plus
//! `Error`.
//!
//! Every process embeds a [`MachineCore`] that owns the lifecycle state, the
//! upgrade level, the progress fraction and the notification [`Outbox`]. The
//! [`Machine`] trait supplies the shared operations on top of it; processes
//! implement [`Machine::refresh_state`] to re-derive their state from their
//! own inventory after every mutation, and may override
//! [`Machine::can_process`] and [`Machine::on_level_changed`].

use log::debug;
use serde::{Deserialize, Serialize};

use crate::behavior::InteractionMode;
use crate::event::{MachineEvent, Notice, Outbox};
use crate::fixed::{Fixed64, clamp01};
use crate::id::{Level, MachineId, MachineKind, SlotIndex};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state shared by all equipment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineState {
    #[default]
    Idle,
    Ready,
    Processing,
    Complete,
    /// Reserved for host fault injection; core logic never enters it.
    Error,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Inventories a machine can run short of or overfill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resource {
    Beans,
    GroundCoffee,
}

/// Recoverable conditions reported by machine operations. Inventory, state
/// and level are left unchanged whenever one of these is returned; the
/// operation may still post a [`Notice`] for the player.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MachineError {
    #[error("upgrade level {level} is outside 0..={max}")]
    InvalidLevel { level: Level, max: Level },

    #[error("cannot downgrade from level {current} to {requested}")]
    Downgrade { current: Level, requested: Level },

    #[error("out of {0:?}")]
    InsufficientInventory(Resource),

    #[error("{0:?} storage is already full")]
    AlreadyMaxCapacity(Resource),

    #[error("ground coffee is already at the largest grind size")]
    GrindAtMaximum,

    #[error("slot {index} is out of range (machine has {available} slots)")]
    InvalidSlotIndex { index: SlotIndex, available: usize },

    #[error("slot {0} is not ready to brew")]
    SlotNotEligible(SlotIndex),

    #[error("slot {0} is brewing")]
    SlotBusy(SlotIndex),

    #[error("{0:?} is already in place")]
    ItemAlreadyPresent(Item),

    #[error("no portafilter in place")]
    PortafilterMissing,

    #[error("operation needs {expected:?} interaction but the machine uses {actual:?}")]
    WrongInteraction {
        expected: InteractionMode,
        actual: InteractionMode,
    },

    #[error("machine is already processing")]
    Busy,

    #[error("machine is faulted")]
    Faulted,

    #[error("unknown machine: {0}")]
    UnknownMachine(MachineId),
}

/// Physical items the player moves between machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Item {
    Portafilter,
    Cup,
    GroundCoffee,
}

// ---------------------------------------------------------------------------
// Fill outcome
// ---------------------------------------------------------------------------

/// Result of adding inventory to a machine's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome<T> {
    /// The whole amount fit.
    Accepted(T),
    /// Only part of the amount fit; storage is now full.
    Clamped { accepted: T },
    /// Storage was already full; nothing changed.
    Rejected,
}

impl<T: Copy + Default> FillOutcome<T> {
    /// True when the whole offered amount was stored.
    pub fn accepted_all(&self) -> bool {
        matches!(self, FillOutcome::Accepted(_))
    }

    /// The amount that actually went into storage.
    pub fn accepted(&self) -> T {
        match self {
            FillOutcome::Accepted(v) => *v,
            FillOutcome::Clamped { accepted } => *accepted,
            FillOutcome::Rejected => T::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// MachineCore
// ---------------------------------------------------------------------------

/// Lifecycle bookkeeping embedded in every process.
#[derive(Debug, Clone)]
pub struct MachineCore {
    kind: MachineKind,
    state: MachineState,
    level: Level,
    max_level: Level,
    progress: Fixed64,
    faulted: bool,
    outbox: Outbox,
}

impl MachineCore {
    pub fn new(kind: MachineKind, max_level: Level) -> Self {
        Self {
            kind,
            state: MachineState::Idle,
            level: 0,
            max_level,
            progress: Fixed64::ZERO,
            faulted: false,
            outbox: Outbox::new(),
        }
    }

    pub fn kind(&self) -> MachineKind {
        self.kind
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn max_level(&self) -> Level {
        self.max_level
    }

    pub fn progress(&self) -> Fixed64 {
        self.progress
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    /// Move to `to`, emitting `StateChanged` if it differs from the current
    /// state. Returns whether a change happened.
    pub fn transition(&mut self, to: MachineState) -> bool {
        if self.state == to {
            return false;
        }
        let from = self.state;
        self.state = to;
        debug!("{}: {:?} -> {:?}", self.kind, from, to);
        self.outbox.push(MachineEvent::StateChanged {
            source: self.kind,
            from,
            to,
        });
        true
    }

    /// Apply a derived state. While faulted the machine stays in `Error`.
    pub fn settle(&mut self, derived: MachineState) {
        if self.faulted {
            self.transition(MachineState::Error);
        } else {
            self.transition(derived);
        }
    }

    /// Enter `Processing` with progress reset to 0.
    pub fn begin_processing(&mut self) {
        self.progress = Fixed64::ZERO;
        self.transition(MachineState::Processing);
    }

    /// Set progress (clamped to `[0, 1]`) and emit `ProgressChanged`.
    pub fn update_progress(&mut self, progress: Fixed64) {
        self.progress = clamp01(progress);
        self.outbox.push(MachineEvent::ProgressChanged {
            source: self.kind,
            progress: self.progress,
        });
    }

    /// Enter `Complete` and emit `ProcessCompleted`.
    pub fn complete_processing(&mut self) {
        self.progress = Fixed64::ONE;
        self.transition(MachineState::Complete);
        self.outbox.push(MachineEvent::ProcessCompleted { source: self.kind });
    }

    /// Force `Idle` with progress 0.
    pub fn reset(&mut self) {
        self.progress = Fixed64::ZERO;
        self.transition(MachineState::Idle);
    }

    /// Validate and store a new upgrade level, emitting `UpgradeApplied`.
    /// Re-applying the current level is accepted without a notification.
    pub fn set_level(&mut self, level: Level) -> Result<bool, MachineError> {
        if level > self.max_level {
            return Err(MachineError::InvalidLevel {
                level,
                max: self.max_level,
            });
        }
        if level < self.level {
            return Err(MachineError::Downgrade {
                current: self.level,
                requested: level,
            });
        }
        if level == self.level {
            return Ok(false);
        }
        self.level = level;
        debug!("{}: upgraded to level {level}", self.kind);
        self.outbox.push(MachineEvent::UpgradeApplied {
            source: self.kind,
            level,
        });
        Ok(true)
    }

    pub fn inject_fault(&mut self) {
        self.faulted = true;
        self.transition(MachineState::Error);
    }

    /// Clear a fault. The owning process must re-derive its state afterwards.
    pub fn clear_fault(&mut self) {
        self.faulted = false;
    }

    /// Fail with [`MachineError::Faulted`] while a fault is injected.
    pub fn ensure_operational(&self) -> Result<(), MachineError> {
        if self.faulted {
            Err(MachineError::Faulted)
        } else {
            Ok(())
        }
    }

    pub fn emit(&mut self, event: MachineEvent) {
        self.outbox.push(event);
    }

    pub fn notice(&mut self, notice: Notice) {
        self.outbox.push(MachineEvent::Notice {
            source: self.kind,
            notice,
        });
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn drain_events(&mut self) -> Vec<MachineEvent> {
        self.outbox.drain()
    }
}

// ---------------------------------------------------------------------------
// Machine trait
// ---------------------------------------------------------------------------

/// Operations shared by every piece of equipment.
pub trait Machine {
    fn core(&self) -> &MachineCore;

    fn core_mut(&mut self) -> &mut MachineCore;

    /// Re-derive the lifecycle state from inventory and processing flags.
    /// Called after every mutation.
    fn refresh_state(&mut self);

    /// Hook run after a new upgrade level has been stored.
    fn on_level_changed(&mut self, level: Level) {
        let _ = level;
    }

    /// Advance timed operations by `dt` seconds. Time never runs backwards:
    /// a negative `dt` is treated as zero.
    fn tick(&mut self, dt: Fixed64);

    fn can_process(&self) -> bool {
        self.core().state() == MachineState::Ready
    }

    /// Enter `Processing` if [`Machine::can_process`] allows it.
    fn start_processing(&mut self) -> bool {
        if !self.can_process() {
            return false;
        }
        self.core_mut().begin_processing();
        true
    }

    /// Switch to a new upgrade level. Out-of-range levels and downgrades are
    /// rejected with no state change.
    fn set_upgrade_level(&mut self, level: Level) -> Result<(), MachineError> {
        if self.core_mut().set_level(level)? {
            self.on_level_changed(level);
        }
        self.refresh_state();
        Ok(())
    }

    fn kind(&self) -> MachineKind {
        self.core().kind()
    }

    fn state(&self) -> MachineState {
        self.core().state()
    }

    fn level(&self) -> Level {
        self.core().level()
    }

    fn max_level(&self) -> Level {
        self.core().max_level()
    }

    fn progress(&self) -> Fixed64 {
        self.core().progress()
    }

    /// Force the machine into `Error` until [`Machine::clear_fault`].
    fn inject_fault(&mut self) {
        self.core_mut().inject_fault();
    }

    fn clear_fault(&mut self) {
        self.core_mut().clear_fault();
        self.refresh_state();
    }

    fn drain_events(&mut self) -> Vec<MachineEvent> {
        self.core_mut().drain_events()
    }
}

/// Something that owns upgradeable machines addressed by [`MachineId`].
pub trait UpgradeTarget {
    /// Apply `level` to the machine named `machine`.
    fn apply_upgrade(&mut self, machine: &MachineId, level: Level) -> Result<(), MachineError>;

    /// The highest level the named machine supports, if it exists.
    fn supported_max_level(&self, machine: &MachineId) -> Option<Level>;
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Test machine: Kettle -- Ready while it holds water
    // -----------------------------------------------------------------------

    #[derive(Debug)]
    struct Kettle {
        core: MachineCore,
        water: u32,
        boiling: bool,
        hooks: Vec<Level>,
    }

    impl Kettle {
        fn new(water: u32) -> Self {
            let mut k = Self {
                core: MachineCore::new(MachineKind::Espresso, 2),
                water,
                boiling: false,
                hooks: Vec::new(),
            };
            k.refresh_state();
            k.core.drain_events();
            k
        }
    }

    impl Machine for Kettle {
        fn core(&self) -> &MachineCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut MachineCore {
            &mut self.core
        }

        fn refresh_state(&mut self) {
            let derived = if self.boiling {
                MachineState::Processing
            } else if self.water > 0 {
                MachineState::Ready
            } else {
                MachineState::Idle
            };
            self.core.settle(derived);
        }

        fn on_level_changed(&mut self, level: Level) {
            self.hooks.push(level);
        }

        fn tick(&mut self, _dt: Fixed64) {}
    }

    fn fixed(v: f64) -> Fixed64 {
        Fixed64::from_num(v)
    }

    #[test]
    fn starts_ready_when_inventory_present() {
        assert_eq!(Kettle::new(1).state(), MachineState::Ready);
        assert_eq!(Kettle::new(0).state(), MachineState::Idle);
    }

    #[test]
    fn start_processing_requires_ready() {
        let mut empty = Kettle::new(0);
        assert!(!empty.start_processing());
        assert_eq!(empty.state(), MachineState::Idle);

        let mut k = Kettle::new(1);
        k.core.update_progress(fixed(0.5));
        assert!(k.start_processing());
        assert_eq!(k.state(), MachineState::Processing);
        assert_eq!(k.progress(), Fixed64::ZERO);
    }

    #[test]
    fn progress_is_clamped_and_notified() {
        let mut k = Kettle::new(1);
        k.core.update_progress(fixed(1.5));
        assert_eq!(k.progress(), Fixed64::ONE);
        k.core.update_progress(fixed(-1.0));
        assert_eq!(k.progress(), Fixed64::ZERO);

        let events = k.drain_events();
        assert_eq!(
            events,
            vec![
                MachineEvent::ProgressChanged {
                    source: MachineKind::Espresso,
                    progress: Fixed64::ONE
                },
                MachineEvent::ProgressChanged {
                    source: MachineKind::Espresso,
                    progress: Fixed64::ZERO
                },
            ]
        );
    }

    #[test]
    fn complete_and_reset() {
        let mut k = Kettle::new(1);
        k.start_processing();
        k.core.complete_processing();
        assert_eq!(k.state(), MachineState::Complete);
        assert!(
            k.core
                .outbox()
                .pending()
                .contains(&MachineEvent::ProcessCompleted {
                    source: MachineKind::Espresso
                })
        );

        k.core.reset();
        assert_eq!(k.state(), MachineState::Idle);
        assert_eq!(k.progress(), Fixed64::ZERO);
    }

    #[test]
    fn state_change_only_notified_on_change() {
        let mut k = Kettle::new(1);
        k.refresh_state();
        k.refresh_state();
        assert!(k.drain_events().is_empty());
    }

    #[test]
    fn set_upgrade_level_runs_hook_and_notifies() {
        let mut k = Kettle::new(1);
        k.set_upgrade_level(1).unwrap();
        assert_eq!(k.level(), 1);
        assert_eq!(k.hooks, vec![1]);
        assert_eq!(
            k.drain_events(),
            vec![MachineEvent::UpgradeApplied {
                source: MachineKind::Espresso,
                level: 1
            }]
        );

        // Same level again is accepted silently.
        k.set_upgrade_level(1).unwrap();
        assert_eq!(k.hooks, vec![1]);
        assert!(k.drain_events().is_empty());
    }

    #[test]
    fn invalid_level_is_rejected_without_change() {
        let mut k = Kettle::new(1);
        let err = k.set_upgrade_level(3).unwrap_err();
        assert_eq!(err, MachineError::InvalidLevel { level: 3, max: 2 });
        assert_eq!(k.level(), 0);
        assert!(k.hooks.is_empty());
        assert!(k.drain_events().is_empty());
    }

    #[test]
    fn downgrade_is_rejected() {
        let mut k = Kettle::new(1);
        k.set_upgrade_level(2).unwrap();
        let err = k.set_upgrade_level(1).unwrap_err();
        assert_eq!(
            err,
            MachineError::Downgrade {
                current: 2,
                requested: 1
            }
        );
        assert_eq!(k.level(), 2);
    }

    #[test]
    fn level_change_rederives_state() {
        let mut k = Kettle::new(0);
        k.water = 3;
        k.set_upgrade_level(1).unwrap();
        assert_eq!(k.state(), MachineState::Ready);
    }

    #[test]
    fn fault_holds_error_until_cleared() {
        let mut k = Kettle::new(1);
        k.inject_fault();
        assert_eq!(k.state(), MachineState::Error);
        assert_eq!(k.core.ensure_operational(), Err(MachineError::Faulted));

        k.refresh_state();
        assert_eq!(k.state(), MachineState::Error);

        k.clear_fault();
        assert_eq!(k.state(), MachineState::Ready);
        assert!(k.core.ensure_operational().is_ok());
    }

    #[test]
    fn fill_outcome_accessors() {
        assert!(FillOutcome::Accepted(3u32).accepted_all());
        assert_eq!(FillOutcome::Clamped { accepted: 2u32 }.accepted(), 2);
        assert!(!FillOutcome::<u32>::Rejected.accepted_all());
        assert_eq!(FillOutcome::<u32>::Rejected.accepted(), 0);
    }
}
