//! Bean grinder.
//!
//! The grinder turns beans into ground coffee one grind step at a time. Each
//! step consumes one bean and moves the grind one size up
//! (`none -> Small -> Medium -> Large`). What drives a step depends on the
//! upgrade level:
//!
//! | Mode         | Trigger                                   |
//! |--------------|-------------------------------------------|
//! | `ManualSpin` | [`GrinderProcess::spin`], synchronous     |
//! | `Button`     | [`GrinderProcess::press_button`], timed   |
//! | `Automatic`  | starts on its own whenever it can, timed  |

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::behavior::{InteractionMode, LevelBehavior};
use crate::config::GrinderConfig;
use crate::event::{MachineEvent, Notice};
use crate::fixed::{Fixed64, fraction};
use crate::id::{Level, MachineId, MachineKind};
use crate::machine::{FillOutcome, Machine, MachineCore, MachineError, MachineState, Resource, UpgradeTarget};

/// Size of the ground coffee in the grinder's output.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum GrindSize {
    #[default]
    Small,
    Medium,
    Large,
}

impl GrindSize {
    /// The next size up, or `None` at `Large`.
    pub fn next(self) -> Option<GrindSize> {
        match self {
            GrindSize::Small => Some(GrindSize::Medium),
            GrindSize::Medium => Some(GrindSize::Large),
            GrindSize::Large => None,
        }
    }
}

/// What a single grind step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrindOutcome {
    /// Fresh ground coffee appeared at `Small`.
    Created,
    /// Existing ground coffee grew to the given size.
    Upgraded(GrindSize),
    /// Already `Large`; no bean consumed.
    AlreadyMaximum,
    /// No beans left; nothing changed.
    OutOfBeans,
}

impl GrindOutcome {
    /// Whether the step consumed a bean.
    pub fn consumed_bean(self) -> bool {
        matches!(self, GrindOutcome::Created | GrindOutcome::Upgraded(_))
    }
}

#[derive(Debug, Clone)]
pub struct GrinderProcess {
    core: MachineCore,
    config: GrinderConfig,
    beans: u32,
    /// `None` when the output tray is empty. Removing the output therefore
    /// always resets the size.
    ground: Option<GrindSize>,
    spin_accumulator: u32,
    /// Seconds elapsed on the running timed grind.
    timer: Option<Fixed64>,
}

impl GrinderProcess {
    pub fn new(config: GrinderConfig) -> Self {
        let core = MachineCore::new(MachineKind::Grinder, config.behavior.max_level());
        Self {
            core,
            config,
            beans: 0,
            ground: None,
            spin_accumulator: 0,
            timer: None,
        }
    }

    pub fn config(&self) -> &GrinderConfig {
        &self.config
    }

    /// Behaviour of the current level.
    pub fn behavior(&self) -> &LevelBehavior {
        self.config.behavior.get(self.core.level())
    }

    pub fn bean_count(&self) -> u32 {
        self.beans
    }

    pub fn bean_capacity(&self) -> u32 {
        self.config.bean_capacity
    }

    pub fn ground_coffee(&self) -> Option<GrindSize> {
        self.ground
    }

    pub fn has_ground_coffee(&self) -> bool {
        self.ground.is_some()
    }

    /// Size shown for the output. `Small` while the tray is empty.
    pub fn grind_size(&self) -> GrindSize {
        self.ground.unwrap_or_default()
    }

    pub fn spin_accumulator(&self) -> u32 {
        self.spin_accumulator
    }

    pub fn is_grinding(&self) -> bool {
        self.timer.is_some()
    }

    // -----------------------------------------------------------------------
    // Inventory
    // -----------------------------------------------------------------------

    /// Pour `count` bean fills into the hopper, clamped to capacity. A full
    /// hopper rejects the whole amount.
    pub fn add_beans(&mut self, count: u32) -> FillOutcome<u32> {
        if count == 0 {
            return FillOutcome::Accepted(0);
        }
        let room = self.config.bean_capacity.saturating_sub(self.beans);
        if room == 0 {
            self.core.notice(Notice::BeansFull);
            return FillOutcome::Rejected;
        }

        let accepted = count.min(room);
        self.beans += accepted;
        self.core.emit(MachineEvent::BeanCountChanged { count: self.beans });
        debug!("grinder: +{accepted} beans ({} stored)", self.beans);
        self.after_mutation();

        if accepted < count {
            self.core.notice(Notice::BeansFull);
            FillOutcome::Clamped { accepted }
        } else {
            FillOutcome::Accepted(accepted)
        }
    }

    /// Take the ground coffee out of the tray. No-op when it is empty.
    pub fn remove_ground_coffee(&mut self) -> Option<GrindSize> {
        let removed = self.ground.take()?;
        self.core.emit(MachineEvent::GroundCoffeeChanged { size: None });
        debug!("grinder: removed {removed:?} ground coffee");
        self.after_mutation();
        Some(removed)
    }

    // -----------------------------------------------------------------------
    // Interaction
    // -----------------------------------------------------------------------

    /// Register `count` completed crank spins. Every `required_spins` spins
    /// run one grind step.
    ///
    /// Stops at the first step that changes nothing (`AlreadyMaximum` or
    /// `OutOfBeans`): that outcome is reported once and the remaining spins
    /// are discarded.
    pub fn spin(&mut self, count: u32) -> Result<Vec<GrindOutcome>, MachineError> {
        self.core.ensure_operational()?;
        self.require_mode(InteractionMode::ManualSpin)?;

        let required = self.config.required_spins.max(1);
        let mut remaining = count;
        let mut outcomes = Vec::new();
        while remaining > 0 {
            let needed = required.saturating_sub(self.spin_accumulator).max(1);
            if remaining < needed {
                self.spin_accumulator += remaining;
                break;
            }
            remaining -= needed;
            let outcome = self.grind_step();
            outcomes.push(outcome);
            if !outcome.consumed_bean() {
                break;
            }
        }
        self.after_mutation();
        Ok(outcomes)
    }

    /// Start a timed grind.
    pub fn press_button(&mut self) -> Result<(), MachineError> {
        self.core.ensure_operational()?;
        if !self.behavior().is_timed() {
            return Err(MachineError::WrongInteraction {
                expected: InteractionMode::Button,
                actual: self.behavior().mode,
            });
        }
        if self.timer.is_some() {
            return Err(MachineError::Busy);
        }
        if self.ground == Some(GrindSize::Large) {
            self.core.notice(Notice::AlreadyMaximum);
            return Err(MachineError::GrindAtMaximum);
        }
        if self.beans == 0 {
            self.core.notice(Notice::OutOfBeans);
            return Err(MachineError::InsufficientInventory(Resource::Beans));
        }
        self.begin_timed_grind();
        Ok(())
    }

    fn require_mode(&self, expected: InteractionMode) -> Result<(), MachineError> {
        let actual = self.behavior().mode;
        if actual == expected {
            Ok(())
        } else {
            Err(MachineError::WrongInteraction { expected, actual })
        }
    }

    // -----------------------------------------------------------------------
    // Grinding
    // -----------------------------------------------------------------------

    fn grind_step(&mut self) -> GrindOutcome {
        self.spin_accumulator = 0;

        let next = match self.ground {
            None => Some(GrindSize::Small),
            Some(size) => size.next(),
        };
        let Some(next) = next else {
            self.core.notice(Notice::AlreadyMaximum);
            return GrindOutcome::AlreadyMaximum;
        };
        if self.beans == 0 {
            self.core.notice(Notice::OutOfBeans);
            return GrindOutcome::OutOfBeans;
        }

        let outcome = if self.ground.is_some() {
            GrindOutcome::Upgraded(next)
        } else {
            GrindOutcome::Created
        };
        self.beans -= 1;
        self.ground = Some(next);
        self.core.emit(MachineEvent::BeanCountChanged { count: self.beans });
        self.core.emit(MachineEvent::GroundCoffeeChanged { size: Some(next) });
        debug!("grinder: ground to {next:?}, {} beans left", self.beans);
        outcome
    }

    fn begin_timed_grind(&mut self) {
        self.timer = Some(Fixed64::ZERO);
        self.core.begin_processing();
    }

    /// Automatic level: start grinding whenever there is something to do.
    fn maybe_auto_start(&mut self) {
        if self.behavior().auto_trigger
            && !self.core.is_faulted()
            && self.timer.is_none()
            && self.beans > 0
            && self.ground != Some(GrindSize::Large)
        {
            self.begin_timed_grind();
        }
    }

    fn after_mutation(&mut self) {
        self.maybe_auto_start();
        self.refresh_state();
    }
}

impl Machine for GrinderProcess {
    fn core(&self) -> &MachineCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut MachineCore {
        &mut self.core
    }

    fn refresh_state(&mut self) {
        let derived = if self.timer.is_some() {
            MachineState::Processing
        } else if self.beans > 0 {
            MachineState::Ready
        } else {
            MachineState::Idle
        };
        self.core.settle(derived);
    }

    fn on_level_changed(&mut self, _level: Level) {
        // Spins counted under the crank do not carry over; a running timer
        // keeps its elapsed time and finishes on the new duration.
        self.spin_accumulator = 0;
        self.maybe_auto_start();
    }

    /// Timed levels only: starts a grind exactly like the button.
    fn start_processing(&mut self) -> bool {
        self.behavior().is_timed() && self.press_button().is_ok()
    }

    /// Negative `dt` counts as zero.
    fn tick(&mut self, dt: Fixed64) {
        if self.core.is_faulted() {
            return;
        }
        let dt = dt.max(Fixed64::ZERO);
        if let Some(elapsed) = self.timer.as_mut() {
            *elapsed += dt;
            let elapsed = *elapsed;
            let duration = self.behavior().duration;
            if elapsed >= duration {
                self.timer = None;
                self.core.update_progress(Fixed64::ONE);
                self.grind_step();
                self.core.complete_processing();
            } else {
                let progress = fraction(elapsed, duration);
                trace!("grinder: progress {progress}");
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

impl UpgradeTarget for GrinderProcess {
    fn apply_upgrade(&mut self, machine: &MachineId, level: Level) -> Result<(), MachineError> {
        if MachineKind::from_id(machine) != Some(MachineKind::Grinder) {
            return Err(MachineError::UnknownMachine(machine.clone()));
        }
        self.set_upgrade_level(level)
    }

    fn supported_max_level(&self, machine: &MachineId) -> Option<Level> {
        (MachineKind::from_id(machine) == Some(MachineKind::Grinder)).then(|| self.max_level())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    fn fixed(v: f64) -> Fixed64 {
        Fixed64::from_num(v)
    }

    fn grinder_with(beans: u32) -> GrinderProcess {
        let mut g = GrinderProcess::new(GrinderConfig::default());
        g.add_beans(beans);
        g.drain_events();
        g
    }

    fn notices(events: &[MachineEvent]) -> Vec<Notice> {
        events
            .iter()
            .filter_map(|e| match e {
                MachineEvent::Notice { notice, .. } => Some(*notice),
                _ => None,
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Test 1: Three steps walk Small -> Medium -> Large; the fourth reports
    // the maximum without consuming a bean
    // -----------------------------------------------------------------------
    #[test]
    fn three_steps_reach_large_then_maximum() {
        let mut g = grinder_with(3);

        let outcomes = g.spin(3).unwrap();
        assert_eq!(
            outcomes,
            vec![
                GrindOutcome::Created,
                GrindOutcome::Upgraded(GrindSize::Medium),
                GrindOutcome::Upgraded(GrindSize::Large),
            ]
        );
        assert_eq!(g.ground_coffee(), Some(GrindSize::Large));
        assert_eq!(g.bean_count(), 0);

        g.drain_events();
        let outcomes = g.spin(1).unwrap();
        assert_eq!(outcomes, vec![GrindOutcome::AlreadyMaximum]);
        assert_eq!(g.bean_count(), 0);
        assert_eq!(notices(&g.drain_events()), vec![Notice::AlreadyMaximum]);
    }

    // -----------------------------------------------------------------------
    // Test 2: Large takes precedence over an empty hopper
    // -----------------------------------------------------------------------
    #[test]
    fn maximum_reported_before_out_of_beans() {
        let mut g = grinder_with(5);
        g.spin(3).unwrap();
        assert_eq!(g.bean_count(), 2);
        assert_eq!(g.spin(1).unwrap(), vec![GrindOutcome::AlreadyMaximum]);
        assert_eq!(g.bean_count(), 2);
    }

    // -----------------------------------------------------------------------
    // Test 3: No beans, no ground coffee
    // -----------------------------------------------------------------------
    #[test]
    fn spin_without_beans_reports_out_of_beans() {
        let mut g = grinder_with(0);
        assert_eq!(g.spin(1).unwrap(), vec![GrindOutcome::OutOfBeans]);
        assert_eq!(g.ground_coffee(), None);
        assert_eq!(g.state(), MachineState::Idle);
        assert_eq!(notices(&g.drain_events()), vec![Notice::OutOfBeans]);
    }

    // -----------------------------------------------------------------------
    // Test 4: Spin accumulation honours required_spins
    // -----------------------------------------------------------------------
    #[test]
    fn spins_accumulate_until_required() {
        let config = GrinderConfig {
            required_spins: 3,
            ..GrinderConfig::default()
        };
        let mut g = GrinderProcess::new(config);
        g.add_beans(2);

        assert!(g.spin(2).unwrap().is_empty());
        assert_eq!(g.spin_accumulator(), 2);
        assert_eq!(g.spin(1).unwrap(), vec![GrindOutcome::Created]);
        assert_eq!(g.spin_accumulator(), 0);
        assert_eq!(g.bean_count(), 1);
    }

    // -----------------------------------------------------------------------
    // Test 5: add_beans clamps and rejects when full
    // -----------------------------------------------------------------------
    #[test]
    fn add_beans_clamps_to_capacity() {
        let mut g = grinder_with(8);
        assert_eq!(g.add_beans(5), FillOutcome::Clamped { accepted: 2 });
        assert_eq!(g.bean_count(), 10);

        g.drain_events();
        assert_eq!(g.add_beans(1), FillOutcome::Rejected);
        assert_eq!(g.bean_count(), 10);
        assert_eq!(notices(&g.drain_events()), vec![Notice::BeansFull]);
    }

    #[test]
    fn add_beans_readies_idle_grinder() {
        let mut g = grinder_with(0);
        assert_eq!(g.state(), MachineState::Idle);
        assert_eq!(g.add_beans(2), FillOutcome::Accepted(2));
        assert_eq!(g.state(), MachineState::Ready);
        let events = g.drain_events();
        assert!(events.contains(&MachineEvent::BeanCountChanged { count: 2 }));
        assert!(events.contains(&MachineEvent::StateChanged {
            source: MachineKind::Grinder,
            from: MachineState::Idle,
            to: MachineState::Ready,
        }));
    }

    // -----------------------------------------------------------------------
    // Test 6: Removal resets the size and is idempotent
    // -----------------------------------------------------------------------
    #[test]
    fn removal_resets_and_is_idempotent() {
        let mut g = grinder_with(3);
        g.spin(2).unwrap();
        assert_eq!(g.grind_size(), GrindSize::Medium);

        g.drain_events();
        assert_eq!(g.remove_ground_coffee(), Some(GrindSize::Medium));
        assert_eq!(g.grind_size(), GrindSize::Small);
        assert!(!g.has_ground_coffee());
        assert_eq!(
            g.drain_events(),
            vec![MachineEvent::GroundCoffeeChanged { size: None }]
        );

        assert_eq!(g.remove_ground_coffee(), None);
        assert!(g.drain_events().is_empty());
    }

    // -----------------------------------------------------------------------
    // Test 7: Button level runs a timed grind
    // -----------------------------------------------------------------------
    #[test]
    fn button_grind_completes_on_timer() {
        let mut g = grinder_with(2);
        g.set_upgrade_level(1).unwrap();
        g.press_button().unwrap();
        assert_eq!(g.state(), MachineState::Processing);

        g.tick(fixed(1.0));
        assert_eq!(g.progress(), fixed(0.5));
        assert_eq!(g.ground_coffee(), None);

        g.drain_events();
        g.tick(fixed(1.0));
        assert_eq!(g.ground_coffee(), Some(GrindSize::Small));
        assert_eq!(g.bean_count(), 1);
        assert_eq!(g.state(), MachineState::Ready);

        let events = g.drain_events();
        assert!(events.contains(&MachineEvent::ProcessCompleted {
            source: MachineKind::Grinder
        }));
        assert!(events.contains(&MachineEvent::StateChanged {
            source: MachineKind::Grinder,
            from: MachineState::Complete,
            to: MachineState::Ready,
        }));
    }

    #[test]
    fn button_guards() {
        let mut g = grinder_with(0);
        assert_eq!(
            g.press_button(),
            Err(MachineError::WrongInteraction {
                expected: InteractionMode::Button,
                actual: InteractionMode::ManualSpin
            })
        );

        g.set_upgrade_level(1).unwrap();
        assert_eq!(
            g.press_button(),
            Err(MachineError::InsufficientInventory(Resource::Beans))
        );

        g.add_beans(1);
        g.press_button().unwrap();
        assert_eq!(g.press_button(), Err(MachineError::Busy));
    }

    #[test]
    fn spin_rejected_at_button_level() {
        let mut g = grinder_with(1);
        g.set_upgrade_level(1).unwrap();
        assert!(matches!(
            g.spin(1),
            Err(MachineError::WrongInteraction { .. })
        ));
        assert_eq!(g.bean_count(), 1);
    }

    // -----------------------------------------------------------------------
    // Test 8: Automatic level grinds up to Large on its own
    // -----------------------------------------------------------------------
    #[test]
    fn automatic_level_grinds_until_large() {
        let mut g = grinder_with(5);
        g.set_upgrade_level(2).unwrap();
        assert!(g.is_grinding());

        for _ in 0..3 {
            g.tick(fixed(1.0));
        }
        assert_eq!(g.ground_coffee(), Some(GrindSize::Large));
        assert_eq!(g.bean_count(), 2);
        assert!(!g.is_grinding());
        assert_eq!(g.state(), MachineState::Ready);

        // Taking the output starts the next batch.
        g.remove_ground_coffee();
        assert!(g.is_grinding());
    }

    #[test]
    fn automatic_level_starts_when_beans_arrive() {
        let mut g = grinder_with(0);
        g.set_upgrade_level(2).unwrap();
        assert!(!g.is_grinding());
        assert_eq!(g.state(), MachineState::Idle);

        g.add_beans(1);
        assert!(g.is_grinding());
        assert_eq!(g.state(), MachineState::Processing);
    }

    // -----------------------------------------------------------------------
    // Test 9: Level change mid-grind keeps elapsed time
    // -----------------------------------------------------------------------
    #[test]
    fn level_change_mid_grind_uses_new_duration() {
        let mut g = grinder_with(3);
        g.set_upgrade_level(1).unwrap();
        g.press_button().unwrap();
        g.tick(fixed(0.5));

        g.set_upgrade_level(2).unwrap();
        g.tick(fixed(0.5));
        assert_eq!(g.ground_coffee(), Some(GrindSize::Small));
    }

    // -----------------------------------------------------------------------
    // Test 10: Faults freeze the grinder
    // -----------------------------------------------------------------------
    #[test]
    fn fault_blocks_operations_and_freezes_timer() {
        let mut g = grinder_with(2);
        g.set_upgrade_level(1).unwrap();
        g.press_button().unwrap();
        g.inject_fault();

        g.tick(fixed(5.0));
        assert_eq!(g.state(), MachineState::Error);
        assert_eq!(g.ground_coffee(), None);
        assert_eq!(g.press_button(), Err(MachineError::Faulted));

        g.clear_fault();
        assert_eq!(g.state(), MachineState::Processing);
        g.tick(fixed(2.0));
        assert_eq!(g.ground_coffee(), Some(GrindSize::Small));
    }

    // -----------------------------------------------------------------------
    // Test 11: Upgrade target routing
    // -----------------------------------------------------------------------
    #[test]
    fn upgrade_target_routes_by_id() {
        let mut g = grinder_with(0);
        g.apply_upgrade(&MachineKind::Grinder.id(), 1).unwrap();
        assert_eq!(g.level(), 1);
        assert_eq!(g.supported_max_level(&MachineKind::Grinder.id()), Some(2));

        let doser = MachineKind::Doser.id();
        assert_eq!(
            g.apply_upgrade(&doser, 2),
            Err(MachineError::UnknownMachine(doser.clone()))
        );
        assert_eq!(g.supported_max_level(&doser), None);
    }

    #[test]
    fn invalid_level_leaves_grinder_unchanged() {
        let mut g = grinder_with(1);
        assert!(g.set_upgrade_level(7).is_err());
        assert_eq!(g.level(), 0);
        assert!(
            g.drain_events()
                .iter()
                .all(|e| e.kind() != EventKind::UpgradeApplied)
        );
    }

    // -----------------------------------------------------------------------
    // Test 12: A long spin burst stops at the first step that changes nothing
    // -----------------------------------------------------------------------
    #[test]
    fn spin_burst_past_large_reports_once() {
        let mut g = grinder_with(5);
        g.spin(3).unwrap();
        g.drain_events();

        assert_eq!(g.spin(1000).unwrap(), vec![GrindOutcome::AlreadyMaximum]);
        assert_eq!(g.bean_count(), 2);
        assert_eq!(g.spin_accumulator(), 0);
        assert_eq!(notices(&g.drain_events()), vec![Notice::AlreadyMaximum]);
    }

    #[test]
    fn spin_burst_runs_out_of_beans_once() {
        let mut g = grinder_with(2);
        assert_eq!(
            g.spin(u32::MAX).unwrap(),
            vec![
                GrindOutcome::Created,
                GrindOutcome::Upgraded(GrindSize::Medium),
                GrindOutcome::OutOfBeans,
            ]
        );
        assert_eq!(g.ground_coffee(), Some(GrindSize::Medium));
        assert_eq!(notices(&g.drain_events()), vec![Notice::OutOfBeans]);
    }

    #[test]
    fn spin_burst_keeps_partial_accumulation() {
        let config = GrinderConfig {
            required_spins: 4,
            ..GrinderConfig::default()
        };
        let mut g = GrinderProcess::new(config);
        g.add_beans(5);

        assert_eq!(g.spin(6).unwrap(), vec![GrindOutcome::Created]);
        assert_eq!(g.spin_accumulator(), 2);
        assert_eq!(
            g.spin(2).unwrap(),
            vec![GrindOutcome::Upgraded(GrindSize::Medium)]
        );
        assert_eq!(g.spin_accumulator(), 0);
    }

    // -----------------------------------------------------------------------
    // Test 13: A negative tick never rewinds a timed grind
    // -----------------------------------------------------------------------
    #[test]
    fn negative_tick_does_not_rewind_grind() {
        let mut g = grinder_with(1);
        g.set_upgrade_level(1).unwrap();
        g.press_button().unwrap();

        g.tick(fixed(1.5));
        assert_eq!(g.progress(), fixed(0.75));
        g.tick(fixed(-1.0));
        assert_eq!(g.progress(), fixed(0.75));
        assert!(g.is_grinding());

        g.tick(fixed(0.5));
        assert_eq!(g.ground_coffee(), Some(GrindSize::Small));
    }
}
