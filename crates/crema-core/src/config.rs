//! Typed machine configuration.
//!
//! Configuration is immutable input handed to each process at construction.
//! [`StationConfig::default`] carries the standard shop values; `crema-data`
//! builds the same types from data files.

use serde::{Deserialize, Serialize};

use crate::behavior::BehaviorTable;
use crate::fixed::Fixed64;
use crate::id::{Level, MachineKind};
use crate::quality::QualityTarget;

/// A configuration value that cannot drive a machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{machine}: {field} must be positive")]
    NotPositive {
        machine: MachineKind,
        field: &'static str,
    },

    #[error("{machine}: {field} must not be negative")]
    Negative {
        machine: MachineKind,
        field: &'static str,
    },

    #[error("{machine}: {detail}")]
    Inconsistent { machine: MachineKind, detail: String },
}

fn positive(machine: MachineKind, field: &'static str, v: Fixed64) -> Result<(), ConfigError> {
    if v > Fixed64::ZERO {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { machine, field })
    }
}

fn timed_levels_positive(machine: MachineKind, table: &BehaviorTable) -> Result<(), ConfigError> {
    for (level, behavior) in table.levels().iter().enumerate() {
        if behavior.is_timed() && behavior.duration <= Fixed64::ZERO {
            return Err(ConfigError::Inconsistent {
                machine,
                detail: format!("level {level} is timed but has no duration"),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Grinder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrinderConfig {
    /// Maximum bean fills the hopper holds.
    pub bean_capacity: u32,
    /// Crank spins needed per grind step at the manual level.
    pub required_spins: u32,
    pub behavior: BehaviorTable,
}

impl Default for GrinderConfig {
    fn default() -> Self {
        Self {
            bean_capacity: 10,
            required_spins: 1,
            behavior: BehaviorTable::grinder_default(),
        }
    }
}

impl GrinderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = MachineKind::Grinder;
        if self.bean_capacity == 0 {
            return Err(ConfigError::NotPositive {
                machine: m,
                field: "bean_capacity",
            });
        }
        if self.required_spins == 0 {
            return Err(ConfigError::NotPositive {
                machine: m,
                field: "required_spins",
            });
        }
        timed_levels_positive(m, &self.behavior)
    }
}

// ---------------------------------------------------------------------------
// Doser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DosingConfig {
    /// Grams of ground coffee the doser can store.
    pub capacity: Fixed64,
    /// Target dose in grams.
    pub ideal: Fixed64,
    /// Grams either side of the ideal that still score perfect.
    pub tolerance: Fixed64,
    /// Grams per second poured while the manual lever is held.
    pub hold_rate: Fixed64,
    pub behavior: BehaviorTable,
}

impl Default for DosingConfig {
    fn default() -> Self {
        Self {
            capacity: Fixed64::from_num(100),
            ideal: Fixed64::from_num(18),
            tolerance: Fixed64::from_num(1),
            hold_rate: Fixed64::from_num(10),
            behavior: BehaviorTable::doser_default(),
        }
    }
}

impl DosingConfig {
    pub fn target(&self) -> QualityTarget {
        QualityTarget::new(self.ideal, self.tolerance)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = MachineKind::Doser;
        positive(m, "capacity", self.capacity)?;
        positive(m, "ideal", self.ideal)?;
        positive(m, "hold_rate", self.hold_rate)?;
        if self.tolerance < Fixed64::ZERO {
            return Err(ConfigError::Negative {
                machine: m,
                field: "tolerance",
            });
        }
        timed_levels_positive(m, &self.behavior)
    }
}

// ---------------------------------------------------------------------------
// Espresso
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrewConfig {
    /// Millilitres of a reference shot; scaled by dose quality.
    pub base_shot: Fixed64,
    /// Slots available before the expansion upgrade.
    pub base_slots: usize,
    /// Slots available from `expanded_at_level` on.
    pub expanded_slots: usize,
    pub expanded_at_level: Level,
    pub behavior: BehaviorTable,
}

impl Default for BrewConfig {
    fn default() -> Self {
        Self {
            base_shot: Fixed64::from_num(30),
            base_slots: 2,
            expanded_slots: 4,
            expanded_at_level: 2,
            behavior: BehaviorTable::espresso_default(),
        }
    }
}

impl BrewConfig {
    /// Slots available at `level`.
    pub fn slot_count(&self, level: Level) -> usize {
        if level >= self.expanded_at_level {
            self.expanded_slots
        } else {
            self.base_slots
        }
    }

    /// Slots at the highest level this configuration reaches.
    pub fn max_slot_count(&self) -> usize {
        self.slot_count(self.behavior.max_level())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = MachineKind::Espresso;
        positive(m, "base_shot", self.base_shot)?;
        if self.base_slots == 0 {
            return Err(ConfigError::NotPositive {
                machine: m,
                field: "base_slots",
            });
        }
        if self.expanded_slots < self.base_slots {
            return Err(ConfigError::Inconsistent {
                machine: m,
                detail: format!(
                    "expanded_slots ({}) is smaller than base_slots ({})",
                    self.expanded_slots, self.base_slots
                ),
            });
        }
        for (level, behavior) in self.behavior.levels().iter().enumerate() {
            if behavior.duration <= Fixed64::ZERO {
                return Err(ConfigError::Inconsistent {
                    machine: m,
                    detail: format!("level {level} has no brew duration"),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Station
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationConfig {
    pub grinder: GrinderConfig,
    pub doser: DosingConfig,
    pub brewer: BrewConfig,
    /// Bounded history capacity per event kind on the station's bus.
    pub event_capacity: usize,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            grinder: GrinderConfig::default(),
            doser: DosingConfig::default(),
            brewer: BrewConfig::default(),
            event_capacity: 256,
        }
    }
}

impl StationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.grinder.validate()?;
        self.doser.validate()?;
        self.brewer.validate()
    }

    /// Maximum upgrade level configured for `machine`.
    pub fn max_level(&self, machine: MachineKind) -> Level {
        match machine {
            MachineKind::Grinder => self.grinder.behavior.max_level(),
            MachineKind::Doser => self.doser.behavior.max_level(),
            MachineKind::Espresso => self.brewer.behavior.max_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::{InteractionMode, LevelBehavior};

    #[test]
    fn defaults_are_valid() {
        StationConfig::default().validate().unwrap();
    }

    #[test]
    fn default_levels() {
        let cfg = StationConfig::default();
        for kind in MachineKind::ALL {
            assert_eq!(cfg.max_level(kind), 2);
        }
    }

    #[test]
    fn slot_count_expands_at_level() {
        let cfg = BrewConfig::default();
        assert_eq!(cfg.slot_count(0), 2);
        assert_eq!(cfg.slot_count(1), 2);
        assert_eq!(cfg.slot_count(2), 4);
        assert_eq!(cfg.max_slot_count(), 4);
    }

    #[test]
    fn negative_tolerance_rejected() {
        let cfg = DosingConfig {
            tolerance: Fixed64::from_num(-1),
            ..DosingConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::Negative {
                machine: MachineKind::Doser,
                field: "tolerance"
            })
        );
    }

    #[test]
    fn zero_capacity_rejected() {
        let cfg = GrinderConfig {
            bean_capacity: 0,
            ..GrinderConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::NotPositive {
                field: "bean_capacity",
                ..
            })
        ));
    }

    #[test]
    fn timed_level_without_duration_rejected() {
        let cfg = GrinderConfig {
            behavior: BehaviorTable::new(vec![
                LevelBehavior::manual(InteractionMode::ManualSpin),
                LevelBehavior::timed(InteractionMode::Button, Fixed64::ZERO),
            ])
            .unwrap(),
            ..GrinderConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Inconsistent { .. })));
    }

    #[test]
    fn shrinking_slots_rejected() {
        let cfg = BrewConfig {
            expanded_slots: 1,
            ..BrewConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Inconsistent { .. })));
    }
}
