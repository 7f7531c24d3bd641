//! Per-level behaviour descriptors.
//!
//! Each machine looks up its current interaction rules in a
//! [`BehaviorTable`] indexed by upgrade level instead of branching on the
//! level number. The table length also fixes the machine's maximum level.

use serde::{Deserialize, Serialize};

use crate::fixed::Fixed64;
use crate::id::Level;

/// How the player drives a machine at a given level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InteractionMode {
    /// Physical spins of a crank, counted by the host.
    ManualSpin,
    /// A continuous press; work happens while held.
    ManualHold,
    /// A single press starts a timed operation.
    Button,
    /// The machine starts timed operations on its own.
    Automatic,
}

/// Behaviour of one upgrade level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelBehavior {
    pub mode: InteractionMode,
    /// Seconds a timed operation takes. Ignored by manual modes.
    pub duration: Fixed64,
    /// Whether the machine (or the station on its behalf) starts work without
    /// an explicit player action.
    pub auto_trigger: bool,
}

impl LevelBehavior {
    pub fn manual(mode: InteractionMode) -> Self {
        Self {
            mode,
            duration: Fixed64::ZERO,
            auto_trigger: false,
        }
    }

    pub fn timed(mode: InteractionMode, duration: Fixed64) -> Self {
        Self {
            mode,
            duration,
            auto_trigger: mode == InteractionMode::Automatic,
        }
    }

    /// Whether work at this level runs on a timer.
    pub fn is_timed(&self) -> bool {
        matches!(self.mode, InteractionMode::Button | InteractionMode::Automatic)
    }
}

/// Level-indexed behaviour descriptors. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<LevelBehavior>", into = "Vec<LevelBehavior>")]
pub struct BehaviorTable {
    levels: Vec<LevelBehavior>,
}

/// Returned when building a table from an empty list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("a behavior table needs at least one level")]
pub struct EmptyBehaviorTable;

impl BehaviorTable {
    pub fn new(levels: Vec<LevelBehavior>) -> Result<Self, EmptyBehaviorTable> {
        if levels.is_empty() {
            return Err(EmptyBehaviorTable);
        }
        Ok(Self { levels })
    }

    /// Highest valid level.
    pub fn max_level(&self) -> Level {
        (self.levels.len() - 1).min(Level::MAX as usize) as Level
    }

    /// Behaviour at `level`. Levels past the end resolve to the last entry.
    pub fn get(&self, level: Level) -> &LevelBehavior {
        let idx = (level as usize).min(self.levels.len() - 1);
        &self.levels[idx]
    }

    pub fn levels(&self) -> &[LevelBehavior] {
        &self.levels
    }

    /// Grinder default: hand crank, button (2 s), automatic (1 s).
    pub fn grinder_default() -> Self {
        Self {
            levels: vec![
                LevelBehavior::manual(InteractionMode::ManualSpin),
                LevelBehavior::timed(InteractionMode::Button, Fixed64::from_num(2)),
                LevelBehavior::timed(InteractionMode::Automatic, Fixed64::from_num(1)),
            ],
        }
    }

    /// Doser default: hold to pour, button (1 s), automatic top-off (0.5 s).
    pub fn doser_default() -> Self {
        Self {
            levels: vec![
                LevelBehavior::manual(InteractionMode::ManualHold),
                LevelBehavior::timed(InteractionMode::Button, Fixed64::from_num(1)),
                LevelBehavior::timed(InteractionMode::Automatic, Fixed64::from_num(0.5)),
            ],
        }
    }

    /// Espresso default: 6 s and 4.5 s manual shots, 3 s automatic shots.
    pub fn espresso_default() -> Self {
        Self {
            levels: vec![
                LevelBehavior::timed(InteractionMode::Button, Fixed64::from_num(6)),
                LevelBehavior::timed(InteractionMode::Button, Fixed64::from_num(4.5)),
                LevelBehavior::timed(InteractionMode::Automatic, Fixed64::from_num(3)),
            ],
        }
    }
}

impl TryFrom<Vec<LevelBehavior>> for BehaviorTable {
    type Error = EmptyBehaviorTable;

    fn try_from(levels: Vec<LevelBehavior>) -> Result<Self, Self::Error> {
        Self::new(levels)
    }
}

impl From<BehaviorTable> for Vec<LevelBehavior> {
    fn from(table: BehaviorTable) -> Self {
        table.levels
    }
}
