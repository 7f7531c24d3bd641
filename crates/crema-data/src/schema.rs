//! Serde data file structs for shop definitions.
//!
//! These structs define the on-disk format for the station's machines and
//! their upgrade prices. They are deserialized from RON, JSON, or TOML data
//! files and then converted into engine types by the loader. Quantities are
//! plain `f64` on disk and become `Fixed64` during conversion.

use crema_core::behavior::InteractionMode;
use serde::Deserialize;

// ===========================================================================
// Station
// ===========================================================================

/// Top-level contents of `station.{ron,toml,json}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StationData {
    pub grinder: GrinderData,
    pub doser: DoserData,
    pub espresso: EspressoData,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_event_capacity() -> usize {
    256
}

/// One upgrade level of a machine.
#[derive(Debug, Clone, Deserialize)]
pub struct LevelData {
    pub mode: InteractionMode,
    /// Seconds. Required for timed modes.
    #[serde(default)]
    pub duration: f64,
    /// Defaults to `true` for `Automatic` and `false` otherwise.
    #[serde(default)]
    pub auto_trigger: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GrinderData {
    pub bean_capacity: u32,
    #[serde(default = "default_required_spins")]
    pub required_spins: u32,
    pub levels: Vec<LevelData>,
}

fn default_required_spins() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct DoserData {
    pub capacity: f64,
    pub ideal: f64,
    pub tolerance: f64,
    pub hold_rate: f64,
    pub levels: Vec<LevelData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EspressoData {
    pub base_shot: f64,
    pub base_slots: usize,
    pub expanded_slots: usize,
    pub expanded_at_level: u8,
    pub levels: Vec<LevelData>,
}

// ===========================================================================
// Upgrades
// ===========================================================================

/// Price list for one machine in `upgrades.{ron,toml,json}`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpgradeData {
    /// Machine name: `grinder`, `doser` or `espresso`.
    pub machine: String,
    /// `costs[i]` buys level `i + 1`.
    pub costs: Vec<u64>,
    #[serde(default)]
    pub initial_level: u8,
}

/// TOML wrapper: TOML requires a top-level table, so lists are stored
/// under a key.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlUpgrades {
    pub upgrades: Vec<UpgradeData>,
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // RON deserialization
    // -----------------------------------------------------------------------

    #[test]
    fn level_data_from_ron() {
        let ron = r#"(mode: Button, duration: 2.0)"#;
        let level: LevelData = ron::from_str(ron).unwrap();
        assert_eq!(level.mode, InteractionMode::Button);
        assert!((level.duration - 2.0).abs() < f64::EPSILON);
        assert_eq!(level.auto_trigger, None);
    }

    #[test]
    fn manual_level_defaults_from_ron() {
        let level: LevelData = ron::from_str("(mode: ManualSpin)").unwrap();
        assert_eq!(level.mode, InteractionMode::ManualSpin);
        assert_eq!(level.duration, 0.0);
    }

    #[test]
    fn station_data_from_ron() {
        let ron = r#"
            (
                grinder: (
                    bean_capacity: 12,
                    levels: [(mode: ManualSpin), (mode: Automatic, duration: 1.0)],
                ),
                doser: (
                    capacity: 80.0,
                    ideal: 18.0,
                    tolerance: 1.0,
                    hold_rate: 10.0,
                    levels: [(mode: ManualHold)],
                ),
                espresso: (
                    base_shot: 30.0,
                    base_slots: 2,
                    expanded_slots: 4,
                    expanded_at_level: 1,
                    levels: [(mode: Button, duration: 6.0), (mode: Button, duration: 4.0)],
                ),
            )
        "#;
        let data: StationData = ron::from_str(ron).unwrap();
        assert_eq!(data.grinder.bean_capacity, 12);
        assert_eq!(data.grinder.required_spins, 1);
        assert_eq!(data.grinder.levels.len(), 2);
        assert!((data.doser.capacity - 80.0).abs() < f64::EPSILON);
        assert_eq!(data.espresso.expanded_at_level, 1);
        assert_eq!(data.event_capacity, 256);
    }

    #[test]
    fn upgrade_data_from_ron() {
        let ron = r#"[(machine: "grinder", costs: [100, 250]), (machine: "doser", costs: [150], initial_level: 1)]"#;
        let upgrades: Vec<UpgradeData> = ron::from_str(ron).unwrap();
        assert_eq!(upgrades.len(), 2);
        assert_eq!(upgrades[0].costs, vec![100, 250]);
        assert_eq!(upgrades[0].initial_level, 0);
        assert_eq!(upgrades[1].initial_level, 1);
    }

    // -----------------------------------------------------------------------
    // JSON deserialization
    // -----------------------------------------------------------------------

    #[test]
    fn level_data_from_json() {
        let json = r#"{"mode": "Automatic", "duration": 0.5, "auto_trigger": false}"#;
        let level: LevelData = serde_json::from_str(json).unwrap();
        assert_eq!(level.mode, InteractionMode::Automatic);
        assert_eq!(level.auto_trigger, Some(false));
    }

    #[test]
    fn upgrade_data_from_json() {
        let json = r#"[{"machine": "espresso", "costs": [200, 500]}]"#;
        let upgrades: Vec<UpgradeData> = serde_json::from_str(json).unwrap();
        assert_eq!(upgrades[0].machine, "espresso");
        assert_eq!(upgrades[0].costs, vec![200, 500]);
    }

    // -----------------------------------------------------------------------
    // TOML deserialization
    // -----------------------------------------------------------------------

    #[test]
    fn upgrades_from_toml() {
        let toml_str = r#"
[[upgrades]]
machine = "grinder"
costs = [100, 250]

[[upgrades]]
machine = "doser"
costs = [150, 400]
initial_level = 2
"#;
        let wrapper: TomlUpgrades = toml::from_str(toml_str).unwrap();
        assert_eq!(wrapper.upgrades.len(), 2);
        assert_eq!(wrapper.upgrades[1].initial_level, 2);
    }

    #[test]
    fn espresso_levels_from_toml() {
        let toml_str = r#"
base_shot = 30.0
base_slots = 2
expanded_slots = 4
expanded_at_level = 2

[[levels]]
mode = "Button"
duration = 6.0

[[levels]]
mode = "Automatic"
duration = 3.0
"#;
        let data: EspressoData = toml::from_str(toml_str).unwrap();
        assert_eq!(data.levels.len(), 2);
        assert_eq!(data.levels[1].mode, InteractionMode::Automatic);
    }
}
