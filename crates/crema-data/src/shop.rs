//! Shop loading: turns data files into a validated [`StationConfig`] and a
//! populated [`UpgradeRegistry`].
//!
//! A shop directory holds:
//!
//! - `station.{ron,toml,json}` (required) -- machine capacities, amounts and
//!   per-level behaviour.
//! - `upgrades.{ron,toml,json}` (optional) -- one price list per machine.
//!   Without it every machine stays at its starting level.

use crema_core::behavior::{BehaviorTable, InteractionMode, LevelBehavior};
use crema_core::config::{BrewConfig, DosingConfig, GrinderConfig, StationConfig};
use crema_core::fixed::Fixed64;
use crema_core::id::MachineKind;
use crema_upgrades::UpgradeRegistry;
use log::info;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::loader::{
    DataLoadError, check_duplicate, deserialize_file, deserialize_list, find_data_file,
    require_data_file, resolve_name,
};
use crate::schema::*;

/// Everything a shop directory describes.
#[derive(Debug, Clone)]
pub struct ShopData {
    pub station: StationConfig,
    pub upgrades: UpgradeRegistry,
}

/// Load `station` and `upgrades` from `dir`.
pub fn load_shop(dir: &Path) -> Result<ShopData, DataLoadError> {
    let station_path = require_data_file(dir, "station")?;
    let station = load_station_config(&station_path)?;

    let upgrades = match find_data_file(dir, "upgrades")? {
        Some(path) => load_upgrades(&path, &station)?,
        None => UpgradeRegistry::new(),
    };

    info!(
        "data: loaded shop from {} ({} upgradeable machines)",
        dir.display(),
        upgrades.records().count()
    );
    Ok(ShopData { station, upgrades })
}

// ===========================================================================
// Station
// ===========================================================================

/// Load and validate a station file.
pub fn load_station_config(path: &Path) -> Result<StationConfig, DataLoadError> {
    let data: StationData = deserialize_file(path)?;
    let config = resolve_station(&data, path)?;
    config.validate().map_err(|source| DataLoadError::Config {
        file: path.to_path_buf(),
        source,
    })?;
    Ok(config)
}

fn resolve_station(data: &StationData, file: &Path) -> Result<StationConfig, DataLoadError> {
    let grinder = GrinderConfig {
        bean_capacity: data.grinder.bean_capacity,
        required_spins: data.grinder.required_spins,
        behavior: resolve_levels(&data.grinder.levels, "grinder", file)?,
    };
    let doser = DosingConfig {
        capacity: to_fixed(data.doser.capacity, "doser.capacity", file)?,
        ideal: to_fixed(data.doser.ideal, "doser.ideal", file)?,
        tolerance: to_fixed(data.doser.tolerance, "doser.tolerance", file)?,
        hold_rate: to_fixed(data.doser.hold_rate, "doser.hold_rate", file)?,
        behavior: resolve_levels(&data.doser.levels, "doser", file)?,
    };
    let brewer = BrewConfig {
        base_shot: to_fixed(data.espresso.base_shot, "espresso.base_shot", file)?,
        base_slots: data.espresso.base_slots,
        expanded_slots: data.espresso.expanded_slots,
        expanded_at_level: data.espresso.expanded_at_level,
        behavior: resolve_levels(&data.espresso.levels, "espresso", file)?,
    };
    Ok(StationConfig {
        grinder,
        doser,
        brewer,
        event_capacity: data.event_capacity,
    })
}

fn resolve_levels(
    levels: &[LevelData],
    machine: &str,
    file: &Path,
) -> Result<BehaviorTable, DataLoadError> {
    let resolved = levels
        .iter()
        .enumerate()
        .map(|(i, level)| {
            let duration = to_fixed(level.duration, &format!("{machine}.levels[{i}].duration"), file)?;
            Ok(LevelBehavior {
                mode: level.mode,
                duration,
                auto_trigger: level
                    .auto_trigger
                    .unwrap_or(level.mode == InteractionMode::Automatic),
            })
        })
        .collect::<Result<Vec<_>, DataLoadError>>()?;

    BehaviorTable::new(resolved).map_err(|e| DataLoadError::InvalidValue {
        file: file.to_path_buf(),
        detail: format!("{machine}: {e}"),
    })
}

/// Convert a data-file number into `Fixed64`, rejecting NaN, infinities and
/// values outside the Q32.32 range.
fn to_fixed(value: f64, field: &str, file: &Path) -> Result<Fixed64, DataLoadError> {
    Fixed64::checked_from_num(value).ok_or_else(|| DataLoadError::InvalidValue {
        file: file.to_path_buf(),
        detail: format!("{field} = {value} is not representable"),
    })
}

// ===========================================================================
// Upgrades
// ===========================================================================

/// Load price lists and check each against the station it will upgrade.
///
/// Every list must price exactly the levels above 0 that the machine's
/// behaviour table defines.
pub fn load_upgrades(
    path: &Path,
    station: &StationConfig,
) -> Result<UpgradeRegistry, DataLoadError> {
    let data: Vec<UpgradeData> = deserialize_list(path, "upgrades")?;

    let machines: HashMap<String, MachineKind> = MachineKind::ALL
        .into_iter()
        .map(|kind| (kind.as_str().to_string(), kind))
        .collect();
    let mut seen = HashSet::new();
    let mut registry = UpgradeRegistry::new();

    for entry in &data {
        let kind = *resolve_name(&machines, &entry.machine, path, "machine")?;
        check_duplicate(&mut seen, &entry.machine, path)?;

        let levels = usize::from(station.max_level(kind));
        if entry.costs.len() != levels {
            return Err(DataLoadError::InvalidValue {
                file: path.to_path_buf(),
                detail: format!(
                    "{kind} has {levels} upgrade levels but {} prices",
                    entry.costs.len()
                ),
            });
        }
        if usize::from(entry.initial_level) > levels {
            return Err(DataLoadError::InvalidValue {
                file: path.to_path_buf(),
                detail: format!(
                    "{kind} initial_level {} exceeds maximum {levels}",
                    entry.initial_level
                ),
            });
        }

        registry.register_machine(kind, entry.costs.clone(), entry.initial_level);
    }

    Ok(registry)
}

// ===========================================================================
// Tests
// ===========================================================================
