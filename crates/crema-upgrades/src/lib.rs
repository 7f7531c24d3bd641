//! Upgrade registry for the Crema coffee-shop engine.
//!
//! Tracks the upgrade level of every machine in the shop together with the
//! price of each level, and gates level changes behind affordability.
//!
//! # Overview
//!
//! Machines are registered at startup via [`UpgradeRegistry::register_machine`]
//! with a cost table: entry `i` is the price of going from level `i` to
//! level `i + 1`, so a machine's maximum level is the table length.
//!
//! At runtime, game code calls [`UpgradeRegistry::purchase`] with the funds
//! the player has and the [`UpgradeTarget`] that owns the machine (usually
//! the `CoffeeStation`). The registry never touches process internals: it
//! asks the target to apply the new level and only records the level once
//! the target accepts. Each purchase emits an [`UpgradeEvent`].
//!
//! Money itself is not held here. The caller deducts
//! [`UpgradePurchase::price`] from its own balance.

use crema_core::id::{Level, MachineId};
use crema_core::machine::{MachineError, UpgradeTarget};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Level and prices of one registered machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeRecord {
    pub machine_id: MachineId,

    /// Current level. Only ever raised by a successful purchase.
    pub level: Level,

    /// `cost_table[i]` is the price of moving from level `i` to `i + 1`.
    pub cost_table: Vec<u64>,
}

impl UpgradeRecord {
    /// Highest level reachable through purchases.
    pub fn max_level(&self) -> Level {
        Level::try_from(self.cost_table.len()).unwrap_or(Level::MAX)
    }

    /// Price of the next level, or `None` once the table is exhausted or
    /// the level cannot go any higher.
    pub fn price(&self) -> Option<u64> {
        if self.level >= self.max_level() {
            return None;
        }
        self.cost_table.get(usize::from(self.level)).copied()
    }

    pub fn is_max_level(&self) -> bool {
        self.price().is_none()
    }
}

/// Receipt for a successful purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradePurchase {
    pub machine_id: MachineId,
    pub new_level: Level,
    pub price: u64,
    /// `funds - price` at the time of purchase.
    pub remaining: u64,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Events emitted by the upgrade registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeEvent {
    /// A machine was bought up to `level` for `price`.
    UpgradePurchased {
        machine_id: MachineId,
        level: Level,
        price: u64,
    },
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during upgrade operations. None of them change the
/// registry or the target.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpgradeError {
    #[error("machine not registered: {0}")]
    NotRegistered(MachineId),

    #[error("{machine} is already at its maximum level {level}")]
    AlreadyMaxLevel { machine: MachineId, level: Level },

    #[error("{machine} upgrade costs {price} but only {available} is available")]
    InsufficientFunds {
        machine: MachineId,
        price: u64,
        available: u64,
    },

    #[error("{machine} refused level {level}: {source}")]
    Rejected {
        machine: MachineId,
        level: Level,
        source: MachineError,
    },

    #[error("{machine} has {table_max} priced levels but the target supports {supported:?}")]
    TableMismatch {
        machine: MachineId,
        table_max: Level,
        supported: Option<Level>,
    },
}

// ---------------------------------------------------------------------------
// UpgradeRegistry
// ---------------------------------------------------------------------------

/// Per-machine upgrade levels and cost tables.
///
/// Records are kept in id order so [`UpgradeRegistry::apply_all`] and
/// serialized output are deterministic. The record set is fully serializable
/// for an external save system; pending events are not.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpgradeRegistry {
    records: BTreeMap<MachineId, UpgradeRecord>,

    /// Events emitted since last drain. Not serialized (transient).
    #[serde(skip)]
    events: Vec<UpgradeEvent>,
}

impl UpgradeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Registration API --

    /// Register `id` with its cost table, starting at `initial_level`.
    ///
    /// Registering an id again replaces the cost table but keeps the level
    /// from the first registration. An initial level past the table is
    /// clamped to the table's maximum. Entries beyond `Level::MAX` are
    /// dropped.
    pub fn register_machine(
        &mut self,
        id: impl Into<MachineId>,
        mut cost_table: Vec<u64>,
        initial_level: Level,
    ) -> &UpgradeRecord {
        let id = id.into();
        let limit = usize::from(Level::MAX);
        if cost_table.len() > limit {
            warn!(
                "upgrades: {id} cost table has {} entries, keeping the first {limit}",
                cost_table.len()
            );
            cost_table.truncate(limit);
        }
        match self.records.entry(id) {
            Entry::Occupied(entry) => {
                let record = entry.into_mut();
                debug!("upgrades: replacing cost table for {}", record.machine_id);
                record.cost_table = cost_table;
                record
            }
            Entry::Vacant(entry) => {
                let mut record = UpgradeRecord {
                    machine_id: entry.key().clone(),
                    level: 0,
                    cost_table,
                };
                record.level = initial_level.min(record.max_level());
                if record.level != initial_level {
                    warn!(
                        "upgrades: {} initial level {initial_level} clamped to {}",
                        record.machine_id, record.level
                    );
                }
                debug!("upgrades: registered {} at level {}", record.machine_id, record.level);
                entry.insert(record)
            }
        }
    }

    // -- Query API --

    pub fn record(&self, id: &MachineId) -> Option<&UpgradeRecord> {
        self.records.get(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &UpgradeRecord> {
        self.records.values()
    }

    pub fn is_registered(&self, id: &MachineId) -> bool {
        self.records.contains_key(id)
    }

    pub fn level(&self, id: &MachineId) -> Option<Level> {
        self.records.get(id).map(|r| r.level)
    }

    pub fn max_level(&self, id: &MachineId) -> Option<Level> {
        self.records.get(id).map(UpgradeRecord::max_level)
    }

    /// Price of the next level. `None` if `id` is at its maximum level or
    /// not registered.
    pub fn price(&self, id: &MachineId) -> Option<u64> {
        self.records.get(id).and_then(UpgradeRecord::price)
    }

    pub fn can_afford(&self, id: &MachineId, funds: u64) -> bool {
        self.price(id).is_some_and(|price| price <= funds)
    }

    // -- Purchase API --

    /// Buy the next level of `id` with `funds`.
    ///
    /// The target applies the level first; the registry records it only
    /// if the target accepts, so a refusal leaves both sides unchanged.
    pub fn purchase(
        &mut self,
        id: &MachineId,
        funds: u64,
        target: &mut dyn UpgradeTarget,
    ) -> Result<UpgradePurchase, UpgradeError> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| UpgradeError::NotRegistered(id.clone()))?;

        let price = record.price().ok_or_else(|| UpgradeError::AlreadyMaxLevel {
            machine: id.clone(),
            level: record.level,
        })?;
        if funds < price {
            return Err(UpgradeError::InsufficientFunds {
                machine: id.clone(),
                price,
                available: funds,
            });
        }

        let new_level = record.level + 1;
        target
            .apply_upgrade(id, new_level)
            .map_err(|source| UpgradeError::Rejected {
                machine: id.clone(),
                level: new_level,
                source,
            })?;
        record.level = new_level;

        info!("upgrades: {id} bought level {new_level} for {price}");
        self.events.push(UpgradeEvent::UpgradePurchased {
            machine_id: id.clone(),
            level: new_level,
            price,
        });
        Ok(UpgradePurchase {
            machine_id: id.clone(),
            new_level,
            price,
            remaining: funds - price,
        })
    }

    // -- Synchronization API --

    /// Push every stored level into `target`, in id order. Used at the start
    /// of a session after the registry was restored from a save.
    pub fn apply_all(&self, target: &mut dyn UpgradeTarget) -> Result<(), UpgradeError> {
        for record in self.records.values() {
            target
                .apply_upgrade(&record.machine_id, record.level)
                .map_err(|source| UpgradeError::Rejected {
                    machine: record.machine_id.clone(),
                    level: record.level,
                    source,
                })?;
        }
        Ok(())
    }

    /// Check that every cost table prices exactly the levels `target`
    /// supports for that machine.
    pub fn validate_against(&self, target: &dyn UpgradeTarget) -> Result<(), UpgradeError> {
        for record in self.records.values() {
            let supported = target.supported_max_level(&record.machine_id);
            if supported != Some(record.max_level()) {
                warn!(
                    "upgrades: {} prices {} levels, target supports {:?}",
                    record.machine_id,
                    record.max_level(),
                    supported
                );
                return Err(UpgradeError::TableMismatch {
                    machine: record.machine_id.clone(),
                    table_max: record.max_level(),
                    supported,
                });
            }
        }
        Ok(())
    }

    // -- Event API --

    /// Drain all pending events. Returns events and clears the internal list.
    pub fn drain_events(&mut self) -> Vec<UpgradeEvent> {
        std::mem::take(&mut self.events)
    }

    /// Get a read-only view of pending events.
    pub fn pending_events(&self) -> &[UpgradeEvent] {
        &self.events
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Stand-in for the station: levels per id, a shared max, and an
    /// optional id that refuses every upgrade.
    #[derive(Debug, Default)]
    struct Workbench {
        levels: HashMap<MachineId, Level>,
        max: Level,
        stubborn: Option<MachineId>,
    }

    impl Workbench {
        fn new(max: Level) -> Self {
            Self {
                max,
                ..Self::default()
            }
        }
    }

    impl UpgradeTarget for Workbench {
        fn apply_upgrade(&mut self, machine: &MachineId, level: Level) -> Result<(), MachineError> {
            if self.stubborn.as_ref() == Some(machine) {
                return Err(MachineError::Faulted);
            }
            if level > self.max {
                return Err(MachineError::InvalidLevel {
                    level,
                    max: self.max,
                });
            }
            self.levels.insert(machine.clone(), level);
            Ok(())
        }

        fn supported_max_level(&self, _machine: &MachineId) -> Option<Level> {
            Some(self.max)
        }
    }

    fn grinder() -> MachineId {
        MachineId::new("grinder")
    }

    fn setup_registry() -> UpgradeRegistry {
        let mut registry = UpgradeRegistry::new();
        registry.register_machine("grinder", vec![100, 250], 0);
        registry.register_machine("doser", vec![150, 400], 0);
        registry
    }

    // -----------------------------------------------------------------------
    // Test 1: Price walks the cost table and ends at max
    // -----------------------------------------------------------------------
    #[test]
    fn price_walks_cost_table() {
        let mut registry = setup_registry();
        let mut bench = Workbench::new(2);

        assert_eq!(registry.price(&grinder()), Some(100));
        registry.purchase(&grinder(), 100, &mut bench).unwrap();
        assert_eq!(registry.price(&grinder()), Some(250));
        registry.purchase(&grinder(), 1000, &mut bench).unwrap();
        assert_eq!(registry.price(&grinder()), None);
        assert!(registry.record(&grinder()).unwrap().is_max_level());
    }

    // -----------------------------------------------------------------------
    // Test 2: Purchase raises the level by exactly one and applies it
    // -----------------------------------------------------------------------
    #[test]
    fn purchase_increments_and_applies() {
        let mut registry = setup_registry();
        let mut bench = Workbench::new(2);

        let receipt = registry.purchase(&grinder(), 120, &mut bench).unwrap();
        assert_eq!(
            receipt,
            UpgradePurchase {
                machine_id: grinder(),
                new_level: 1,
                price: 100,
                remaining: 20,
            }
        );
        assert_eq!(registry.level(&grinder()), Some(1));
        assert_eq!(bench.levels[&grinder()], 1);
    }

    // -----------------------------------------------------------------------
    // Test 3: Insufficient funds leaves everything unchanged
    // -----------------------------------------------------------------------
    #[test]
    fn insufficient_funds_rejected() {
        let mut registry = setup_registry();
        let mut bench = Workbench::new(2);

        let err = registry.purchase(&grinder(), 99, &mut bench).unwrap_err();
        assert_eq!(
            err,
            UpgradeError::InsufficientFunds {
                machine: grinder(),
                price: 100,
                available: 99,
            }
        );
        assert_eq!(registry.level(&grinder()), Some(0));
        assert!(bench.levels.is_empty());
        assert!(registry.pending_events().is_empty());
    }

    // -----------------------------------------------------------------------
    // Test 4: Purchase at max level fails
    // -----------------------------------------------------------------------
    #[test]
    fn already_max_level_rejected() {
        let mut registry = UpgradeRegistry::new();
        registry.register_machine("grinder", vec![100, 250], 2);
        let mut bench = Workbench::new(2);

        assert!(matches!(
            registry.purchase(&grinder(), u64::MAX, &mut bench),
            Err(UpgradeError::AlreadyMaxLevel { level: 2, .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Test 5: Unknown machine
    // -----------------------------------------------------------------------
    #[test]
    fn unregistered_machine() {
        let mut registry = setup_registry();
        let mut bench = Workbench::new(2);
        let kettle = MachineId::new("kettle");

        assert_eq!(registry.price(&kettle), None);
        assert_eq!(registry.level(&kettle), None);
        assert_eq!(
            registry.purchase(&kettle, 1000, &mut bench),
            Err(UpgradeError::NotRegistered(kettle))
        );
    }

    // -----------------------------------------------------------------------
    // Test 6: Re-registration keeps the first level, replaces the table
    // -----------------------------------------------------------------------
    #[test]
    fn reregistration_keeps_first_level() {
        let mut registry = UpgradeRegistry::new();
        registry.register_machine("grinder", vec![100, 250], 1);
        let record = registry.register_machine("grinder", vec![10, 20, 30], 0);

        assert_eq!(record.level, 1);
        assert_eq!(record.cost_table, vec![10, 20, 30]);
        assert_eq!(registry.price(&grinder()), Some(20));
        assert_eq!(registry.max_level(&grinder()), Some(3));
    }

    // -----------------------------------------------------------------------
    // Test 7: Initial level past the table is clamped
    // -----------------------------------------------------------------------
    #[test]
    fn initial_level_clamped() {
        let mut registry = UpgradeRegistry::new();
        let record = registry.register_machine("grinder", vec![100], 5);
        assert_eq!(record.level, 1);
    }

    // -----------------------------------------------------------------------
    // Test 8: Target refusal is reported and not recorded
    // -----------------------------------------------------------------------
    #[test]
    fn target_refusal_not_recorded() {
        let mut registry = setup_registry();
        let mut bench = Workbench::new(2);
        bench.stubborn = Some(grinder());

        assert_eq!(
            registry.purchase(&grinder(), 500, &mut bench),
            Err(UpgradeError::Rejected {
                machine: grinder(),
                level: 1,
                source: MachineError::Faulted,
            })
        );
        assert_eq!(registry.level(&grinder()), Some(0));
        assert!(registry.drain_events().is_empty());
    }

    // -----------------------------------------------------------------------
    // Test 9: Purchase emits an event; drain clears it
    // -----------------------------------------------------------------------
    #[test]
    fn purchase_emits_event() {
        let mut registry = setup_registry();
        let mut bench = Workbench::new(2);
        registry
            .purchase(&MachineId::new("doser"), 150, &mut bench)
            .unwrap();

        assert_eq!(
            registry.drain_events(),
            vec![UpgradeEvent::UpgradePurchased {
                machine_id: MachineId::new("doser"),
                level: 1,
                price: 150,
            }]
        );
        assert!(registry.pending_events().is_empty());
    }

    // -----------------------------------------------------------------------
    // Test 10: apply_all pushes stored levels into a fresh target
    // -----------------------------------------------------------------------
    #[test]
    fn apply_all_syncs_levels() {
        let mut registry = UpgradeRegistry::new();
        registry.register_machine("grinder", vec![100, 250], 2);
        registry.register_machine("doser", vec![150, 400], 1);
        let mut bench = Workbench::new(2);

        registry.apply_all(&mut bench).unwrap();
        assert_eq!(bench.levels[&grinder()], 2);
        assert_eq!(bench.levels[&MachineId::new("doser")], 1);

        let mut small = Workbench::new(1);
        assert!(matches!(
            registry.apply_all(&mut small),
            Err(UpgradeError::Rejected { level: 2, .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Test 11: validate_against compares table length with target max
    // -----------------------------------------------------------------------
    #[test]
    fn validate_against_target() {
        let registry = setup_registry();
        assert!(registry.validate_against(&Workbench::new(2)).is_ok());
        assert!(matches!(
            registry.validate_against(&Workbench::new(3)),
            Err(UpgradeError::TableMismatch {
                table_max: 2,
                supported: Some(3),
                ..
            })
        ));
    }

    // -----------------------------------------------------------------------
    // Test 12: Serialization round-trip keeps records, drops events
    // -----------------------------------------------------------------------
    #[test]
    fn serialization_round_trip() {
        let mut registry = setup_registry();
        let mut bench = Workbench::new(2);
        registry.purchase(&grinder(), 100, &mut bench).unwrap();

        let json = serde_json::to_string(&registry).unwrap();
        let restored: UpgradeRegistry = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.level(&grinder()), Some(1));
        assert_eq!(restored.price(&MachineId::new("doser")), Some(150));
        assert_eq!(restored.records().count(), 2);
        assert!(restored.pending_events().is_empty());
    }

    // -----------------------------------------------------------------------
    // Test 13: can_afford
    // -----------------------------------------------------------------------
    #[test]
    fn can_afford_checks_price() {
        let registry = setup_registry();
        assert!(registry.can_afford(&grinder(), 100));
        assert!(!registry.can_afford(&grinder(), 99));
        assert!(!registry.can_afford(&MachineId::new("kettle"), u64::MAX));
    }

    // -----------------------------------------------------------------------
    // Test 14: Cost tables are capped at the highest representable level
    // -----------------------------------------------------------------------
    #[test]
    fn oversized_cost_table_is_capped() {
        let mut registry = UpgradeRegistry::new();
        let record = registry.register_machine("grinder", vec![1; 300], Level::MAX - 1);
        assert_eq!(record.cost_table.len(), usize::from(Level::MAX));
        assert_eq!(record.max_level(), Level::MAX);

        let mut bench = Workbench::new(Level::MAX);
        let receipt = registry.purchase(&grinder(), 1, &mut bench).unwrap();
        assert_eq!(receipt.new_level, Level::MAX);
        assert_eq!(registry.price(&grinder()), None);
        assert!(matches!(
            registry.purchase(&grinder(), u64::MAX, &mut bench),
            Err(UpgradeError::AlreadyMaxLevel { level, .. }) if level == Level::MAX
        ));
    }

    #[test]
    fn restored_record_with_long_table_stops_at_max() {
        let record = UpgradeRecord {
            machine_id: grinder(),
            level: Level::MAX,
            cost_table: vec![1; 300],
        };
        assert_eq!(record.price(), None);
        assert!(record.is_max_level());
    }
}
