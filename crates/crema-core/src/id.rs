use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a listener registered on the [`EventBus`](crate::event::EventBus).
    pub struct ListenerId;
}

/// The kind of equipment a process simulates. Cheap to copy and compare;
/// carried on every notification as its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MachineKind {
    Grinder,
    Doser,
    Espresso,
}

impl MachineKind {
    /// All machine kinds in station order.
    pub const ALL: [MachineKind; 3] = [MachineKind::Grinder, MachineKind::Doser, MachineKind::Espresso];

    /// The canonical string identifier used by the upgrade registry and data files.
    pub fn as_str(self) -> &'static str {
        match self {
            MachineKind::Grinder => "grinder",
            MachineKind::Doser => "doser",
            MachineKind::Espresso => "espresso",
        }
    }

    /// Parse a canonical identifier back into a kind.
    pub fn from_id(id: &MachineId) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == id.as_str())
    }

    /// The registry identifier for this kind.
    pub fn id(self) -> MachineId {
        MachineId::new(self.as_str())
    }
}

impl std::fmt::Display for MachineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// String identifier of an upgradeable machine, as used by the upgrade
/// registry and configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(String);

impl MachineId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MachineId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<MachineKind> for MachineId {
    fn from(kind: MachineKind) -> Self {
        kind.id()
    }
}

impl std::fmt::Display for MachineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Index of a brewing slot on the espresso machine.
pub type SlotIndex = usize;

/// Upgrade level of a machine. Level 0 is the starting equipment.
pub type Level = u8;
