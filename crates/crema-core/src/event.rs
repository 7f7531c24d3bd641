//! Typed machine notifications, their delivery and a bounded history.
//!
//! Processes never call listeners directly. Each process buffers its
//! [`MachineEvent`]s in an [`Outbox`]; the station drains every outbox into
//! the [`EventBus`] after an action or tick, and the bus delivers the batch to
//! registered listeners. Each event kind keeps its recent history in an
//! [`EventBuffer`] of configurable capacity.
//!
//! # Suppression
//!
//! Event kinds can be suppressed via [`EventBus::suppress`], which prevents
//! any recording or delivery for that kind. Progress notifications fire on
//! every tick of a timed operation, so hosts that do not draw progress bars
//! usually suppress [`EventKind::ProgressChanged`].

use slotmap::SlotMap;
use std::collections::{VecDeque, vec_deque};

use crate::fixed::Fixed64;
use crate::grinder::GrindSize;
use crate::id::{Level, ListenerId, MachineKind, SlotIndex};
use crate::machine::MachineState;
use crate::quality::QualityResult;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// Recoverable conditions reported to the player rather than raised as
/// failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Notice {
    OutOfBeans,
    OutOfCoffee,
    BeansFull,
    StorageFull,
    /// The ground coffee is already at the largest grind size.
    AlreadyMaximum,
    NoPortafilter,
}

/// A machine notification. All events carry the machine that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineEvent {
    // -- Lifecycle --
    StateChanged {
        source: MachineKind,
        from: MachineState,
        to: MachineState,
    },
    ProgressChanged {
        source: MachineKind,
        progress: Fixed64,
    },
    ProcessCompleted {
        source: MachineKind,
    },
    UpgradeApplied {
        source: MachineKind,
        level: Level,
    },
    QualityEvaluated {
        source: MachineKind,
        result: QualityResult,
    },
    Notice {
        source: MachineKind,
        notice: Notice,
    },

    // -- Grinder --
    BeanCountChanged {
        count: u32,
    },
    GroundCoffeeChanged {
        size: Option<GrindSize>,
    },

    // -- Doser --
    CoffeeAmountChanged {
        amount: Fixed64,
    },
    PortafilterFillChanged {
        amount: Fixed64,
    },

    // -- Espresso --
    SlotStateChanged {
        slot: SlotIndex,
    },
    BrewingCompleted {
        slot: SlotIndex,
        volume: Fixed64,
        quality: Fixed64,
    },
}

/// Discriminant tag for event types, used for suppression and subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StateChanged,
    ProgressChanged,
    ProcessCompleted,
    UpgradeApplied,
    QualityEvaluated,
    Notice,
    BeanCountChanged,
    GroundCoffeeChanged,
    CoffeeAmountChanged,
    PortafilterFillChanged,
    SlotStateChanged,
    BrewingCompleted,
}

/// Total number of event kinds.
const EVENT_KIND_COUNT: usize = 12;

impl MachineEvent {
    /// Get the discriminant kind for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            MachineEvent::StateChanged { .. } => EventKind::StateChanged,
            MachineEvent::ProgressChanged { .. } => EventKind::ProgressChanged,
            MachineEvent::ProcessCompleted { .. } => EventKind::ProcessCompleted,
            MachineEvent::UpgradeApplied { .. } => EventKind::UpgradeApplied,
            MachineEvent::QualityEvaluated { .. } => EventKind::QualityEvaluated,
            MachineEvent::Notice { .. } => EventKind::Notice,
            MachineEvent::BeanCountChanged { .. } => EventKind::BeanCountChanged,
            MachineEvent::GroundCoffeeChanged { .. } => EventKind::GroundCoffeeChanged,
            MachineEvent::CoffeeAmountChanged { .. } => EventKind::CoffeeAmountChanged,
            MachineEvent::PortafilterFillChanged { .. } => EventKind::PortafilterFillChanged,
            MachineEvent::SlotStateChanged { .. } => EventKind::SlotStateChanged,
            MachineEvent::BrewingCompleted { .. } => EventKind::BrewingCompleted,
        }
    }

    /// The machine that emitted this event.
    pub fn source(&self) -> MachineKind {
        match self {
            MachineEvent::StateChanged { source, .. }
            | MachineEvent::ProgressChanged { source, .. }
            | MachineEvent::ProcessCompleted { source }
            | MachineEvent::UpgradeApplied { source, .. }
            | MachineEvent::QualityEvaluated { source, .. }
            | MachineEvent::Notice { source, .. } => *source,
            MachineEvent::BeanCountChanged { .. } | MachineEvent::GroundCoffeeChanged { .. } => {
                MachineKind::Grinder
            }
            MachineEvent::CoffeeAmountChanged { .. }
            | MachineEvent::PortafilterFillChanged { .. } => MachineKind::Doser,
            MachineEvent::SlotStateChanged { .. } | MachineEvent::BrewingCompleted { .. } => {
                MachineKind::Espresso
            }
        }
    }
}

impl EventKind {
    /// Convert to usize index for array lookups.
    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// Outbox: per-process notification queue
// ---------------------------------------------------------------------------

/// Notifications buffered by a single process until the host drains them.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    events: Vec<MachineEvent>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: MachineEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Peek at pending events, oldest first.
    pub fn pending(&self) -> &[MachineEvent] {
        &self.events
    }

    /// Take every pending event, leaving the outbox empty.
    pub fn drain(&mut self) -> Vec<MachineEvent> {
        std::mem::take(&mut self.events)
    }
}

// ---------------------------------------------------------------------------
// EventBuffer -- bounded per-kind history
// ---------------------------------------------------------------------------

/// Bounded history of one event kind. Holds at most `capacity` events and
/// evicts the oldest to make room.
#[derive(Debug)]
pub struct EventBuffer {
    events: VecDeque<MachineEvent>,
    capacity: usize,
    /// Every push since creation, evicted ones included.
    total_written: u64,
}

impl EventBuffer {
    /// Capacity 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            total_written: 0,
        }
    }

    pub fn push(&mut self, event: MachineEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
        self.total_written += 1;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Oldest first.
    pub fn iter(&self) -> vec_deque::Iter<'_, MachineEvent> {
        self.events.iter()
    }

    /// Drop the history. `total_written` keeps counting.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

/// A listener receives events read-only.
pub type Listener = Box<dyn FnMut(&MachineEvent)>;

/// Optional predicate that filters events for a listener.
pub type EventFilter = Box<dyn Fn(&MachineEvent) -> bool>;

/// Priority level for listeners. Lower priorities run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ListenerPriority {
    Pre = 0,
    Normal = 1,
    Post = 2,
}

struct ListenerEntry {
    kind: EventKind,
    listener: Listener,
    priority: ListenerPriority,
    filter: Option<EventFilter>,
    insertion_order: u64,
}

impl std::fmt::Debug for ListenerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerEntry")
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .field(
                "filter",
                &if self.filter.is_some() {
                    "Some(<fn>)"
                } else {
                    "None"
                },
            )
            .field("insertion_order", &self.insertion_order)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// The station's event bus: per-kind history, listeners and suppression
/// flags.
///
/// Emitted events go to two places: an unbounded pending queue that the next
/// [`EventBus::deliver`] drains, and a bounded history that keeps the most
/// recent events of each kind for inspection. Eviction from the history never
/// affects delivery.
pub struct EventBus {
    /// History, allocated on first emit of each kind.
    buffers: [Option<EventBuffer>; EVENT_KIND_COUNT],

    /// Events awaiting delivery, per kind.
    pending: [Vec<MachineEvent>; EVENT_KIND_COUNT],

    /// Suppressed event kinds. Suppressed events are never buffered.
    suppressed: [bool; EVENT_KIND_COUNT],

    listeners: SlotMap<ListenerId, ListenerEntry>,

    /// Default buffer capacity for new event buffers.
    default_capacity: usize,

    /// Monotonically increasing counter for stable sort ordering.
    next_insertion_order: u64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("buffers", &self.buffers)
            .field("suppressed", &self.suppressed)
            .field("listeners", &self.listeners.len())
            .field("default_capacity", &self.default_capacity)
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Create a new event bus with the given default buffer capacity per kind.
    pub fn new(default_capacity: usize) -> Self {
        Self {
            buffers: Default::default(),
            pending: std::array::from_fn(|_| Vec::new()),
            suppressed: [false; EVENT_KIND_COUNT],
            listeners: SlotMap::with_key(),
            default_capacity,
            next_insertion_order: 0,
        }
    }

    /// Suppress an event kind. Its history and undelivered events are
    /// dropped and new events are ignored.
    pub fn suppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = true;
        self.buffers[kind.index()] = None;
        self.pending[kind.index()].clear();
    }

    /// Lift a suppression set by [`EventBus::suppress`].
    pub fn unsuppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = false;
    }

    pub fn is_suppressed(&self, kind: EventKind) -> bool {
        self.suppressed[kind.index()]
    }

    /// Record an event for the next delivery. Ignored for suppressed kinds.
    pub fn emit(&mut self, event: MachineEvent) {
        let idx = event.kind().index();
        if self.suppressed[idx] {
            return;
        }
        let capacity = self.default_capacity;
        self.buffers[idx]
            .get_or_insert_with(|| EventBuffer::new(capacity))
            .push(event.clone());
        self.pending[idx].push(event);
    }

    /// Emit every event from an iterator, in order.
    pub fn emit_all(&mut self, events: impl IntoIterator<Item = MachineEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    /// Register a listener for an event kind with Normal priority and no filter.
    pub fn subscribe(&mut self, kind: EventKind, listener: Listener) -> ListenerId {
        self.subscribe_filtered(kind, ListenerPriority::Normal, None, listener)
    }

    /// Register a listener with explicit priority and optional filter.
    pub fn subscribe_filtered(
        &mut self,
        kind: EventKind,
        priority: ListenerPriority,
        filter: Option<EventFilter>,
        listener: Listener,
    ) -> ListenerId {
        let order = self.next_insertion_order;
        self.next_insertion_order += 1;
        self.listeners.insert(ListenerEntry {
            kind,
            listener,
            priority,
            filter,
            insertion_order: order,
        })
    }

    /// Remove a listener. Returns false if it was already removed.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id).is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Deliver every pending event to listeners.
    ///
    /// For each event kind with pending events, listeners for that kind run
    /// in `(priority, insertion_order)` order; each receives the events
    /// oldest-to-newest, skipping any its filter rejects. The history is left
    /// untouched.
    pub fn deliver(&mut self) {
        for idx in 0..EVENT_KIND_COUNT {
            if self.pending[idx].is_empty() {
                continue;
            }
            let events = std::mem::take(&mut self.pending[idx]);

            let mut order: Vec<(ListenerPriority, u64, ListenerId)> = self
                .listeners
                .iter()
                .filter(|(_, entry)| entry.kind.index() == idx)
                .map(|(id, entry)| (entry.priority, entry.insertion_order, id))
                .collect();
            order.sort_unstable();

            for (_, _, id) in order {
                let Some(entry) = self.listeners.get_mut(id) else {
                    continue;
                };
                for event in &events {
                    if let Some(ref filter) = entry.filter
                        && !filter(event)
                    {
                        continue;
                    }
                    (entry.listener)(event);
                }
            }
        }
    }

    /// Events of a kind emitted since the last delivery.
    pub fn pending_count(&self, kind: EventKind) -> usize {
        self.pending[kind.index()].len()
    }

    /// Get the event buffer for a specific event kind (read-only).
    pub fn buffer(&self, kind: EventKind) -> Option<&EventBuffer> {
        self.buffers[kind.index()].as_ref()
    }

    /// Get the count of events currently held in a kind's history.
    pub fn buffered_count(&self, kind: EventKind) -> usize {
        self.buffers[kind.index()]
            .as_ref()
            .map(|b| b.len())
            .unwrap_or(0)
    }

    /// Get the total events ever emitted for a kind (including dropped).
    pub fn total_emitted(&self, kind: EventKind) -> u64 {
        self.buffers[kind.index()]
            .as_ref()
            .map(|b| b.total_written())
            .unwrap_or(0)
    }

    /// Clear all history and undelivered events. Does not remove listeners
    /// or suppression settings.
    pub fn clear_all(&mut self) {
        for buffer in self.buffers.iter_mut().flatten() {
            buffer.clear();
        }
        for queue in &mut self.pending {
            queue.clear();
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
