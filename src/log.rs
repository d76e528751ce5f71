//! `L` (full log) and `PL` (partial log) — spec §3.
//!
//! Grounded on the teacher's `protocol::dot_index_map::DotIndexMap`: a
//! bidirectional `Dot`-keyed index kept alongside an ordered event store for
//! O(1) membership checks. This crate only needs one direction (has this
//! event been seen before), so the `BiMap` becomes a plain `Vec` plus an
//! `FxHashSet` index, with a hand-written `Serialize`/`Deserialize` pair so
//! the wire/disk form stays a plain ordered sequence (insertion order) rather
//! than depending on hash-iteration order, which the spec's bit-for-bit
//! round-trip law forbids.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::appointment::{AppointmentId, NodeId};
use crate::clock::TimeTable;
use crate::event::{EventRecord, Op};

#[derive(Clone, PartialEq, Eq, Hash)]
struct EventKey {
    op: Op,
    clock: u64,
    origin: NodeId,
    appt_id: AppointmentId,
}

impl From<&EventRecord> for EventKey {
    fn from(e: &EventRecord) -> Self {
        EventKey {
            op: e.op,
            clock: e.clock,
            origin: e.origin_node,
            appt_id: e.appt.appt_id.clone(),
        }
    }
}

/// Set of all EventRecords this node has ever seen. Grows monotonically;
/// deduplicated by record equality; never shrinks.
#[derive(Debug, Clone, Default)]
pub struct Log {
    events: Vec<EventRecord>,
    index: FxHashSet<EventKey>,
}

impl Log {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, e: &EventRecord) -> bool {
        self.index.contains(&EventKey::from(e))
    }

    /// Idempotent append. Returns `true` if the record was newly observed.
    pub fn insert(&mut self, e: EventRecord) -> bool {
        let key = EventKey::from(&e);
        if self.index.contains(&key) {
            return false;
        }
        self.index.insert(key);
        self.events.push(e);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Serialize for Log {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.events.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Log {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let events = Vec::<EventRecord>::deserialize(deserializer)?;
        let mut log = Log::new();
        for e in events {
            log.insert(e);
        }
        Ok(log)
    }
}

/// Subset of `L` still "interesting" to at least one peer — the send
/// buffer. A record is in `PL` iff some peer `k` has `¬hasRec(T, eR, k)`.
#[derive(Debug, Clone, Default)]
pub struct PartialLog {
    events: Vec<EventRecord>,
    index: FxHashSet<EventKey>,
}

impl PartialLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events(events: Vec<EventRecord>) -> Self {
        let mut pl = PartialLog::new();
        for e in events {
            pl.insert(e);
        }
        pl
    }

    pub fn contains(&self, e: &EventRecord) -> bool {
        self.index.contains(&EventKey::from(e))
    }

    /// Idempotent insert.
    pub fn insert(&mut self, e: EventRecord) {
        let key = EventKey::from(&e);
        if self.index.insert(key) {
            self.events.push(e);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Projection for a send to peer `k`: events `k` is not yet known to
    /// have observed (§4.2 step 1).
    pub fn novelty_for(&self, k: NodeId, time_table: &TimeTable) -> Vec<EventRecord> {
        self.events
            .iter()
            .filter(|e| !time_table.has_rec(e.origin_node, e.clock, k))
            .cloned()
            .collect()
    }

    /// Garbage-collects every record every peer has now observed (§4.3 step
    /// 6, first half).
    pub fn gc(&mut self, time_table: &TimeTable) {
        let keep: Vec<EventRecord> = self
            .events
            .drain(..)
            .filter(|e| !time_table.all_peers_have(e.origin_node, e.clock))
            .collect();
        self.index = keep.iter().map(EventKey::from).collect();
        self.events = keep;
    }
}

impl Serialize for PartialLog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.events.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PartialLog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let events = Vec::<EventRecord>::deserialize(deserializer)?;
        Ok(PartialLog::from_events(events))
    }
}
