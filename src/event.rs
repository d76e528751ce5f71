//! Immutable event records (spec §3 "EventRecord").

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::appointment::{Appointment, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    Insert,
    Delete,
}

/// One Insert or Delete, tagged with origin and origin-clock. The full
/// appointment is replicated alongside a Delete so it can be applied without
/// prior knowledge of the matching Insert (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub op: Op,
    pub clock: u64,
    pub origin_node: NodeId,
    pub appt: Appointment,
}

impl EventRecord {
    pub fn new(op: Op, clock: u64, origin_node: NodeId, appt: Appointment) -> Self {
        EventRecord {
            op,
            clock,
            origin_node,
            appt,
        }
    }
}

/// Equality and hashing are over `(op, clock, origin_node, appt_id)`, per
/// spec — not the full appointment body, so a Delete record referencing an
/// appointment the deletion didn't mutate still compares equal across peers.
impl PartialEq for EventRecord {
    fn eq(&self, other: &Self) -> bool {
        self.op == other.op
            && self.clock == other.clock
            && self.origin_node == other.origin_node
            && self.appt.appt_id == other.appt.appt_id
    }
}

impl Eq for EventRecord {}

impl Hash for EventRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.op.hash(state);
        self.clock.hash(state);
        self.origin_node.hash(state);
        self.appt.appt_id.hash(state);
    }
}
