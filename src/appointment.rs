//! Appointment and identity types (spec §3 "Data model").

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CalendarError, Result};

/// The calendar is a fixed 7-day sliding week of 30-minute slots.
pub const NUM_DAYS: u8 = 7;
/// 48 half-hour slots per day, anchored at midnight.
pub const NUM_SLOTS: u8 = 48;

/// Dense replica id in `[0, N)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u16);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for NodeId {
    fn from(value: u16) -> Self {
        NodeId(value)
    }
}

/// `<origin_node_id>-<origin_local_counter>`, globally unique and never reused.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AppointmentId(pub String);

impl AppointmentId {
    pub fn new(origin: NodeId, counter: u64) -> Self {
        AppointmentId(format!("{}-{}", origin.0, counter))
    }
}

impl fmt::Display for AppointmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub appt_id: AppointmentId,
    pub name: String,
    pub day: u8,
    pub start_slot: u8,
    pub end_slot: u8,
    pub participants: BTreeSet<NodeId>,
    pub origin_node: NodeId,
}

impl Appointment {
    pub fn slots(&self) -> std::ops::Range<u8> {
        self.start_slot..self.end_slot
    }
}

/// Validates the inputs to `create` against §4.1's constraints. Does not
/// touch any replica state; violations must leave everything untouched.
pub fn validate_create_input(
    day: u8,
    start_slot: u8,
    end_slot: u8,
    participants: &BTreeSet<NodeId>,
    num_nodes: usize,
) -> Result<()> {
    if day >= NUM_DAYS {
        return Err(CalendarError::InvalidInput(format!(
            "day {day} out of range [0, {NUM_DAYS})"
        )));
    }
    if start_slot >= end_slot {
        return Err(CalendarError::InvalidInput(format!(
            "start_slot {start_slot} must be < end_slot {end_slot}"
        )));
    }
    if end_slot > NUM_SLOTS {
        return Err(CalendarError::InvalidInput(format!(
            "end_slot {end_slot} out of range [0, {NUM_SLOTS}]"
        )));
    }
    if participants.is_empty() {
        return Err(CalendarError::InvalidInput(
            "participants must be non-empty".to_string(),
        ));
    }
    if let Some(bad) = participants.iter().find(|p| p.0 as usize >= num_nodes) {
        return Err(CalendarError::InvalidInput(format!(
            "participant {bad} out of range [0, {num_nodes})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[u16]) -> BTreeSet<NodeId> {
        ids.iter().map(|&i| NodeId(i)).collect()
    }

    #[test]
    fn rejects_bad_day() {
        assert!(validate_create_input(7, 0, 1, &set(&[0]), 3).is_err());
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(validate_create_input(0, 10, 10, &set(&[0]), 3).is_err());
        assert!(validate_create_input(0, 10, 5, &set(&[0]), 3).is_err());
    }

    #[test]
    fn rejects_end_slot_overflow() {
        assert!(validate_create_input(0, 0, 49, &set(&[0]), 3).is_err());
    }

    #[test]
    fn rejects_empty_participants() {
        assert!(validate_create_input(0, 0, 1, &BTreeSet::new(), 3).is_err());
    }

    #[test]
    fn rejects_participant_out_of_range() {
        assert!(validate_create_input(0, 0, 1, &set(&[3]), 3).is_err());
    }

    #[test]
    fn accepts_boundary_appointment() {
        assert!(validate_create_input(0, 0, 48, &set(&[0]), 1).is_ok());
    }

    #[test]
    fn appointment_id_format() {
        let id = AppointmentId::new(NodeId(2), 7);
        assert_eq!(id.0, "2-7");
    }
}
