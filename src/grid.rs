//! `C` — the calendar occupancy grid (spec §3).
//!
//! A pure projection of `Dictionary`; cached only so conflict checks are
//! `O(slots)` instead of a full dictionary scan.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::appointment::{Appointment, AppointmentId, NodeId};
use crate::dictionary::Dictionary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct Slot {
    participant: NodeId,
    day: u8,
    slot: u8,
}

#[derive(Debug, Clone, Default)]
pub struct CalendarGrid {
    occupancy: FxHashMap<Slot, AppointmentId>,
}

impl CalendarGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn occupant(&self, participant: NodeId, day: u8, slot: u8) -> Option<&AppointmentId> {
        self.occupancy.get(&Slot {
            participant,
            day,
            slot,
        })
    }

    /// `true` if, for `participant`, any slot in `appt`'s range is held by a
    /// *different* appointment id (spec §4.1/§4.3's conflict check).
    pub fn conflicts_for(&self, participant: NodeId, day: u8, range: std::ops::Range<u8>, appt_id: &AppointmentId) -> bool {
        range
            .into_iter()
            .any(|s| matches!(self.occupant(participant, day, s), Some(occ) if occ != appt_id))
    }

    /// First slot in `range`, for `participant` on `day`, held by *any*
    /// appointment (used for the local-conflict check before an id exists
    /// to compare against, spec §4.1).
    pub fn first_busy_slot(&self, participant: NodeId, day: u8, range: std::ops::Range<u8>) -> Option<u8> {
        range.into_iter().find(|&s| self.occupant(participant, day, s).is_some())
    }

    /// Marks every participant's slots in `appt`'s range with its id.
    pub fn occupy(&mut self, appt: &Appointment) {
        for &participant in &appt.participants {
            for s in appt.slots() {
                self.occupancy.insert(
                    Slot {
                        participant,
                        day: appt.day,
                        slot: s,
                    },
                    appt.appt_id.clone(),
                );
            }
        }
    }

    /// Clears every slot currently held by `appt`'s id, for every participant.
    pub fn vacate(&mut self, appt: &Appointment) {
        for &participant in &appt.participants {
            for s in appt.slots() {
                let key = Slot {
                    participant,
                    day: appt.day,
                    slot: s,
                };
                if self.occupancy.get(&key) == Some(&appt.appt_id) {
                    self.occupancy.remove(&key);
                }
            }
        }
    }

    /// Recomputes the grid from scratch. The grid is a pure projection of
    /// `V`, so this is always a valid (if expensive) recovery path.
    pub fn rebuild_from(dictionary: &Dictionary) -> Self {
        let mut grid = CalendarGrid::new();
        for appt in dictionary.values() {
            grid.occupy(appt);
        }
        grid
    }
}

impl Serialize for CalendarGrid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut entries: Vec<(&Slot, &AppointmentId)> = self.occupancy.iter().collect();
        entries.sort_by_key(|(slot, _)| (slot.participant, slot.day, slot.slot));
        let owned: Vec<((u16, u8, u8), &AppointmentId)> = entries
            .into_iter()
            .map(|(s, id)| ((s.participant.0, s.day, s.slot), id))
            .collect();
        owned.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CalendarGrid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = Vec::<((u16, u8, u8), AppointmentId)>::deserialize(deserializer)?;
        let mut grid = CalendarGrid::new();
        for ((participant, day, slot), id) in entries {
            grid.occupancy.insert(
                Slot {
                    participant: NodeId(participant),
                    day,
                    slot,
                },
                id,
            );
        }
        Ok(grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn appt(id: &str, participants: &[u16], day: u8, start: u8, end: u8) -> Appointment {
        Appointment {
            appt_id: AppointmentId(id.to_string()),
            name: "n".to_string(),
            day,
            start_slot: start,
            end_slot: end,
            participants: participants.iter().map(|&p| NodeId(p)).collect(),
            origin_node: NodeId(participants[0]),
        }
    }

    #[test]
    fn occupy_then_vacate_is_fully_vacant() {
        let mut grid = CalendarGrid::new();
        let a = appt("0-1", &[0, 1], 0, 10, 12);
        grid.occupy(&a);
        assert_eq!(grid.occupant(NodeId(0), 0, 10), Some(&a.appt_id));
        assert_eq!(grid.occupant(NodeId(1), 0, 11), Some(&a.appt_id));
        assert_eq!(grid.occupant(NodeId(0), 0, 12), None);
        grid.vacate(&a);
        assert_eq!(grid.occupant(NodeId(0), 0, 10), None);
        assert_eq!(grid.occupant(NodeId(1), 0, 11), None);
    }

    #[test]
    fn conflict_detection_ignores_same_appointment() {
        let mut grid = CalendarGrid::new();
        let a = appt("0-1", &[0], 0, 10, 12);
        grid.occupy(&a);
        assert!(!grid.conflicts_for(NodeId(0), 0, 10..12, &a.appt_id));
        let other = AppointmentId("1-1".to_string());
        assert!(grid.conflicts_for(NodeId(0), 0, 11..13, &other));
    }

    #[test]
    fn first_busy_slot_finds_any_occupant() {
        let mut grid = CalendarGrid::new();
        let a = appt("0-1", &[0], 0, 10, 12);
        grid.occupy(&a);
        assert_eq!(grid.first_busy_slot(NodeId(0), 0, 9..10), None);
        assert_eq!(grid.first_busy_slot(NodeId(0), 0, 9..12), Some(10));
    }

    #[test]
    fn rebuild_matches_incremental_occupy() {
        let mut dict = Dictionary::new();
        let a = appt("0-1", &[0, 1], 2, 5, 8);
        dict.insert(a.clone());
        let rebuilt = CalendarGrid::rebuild_from(&dict);
        assert_eq!(rebuilt.occupant(NodeId(0), 2, 6), Some(&a.appt_id));
        assert_eq!(rebuilt.occupant(NodeId(1), 2, 7), Some(&a.appt_id));
    }
}
