//! `V` — the dictionary of currently-live appointments (spec §3).

use rustc_hash::FxHashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::appointment::{Appointment, AppointmentId};

#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    entries: FxHashMap<AppointmentId, Appointment>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &AppointmentId) -> Option<&Appointment> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &AppointmentId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn insert(&mut self, appt: Appointment) {
        self.entries.insert(appt.appt_id.clone(), appt);
    }

    pub fn remove(&mut self, id: &AppointmentId) -> Option<Appointment> {
        self.entries.remove(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &Appointment> {
        self.entries.values()
    }
}

impl Serialize for Dictionary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut entries: Vec<&Appointment> = self.entries.values().collect();
        entries.sort_by(|a, b| a.appt_id.cmp(&b.appt_id));
        entries.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Dictionary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let appts = Vec::<Appointment>::deserialize(deserializer)?;
        let mut dict = Dictionary::new();
        for a in appts {
            dict.insert(a);
        }
        Ok(dict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use crate::appointment::NodeId;

    fn appt(id: &str) -> Appointment {
        Appointment {
            appt_id: AppointmentId(id.to_string()),
            name: "n".to_string(),
            day: 0,
            start_slot: 0,
            end_slot: 1,
            participants: BTreeSet::from([NodeId(0)]),
            origin_node: NodeId(0),
        }
    }

    #[test]
    fn insert_and_remove_round_trip() {
        let mut d = Dictionary::new();
        d.insert(appt("0-1"));
        assert!(d.contains(&AppointmentId("0-1".to_string())));
        let removed = d.remove(&AppointmentId("0-1".to_string()));
        assert!(removed.is_some());
        assert!(d.is_empty());
    }

    #[test]
    fn serialization_is_sorted_regardless_of_insertion_order() {
        let mut a = Dictionary::new();
        a.insert(appt("1-1"));
        a.insert(appt("0-1"));
        let mut b = Dictionary::new();
        b.insert(appt("0-1"));
        b.insert(appt("1-1"));
        let bytes_a = bincode::serialize(&a).unwrap();
        let bytes_b = bincode::serialize(&b).unwrap();
        assert_eq!(bytes_a, bytes_b);
    }
}
