//! Scalar clock and the N×N matrix time table (spec §3 "Clock", "TimeTable").
//!
//! Grounded on the teacher's `clocks::matrix_clock::MatrixClock`, specialised
//! here to the spec's plain-integer variant: no view/resolver indirection is
//! needed because `N` is fixed at configuration time and node ids are already
//! dense `usize`-compatible integers.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::appointment::NodeId;

/// Dense `N×N` matrix of non-negative integers. `entries[j][k]` is this
/// replica's best estimate of what node `j` knows about node `k`'s clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeTable {
    entries: Vec<Vec<u64>>,
    self_id: NodeId,
}

impl TimeTable {
    pub fn new(num_nodes: usize, self_id: NodeId) -> Self {
        let table = TimeTable {
            entries: vec![vec![0u64; num_nodes]; num_nodes],
            self_id,
        };
        debug_assert!(table.is_valid());
        table
    }

    pub fn num_nodes(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, row: NodeId, col: NodeId) -> u64 {
        self.entries[row.0 as usize][col.0 as usize]
    }

    pub fn set(&mut self, row: NodeId, col: NodeId, value: u64) {
        self.entries[row.0 as usize][col.0 as usize] = value;
    }

    /// This replica's own scalar clock: `T[self][self]`.
    pub fn self_clock(&self) -> u64 {
        self.get(self.self_id, self.self_id)
    }

    /// Increments the local clock by exactly one, returning the new value.
    /// Invoked on every locally-originated Insert or Delete.
    pub fn increment_self(&mut self) -> u64 {
        let next = self.self_clock() + 1;
        self.set(self.self_id, self.self_id, next);
        next
    }

    /// `hasRec(T, eR, k)` ≜ `T[k][origin] >= clock` — "node k is known to
    /// have observed this event."
    pub fn has_rec(&self, origin: NodeId, clock: u64, k: NodeId) -> bool {
        self.get(k, origin) >= clock
    }

    /// Row `self_id`'s view of what node `k` knows about every other node,
    /// taken from a peer's own snapshot: `T[self][r] := max(T[self][r],
    /// Tk[k][r])` — step one of §4.3's two-step merge.
    pub fn merge_peer_row(&mut self, peer: NodeId, peer_table: &TimeTable) {
        let n = self.num_nodes();
        for r in 0..n {
            let r = NodeId(r as u16);
            let theirs = peer_table.get(peer, r);
            let ours = self.get(self.self_id, r);
            if theirs > ours {
                self.set(self.self_id, r, theirs);
            }
        }
    }

    /// Element-wise maximum over every cell: `T[r][s] := max(T[r][s],
    /// Tk[r][s])` — step two of §4.3's merge, generalising to all pairs.
    pub fn merge_all(&mut self, peer_table: &TimeTable) {
        let n = self.num_nodes();
        for r in 0..n {
            for s in 0..n {
                let (r, s) = (NodeId(r as u16), NodeId(s as u16));
                let theirs = peer_table.get(r, s);
                if theirs > self.get(r, s) {
                    self.set(r, s, theirs);
                }
            }
        }
    }

    /// Every peer has observed `(origin, clock)`: used to decide whether an
    /// event can be garbage-collected from the partial log.
    pub fn all_peers_have(&self, origin: NodeId, clock: u64) -> bool {
        (0..self.num_nodes()).all(|k| self.has_rec(origin, clock, NodeId(k as u16)))
    }

    fn is_valid(&self) -> bool {
        let square = self.entries.iter().all(|row| row.len() == self.entries.len());
        if !square {
            error!("time table is not square");
        }
        square
    }

    #[cfg(test)]
    pub(crate) fn build(self_id: NodeId, rows: &[&[u64]]) -> Self {
        let entries = rows.iter().map(|r| r.to_vec()).collect();
        TimeTable { entries, self_id }
    }
}
