//! The replication engine (spec §4.1–§4.4, §4.7): command API, receive path,
//! and conflict resolver, all serialised through one replica-wide lock (§5).
//!
//! Grounded on the teacher's `Tcsb<L>` (`protocol::tcsb::Tcsb`): one struct
//! owning all mutable protocol state, mutated under a single guard, with
//! `tracing` lines at every delivery/stabilisation transition. Unlike the
//! teacher's generic `Log` trait, the domain here is fixed (calendars), so
//! there is one concrete state type instead of a trait parameter.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::appointment::{validate_create_input, Appointment, AppointmentId, NodeId};
use crate::clock::TimeTable;
use crate::config::NodeConfig;
use crate::dictionary::Dictionary;
use crate::error::{CalendarError, Result};
use crate::event::{EventRecord, Op};
use crate::grid::CalendarGrid;
use crate::log::{Log, PartialLog};
use crate::snapshot::Snapshot;
use rustc_hash::FxHashSet;

/// The mutable protocol state behind the replica-wide mutex (§5).
pub struct ReplicaState {
    pub id: NodeId,
    pub num_nodes: usize,
    pub time_table: TimeTable,
    pub log: Log,
    pub partial_log: PartialLog,
    pub dictionary: Dictionary,
    pub grid: CalendarGrid,
    pub apt_no: u64,
    /// Appointment ids for which a Delete has been logged. Not part of the
    /// persisted snapshot (see `snapshot.rs`'s doc comment and
    /// `DESIGN.md`'s open-question entry); rebuilt from `log` on recovery.
    tombstones: FxHashSet<AppointmentId>,
}

impl ReplicaState {
    fn new(id: NodeId, num_nodes: usize) -> Self {
        ReplicaState {
            id,
            num_nodes,
            time_table: TimeTable::new(num_nodes, id),
            log: Log::new(),
            partial_log: PartialLog::new(),
            dictionary: Dictionary::new(),
            grid: CalendarGrid::new(),
            apt_no: 0,
            tombstones: FxHashSet::default(),
        }
    }

    fn from_snapshot(snap: Snapshot, id: NodeId, num_nodes: usize) -> Self {
        // §4.8: L is not snapshotted; it is re-initialised to PL and rebuilt
        // as new events arrive.
        let mut log = Log::new();
        for e in snap.partial_log.iter() {
            log.insert(e.clone());
        }
        let mut tombstones = FxHashSet::default();
        for e in log.iter() {
            if e.op == Op::Delete {
                tombstones.insert(e.appt.appt_id.clone());
            }
        }
        ReplicaState {
            id,
            num_nodes,
            time_table: snap.time_table,
            log,
            partial_log: snap.partial_log,
            dictionary: snap.dictionary,
            grid: snap.calendar,
            apt_no: snap.apt_no,
            tombstones,
        }
    }

    fn next_appt_id(&mut self) -> AppointmentId {
        let id = AppointmentId::new(self.id, self.apt_no);
        self.apt_no += 1;
        id
    }

    fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            clock: self.time_table.self_clock(),
            calendar: self.grid.clone(),
            time_table: self.time_table.clone(),
            partial_log: self.partial_log.clone(),
            ne: Vec::new(),
            np: Vec::new(),
            dictionary: self.dictionary.clone(),
            apt_no: self.apt_no,
        }
    }

    /// §4.3, substeps 1–6, executed in the required order.
    fn apply_receive(&mut self, np_k: &[EventRecord], peer_table: &TimeTable, peer: NodeId) -> Vec<Appointment> {
        let self_id = self.id;

        // 1. Extract novelty against our own clock knowledge of each origin.
        let ne: Vec<EventRecord> = np_k
            .iter()
            .filter(|e| !self.time_table.has_rec(e.origin_node, e.clock, self_id))
            .cloned()
            .collect();

        // 2. Append to log (idempotent).
        for e in &ne {
            self.log.insert(e.clone());
        }

        let deleted_in_batch: HashSet<&AppointmentId> = ne
            .iter()
            .filter(|e| e.op == Op::Delete)
            .map(|e| &e.appt.appt_id)
            .collect();

        // 3. Apply deletes first.
        for e in ne.iter().filter(|e| e.op == Op::Delete) {
            self.tombstones.insert(e.appt.appt_id.clone());
            if let Some(removed) = self.dictionary.remove(&e.appt.appt_id) {
                self.grid.vacate(&removed);
            }
        }

        // 4. Apply inserts, unless the same batch (or an earlier Delete we
        // already logged) cancels the same id.
        let mut conflicts = Vec::new();
        for e in ne.iter().filter(|e| e.op == Op::Insert) {
            let appt = &e.appt;
            if deleted_in_batch.contains(&appt.appt_id) || self.tombstones.contains(&appt.appt_id) {
                continue;
            }
            if appt.participants.contains(&self_id) {
                let conflict = self.grid.conflicts_for(self_id, appt.day, appt.slots(), &appt.appt_id);
                if conflict {
                    warn!(appt_id = %appt.appt_id, from = %peer, "booking conflict detected, vetoing insert");
                    conflicts.push(appt.clone());
                    continue;
                }
            }
            self.dictionary.insert(appt.clone());
            self.grid.occupy(appt);
        }

        // 5. Merge time tables: first the sender's row, then everything.
        self.time_table.merge_peer_row(peer, peer_table);
        self.time_table.merge_all(peer_table);

        // 6. Garbage-collect, then re-add anything still not globally known.
        self.partial_log.gc(&self.time_table);
        for e in ne {
            if !self.time_table.all_peers_have(e.origin_node, e.clock) {
                self.partial_log.insert(e);
            }
        }

        conflicts
    }

    /// Shared by user-initiated cancel and conflict-driven cancel (§4.4: "the
    /// node behaves as if the local user had issued `cancel`").
    fn cancel_locked(&mut self, appt_id: &AppointmentId) -> Option<Appointment> {
        let appt = self.dictionary.remove(appt_id)?;
        self.grid.vacate(&appt);
        let clock = self.time_table.increment_self();
        let event = EventRecord::new(Op::Delete, clock, self.id, appt.clone());
        self.tombstones.insert(appt_id.clone());
        self.log.insert(event.clone());
        self.partial_log.insert(event);
        Some(appt)
    }
}

/// One unit of outstanding work for a peer's delivery task (§4.5).
#[derive(Clone)]
pub(crate) enum PeerWork {
    /// Recompute NP fresh and send `<NP, T>`.
    Gossip,
    /// Send a targeted `DeleteConflict`.
    Conflict(Appointment),
}

struct ReplicaInner {
    config: NodeConfig,
    state: Mutex<ReplicaState>,
    send_fail: Mutex<Vec<bool>>,
    peer_tx: Vec<Option<mpsc::UnboundedSender<PeerWork>>>,
}

/// Cheaply-cloneable handle to a replica. All command-API, receive, and
/// delivery-loop code shares one `Arc<ReplicaInner>`.
#[derive(Clone)]
pub struct Replica {
    inner: Arc<ReplicaInner>,
}

impl Replica {
    /// Boots a replica from its config, restoring from snapshot if present
    /// (§4.8: "Restart reads the snapshot; if absent, writes a fresh one").
    /// Spawns one delivery task per peer (§4.5) and returns the handle.
    pub async fn start(config: NodeConfig) -> Result<Replica> {
        config.validate()?;
        let snapshot_path = config.snapshot_path();
        let existing = Snapshot::load(&snapshot_path).await?;
        let state = match existing {
            Some(snap) => {
                info!(node = %config.node_id, "restored replica from snapshot");
                ReplicaState::from_snapshot(snap, config.node_id, config.num_nodes)
            }
            None => {
                info!(node = %config.node_id, "no snapshot found, starting fresh");
                ReplicaState::new(config.node_id, config.num_nodes)
            }
        };

        let mut peer_tx = vec![None; config.num_nodes];
        let mut receivers = Vec::new();
        for peer in config.peers() {
            let (tx, rx) = mpsc::unbounded_channel();
            peer_tx[peer.0 as usize] = Some(tx);
            receivers.push((peer, rx));
        }

        let inner = Arc::new(ReplicaInner {
            send_fail: Mutex::new(vec![false; config.num_nodes]),
            config,
            state: Mutex::new(state),
            peer_tx,
        });
        let replica = Replica { inner };

        // Write a fresh snapshot immediately if we didn't load one, so the
        // file always exists once a replica has started (§4.8).
        {
            let state = replica.inner.state.lock().await;
            replica.snapshot_locked(&state).await?;
        }

        for (peer, rx) in receivers {
            crate::delivery::spawn_peer_task(replica.clone(), peer, rx);
        }

        Ok(replica)
    }

    pub fn id(&self) -> NodeId {
        self.inner.config.node_id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    async fn snapshot_locked(&self, state: &ReplicaState) -> Result<()> {
        let snap = state.to_snapshot();
        let path = self.inner.config.snapshot_path();
        snap.save(&path).await
    }

    fn wake_all_peers(&self) {
        for tx in self.inner.peer_tx.iter().flatten() {
            let _ = tx.send(PeerWork::Gossip);
        }
    }

    fn send_conflict(&self, peer: NodeId, appt: Appointment) {
        if let Some(Some(tx)) = self.inner.peer_tx.get(peer.0 as usize) {
            let _ = tx.send(PeerWork::Conflict(appt));
        }
    }

    // ---- §4.1 Command API -------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        name: &str,
        day: u8,
        start_slot: u8,
        end_slot: u8,
        participants: BTreeSet<NodeId>,
    ) -> Result<AppointmentId> {
        validate_create_input(day, start_slot, end_slot, &participants, self.inner.config.num_nodes)?;

        let mut state = self.inner.state.lock().await;
        for &p in &participants {
            if let Some(slot) = state.grid.first_busy_slot(p, day, start_slot..end_slot) {
                return Err(CalendarError::LocalConflict {
                    participant: p,
                    day,
                    slot,
                });
            }
        }

        let appt_id = state.next_appt_id();
        let appt = Appointment {
            appt_id: appt_id.clone(),
            name: name.to_string(),
            day,
            start_slot,
            end_slot,
            participants,
            origin_node: self.id(),
        };
        state.dictionary.insert(appt.clone());
        state.grid.occupy(&appt);
        let clock = state.time_table.increment_self();
        let event = EventRecord::new(Op::Insert, clock, self.id(), appt);
        state.log.insert(event.clone());
        state.partial_log.insert(event);

        self.snapshot_locked(&state).await?;
        drop(state);

        info!(node = %self.id(), appt_id = %appt_id, "scheduled appointment");
        self.wake_all_peers();
        Ok(appt_id)
    }

    pub async fn cancel(&self, appt_id: &AppointmentId) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        let removed = state.cancel_locked(appt_id);
        self.snapshot_locked(&state).await?;
        drop(state);

        if removed.is_some() {
            info!(node = %self.id(), appt_id = %appt_id, "cancelled appointment");
            self.wake_all_peers();
        }
        Ok(())
    }

    pub async fn read_calendar(&self) -> CalendarGrid {
        self.inner.state.lock().await.grid.clone()
    }

    // ---- §4.3 / §4.4 receive path ----------------------------------------

    /// Handles an inbound `<NPk, Tk>` from `peer` (§4.3). Returns the booking
    /// conflicts this receive detected, so a caller driving replicas directly
    /// (e.g. an in-process test harness) can relay `DeleteConflict` without
    /// going through the real delivery loop; production callers can ignore
    /// the returned `Vec` since it is also enqueued onto the originator's
    /// delivery task below.
    pub async fn receive_send_log(
        &self,
        events: Vec<EventRecord>,
        peer_time_table: TimeTable,
        peer: NodeId,
    ) -> Result<Vec<Appointment>> {
        let mut state = self.inner.state.lock().await;
        let conflicts = state.apply_receive(&events, &peer_time_table, peer);
        self.snapshot_locked(&state).await?;
        drop(state);

        self.wake_all_peers();
        // §4.4: "the non-originator that detected the conflict sends it
        // exactly to the originator" — not to `peer`, the immediate gossip
        // sender, which may just be a relay (see S4).
        for appt in &conflicts {
            self.send_conflict(appt.origin_node, appt.clone());
        }
        Ok(conflicts)
    }

    /// Handles an inbound `DeleteConflict` (§4.4). Only ever received by the
    /// appointment's originator; reuses the cancel path verbatim.
    pub async fn receive_delete_conflict(&self, appt: Appointment, from: NodeId) -> Result<()> {
        warn!(node = %self.id(), appt_id = %appt.appt_id, from = %from, "received delete-conflict, cancelling");
        self.cancel(&appt.appt_id).await
    }

    // ---- delivery-loop internals (§4.5) -----------------------------------
    //
    // `novelty_snapshot` is also the seam integration tests use to drive a
    // "twins" style harness (two or more in-process `Replica`s exchanging
    // `<NP, T>` directly) without going through real sockets.

    pub async fn novelty_snapshot(&self, peer: NodeId) -> (Vec<EventRecord>, TimeTable) {
        let state = self.inner.state.lock().await;
        let np = state.partial_log.novelty_for(peer, &state.time_table);
        (np, state.time_table.clone())
    }

    pub(crate) async fn set_send_fail(&self, peer: NodeId, failed: bool) {
        let mut flags = self.inner.send_fail.lock().await;
        flags[peer.0 as usize] = failed;
    }

    pub async fn is_unreachable(&self, peer: NodeId) -> bool {
        self.inner.send_fail.lock().await[peer.0 as usize]
    }

    /// Drains in-flight handlers is out of scope for a library type without
    /// a runtime handle to join on; callers that spawn the delivery tasks
    /// can simply drop the `Replica` — closing every peer channel causes
    /// each task to finish its current send and exit.
    pub fn shutdown(&self) {
        for tx in self.inner.peer_tx.iter().flatten() {
            drop(tx.clone());
        }
    }
}
