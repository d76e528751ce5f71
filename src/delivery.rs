//! Per-peer delivery tasks (spec §4.5).
//!
//! One long-lived task per peer, each owning a single `mpsc` queue of
//! [`PeerWork`](crate::replica::PeerWork) — this is what keeps "at most one
//! retry task per peer" true without any extra bookkeeping: there is
//! structurally only one task that can ever be driving that peer's socket.
//! Grounded on `echo-sched::Scheduler` (`tokio::time::interval` driving a
//! `loop { interval.tick().await; ... }`), adapted to one task per remote
//! peer with message-driven wakeups folded in via `tokio::select!`.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::appointment::NodeId;
use crate::replica::{PeerWork, Replica};
use crate::transport::{send_message, Message};

/// Interval recommended by spec §4.5 for periodic re-gossip, independent of
/// message-driven wakeups (covers the "passive replica" convergence case:
/// nothing will ever wake a peer task for a node that sends no commands).
const GOSSIP_INTERVAL: Duration = Duration::from_secs(10);

pub(crate) fn spawn_peer_task(replica: Replica, peer: NodeId, mut rx: mpsc::UnboundedReceiver<PeerWork>) {
    tokio::spawn(async move {
        let mut ticker = interval(GOSSIP_INTERVAL);
        ticker.tick().await; // first tick fires immediately; consume it

        loop {
            tokio::select! {
                work = rx.recv() => {
                    match work {
                        Some(PeerWork::Gossip) => gossip_once(&replica, peer).await,
                        Some(PeerWork::Conflict(appt)) => send_conflict_once(&replica, peer, appt).await,
                        None => {
                            debug!(node = %replica.id(), peer = %peer, "delivery channel closed, exiting");
                            return;
                        }
                    }
                }
                _ = ticker.tick() => {
                    gossip_once(&replica, peer).await;
                }
            }
        }
    });
}

/// Sends `<NP_k, T>` to `peer`. Always attempts the send, even when `NP_k`
/// is empty: an empty batch still carries the sender's full time table,
/// which is how a node with nothing new to report still pushes clock
/// knowledge to a peer that otherwise never hears from it.
async fn gossip_once(replica: &Replica, peer: NodeId) {
    let (events, time_table) = replica.novelty_snapshot(peer).await;
    let msg = Message::SendLog {
        events,
        time_table,
        sender: replica.id(),
    };
    deliver(replica, peer, msg).await;
}

async fn send_conflict_once(replica: &Replica, peer: NodeId, appt: crate::appointment::Appointment) {
    let msg = Message::DeleteConflict {
        appt,
        sender: replica.id(),
    };
    deliver(replica, peer, msg).await;
}

async fn deliver(replica: &Replica, peer: NodeId, msg: Message) {
    let addr = match replica.config().peer_addr(peer) {
        Ok(addr) => addr,
        Err(e) => {
            warn!(node = %replica.id(), peer = %peer, error = %e, "cannot resolve peer, marking unreachable");
            replica.set_send_fail(peer, true).await;
            return;
        }
    };

    match send_message(addr, &msg).await {
        Ok(()) => {
            if replica.is_unreachable(peer).await {
                info!(node = %replica.id(), peer = %peer, "peer reachable again");
            }
            replica.set_send_fail(peer, false).await;
        }
        Err(e) => {
            warn!(node = %replica.id(), peer = %peer, error = %e, "send failed, will retry");
            replica.set_send_fail(peer, true).await;
        }
    }
}
