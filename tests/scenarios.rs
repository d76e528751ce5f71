//! End-to-end convergence scenarios (mirrors the concrete walkthroughs in
//! the design doc's testable-properties section), driven by an in-process
//! "twins" harness: real `Replica`s, real snapshot files on a tempdir, but
//! gossip delivered by calling `novelty_snapshot` / `receive_send_log`
//! directly instead of opening sockets.

use std::collections::BTreeSet;
use std::path::Path;

use distcal::appointment::NodeId;
use distcal::{NodeConfig, Replica};

fn config(node_id: u16, num_nodes: usize, dir: &Path) -> NodeConfig {
    NodeConfig {
        node_id: NodeId(node_id),
        num_nodes,
        listen_port: 0,
        host_names: (0..num_nodes).map(|_| "127.0.0.1".to_string()).collect(),
        snapshot_dir: dir.to_path_buf(),
    }
}

async fn cluster(num_nodes: u16, dir: &Path) -> Vec<Replica> {
    let mut replicas = Vec::new();
    for id in 0..num_nodes {
        replicas.push(
            Replica::start(config(id, num_nodes as usize, dir))
                .await
                .unwrap(),
        );
    }
    replicas
}

/// One direct `<NP, T>` push from `from` to `to`, bypassing the socket. Any
/// booking conflict `to` detects is relayed in-process to its true
/// originator — found by id in `cluster`, not sent back to `from` — the same
/// routing `Replica::receive_send_log` performs for the real delivery loop
/// (§4.4: "the non-originator that detected the conflict sends it exactly to
/// the originator").
async fn gossip(cluster: &[Replica], from: &Replica, to: &Replica) {
    let (events, table) = from.novelty_snapshot(to.id()).await;
    let conflicts = to.receive_send_log(events, table, from.id()).await.unwrap();
    for appt in conflicts {
        let originator = cluster
            .iter()
            .find(|r| r.id() == appt.origin_node)
            .expect("conflict originator must be present in the test cluster");
        originator
            .receive_delete_conflict(appt, to.id())
            .await
            .unwrap();
    }
}

/// Every ordered pair exchanges one message, twice (covers both directions
/// and a second round so anything unlocked by the first round propagates).
async fn gossip_all(replicas: &[Replica]) {
    for _ in 0..2 {
        for a in replicas {
            for b in replicas {
                if a.id() != b.id() {
                    gossip(replicas, a, b).await;
                }
            }
        }
    }
}

#[tokio::test]
async fn s1_simple_two_party_schedule() {
    let dir = tempfile::tempdir().unwrap();
    let replicas = cluster(2, dir.path()).await;

    let id = replicas[0]
        .create("sync", 0, 10, 12, BTreeSet::from([NodeId(0), NodeId(1)]))
        .await
        .unwrap();

    gossip_all(&replicas).await;

    for r in &replicas {
        let grid = r.read_calendar().await;
        assert_eq!(grid.occupant(NodeId(0), 0, 10), Some(&id));
        assert_eq!(grid.occupant(NodeId(1), 0, 11), Some(&id));
    }
}

#[tokio::test]
async fn s2_cancel_propagation() {
    let dir = tempfile::tempdir().unwrap();
    let replicas = cluster(2, dir.path()).await;

    let id = replicas[0]
        .create("sync", 0, 10, 12, BTreeSet::from([NodeId(0), NodeId(1)]))
        .await
        .unwrap();
    gossip_all(&replicas).await;

    replicas[1].cancel(&id).await.unwrap();
    gossip_all(&replicas).await;

    for r in &replicas {
        let grid = r.read_calendar().await;
        assert_eq!(grid.occupant(NodeId(0), 0, 10), None);
        assert_eq!(grid.occupant(NodeId(1), 0, 11), None);
    }
}

#[tokio::test]
async fn s3_concurrent_overlapping_bookings_mutually_veto() {
    let dir = tempfile::tempdir().unwrap();
    let replicas = cluster(2, dir.path()).await;

    let a = replicas[0]
        .create("a", 0, 10, 12, BTreeSet::from([NodeId(0), NodeId(1)]))
        .await
        .unwrap();
    let b = replicas[1]
        .create("b", 0, 11, 13, BTreeSet::from([NodeId(0), NodeId(1)]))
        .await
        .unwrap();
    assert_ne!(a, b);

    // Enough rounds for: insert delivery -> conflict detection -> in-process
    // DeleteConflict relay to each originator -> cancel -> cancel delivery.
    for _ in 0..4 {
        gossip_all(&replicas).await;
    }

    for r in &replicas {
        let grid = r.read_calendar().await;
        assert_eq!(grid.occupant(NodeId(0), 0, 10), None);
        assert_eq!(grid.occupant(NodeId(0), 0, 11), None);
        assert_eq!(grid.occupant(NodeId(1), 0, 12), None);
    }
}

#[tokio::test]
async fn s4_relay_through_intermediate_node_then_direct_link_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let replicas = cluster(3, dir.path()).await;

    let id = replicas[0]
        .create("x", 0, 5, 6, BTreeSet::from([NodeId(0), NodeId(1)]))
        .await
        .unwrap();

    // 0 -> 1 only; 2 never hears directly from 0.
    gossip(&replicas, &replicas[0], &replicas[1]).await;
    assert!(replicas[2].read_calendar().await.occupant(NodeId(0), 0, 5).is_none());

    // 1 -> 2 relays it.
    gossip(&replicas, &replicas[1], &replicas[2]).await;
    assert_eq!(replicas[2].read_calendar().await.occupant(NodeId(0), 0, 5), Some(&id));

    // 0's NP for 2 is now empty: 1's gossip already advanced T_0[2][0] via an
    // earlier 1 -> 0 round. Simulate that round, then confirm no duplicate.
    gossip(&replicas, &replicas[1], &replicas[0]).await;
    let (np_for_2, _) = replicas[0].novelty_snapshot(NodeId(2)).await;
    assert!(np_for_2.is_empty());
}

#[tokio::test]
async fn s5_crash_after_insert_recovers_and_converges_via_partial_log() {
    let dir = tempfile::tempdir().unwrap();
    let cfg0 = config(0, 2, dir.path());
    let cfg1 = config(1, 2, dir.path());

    let replica0 = Replica::start(cfg0.clone()).await.unwrap();
    let replica1 = Replica::start(cfg1).await.unwrap();

    let id = replica0
        .create("x", 0, 2, 3, BTreeSet::from([NodeId(0), NodeId(1)]))
        .await
        .unwrap();

    // Simulate a crash: the outbound gossip never left before the process
    // died. Drop the handle and reboot from the snapshot `create` already
    // wrote (§4.8 persists on every mutation, including before fan-out).
    drop(replica0);
    let restarted0 = Replica::start(cfg0).await.unwrap();

    // PL must still contain the Insert, so the recomputed NP for node 1 is
    // non-empty even though no send ever happened pre-crash.
    let (np, table) = restarted0.novelty_snapshot(NodeId(1)).await;
    assert_eq!(np.len(), 1);
    replica1.receive_send_log(np, table, NodeId(0)).await.unwrap();

    assert_eq!(
        replica1.read_calendar().await.occupant(NodeId(0), 0, 2),
        Some(&id)
    );

    // One more round drains PL on both sides.
    let pair = [replica1.clone(), restarted0.clone()];
    gossip(&pair, &replica1, &restarted0).await;
    let (np_again, _) = restarted0.novelty_snapshot(NodeId(1)).await;
    assert!(np_again.is_empty());
}

#[tokio::test]
async fn s6_passive_replica_converges_without_participating() {
    let dir = tempfile::tempdir().unwrap();
    let replicas = cluster(3, dir.path()).await;

    replicas[0]
        .create("ab-only", 0, 1, 2, BTreeSet::from([NodeId(0), NodeId(1)]))
        .await
        .unwrap();

    gossip_all(&replicas).await;

    let v0 = replicas[0].read_calendar().await;
    let v2 = replicas[2].read_calendar().await;
    assert_eq!(v0.occupant(NodeId(0), 0, 1), v2.occupant(NodeId(0), 0, 1));
    assert_eq!(v2.occupant(NodeId(2), 0, 1), None);
}

#[tokio::test]
async fn applying_the_same_inbound_message_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let replicas = cluster(2, dir.path()).await;

    replicas[0]
        .create("once", 0, 0, 1, BTreeSet::from([NodeId(0), NodeId(1)]))
        .await
        .unwrap();

    let (events, table) = replicas[0].novelty_snapshot(NodeId(1)).await;
    replicas[1]
        .receive_send_log(events.clone(), table.clone(), NodeId(0))
        .await
        .unwrap();
    let after_first = replicas[1].read_calendar().await;

    replicas[1]
        .receive_send_log(events, table, NodeId(0))
        .await
        .unwrap();
    let after_second = replicas[1].read_calendar().await;

    assert_eq!(after_first.occupant(NodeId(0), 0, 0), after_second.occupant(NodeId(0), 0, 0));
}
