//! Inbound TCP accept loop (spec §6).
//!
//! One connection per message (see `transport.rs`); each accepted socket is
//! handled on its own task so a slow or hostile peer cannot stall delivery
//! from the rest of the cluster. Grounded on `flyingrobots-echo`'s `jitosd`
//! accept loop: `TcpListener::accept` in a `loop`, `tokio::spawn` per
//! connection, errors logged and never allowed to kill the loop.

use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::CalendarError;
use crate::replica::Replica;
use crate::transport::{read_message, Message};

/// Binds `0.0.0.0:<listen_port>` and serves inbound peer connections until
/// the process is asked to shut down.
pub async fn run(replica: Replica) -> std::io::Result<()> {
    let port = replica.config().listen_port;
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(node = %replica.id(), port, "listening for peer connections");

    loop {
        let (mut stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "accept failed, continuing");
                continue;
            }
        };
        let replica = replica.clone();

        tokio::spawn(async move {
            let frame = match read_message(&mut stream).await {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(from = %peer_addr, error = %e, "failed to read frame");
                    return;
                }
            };

            let msg = match Message::decode(&frame) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(from = %peer_addr, error = %e, "failed to decode message");
                    return;
                }
            };

            let result = match msg {
                Message::SendLog {
                    events,
                    time_table,
                    sender,
                } => replica.receive_send_log(events, time_table, sender).await.map(|_| ()),
                Message::DeleteConflict { appt, sender } => {
                    replica.receive_delete_conflict(appt, sender).await
                }
            };

            if let Err(e) = result {
                // §7: a snapshot write failure means memory and disk can no
                // longer be trusted to agree; fail-stop rather than keep
                // serving from a replica that might silently diverge.
                if matches!(e, CalendarError::SnapshotWrite(_)) {
                    error!(from = %peer_addr, error = %e, "snapshot write failed, fail-stopping");
                    std::process::exit(1);
                }
                error!(from = %peer_addr, error = %e, "failed to apply inbound message");
            }
        });
    }
}
