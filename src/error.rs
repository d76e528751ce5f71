//! Error taxonomy for the replicated calendar core (see design doc §7).

use thiserror::Error;

/// Errors that can cross the command-API boundary, plus the internal
/// categories the replication/delivery machinery logs and absorbs.
#[derive(Debug, Error)]
pub enum CalendarError {
    /// Rejected at the command API; no state was mutated.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// `create` rejected because the local grid shows a busy slot.
    #[error("local scheduling conflict: {participant:?} already booked on day {day} slot {slot}")]
    LocalConflict {
        participant: crate::appointment::NodeId,
        day: u8,
        slot: u8,
    },

    /// A peer could not be reached. Never surfaced to the command-API caller;
    /// absorbed by the delivery loop's retry machinery.
    #[error("peer {0} unreachable")]
    TransportUnreachable(crate::appointment::NodeId),

    /// A message failed to decode, or named an unknown message kind.
    #[error("malformed message: {0}")]
    Decode(String),

    /// The on-disk snapshot could not be written. Treated as fatal: the
    /// replica should fail-stop rather than let memory and disk diverge.
    #[error("snapshot write failed: {0}")]
    SnapshotWrite(String),

    /// Configuration was internally inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CalendarError>;
