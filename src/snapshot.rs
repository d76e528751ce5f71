//! Durable snapshot of replica state (spec §4.8).
//!
//! `NE` and `NP` are per-receive/per-send scratch projections (§4.2, §4.3)
//! that are never retained between operations; they appear below only to
//! keep the on-disk schema shaped like the spec's field list, and are always
//! empty at rest (see `DESIGN.md`, "Open question — NE/NP in the snapshot").

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::clock::TimeTable;
use crate::dictionary::Dictionary;
use crate::error::{CalendarError, Result};
use crate::event::EventRecord;
use crate::grid::CalendarGrid;
use crate::log::PartialLog;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub clock: u64,
    pub calendar: CalendarGrid,
    pub time_table: TimeTable,
    pub partial_log: PartialLog,
    pub ne: Vec<EventRecord>,
    pub np: Vec<EventRecord>,
    pub dictionary: Dictionary,
    pub apt_no: u64,
}

impl Snapshot {
    /// Write-to-temp + atomic rename so a crash mid-write never leaves a
    /// corrupt file behind.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let bytes = bincode::serialize(self)
            .map_err(|e| CalendarError::SnapshotWrite(e.to_string()))?;
        let dir = path
            .parent()
            .ok_or_else(|| CalendarError::SnapshotWrite("snapshot path has no parent".into()))?;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| CalendarError::SnapshotWrite(e.to_string()))?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| CalendarError::SnapshotWrite(e.to_string()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| CalendarError::SnapshotWrite(e.to_string()))?;
        Ok(())
    }

    /// Recovery tolerates an absent file: returns `Ok(None)` rather than an
    /// error when `path` does not exist.
    pub async fn load(path: &Path) -> Result<Option<Snapshot>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let snap = bincode::deserialize(&bytes)
                    .map_err(|e| CalendarError::SnapshotWrite(e.to_string()))?;
                Ok(Some(snap))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CalendarError::SnapshotWrite(e.to_string())),
        }
    }
}
