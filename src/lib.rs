//! Replicated, eventually-consistent weekly calendar.
//!
//! A fixed-size cluster of nodes each hold a full replica of a shared
//! calendar. Scheduling and cancelling appointments are purely local
//! operations that gossip out over a causal event log (`L`/`PL`) tracked by
//! an `N×N` matrix clock, converging every replica to the same state without
//! coordination (see `DESIGN.md` for the full write-up).

pub mod appointment;
pub mod clock;
pub mod config;
pub mod delivery;
pub mod dictionary;
pub mod error;
pub mod event;
pub mod grid;
pub mod listener;
pub mod log;
pub mod replica;
pub mod snapshot;
pub mod transport;

pub use appointment::{Appointment, AppointmentId, NodeId};
pub use config::NodeConfig;
pub use error::{CalendarError, Result};
pub use replica::Replica;
