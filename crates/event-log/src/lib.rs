//! Driving Event Log
//!
//! Append-only `timestamp | event_type` record of state-machine transitions.
//! The state engines write through [`EventSink`]; the status server reads it
//! back through [`EventStore`] to build the 30-day summary.

mod event;
mod log;
mod summary;

pub use event::{DriverEvent, LogEntry, TIMESTAMP_FORMAT};
pub use log::{EventSink, EventStore, FileEventLog, MemoryEventLog};
pub use summary::{summarize, summary_cutoff, DailyScore, EventCounts, LogSummary, SUMMARY_DAYS};

use thiserror::Error;

/// Event log errors
#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("Failed to open event log {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },
    #[error("Event log I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Lock error: {0}")]
    Lock(String),
}
