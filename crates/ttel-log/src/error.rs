//! Error and cancellation types for the facade.
//!
//! `TtelError` composes each subsystem's own error with the facade-level
//! kinds that have no single owning subsystem, the way `anyhow`/`thiserror`
//! are already split in this codebase: typed errors inside library crates,
//! `#[from]` composition at the boundary that orchestrates them.

use thiserror::Error;
use ttel_record::EventTime;

#[derive(Debug, Error)]
pub enum TtelError {
    #[error("replay cursor out of sync: expected event_time {expected}, found {found}")]
    OutOfSync { expected: EventTime, found: EventTime },

    #[error("mode misuse: {0}")]
    ModeMisuse(&'static str),

    #[error("host architecture mismatch: log recorded on {recorded:?}, replaying on {current:?}")]
    ArchMismatch { recorded: String, current: String },

    #[error("diagnostics flag mismatch: log recorded with diag_enabled={recorded}, replaying with {current}")]
    DiagMismatch { recorded: bool, current: bool },

    #[error("missing property record for id {0}")]
    PropertyGap(u32),

    #[error("stream I/O error")]
    StreamIo(#[from] std::io::Error),

    #[error("log serialization error")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Arena(#[from] ttel_arena::ArenaError),

    #[error(transparent)]
    EventStore(#[from] ttel_record::EventStoreError),

    #[error(transparent)]
    Mode(#[from] ttel_mode::ModeError),

    #[error(transparent)]
    Snapshot(#[from] ttel_snapshot::SnapshotError),
}

/// An intentional, structured unwind out of replay — not a failure of the
/// log itself. Kept out of `TtelError` on purpose: a caller matching on
/// `ReplayFailure` is forced to handle cancellation separately from a
/// genuine bug or I/O error, rather than lumping both under one `Err`.
#[derive(Debug, Clone, PartialEq)]
pub enum DebuggerAbort {
    EndOfLog,
    Explicit {
        target_event_time: Option<EventTime>,
        message: String,
    },
}

#[derive(Debug)]
pub enum ReplayFailure {
    Fatal(TtelError),
    Abort(DebuggerAbort),
}

impl From<TtelError> for ReplayFailure {
    fn from(e: TtelError) -> Self {
        ReplayFailure::Fatal(e)
    }
}

impl std::fmt::Display for ReplayFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplayFailure::Fatal(e) => write!(f, "{e}"),
            ReplayFailure::Abort(DebuggerAbort::EndOfLog) => write!(f, "end of log"),
            ReplayFailure::Abort(DebuggerAbort::Explicit { message, .. }) => {
                write!(f, "debugger abort: {message}")
            }
        }
    }
}

impl std::error::Error for ReplayFailure {}
