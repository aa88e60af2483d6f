//! Durable run ledger.
//!
//! The ledger is a single JSON document holding the run status, aggregate
//! counters and every job's record. It is read in full at startup and
//! written in full after every mutation, so a crash at any point leaves a
//! parseable document behind. See [`writer`] for the single-writer task
//! that owns all mutation.

pub mod handle;
pub mod source;
pub mod store;
pub mod types;
pub mod writer;

pub use handle::LedgerHandle;
pub use source::{parse_source, ParsedSource};
pub use store::{JsonLedgerStore, LedgerStore};
pub use types::{
    InitReport, Job, JobStatus, ResetOutcome, RunConfig, RunState, RunStatus, RunSummary,
    StatusCounts, SyncReport,
};
pub use writer::{create_ledger_system, JobRepair, LedgerWriter, RepairAction, LEDGER_CHANNEL_CAPACITY};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("job {0} not found")]
    JobNotFound(u64),

    #[error("job {id}: illegal transition {from} -> {to}")]
    IllegalTransition {
        id: u64,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("illegal run transition {from} -> {to}")]
    IllegalRunTransition { from: RunStatus, to: RunStatus },

    #[error("ledger already holds {0} jobs")]
    AlreadyInitialized(usize),

    #[error("ledger document is corrupt: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("ledger writer is not running")]
    WriterUnavailable,
}
