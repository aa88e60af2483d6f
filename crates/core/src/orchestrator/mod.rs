//! Generation orchestration: batching, workers, and run control.
//!
//! The orchestrator forms bounded priority-aware batches, dispatches them
//! under a concurrency limiter, and runs the serial retry sweep. Workers
//! commit every outcome through the ledger writer, so run state stays
//! consistent no matter how jobs interleave.

mod batch;
mod control;
mod runner;
mod worker;

pub use batch::{form_batch, retry_candidate, BATCH_SIZE, PRIORITY_CAP};
pub use control::EngineControls;
pub use runner::{EngineStatus, Orchestrator};

use crate::ledger::LedgerError;
use crate::synth::SynthesisError;

/// Errors surfaced by the run-control surface.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("a generation run is already active")]
    AlreadyRunning,

    #[error("no generation run is active")]
    NotRunning,

    #[error("operation requires the engine to be idle")]
    RunActive,

    #[error("synthesis service unavailable: {0}")]
    SynthesisUnavailable(#[from] SynthesisError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
