//! Cloneable handle for talking to the ledger writer.

use tokio::sync::{mpsc, oneshot};

use super::types::{
    InitReport, ResetOutcome, RunConfig, RunState, RunStatus, SyncReport,
};
use super::writer::{JobRepair, LedgerCommand};
use super::LedgerError;
use crate::emotion::Emotion;

/// Handle for reading and mutating the run state.
///
/// Cheap to clone; every clone talks to the same writer task. Methods
/// resolve once the writer has applied and persisted the change.
#[derive(Clone)]
pub struct LedgerHandle {
    tx: mpsc::Sender<LedgerCommand>,
}

impl LedgerHandle {
    pub(crate) fn new(tx: mpsc::Sender<LedgerCommand>) -> Self {
        Self { tx }
    }

    /// Current state of the whole run.
    pub async fn snapshot(&self) -> Result<RunState, LedgerError> {
        let (reply, rx) = oneshot::channel();
        self.send(LedgerCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| LedgerError::WriterUnavailable)
    }

    /// Build the job list from source text. Fails if jobs already exist.
    pub async fn initialize_from(&self, content: &str) -> Result<InitReport, LedgerError> {
        let (reply, rx) = oneshot::channel();
        self.send(LedgerCommand::InitializeFrom {
            content: content.to_string(),
            reply,
        })
        .await?;
        self.recv(rx).await
    }

    /// Transition the run status, optionally recording the run config.
    pub async fn set_run_status(
        &self,
        status: RunStatus,
        config: Option<RunConfig>,
    ) -> Result<(), LedgerError> {
        let (reply, rx) = oneshot::channel();
        self.send(LedgerCommand::SetRunStatus {
            status,
            config,
            reply,
        })
        .await?;
        self.recv(rx).await
    }

    /// Claim a pending job for a worker.
    pub async fn mark_generating(&self, id: u64) -> Result<(), LedgerError> {
        let (reply, rx) = oneshot::channel();
        self.send(LedgerCommand::MarkGenerating { id, reply }).await?;
        self.recv(rx).await
    }

    /// Commit a successful synthesis with its artifact metadata.
    pub async fn complete_job(
        &self,
        id: u64,
        duration_secs: f64,
        size_bytes: u64,
    ) -> Result<(), LedgerError> {
        let (reply, rx) = oneshot::channel();
        self.send(LedgerCommand::CompleteJob {
            id,
            duration_secs,
            size_bytes,
            reply,
        })
        .await?;
        self.recv(rx).await
    }

    /// Commit a failed synthesis with its error message.
    pub async fn fail_job(&self, id: u64, message: String) -> Result<(), LedgerError> {
        let (reply, rx) = oneshot::channel();
        self.send(LedgerCommand::FailJob { id, message, reply }).await?;
        self.recv(rx).await
    }

    /// Reset a job to pending for regeneration, replacing its emotion
    /// override (`None` clears it).
    pub async fn reset_job(
        &self,
        id: u64,
        emotion: Option<Emotion>,
    ) -> Result<ResetOutcome, LedgerError> {
        let (reply, rx) = oneshot::channel();
        self.send(LedgerCommand::ResetJob { id, emotion, reply }).await?;
        self.recv(rx).await
    }

    /// Put a failed job back in the pending pool, counting the attempt.
    pub async fn reset_for_retry(&self, id: u64) -> Result<(), LedgerError> {
        let (reply, rx) = oneshot::channel();
        self.send(LedgerCommand::ResetForRetry { id, reply }).await?;
        self.recv(rx).await
    }

    /// Reset every job with `id >= from_id` to pending.
    pub async fn reset_from(&self, from_id: u64) -> Result<Vec<ResetOutcome>, LedgerError> {
        let (reply, rx) = oneshot::channel();
        self.send(LedgerCommand::ResetFrom { id: from_id, reply }).await?;
        self.recv(rx).await
    }

    /// Demote jobs stranded in the generating state by a crash.
    pub async fn recover_interrupted(&self) -> Result<usize, LedgerError> {
        let (reply, rx) = oneshot::channel();
        self.send(LedgerCommand::RecoverInterrupted { reply }).await?;
        rx.await.map_err(|_| LedgerError::WriterUnavailable)
    }

    /// Apply filesystem-reconciliation fixes in one atomic step.
    pub async fn repair(&self, repairs: Vec<JobRepair>) -> Result<SyncReport, LedgerError> {
        let (reply, rx) = oneshot::channel();
        self.send(LedgerCommand::Repair { repairs, reply }).await?;
        self.recv(rx).await
    }

    async fn send(&self, command: LedgerCommand) -> Result<(), LedgerError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| LedgerError::WriterUnavailable)
    }

    async fn recv<T>(
        &self,
        rx: oneshot::Receiver<Result<T, LedgerError>>,
    ) -> Result<T, LedgerError> {
        rx.await.map_err(|_| LedgerError::WriterUnavailable)?
    }
}

impl std::fmt::Debug for LedgerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerHandle").finish_non_exhaustive()
    }
}
