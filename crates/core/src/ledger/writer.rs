//! Single-writer task owning the run state.
//!
//! All mutation flows through one mpsc command loop: the writer applies the
//! change to its owned `RunState`, keeps the paired aggregate counter in the
//! same step, persists the whole document, then notifies observers. Workers
//! committing concurrently therefore cannot lose each other's updates, and
//! a commit for a job that was reset while its worker was in flight is
//! rejected by the status transition table.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};

use super::source::parse_source;
use super::store::LedgerStore;
use super::types::{
    InitReport, JobStatus, ResetOutcome, RunConfig, RunState, RunStatus, SyncReport,
};
use super::LedgerError;
use crate::broadcast::ProgressBroadcaster;
use crate::emotion::Emotion;

/// Default command channel capacity.
pub const LEDGER_CHANNEL_CAPACITY: usize = 64;

/// One filesystem-reconciliation fix for a single job.
#[derive(Debug, Clone)]
pub struct JobRepair {
    pub id: u64,
    pub action: RepairAction,
}

#[derive(Debug, Clone)]
pub enum RepairAction {
    /// Artifact exists on disk; adopt it as the job's result.
    MarkCompleted { duration_secs: f64, size_bytes: u64 },
    /// Artifact is gone; the job has to be produced again.
    ResetPending,
}

pub(crate) enum LedgerCommand {
    Snapshot {
        reply: oneshot::Sender<RunState>,
    },
    InitializeFrom {
        content: String,
        reply: oneshot::Sender<Result<InitReport, LedgerError>>,
    },
    SetRunStatus {
        status: RunStatus,
        config: Option<RunConfig>,
        reply: oneshot::Sender<Result<(), LedgerError>>,
    },
    MarkGenerating {
        id: u64,
        reply: oneshot::Sender<Result<(), LedgerError>>,
    },
    CompleteJob {
        id: u64,
        duration_secs: f64,
        size_bytes: u64,
        reply: oneshot::Sender<Result<(), LedgerError>>,
    },
    FailJob {
        id: u64,
        message: String,
        reply: oneshot::Sender<Result<(), LedgerError>>,
    },
    ResetJob {
        id: u64,
        emotion: Option<Emotion>,
        reply: oneshot::Sender<Result<ResetOutcome, LedgerError>>,
    },
    ResetForRetry {
        id: u64,
        reply: oneshot::Sender<Result<(), LedgerError>>,
    },
    ResetFrom {
        id: u64,
        reply: oneshot::Sender<Result<Vec<ResetOutcome>, LedgerError>>,
    },
    RecoverInterrupted {
        reply: oneshot::Sender<usize>,
    },
    Repair {
        repairs: Vec<JobRepair>,
        reply: oneshot::Sender<Result<SyncReport, LedgerError>>,
    },
}

/// Background task that owns the run state and the store.
pub struct LedgerWriter {
    rx: mpsc::Receiver<LedgerCommand>,
    store: Arc<dyn LedgerStore>,
    broadcaster: ProgressBroadcaster,
    state: RunState,
}

impl LedgerWriter {
    fn new(
        rx: mpsc::Receiver<LedgerCommand>,
        store: Arc<dyn LedgerStore>,
        broadcaster: ProgressBroadcaster,
        state: RunState,
    ) -> Self {
        Self {
            rx,
            store,
            broadcaster,
            state,
        }
    }

    /// Run the writer, consuming commands until every handle is dropped.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        tracing::info!("Ledger writer started");

        while let Some(command) = self.rx.recv().await {
            self.handle(command);
        }

        tracing::info!("Ledger writer shutting down");
    }

    fn handle(&mut self, command: LedgerCommand) {
        match command {
            LedgerCommand::Snapshot { reply } => {
                let _ = reply.send(self.state.clone());
            }
            LedgerCommand::InitializeFrom { content, reply } => {
                let _ = reply.send(self.initialize_from(&content));
            }
            LedgerCommand::SetRunStatus {
                status,
                config,
                reply,
            } => {
                let _ = reply.send(self.set_run_status(status, config));
            }
            LedgerCommand::MarkGenerating { id, reply } => {
                let _ = reply.send(self.mark_generating(id));
            }
            LedgerCommand::CompleteJob {
                id,
                duration_secs,
                size_bytes,
                reply,
            } => {
                let _ = reply.send(self.complete_job(id, duration_secs, size_bytes));
            }
            LedgerCommand::FailJob { id, message, reply } => {
                let _ = reply.send(self.fail_job(id, message));
            }
            LedgerCommand::ResetJob { id, emotion, reply } => {
                let _ = reply.send(self.reset_job(id, emotion));
            }
            LedgerCommand::ResetForRetry { id, reply } => {
                let _ = reply.send(self.reset_for_retry(id));
            }
            LedgerCommand::ResetFrom { id, reply } => {
                let _ = reply.send(self.reset_from(id));
            }
            LedgerCommand::RecoverInterrupted { reply } => {
                let _ = reply.send(self.recover_interrupted());
            }
            LedgerCommand::Repair { repairs, reply } => {
                let _ = reply.send(self.repair(repairs));
            }
        }
    }

    fn initialize_from(&mut self, content: &str) -> Result<InitReport, LedgerError> {
        if !self.state.jobs.is_empty() {
            return Err(LedgerError::AlreadyInitialized(self.state.jobs.len()));
        }

        let parsed = parse_source(content);
        let report = InitReport {
            jobs_created: parsed.jobs.len(),
            lines_skipped: parsed.skipped,
        };

        self.state.jobs = parsed.jobs;
        self.state.total = self.state.jobs.len() as u64;
        self.state.completed = 0;
        self.state.failed = 0;
        self.persist();

        tracing::info!(
            jobs = report.jobs_created,
            skipped = report.lines_skipped,
            "Ledger initialized from source"
        );
        self.broadcaster.log_info(format!(
            "Initialized {} jobs from source ({} lines skipped)",
            report.jobs_created, report.lines_skipped
        ));
        if report.lines_skipped > 0 {
            self.broadcaster.log_warning(format!(
                "{} malformed source lines were skipped",
                report.lines_skipped
            ));
        }
        Ok(report)
    }

    fn set_run_status(
        &mut self,
        status: RunStatus,
        config: Option<RunConfig>,
    ) -> Result<(), LedgerError> {
        if self.state.status != status && !self.state.status.can_transition_to(status) {
            return Err(LedgerError::IllegalRunTransition {
                from: self.state.status,
                to: status,
            });
        }

        if let Some(config) = config {
            self.state.config = config;
        }
        self.state.status = status;
        self.persist();
        self.broadcaster.run_status(status);
        Ok(())
    }

    fn mark_generating(&mut self, id: u64) -> Result<(), LedgerError> {
        let job = self
            .state
            .job_mut(id)
            .ok_or(LedgerError::JobNotFound(id))?;
        if !job.status.can_transition_to(JobStatus::Generating) {
            return Err(LedgerError::IllegalTransition {
                id,
                from: job.status,
                to: JobStatus::Generating,
            });
        }

        job.status = JobStatus::Generating;
        let updated = job.clone();
        self.persist();
        self.broadcaster.job_updated(updated);
        Ok(())
    }

    fn complete_job(
        &mut self,
        id: u64,
        duration_secs: f64,
        size_bytes: u64,
    ) -> Result<(), LedgerError> {
        let job = self
            .state
            .job_mut(id)
            .ok_or(LedgerError::JobNotFound(id))?;
        if !job.status.can_transition_to(JobStatus::Completed) {
            return Err(LedgerError::IllegalTransition {
                id,
                from: job.status,
                to: JobStatus::Completed,
            });
        }

        job.status = JobStatus::Completed;
        job.duration_secs = Some(duration_secs);
        job.size_bytes = Some(size_bytes);
        job.generated_at = Some(Utc::now());
        job.error_message = None;
        let updated = job.clone();
        self.state.completed += 1;
        self.persist();
        self.notify_job_and_progress(updated);
        Ok(())
    }

    fn fail_job(&mut self, id: u64, message: String) -> Result<(), LedgerError> {
        let job = self
            .state
            .job_mut(id)
            .ok_or(LedgerError::JobNotFound(id))?;
        if !job.status.can_transition_to(JobStatus::Error) {
            return Err(LedgerError::IllegalTransition {
                id,
                from: job.status,
                to: JobStatus::Error,
            });
        }

        job.status = JobStatus::Error;
        job.error_message = Some(message);
        let updated = job.clone();
        self.state.failed += 1;
        self.persist();
        self.notify_job_and_progress(updated);
        Ok(())
    }

    fn reset_job(
        &mut self,
        id: u64,
        emotion: Option<Emotion>,
    ) -> Result<ResetOutcome, LedgerError> {
        let job = self
            .state
            .job_mut(id)
            .ok_or(LedgerError::JobNotFound(id))?;

        let outcome = ResetOutcome {
            id,
            filename: job.filename.clone(),
            prior_status: job.status,
        };

        job.status = JobStatus::Pending;
        job.clear_result();
        job.retry_count = 0;
        job.emotion_override = emotion;
        let updated = job.clone();

        match outcome.prior_status {
            JobStatus::Completed => self.state.completed = self.state.completed.saturating_sub(1),
            JobStatus::Error => self.state.failed = self.state.failed.saturating_sub(1),
            _ => {}
        }

        self.persist();
        self.notify_job_and_progress(updated);
        Ok(outcome)
    }

    fn reset_for_retry(&mut self, id: u64) -> Result<(), LedgerError> {
        let job = self
            .state
            .job_mut(id)
            .ok_or(LedgerError::JobNotFound(id))?;
        if job.status != JobStatus::Error {
            return Err(LedgerError::IllegalTransition {
                id,
                from: job.status,
                to: JobStatus::Pending,
            });
        }

        job.retry_count += 1;
        job.status = JobStatus::Pending;
        let updated = job.clone();
        self.state.failed = self.state.failed.saturating_sub(1);
        self.persist();
        self.notify_job_and_progress(updated);
        Ok(())
    }

    fn reset_from(&mut self, from_id: u64) -> Result<Vec<ResetOutcome>, LedgerError> {
        let mut outcomes = Vec::new();
        let mut updated_jobs = Vec::new();

        for job in self.state.jobs.iter_mut().filter(|j| j.id >= from_id) {
            outcomes.push(ResetOutcome {
                id: job.id,
                filename: job.filename.clone(),
                prior_status: job.status,
            });
            job.status = JobStatus::Pending;
            job.clear_result();
            job.retry_count = 0;
            job.emotion_override = None;
            updated_jobs.push(job.clone());
        }

        if outcomes.is_empty() {
            return Ok(outcomes);
        }

        for outcome in &outcomes {
            match outcome.prior_status {
                JobStatus::Completed => {
                    self.state.completed = self.state.completed.saturating_sub(1)
                }
                JobStatus::Error => self.state.failed = self.state.failed.saturating_sub(1),
                _ => {}
            }
        }

        self.persist();
        for job in updated_jobs {
            self.broadcaster.job_updated(job);
        }
        self.notify_progress();
        Ok(outcomes)
    }

    fn recover_interrupted(&mut self) -> usize {
        let mut recovered = 0;
        for job in &mut self.state.jobs {
            if job.status == JobStatus::Generating {
                job.status = JobStatus::Pending;
                recovered += 1;
            }
        }

        if recovered > 0 {
            self.persist();
            tracing::info!(recovered, "Demoted interrupted jobs back to pending");
        }
        recovered
    }

    fn repair(&mut self, repairs: Vec<JobRepair>) -> Result<SyncReport, LedgerError> {
        // Repairs reconcile against the filesystem; they do not go through
        // the worker transition table.
        let mut report = SyncReport::default();
        let mut updated_jobs = Vec::new();

        for repair in repairs {
            let job = self
                .state
                .job_mut(repair.id)
                .ok_or(LedgerError::JobNotFound(repair.id))?;
            let prior = job.status;

            match repair.action {
                RepairAction::MarkCompleted {
                    duration_secs,
                    size_bytes,
                } => {
                    if prior == JobStatus::Completed {
                        continue;
                    }
                    job.status = JobStatus::Completed;
                    job.duration_secs = Some(duration_secs);
                    job.size_bytes = Some(size_bytes);
                    job.generated_at = Some(Utc::now());
                    job.error_message = None;
                    updated_jobs.push(job.clone());
                    if prior == JobStatus::Error {
                        self.state.failed = self.state.failed.saturating_sub(1);
                    }
                    self.state.completed += 1;
                    report.repaired_completed += 1;
                }
                RepairAction::ResetPending => {
                    if prior == JobStatus::Pending {
                        continue;
                    }
                    job.status = JobStatus::Pending;
                    job.clear_result();
                    updated_jobs.push(job.clone());
                    match prior {
                        JobStatus::Completed => {
                            self.state.completed = self.state.completed.saturating_sub(1)
                        }
                        JobStatus::Error => {
                            self.state.failed = self.state.failed.saturating_sub(1)
                        }
                        _ => {}
                    }
                    report.reset_pending += 1;
                }
            }
        }

        if report.total() > 0 {
            self.persist();
            for job in updated_jobs {
                self.broadcaster.job_updated(job);
            }
            self.notify_progress();
        }
        Ok(report)
    }

    fn notify_job_and_progress(&self, job: super::types::Job) {
        self.broadcaster.job_updated(job);
        self.notify_progress();
    }

    fn notify_progress(&self) {
        self.broadcaster
            .progress(self.state.completed, self.state.failed, self.state.total);
    }

    /// Write the whole document. A failed save is logged and surfaced to
    /// observers; the in-memory state stays authoritative and the next
    /// successful save catches the document up.
    fn persist(&mut self) {
        if let Err(e) = self.store.save(&self.state) {
            tracing::error!("Failed to persist ledger: {}", e);
            self.broadcaster
                .log_error(format!("Ledger persistence failed: {e}"));
        }
    }
}

/// Create a complete ledger system.
///
/// Loads the durable document (falling back to an empty run state when the
/// document is absent or unreadable; the latter is surfaced as a data-loss
/// warning) and returns:
/// - `LedgerHandle` - for reading and mutating state (clone freely)
/// - `LedgerWriter` - spawn with `tokio::spawn(writer.run())`
pub fn create_ledger_system(
    store: Arc<dyn LedgerStore>,
    broadcaster: ProgressBroadcaster,
    buffer_size: usize,
) -> (super::handle::LedgerHandle, LedgerWriter) {
    let state = match store.load() {
        Ok(Some(state)) => state,
        Ok(None) => {
            tracing::info!("No ledger document found, starting fresh");
            RunState::empty()
        }
        Err(e) => {
            tracing::warn!("Ledger document unreadable, falling back to empty state: {}", e);
            broadcaster.log_error(format!(
                "Ledger document unreadable, starting from an empty state: {e}"
            ));
            RunState::empty()
        }
    };

    let (tx, rx) = mpsc::channel(buffer_size);
    let handle = super::handle::LedgerHandle::new(tx);
    let writer = LedgerWriter::new(rx, store, broadcaster, state);
    (handle, writer)
}
