//! Generation engine: drives a run end to end and owns the control surface.
//!
//! A run is a crash-recovery sweep, then sequential batches of parallel
//! workers until no pending jobs remain, then a serial retry pass over
//! failed jobs. Control operations (pause/resume/stop, regenerate,
//! reset-from, sync) act on the same ledger between or during runs.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::audio::AudioProcessor;
use crate::broadcast::ProgressBroadcaster;
use crate::config::EngineConfig;
use crate::emotion::Emotion;
use crate::ledger::{
    JobRepair, JobStatus, LedgerError, LedgerHandle, RepairAction, RunConfig, RunStatus,
    RunSummary, SyncReport,
};
use crate::synth::Synthesizer;

use super::batch::{form_batch, retry_candidate};
use super::control::EngineControls;
use super::worker::{run_job, JobOutcome, WorkerContext};
use super::OrchestratorError;

/// Point-in-time view of the engine for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    /// A run loop is active.
    pub running: bool,
    /// The pause gate is closed.
    pub paused: bool,
    /// An ad-hoc regeneration drain is active.
    pub draining: bool,
    #[serde(flatten)]
    pub run: RunSummary,
}

/// The generation engine.
///
/// One instance owns one ledger. All run-control state lives on the
/// instance; the control surface is the only way to touch it.
pub struct Orchestrator {
    engine: EngineConfig,
    output_dir: PathBuf,
    ledger: LedgerHandle,
    synthesizer: Arc<dyn Synthesizer>,
    processor: Arc<dyn AudioProcessor>,
    broadcaster: ProgressBroadcaster,
    controls: Arc<EngineControls>,
    running: Arc<AtomicBool>,
    draining: Arc<AtomicBool>,
    adhoc_queue: Arc<Mutex<VecDeque<u64>>>,
}

/// Everything the spawned run loop needs, detached from `&self`.
struct RunContext {
    worker: WorkerContext,
    concurrency: usize,
    max_retries: u32,
    failure_streak_limit: u32,
    broadcaster: ProgressBroadcaster,
    running: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(
        engine: EngineConfig,
        output_dir: PathBuf,
        ledger: LedgerHandle,
        synthesizer: Arc<dyn Synthesizer>,
        processor: Arc<dyn AudioProcessor>,
        broadcaster: ProgressBroadcaster,
    ) -> Self {
        Self {
            engine,
            output_dir,
            ledger,
            synthesizer,
            processor,
            broadcaster,
            controls: Arc::new(EngineControls::new()),
            running: Arc::new(AtomicBool::new(false)),
            draining: Arc::new(AtomicBool::new(false)),
            adhoc_queue: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn ledger(&self) -> &LedgerHandle {
        &self.ledger
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn broadcaster(&self) -> &ProgressBroadcaster {
        &self.broadcaster
    }

    /// Start a generation run. Fails if one is already active.
    pub async fn start(&self, config: Option<RunConfig>) -> Result<(), OrchestratorError> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Generation run already active");
            return Err(OrchestratorError::AlreadyRunning);
        }

        let result = self.begin_run(config).await;
        if result.is_err() {
            self.running.store(false, Ordering::SeqCst);
        }
        result
    }

    async fn begin_run(&self, config: Option<RunConfig>) -> Result<(), OrchestratorError> {
        self.synthesizer.check_health().await?;

        self.controls.reset();

        let recovered = self.ledger.recover_interrupted().await?;
        if recovered > 0 {
            debug!(recovered, "Demoted jobs interrupted by a previous crash");
        }

        let run_config = config.unwrap_or_else(|| RunConfig {
            concurrency: self.engine.concurrency,
            max_retries: self.engine.max_retries,
            backend: self.engine.backend.clone(),
        });

        self.ledger
            .set_run_status(RunStatus::Running, Some(run_config.clone()))
            .await?;

        info!(
            concurrency = run_config.concurrency,
            max_retries = run_config.max_retries,
            backend = %run_config.backend,
            "Generation run started"
        );

        let ctx = RunContext {
            worker: WorkerContext {
                ledger: self.ledger.clone(),
                synthesizer: Arc::clone(&self.synthesizer),
                processor: Arc::clone(&self.processor),
                controls: Arc::clone(&self.controls),
                output_dir: self.output_dir.clone(),
                backend: run_config.backend,
                post_job_delay: Duration::from_millis(self.engine.post_job_delay_ms),
            },
            concurrency: run_config.concurrency.max(1),
            max_retries: run_config.max_retries,
            failure_streak_limit: self.engine.failure_streak_limit,
            broadcaster: self.broadcaster.clone(),
            running: Arc::clone(&self.running),
        };

        tokio::spawn(Self::run_loop(ctx));
        Ok(())
    }

    async fn run_loop(ctx: RunContext) {
        let outcome = Self::process_run(&ctx).await;

        let terminal = if ctx.worker.controls.stop_requested() || outcome.is_err() {
            RunStatus::Stopped
        } else {
            RunStatus::Completed
        };

        if let Err(e) = &outcome {
            error!(error = %e, "Generation run aborted");
            ctx.broadcaster.log_error(format!("Run aborted: {e}"));
        }

        match ctx.worker.ledger.set_run_status(terminal, None).await {
            Ok(()) => info!(status = %terminal, "Generation run finished"),
            Err(e) => error!(error = %e, "Failed to record terminal run status"),
        }

        ctx.running.store(false, Ordering::SeqCst);
    }

    async fn process_run(ctx: &RunContext) -> Result<(), LedgerError> {
        loop {
            if ctx.worker.controls.stop_requested() {
                break;
            }
            Self::process_batches(ctx).await?;
            if ctx.worker.controls.stop_requested() {
                break;
            }
            Self::retry_sweep(ctx).await?;
            if ctx.worker.controls.stop_requested() {
                break;
            }

            // Regeneration during the retry sweep can add new pending work.
            let state = ctx.worker.ledger.snapshot().await?;
            if form_batch(&state.jobs).is_empty() {
                break;
            }
        }
        Ok(())
    }

    /// Sequential batches of parallel jobs until no pending work remains.
    async fn process_batches(ctx: &RunContext) -> Result<(), LedgerError> {
        let limiter = Arc::new(Semaphore::new(ctx.concurrency));
        let mut streak: u32 = 0;

        loop {
            if ctx.worker.controls.stop_requested() {
                break;
            }
            if ctx.worker.controls.take_priority_check() {
                debug!("Priority check forced ahead of batch formation");
            }

            let state = ctx.worker.ledger.snapshot().await?;
            let batch = form_batch(&state.jobs);
            if batch.is_empty() {
                break;
            }

            let priority = batch.iter().filter(|j| j.is_priority()).count();
            debug!(size = batch.len(), priority, "Dispatching batch");

            let mut tasks = JoinSet::new();
            let mut task_jobs = HashMap::new();
            for job in batch {
                let id = job.id;
                let handle = tasks.spawn(run_job(ctx.worker.clone(), job, Arc::clone(&limiter)));
                task_jobs.insert(handle.id(), id);
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((_, JobOutcome::Completed)) => streak = 0,
                    Ok((_, JobOutcome::SynthesisFailed)) => streak += 1,
                    Ok((_, JobOutcome::ProcessingFailed | JobOutcome::Abandoned)) => {}
                    Err(e) => {
                        streak += 1;
                        if let Some(&id) = task_jobs.get(&e.id()) {
                            Self::record_worker_crash(&ctx.worker.ledger, id, &e).await;
                        } else {
                            error!(error = %e, "Worker task failed with no job attached");
                        }
                    }
                }

                if ctx.failure_streak_limit > 0
                    && streak >= ctx.failure_streak_limit
                    && !ctx.worker.controls.stop_requested()
                {
                    let message =
                        format!("Stopping run after {streak} consecutive synthesis failures");
                    error!("{message}");
                    ctx.broadcaster.log_error(message);
                    ctx.worker.controls.request_stop();
                }
            }
        }

        Ok(())
    }

    /// Serial retry pass over failed jobs, one at a time so a systemic
    /// outage is not amplified by parallel retries.
    async fn retry_sweep(ctx: &RunContext) -> Result<(), LedgerError> {
        let state = ctx.worker.ledger.snapshot().await?;
        if retry_candidate(&state.jobs, ctx.max_retries).is_none() {
            return Ok(());
        }

        info!("Starting retry sweep");
        let limiter = Arc::new(Semaphore::new(1));

        loop {
            if ctx.worker.controls.stop_requested() {
                break;
            }

            let state = ctx.worker.ledger.snapshot().await?;
            let Some(candidate) = retry_candidate(&state.jobs, ctx.max_retries) else {
                break;
            };
            let id = candidate.id;
            info!(
                job = id,
                attempt = candidate.retry_count + 1,
                max_retries = ctx.max_retries,
                "Retrying failed job"
            );

            match ctx.worker.ledger.reset_for_retry(id).await {
                Ok(()) => {}
                Err(LedgerError::IllegalTransition { .. } | LedgerError::JobNotFound(_)) => {
                    // The job changed under us; pick again from a fresh state.
                    continue;
                }
                Err(e) => return Err(e),
            }

            let state = ctx.worker.ledger.snapshot().await?;
            let Some(job) = state.job(id) else {
                continue;
            };
            let (_, outcome) =
                run_job(ctx.worker.clone(), job.clone(), Arc::clone(&limiter)).await;
            debug!(job = id, outcome = ?outcome, "Retry attempt finished");
        }

        Ok(())
    }

    /// A panicking worker must not take down the run; record it on the job.
    async fn record_worker_crash(ledger: &LedgerHandle, id: u64, cause: &tokio::task::JoinError) {
        error!(job = id, error = %cause, "Worker crashed");
        match ledger.fail_job(id, format!("Worker crashed: {cause}")).await {
            Ok(()) => {}
            Err(LedgerError::IllegalTransition { .. }) => {
                // Crashed before claiming; the job is still pending.
            }
            Err(e) => error!(job = id, error = %e, "Failed to record worker crash"),
        }
    }

    /// Close the pause gate. Workers finish their current job and park.
    pub async fn pause(&self) -> Result<(), OrchestratorError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(OrchestratorError::NotRunning);
        }
        self.controls.pause();
        self.ledger.set_run_status(RunStatus::Paused, None).await?;
        info!("Generation run paused");
        Ok(())
    }

    /// Reopen the pause gate.
    pub async fn resume(&self) -> Result<(), OrchestratorError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(OrchestratorError::NotRunning);
        }
        self.controls.resume();
        self.ledger.set_run_status(RunStatus::Running, None).await?;
        info!("Generation run resumed");
        Ok(())
    }

    /// Soft stop: in-flight jobs finish their current step, nothing new is
    /// claimed. The run loop records the terminal status when it winds down.
    pub async fn stop(&self) -> Result<(), OrchestratorError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(OrchestratorError::NotRunning);
        }
        info!("Stop requested");
        self.controls.request_stop();
        Ok(())
    }

    /// Reset one job to pending and synthesize it again.
    ///
    /// With a run active the job simply rejoins the next batch. Otherwise it
    /// is queued and an ad-hoc drain synthesizes everything queued as one
    /// fully-parallel round.
    pub async fn regenerate(
        &self,
        id: u64,
        emotion: Option<Emotion>,
    ) -> Result<(), OrchestratorError> {
        let state = self.ledger.snapshot().await?;
        let Some(job) = state.job(id) else {
            return Err(LedgerError::JobNotFound(id).into());
        };

        // Artifact first; a crash between the steps leaves a completed-status
        // job with no artifact, which sync() repairs toward pending.
        self.remove_artifact(&job.filename).await;
        let outcome = self.ledger.reset_job(id, emotion).await?;
        info!(job = id, prior = %outcome.prior_status, "Job queued for regeneration");

        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.adhoc_queue.lock().await.push_back(id);
        self.spawn_drain_if_idle();
        Ok(())
    }

    fn spawn_drain_if_idle(&self) {
        if self.draining.swap(true, Ordering::SeqCst) {
            // An active drain re-checks the queue before exiting.
            return;
        }

        let ledger = self.ledger.clone();
        let synthesizer = Arc::clone(&self.synthesizer);
        let processor = Arc::clone(&self.processor);
        let output_dir = self.output_dir.clone();
        let backend = self.engine.backend.clone();
        let post_job_delay = Duration::from_millis(self.engine.post_job_delay_ms);
        let draining = Arc::clone(&self.draining);
        let queue = Arc::clone(&self.adhoc_queue);

        tokio::spawn(async move {
            loop {
                let ids: Vec<u64> = {
                    let mut queue = queue.lock().await;
                    queue.drain(..).collect()
                };

                if !ids.is_empty() {
                    info!(count = ids.len(), "Draining ad-hoc regeneration queue");
                    // Fresh controls per drain: a stop flag left over from
                    // the last run must not abort ad-hoc work.
                    let ctx = WorkerContext {
                        ledger: ledger.clone(),
                        synthesizer: Arc::clone(&synthesizer),
                        processor: Arc::clone(&processor),
                        controls: Arc::new(EngineControls::new()),
                        output_dir: output_dir.clone(),
                        backend: backend.clone(),
                        post_job_delay,
                    };
                    Self::drain_round(ctx, ids).await;
                }

                draining.store(false, Ordering::SeqCst);
                // An enqueue may have landed between the drain and the flag
                // clear; reclaim the flag and go again if so.
                if queue.lock().await.is_empty() || draining.swap(true, Ordering::SeqCst) {
                    break;
                }
            }
        });
    }

    /// One fully-parallel pass over the queued ad-hoc jobs.
    async fn drain_round(ctx: WorkerContext, ids: Vec<u64>) {
        let state = match ctx.ledger.snapshot().await {
            Ok(state) => state,
            Err(e) => {
                error!(error = %e, "Ad-hoc drain could not read the ledger");
                return;
            }
        };

        let jobs: Vec<_> = ids
            .iter()
            .filter_map(|id| state.job(*id))
            .filter(|job| job.status == JobStatus::Pending)
            .cloned()
            .collect();
        if jobs.is_empty() {
            return;
        }

        let limiter = Arc::new(Semaphore::new(jobs.len()));
        let mut tasks = JoinSet::new();
        let mut task_jobs = HashMap::new();
        for job in jobs {
            let id = job.id;
            let handle = tasks.spawn(run_job(ctx.clone(), job, Arc::clone(&limiter)));
            task_jobs.insert(handle.id(), id);
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, outcome)) => debug!(job = id, outcome = ?outcome, "Ad-hoc job finished"),
                Err(e) => {
                    if let Some(&id) = task_jobs.get(&e.id()) {
                        Self::record_worker_crash(&ctx.ledger, id, &e).await;
                    } else {
                        error!(error = %e, "Ad-hoc worker task failed with no job attached");
                    }
                }
            }
        }
    }

    /// Reset every job with `id >= from_id` to pending, removing artifacts
    /// of previously completed jobs.
    pub async fn reset_from(&self, from_id: u64) -> Result<usize, OrchestratorError> {
        // Artifacts first, same ordering as regenerate.
        let state = self.ledger.snapshot().await?;
        for job in state
            .jobs
            .iter()
            .filter(|j| j.id >= from_id && j.status == JobStatus::Completed)
        {
            self.remove_artifact(&job.filename).await;
        }

        let outcomes = self.ledger.reset_from(from_id).await?;
        info!(from = from_id, count = outcomes.len(), "Jobs reset to pending");
        Ok(outcomes.len())
    }

    /// Flag the next batch formation to re-evaluate priority work.
    pub fn force_priority_check(&self) {
        self.controls.request_priority_check();
        debug!("Priority check flagged for the next batch");
    }

    /// Reconcile the ledger with the artifact directory. Refused while a
    /// run is active; workers are mutating exactly what sync would inspect.
    pub async fn sync(&self, dir: &Path) -> Result<SyncReport, OrchestratorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(OrchestratorError::RunActive);
        }

        let state = self.ledger.snapshot().await?;
        let mut repairs = Vec::new();

        for job in &state.jobs {
            let artifact = dir.join(&job.filename);
            let exists = tokio::fs::metadata(&artifact).await.is_ok();

            if exists && job.status != JobStatus::Completed {
                match self.processor.probe(&artifact).await {
                    Ok(info) => repairs.push(JobRepair {
                        id: job.id,
                        action: RepairAction::MarkCompleted {
                            duration_secs: info.duration_secs,
                            size_bytes: info.size_bytes,
                        },
                    }),
                    Err(e) => {
                        warn!(job = job.id, error = %e, "Unreadable artifact left untouched");
                    }
                }
            } else if !exists && job.status != JobStatus::Pending {
                repairs.push(JobRepair {
                    id: job.id,
                    action: RepairAction::ResetPending,
                });
            }
        }

        if repairs.is_empty() {
            debug!("Ledger and filesystem already agree");
            return Ok(SyncReport::default());
        }

        let report = self.ledger.repair(repairs).await?;
        info!(
            repaired_completed = report.repaired_completed,
            reset_pending = report.reset_pending,
            "Ledger reconciled with filesystem"
        );
        Ok(report)
    }

    pub async fn status(&self) -> Result<EngineStatus, OrchestratorError> {
        let state = self.ledger.snapshot().await?;
        Ok(EngineStatus {
            running: self.running.load(Ordering::SeqCst),
            paused: self.controls.is_paused(),
            draining: self.draining.load(Ordering::SeqCst),
            run: RunSummary::from(&state),
        })
    }

    async fn remove_artifact(&self, filename: &str) {
        let path = self.output_dir.join(filename);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(path = %path.display(), "Removed artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove artifact"),
        }
    }
}
