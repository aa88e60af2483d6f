//! Per-job synthesis worker.
//!
//! One invocation takes a job from pending to a terminal status: claim,
//! synthesize, post-process, commit. Failures are contained per job and
//! recorded on the ledger; nothing here propagates an error upward.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::audio::AudioProcessor;
use crate::emotion;
use crate::ledger::{Job, LedgerError, LedgerHandle};
use crate::synth::{SynthesisRequest, Synthesizer};

use super::control::EngineControls;

/// What happened to one dispatched job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobOutcome {
    Completed,
    SynthesisFailed,
    ProcessingFailed,
    /// Nothing was committed; the job was not (or no longer) ours to finish.
    Abandoned,
}

/// Everything a worker needs, cheap to clone per job.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub ledger: LedgerHandle,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub processor: Arc<dyn AudioProcessor>,
    pub controls: Arc<EngineControls>,
    pub output_dir: PathBuf,
    pub backend: String,
    pub post_job_delay: Duration,
}

/// Run one job to its outcome, bounded by the concurrency limiter.
pub(crate) async fn run_job(
    ctx: WorkerContext,
    job: Job,
    limiter: Arc<Semaphore>,
) -> (u64, JobOutcome) {
    let id = job.id;
    let outcome = process(&ctx, &job, limiter).await;

    // Fixed pacing delay between jobs, skipped when nothing was attempted.
    if outcome != JobOutcome::Abandoned && !ctx.post_job_delay.is_zero() {
        tokio::time::sleep(ctx.post_job_delay).await;
    }

    (id, outcome)
}

async fn process(ctx: &WorkerContext, job: &Job, limiter: Arc<Semaphore>) -> JobOutcome {
    let Ok(_permit) = limiter.acquire_owned().await else {
        return JobOutcome::Abandoned;
    };

    ctx.controls.wait_if_paused().await;
    if ctx.controls.stop_requested() {
        debug!(job = job.id, "Stop requested, leaving job pending");
        return JobOutcome::Abandoned;
    }

    match ctx.ledger.mark_generating(job.id).await {
        Ok(()) => {}
        Err(LedgerError::IllegalTransition { .. }) => {
            warn!(job = job.id, "Job is no longer claimable, skipping");
            return JobOutcome::Abandoned;
        }
        Err(e) => {
            warn!(job = job.id, error = %e, "Failed to claim job");
            return JobOutcome::Abandoned;
        }
    }

    let resolved = job
        .emotion_override
        .unwrap_or_else(|| emotion::detect(&job.text));
    let request = SynthesisRequest::new(job.text.clone(), ctx.backend.clone(), resolved);

    debug!(job = job.id, emotion = %resolved, "Synthesizing");
    let audio = match ctx.synthesizer.synthesize(&request).await {
        Ok(audio) => audio,
        Err(e) => {
            warn!(job = job.id, error = %e, "Synthesis failed");
            commit_failure(ctx, job.id, format!("Synthesis failed: {e}")).await;
            return JobOutcome::SynthesisFailed;
        }
    };

    let dest = ctx.output_dir.join(&job.filename);
    let info = match ctx.processor.process(audio, &dest).await {
        Ok(info) => info,
        Err(e) => {
            warn!(job = job.id, error = %e, "Post-processing failed");
            commit_failure(ctx, job.id, format!("Post-processing failed: {e}")).await;
            return JobOutcome::ProcessingFailed;
        }
    };

    match ctx
        .ledger
        .complete_job(job.id, info.duration_secs, info.size_bytes)
        .await
    {
        Ok(()) => {
            debug!(
                job = job.id,
                duration_secs = info.duration_secs,
                "Job completed"
            );
            JobOutcome::Completed
        }
        Err(LedgerError::IllegalTransition { .. }) => {
            // The job was reset while we were synthesizing. The artifact was
            // produced with the old parameters, so it goes too.
            warn!(job = job.id, "Job was reset mid-flight, discarding result");
            if let Err(e) = tokio::fs::remove_file(&dest).await {
                debug!(job = job.id, error = %e, "Stale artifact removal failed");
            }
            JobOutcome::Abandoned
        }
        Err(e) => {
            warn!(job = job.id, error = %e, "Failed to commit job result");
            JobOutcome::Abandoned
        }
    }
}

async fn commit_failure(ctx: &WorkerContext, id: u64, message: String) {
    match ctx.ledger.fail_job(id, message).await {
        Ok(()) => {}
        Err(LedgerError::IllegalTransition { .. }) => {
            warn!(job = id, "Job was reset mid-flight, discarding failure");
        }
        Err(e) => {
            warn!(job = id, error = %e, "Failed to record job failure");
        }
    }
}
