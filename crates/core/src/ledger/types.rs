//! Ledger data model: jobs, run state, and the status machines.
//!
//! The whole `RunState` serializes as the on-disk ledger document, which is
//! always read and written in full.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::emotion::Emotion;

/// Per-job status machine: `pending → generating → {completed | error}`,
/// with resets returning any status to `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Generating,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Generating => "generating",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }

    /// Terminal statuses count toward an aggregate counter.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    /// Explicit transition table. Everything not listed is illegal; the
    /// ledger writer rejects illegal transitions, which also drops commits
    /// from workers whose job was reset while in flight.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Generating)
                | (Generating, Completed)
                | (Generating, Error)
                // crash-recovery sweep and resets
                | (Generating, Pending)
                | (Completed, Pending)
                | (Error, Pending)
                // resetting an already-pending job clears its fields
                | (Pending, Pending)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run-level status machine: `idle → running ⇄ paused → {completed | stopped}`.
/// A stopped or completed run may be started again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Idle,
    Running,
    Paused,
    Stopped,
    Completed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Stopped => "stopped",
            RunStatus::Completed => "completed",
        }
    }

    /// A run is active while running or paused.
    pub fn is_active(&self) -> bool {
        matches!(self, RunStatus::Running | RunStatus::Paused)
    }

    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        use RunStatus::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Running, Paused)
                | (Running, Stopped)
                | (Running, Completed)
                | (Paused, Running)
                | (Paused, Stopped)
                // a paused run can still exhaust its in-flight work
                | (Paused, Completed)
                | (Stopped, Running)
                | (Completed, Running)
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work: text in, one audio artifact out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique increasing id, assigned at initialization, stable forever.
    pub id: u64,
    /// Unique artifact key inside the output directory.
    pub filename: String,
    pub text: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retry_count: u32,
    /// Explicit emotion; absent means auto-detect at synthesis time.
    /// Present also marks the job as priority for batch formation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion_override: Option<Emotion>,
}

impl Job {
    pub fn new(id: u64, filename: String, text: String) -> Self {
        Self {
            id,
            filename,
            text,
            status: JobStatus::Pending,
            error_message: None,
            duration_secs: None,
            size_bytes: None,
            generated_at: None,
            retry_count: 0,
            emotion_override: None,
        }
    }

    pub fn is_priority(&self) -> bool {
        self.emotion_override.is_some()
    }

    /// Clear result fields; used by every flavor of reset.
    pub fn clear_result(&mut self) {
        self.error_message = None;
        self.duration_secs = None;
        self.size_bytes = None;
        self.generated_at = None;
    }
}

/// Per-run configuration, persisted inside the ledger document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// How many jobs may synthesize at once.
    pub concurrency: usize,
    /// Automatic retry ceiling per job.
    pub max_retries: u32,
    /// Voice backend forwarded to the synthesis service.
    pub backend: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            max_retries: 3,
            backend: "default".to_string(),
        }
    }
}

/// The full run state; serializes as the ledger document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub status: RunStatus,
    pub completed: u64,
    pub failed: u64,
    pub total: u64,
    pub config: RunConfig,
    pub jobs: Vec<Job>,
}

impl RunState {
    /// Fresh state with no jobs; the fallback when no document exists.
    pub fn empty() -> Self {
        Self {
            status: RunStatus::Idle,
            completed: 0,
            failed: 0,
            total: 0,
            config: RunConfig::default(),
            jobs: Vec::new(),
        }
    }

    pub fn job(&self, id: u64) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn job_mut(&mut self, id: u64) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    /// Status counts derived by scanning the job list.
    pub fn derived_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts {
            total: self.jobs.len() as u64,
            ..StatusCounts::default()
        };
        for job in &self.jobs {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Generating => counts.generating += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Error => counts.failed += 1,
            }
        }
        counts
    }

    /// True when the stored aggregate counters agree with the job statuses:
    /// `completed + failed + pending + generating == total`, and each
    /// counter matches its derived value.
    pub fn counters_consistent(&self) -> bool {
        let derived = self.derived_counts();
        self.completed == derived.completed
            && self.failed == derived.failed
            && self.total == derived.total
            && self.completed + self.failed + derived.pending + derived.generating == self.total
    }
}

/// Aggregate counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub generating: u64,
    pub completed: u64,
    pub failed: u64,
    pub total: u64,
}

/// Read-only run overview for the status surface; no job list.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub completed: u64,
    pub failed: u64,
    pub pending: u64,
    pub generating: u64,
    pub total: u64,
    pub config: RunConfig,
}

impl From<&RunState> for RunSummary {
    fn from(state: &RunState) -> Self {
        let derived = state.derived_counts();
        Self {
            status: state.status,
            completed: state.completed,
            failed: state.failed,
            pending: derived.pending,
            generating: derived.generating,
            total: state.total,
            config: state.config.clone(),
        }
    }
}

/// What a reset did to one job; the caller deletes artifacts based on this.
#[derive(Debug, Clone)]
pub struct ResetOutcome {
    pub id: u64,
    pub filename: String,
    pub prior_status: JobStatus,
}

/// Result of `initialize_from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InitReport {
    pub jobs_created: usize,
    pub lines_skipped: usize,
}

/// Result of `sync`: how many jobs were repaired in each direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Artifact present on disk, status was not completed.
    pub repaired_completed: usize,
    /// Artifact missing on disk, status was not pending.
    pub reset_pending: usize,
}

impl SyncReport {
    pub fn total(&self) -> usize {
        self.repaired_completed + self.reset_pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Generating).unwrap(),
            "\"generating\""
        );
        let back: JobStatus = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(back, JobStatus::Error);
    }

    #[test]
    fn test_job_status_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Generating.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Error.is_terminal());
    }

    #[test]
    fn test_job_status_transitions() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Generating));
        assert!(Generating.can_transition_to(Completed));
        assert!(Generating.can_transition_to(Error));
        assert!(Generating.can_transition_to(Pending));
        assert!(Completed.can_transition_to(Pending));
        assert!(Error.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Pending));

        // Illegal: terminal commits for jobs that are not generating.
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Error));
        assert!(!Completed.can_transition_to(Error));
        assert!(!Error.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Generating));
        assert!(!Error.can_transition_to(Generating));
    }

    #[test]
    fn test_run_status_transitions() {
        use RunStatus::*;
        assert!(Idle.can_transition_to(Running));
        assert!(Running.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Running));
        assert!(Running.can_transition_to(Stopped));
        assert!(Paused.can_transition_to(Stopped));
        assert!(Paused.can_transition_to(Completed));
        assert!(Running.can_transition_to(Completed));
        assert!(Stopped.can_transition_to(Running));
        assert!(Completed.can_transition_to(Running));

        assert!(!Idle.can_transition_to(Paused));
        assert!(!Idle.can_transition_to(Completed));
        assert!(!Stopped.can_transition_to(Paused));
        assert!(!Completed.can_transition_to(Paused));
    }

    #[test]
    fn test_run_status_is_active() {
        assert!(RunStatus::Running.is_active());
        assert!(RunStatus::Paused.is_active());
        assert!(!RunStatus::Idle.is_active());
        assert!(!RunStatus::Stopped.is_active());
        assert!(!RunStatus::Completed.is_active());
    }

    #[test]
    fn test_new_job_is_pending_without_results() {
        let job = Job::new(7, "0007.wav".to_string(), "hello".to_string());
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 0);
        assert!(job.error_message.is_none());
        assert!(job.duration_secs.is_none());
        assert!(job.size_bytes.is_none());
        assert!(job.generated_at.is_none());
        assert!(!job.is_priority());
    }

    #[test]
    fn test_priority_follows_override() {
        let mut job = Job::new(1, "a.wav".to_string(), "t".to_string());
        assert!(!job.is_priority());
        job.emotion_override = Some(Emotion::Happy);
        assert!(job.is_priority());
    }

    #[test]
    fn test_job_serde_skips_absent_optionals() {
        let job = Job::new(1, "0001.wav".to_string(), "hi".to_string());
        let json = serde_json::to_string(&job).unwrap();
        assert!(!json.contains("error_message"));
        assert!(!json.contains("duration_secs"));
        assert!(!json.contains("emotion_override"));
        assert!(json.contains("\"retry_count\":0"));
    }

    #[test]
    fn test_job_round_trip_with_results() {
        let mut job = Job::new(3, "0003.wav".to_string(), "text".to_string());
        job.status = JobStatus::Completed;
        job.duration_secs = Some(2.5);
        job.size_bytes = Some(110250);
        job.generated_at = Some(Utc::now());
        job.emotion_override = Some(Emotion::Sad);

        let json = serde_json::to_string(&job).unwrap();
        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, JobStatus::Completed);
        assert_eq!(back.duration_secs, Some(2.5));
        assert_eq!(back.size_bytes, Some(110250));
        assert_eq!(back.emotion_override, Some(Emotion::Sad));
    }

    #[test]
    fn test_empty_state_is_consistent() {
        let state = RunState::empty();
        assert_eq!(state.status, RunStatus::Idle);
        assert!(state.counters_consistent());
        assert_eq!(state.derived_counts(), StatusCounts::default());
    }

    #[test]
    fn test_counters_consistent_detects_drift() {
        let mut state = RunState::empty();
        state.jobs.push(Job::new(1, "a.wav".into(), "x".into()));
        state.total = 1;
        assert!(state.counters_consistent());

        state.jobs[0].status = JobStatus::Completed;
        // Counter not bumped alongside the status change.
        assert!(!state.counters_consistent());

        state.completed = 1;
        assert!(state.counters_consistent());
    }

    #[test]
    fn test_run_summary_derives_pending_and_generating() {
        let mut state = RunState::empty();
        for id in 1..=4 {
            state.jobs.push(Job::new(id, format!("{id}.wav"), "t".into()));
        }
        state.total = 4;
        state.jobs[0].status = JobStatus::Completed;
        state.completed = 1;
        state.jobs[1].status = JobStatus::Generating;

        let summary = RunSummary::from(&state);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.generating, 1);
        assert_eq!(summary.pending, 2);
        assert_eq!(summary.total, 4);
    }

    #[test]
    fn test_document_round_trip() {
        let mut state = RunState::empty();
        state.status = RunStatus::Running;
        state.config = RunConfig {
            concurrency: 4,
            max_retries: 2,
            backend: "kokoro".to_string(),
        };
        state.jobs.push(Job::new(1, "0001.wav".into(), "one".into()));
        state.jobs.push(Job::new(2, "0002.wav".into(), "two".into()));
        state.total = 2;

        let json = serde_json::to_string_pretty(&state).unwrap();
        let back: RunState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, RunStatus::Running);
        assert_eq!(back.config.concurrency, 4);
        assert_eq!(back.jobs.len(), 2);
        assert_eq!(back.jobs[1].filename, "0002.wav");
    }
}
