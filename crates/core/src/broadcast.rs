//! Best-effort progress broadcasting to external observers.
//!
//! The engine pushes four notification kinds: per-job updates, aggregate
//! progress, run status changes, and free-text log lines with severity.
//! Delivery rides a tokio broadcast channel, so a slow or vanished observer
//! only affects its own receiver, never the run or other observers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::ledger::{Job, RunStatus};

/// Capacity of the event channel; lagging observers skip, they do not block.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Severity for broadcast log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// Event pushed to observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A single job changed (status, result fields, retry count).
    JobUpdated { job: Job },
    /// Aggregate counters after a terminal commit.
    Progress {
        completed: u64,
        failed: u64,
        total: u64,
    },
    /// The run-level status changed.
    RunStatus { status: RunStatus },
    /// Free-text log line with severity.
    Log { level: LogLevel, message: String },
}

/// Broadcaster for engine events using a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct ProgressBroadcaster {
    sender: broadcast::Sender<EngineEvent>,
}

impl ProgressBroadcaster {
    /// Create a new broadcaster with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Broadcast an event to all observers.
    pub fn broadcast(&self, event: EngineEvent) {
        // Ignore send errors - they just mean no one is listening
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Number of currently attached observers.
    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Convenience method to broadcast a job update.
    pub fn job_updated(&self, job: Job) {
        self.broadcast(EngineEvent::JobUpdated { job });
    }

    /// Convenience method to broadcast aggregate progress.
    pub fn progress(&self, completed: u64, failed: u64, total: u64) {
        self.broadcast(EngineEvent::Progress {
            completed,
            failed,
            total,
        });
    }

    /// Convenience method to broadcast a run status change.
    pub fn run_status(&self, status: RunStatus) {
        self.broadcast(EngineEvent::RunStatus { status });
    }

    /// Convenience method to broadcast a log line.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.broadcast(EngineEvent::Log {
            level,
            message: message.into(),
        });
    }

    pub fn log_info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn log_warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    pub fn log_error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}
