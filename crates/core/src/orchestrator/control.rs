//! Run-control signals shared between the engine loop and its workers.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// Cooperative control flags for a run.
///
/// Pause is a gate workers wait on; stop is a soft flag checked at the same
/// points. Requesting a stop opens the gate so paused waiters wake up and
/// observe the flag instead of sleeping forever.
pub struct EngineControls {
    gate: watch::Sender<bool>,
    stop_requested: AtomicBool,
    force_priority: AtomicBool,
}

impl EngineControls {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            gate,
            stop_requested: AtomicBool::new(false),
            force_priority: AtomicBool::new(false),
        }
    }

    /// Clear all flags for a fresh run.
    pub fn reset(&self) {
        self.stop_requested.store(false, Ordering::SeqCst);
        self.force_priority.store(false, Ordering::SeqCst);
        self.gate.send_replace(false);
    }

    pub fn pause(&self) {
        self.gate.send_replace(true);
    }

    pub fn resume(&self) {
        self.gate.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.gate.borrow()
    }

    /// Request a soft stop and release any paused waiters.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.gate.send_replace(false);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn request_priority_check(&self) {
        self.force_priority.store(true, Ordering::SeqCst);
    }

    /// Consume the priority-check hint, returning whether it was set.
    pub fn take_priority_check(&self) -> bool {
        self.force_priority.swap(false, Ordering::SeqCst)
    }

    /// Wait until the run is not paused. Returns immediately when unpaused.
    pub async fn wait_if_paused(&self) {
        let mut rx = self.gate.subscribe();
        while *rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for EngineControls {
    fn default() -> Self {
        Self::new()
    }
}
