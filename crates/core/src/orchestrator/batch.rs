//! Batch formation and retry selection.
//!
//! Pure selection logic over a run-state snapshot. Jobs carrying an emotion
//! override are "priority" work but get at most [`PRIORITY_CAP`] slots per
//! batch, so a long stream of overrides can never starve the regular
//! dataset order.

use crate::ledger::{Job, JobStatus};

/// Jobs dispatched per concurrency round.
pub const BATCH_SIZE: usize = 10;

/// Priority slots per batch.
pub const PRIORITY_CAP: usize = 5;

/// Select the next batch of pending jobs in dataset order.
///
/// Priority jobs fill at most [`PRIORITY_CAP`] slots, the rest goes to
/// regular jobs. When regular work cannot fill the batch, remaining
/// priority jobs top it up past the cap.
pub fn form_batch(jobs: &[Job]) -> Vec<Job> {
    let (priority, regular): (Vec<&Job>, Vec<&Job>) = jobs
        .iter()
        .filter(|j| j.status == JobStatus::Pending)
        .partition(|j| j.is_priority());

    let priority_take = priority.len().min(PRIORITY_CAP);
    let regular_take = regular.len().min(BATCH_SIZE - priority_take);

    let mut batch: Vec<Job> = priority
        .iter()
        .take(priority_take)
        .map(|j| (*j).clone())
        .collect();
    batch.extend(regular.iter().take(regular_take).map(|j| (*j).clone()));

    if batch.len() < BATCH_SIZE {
        let top_up = (BATCH_SIZE - batch.len()).min(priority.len() - priority_take);
        batch.extend(
            priority
                .iter()
                .skip(priority_take)
                .take(top_up)
                .map(|j| (*j).clone()),
        );
    }

    batch
}

/// The next failed job eligible for an automatic retry, in dataset order.
pub fn retry_candidate(jobs: &[Job], max_retries: u32) -> Option<&Job> {
    jobs.iter()
        .find(|j| j.status == JobStatus::Error && j.retry_count < max_retries)
}
