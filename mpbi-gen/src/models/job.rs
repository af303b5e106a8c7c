//! Generation job: the persisted progress of one run
//!
//! A job is created when a run starts, shrinks by one batch per advance, and
//! is deleted when its queue empties (or evicted once stale).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Progress record for one run
///
/// `processed + remaining_queue.len() == total` holds after every applied
/// batch; `successful <= processed` always.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub job_id: Uuid,
    pub total: usize,
    pub processed: usize,
    pub successful: usize,
    pub errors: Vec<String>,
    pub remaining_queue: VecDeque<i64>,
    pub packaging_requested: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationJob {
    pub fn new(transaction_ids: Vec<i64>, packaging_requested: bool) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            total: transaction_ids.len(),
            processed: 0,
            successful: 0,
            errors: Vec::new(),
            remaining_queue: transaction_ids.into(),
            packaging_requested,
            created_at: now,
            updated_at: now,
        }
    }

    /// Pop up to `batch_size` ids from the head of the queue
    pub fn take_batch(&mut self, batch_size: usize) -> Vec<i64> {
        let n = batch_size.min(self.remaining_queue.len());
        self.remaining_queue.drain(..n).collect()
    }

    /// Fold a finished batch into the running totals
    pub fn apply_batch(&mut self, outcome: &BatchOutcome) {
        self.processed += outcome.processed;
        self.successful += outcome.successful;
        self.errors.extend(outcome.errors.iter().cloned());
        self.updated_at = Utc::now();
    }

    pub fn remaining(&self) -> usize {
        self.remaining_queue.len()
    }

    pub fn is_complete(&self) -> bool {
        self.remaining_queue.is_empty()
    }

    /// Whether the job is older than `staleness_secs` at `now`
    pub fn is_stale(&self, now: DateTime<Utc>, staleness_secs: u64) -> bool {
        (now - self.created_at).num_seconds() > staleness_secs as i64
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            job_id: self.job_id,
            total: self.total,
            processed: self.processed,
            successful: self.successful,
            errors: self.errors.clone(),
            remaining: self.remaining(),
            percentage: percentage(self.processed, self.total),
        }
    }
}

/// Tally of one batch, built item by item by the executor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub processed: usize,
    pub successful: usize,
    pub errors: Vec<String>,
}

impl BatchOutcome {
    pub fn record_success(&mut self) {
        self.processed += 1;
        self.successful += 1;
    }

    /// Item attempted but produced nothing (missing transaction, no path)
    pub fn record_skipped(&mut self) {
        self.processed += 1;
    }

    pub fn record_error(&mut self, message: String) {
        self.processed += 1;
        self.errors.push(message);
    }
}

/// Read-only view of a job returned by the progress endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub job_id: Uuid,
    pub total: usize,
    pub processed: usize,
    pub successful: usize,
    pub errors: Vec<String>,
    pub remaining: usize,
    pub percentage: u8,
}

fn percentage(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((processed * 100) / total).min(100) as u8
}
