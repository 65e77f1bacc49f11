//! Thread-safe scan progress tracking with wall-clock ETA.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use jmo_core::TargetKind;

/// One completed job's contribution to the progress feed.
///
/// A negative `elapsed_secs` conventionally encodes failure for display.
#[derive(Debug, Clone)]
pub struct JobUpdate {
    pub kind: TargetKind,
    pub name: String,
    pub elapsed_secs: f64,
}

/// Shared `(completed, total)` counter fed by worker jobs.
#[derive(Debug)]
pub struct ProgressTracker {
    total: usize,
    completed: AtomicUsize,
    updates: Mutex<Vec<JobUpdate>>,
    started: Instant,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        ProgressTracker {
            total,
            completed: AtomicUsize::new(0),
            updates: Mutex::new(Vec::new()),
            started: Instant::now(),
        }
    }

    /// Record a finished job. Returns `(completed, total)` after the update.
    pub fn record(&self, update: JobUpdate) -> (usize, usize) {
        self.updates
            .lock()
            .expect("progress lock poisoned")
            .push(update);
        let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        (done, self.total)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Seconds since the tracker was created.
    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Estimated seconds to completion, from mean per-target elapsed time.
    /// `None` until the first job completes or once everything is done.
    pub fn eta_seconds(&self) -> Option<f64> {
        let done = self.completed();
        if done == 0 || done >= self.total {
            return None;
        }
        let updates = self.updates.lock().expect("progress lock poisoned");
        let mean: f64 =
            updates.iter().map(|u| u.elapsed_secs.abs()).sum::<f64>() / updates.len() as f64;
        Some(mean * (self.total - done) as f64)
    }

    /// Snapshot of all recorded updates, in completion order.
    pub fn snapshot(&self) -> Vec<JobUpdate> {
        self.updates.lock().expect("progress lock poisoned").clone()
    }
}
