//! Progress reporting hooks.

use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};

use tracing::{debug, info};

/// Receives progress events from long-running operations.
///
/// The total may be adjusted in either direction after reporting starts,
/// since target expansion only learns the real amount of work as it goes.
pub trait Progress: Send + Sync {
    fn add_total(&self, delta: isize);

    /// One item finished; `label` names the next one.
    fn update(&self, label: &str);

    fn finish(&self) {}
}

/// Discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn add_total(&self, _delta: isize) {}

    fn update(&self, _label: &str) {}
}

/// Reports progress through `tracing`.
#[derive(Debug)]
pub struct LogProgress {
    desc: String,
    total: AtomicIsize,
    done: AtomicUsize,
}

impl LogProgress {
    pub fn new(desc: impl Into<String>) -> Self {
        Self {
            desc: desc.into(),
            total: AtomicIsize::new(0),
            done: AtomicUsize::new(0),
        }
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst).max(0).unsigned_abs()
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::SeqCst)
    }
}

impl Progress for LogProgress {
    fn add_total(&self, delta: isize) {
        let total = self.total.fetch_add(delta, Ordering::SeqCst) + delta;
        debug!(desc = %self.desc, total, "progress total adjusted");
    }

    fn update(&self, label: &str) {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(desc = %self.desc, done, total = self.total(), "{label}");
    }

    fn finish(&self) {
        info!("{}: {}/{} done", self.desc, self.done(), self.total());
    }
}
