use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::rate::effective_rate;

/// Per-run outcome counters shared by every requester.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    succeeded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

impl Counters {
    pub(crate) fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, admitted: u64, elapsed: Duration) -> PipelineStats {
        PipelineStats {
            admitted,
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            elapsed,
        }
    }
}

/// Snapshot of a pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Tokens released by the admission gate.
    pub admitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Absent requests that were logged and dropped.
    pub skipped: u64,
    pub elapsed: Duration,
}

impl PipelineStats {
    /// Admissions per second over the run so far.
    #[must_use]
    pub fn effective_rate(&self) -> f64 {
        effective_rate(self.admitted, self.elapsed)
    }
}
