use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::rate::{Pacer, Rate, effective_rate};
use crate::shutdown::CancelListener;

use super::bucket::Bucket;

/// Outcome of a pacing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaceReport {
    pub admitted: u64,
    pub elapsed: Duration,
}

impl PaceReport {
    #[must_use]
    pub fn effective_rate(&self) -> f64 {
        effective_rate(self.admitted, self.elapsed)
    }
}

/// Removes one token from a bucket per rate interval.
///
/// The gate owns its pacer, so the interval timer lives exactly as long as
/// the gate. The first token is released one interval after pacing starts
/// and consecutive releases are at least one interval apart, so `n`
/// admissions never take less than `n` intervals.
#[derive(Debug)]
pub struct AdmissionGate {
    rate: Rate,
    pacer: Pacer,
    admitted: AtomicU64,
}

impl AdmissionGate {
    #[must_use]
    pub fn new(rate: Rate) -> Self {
        Self {
            rate,
            pacer: Pacer::new(rate),
            admitted: AtomicU64::new(0),
        }
    }

    /// Builds a gate from queries per second.
    ///
    /// # Errors
    ///
    /// Returns an error when the rate is negative, not finite, or has no
    /// representable interval.
    pub fn per_second(qps: f64) -> Result<Self, ConfigError> {
        Ok(Self::new(Rate::per_second(qps)?))
    }

    #[must_use]
    pub const fn rate(&self) -> Rate {
        self.rate
    }

    /// Tokens admitted over the gate's lifetime.
    #[must_use]
    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }

    /// Admits tokens until cancelled.
    pub async fn pace(&self, bucket: &Bucket, cancel: CancelListener) -> PaceReport {
        self.drain(None, bucket, cancel).await
    }

    /// Admits exactly `total` tokens, or fewer if cancelled first.
    pub async fn consume(&self, total: u64, bucket: &Bucket, cancel: CancelListener) -> PaceReport {
        self.drain(Some(total), bucket, cancel).await
    }

    async fn drain(
        &self,
        limit: Option<u64>,
        bucket: &Bucket,
        mut cancel: CancelListener,
    ) -> PaceReport {
        let start = Instant::now();
        self.pacer.rearm().await;
        let mut admitted: u64 = 0;

        while limit.is_none_or(|limit| admitted < limit) {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = self.pacer.admit() => {}
            }
            if bucket.take(&mut cancel).await.is_err() {
                break;
            }
            self.pacer.rearm().await;
            admitted = admitted.saturating_add(1);
            self.admitted.fetch_add(1, Ordering::Relaxed);
            trace!(admitted, "Token admitted");
        }

        let report = PaceReport {
            admitted,
            elapsed: start.elapsed(),
        };
        debug!(
            admitted = report.admitted,
            elapsed_ms = report.elapsed.as_millis(),
            rate = %self.rate,
            "Admission gate finished"
        );
        report
    }
}
