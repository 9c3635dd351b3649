use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::rate::{Rate, effective_rate};
use crate::shutdown::CancelSignal;

use super::bucket::Bucket;
use super::executor::Executor;
use super::gate::AdmissionGate;

/// Result of [`send_batch`].
#[derive(Debug)]
pub struct BatchReport<T> {
    /// Successful responses in completion order.
    pub responses: Vec<T>,
    pub failed: u64,
    pub skipped: u64,
    pub admitted: u64,
    pub elapsed: Duration,
}

impl<T> BatchReport<T> {
    #[must_use]
    pub fn effective_rate(&self) -> f64 {
        effective_rate(self.admitted, self.elapsed)
    }
}

/// Sends a fixed list of requests, one task each, paced by a private gate.
///
/// The gate consumes exactly as many tokens as there are present requests,
/// so the call returns once every request has been admitted and has
/// finished. `None` entries are logged and skipped.
pub async fn send_batch<E: Executor>(
    executor: Arc<E>,
    requests: Vec<Option<E::Request>>,
    rate: Rate,
    burst: usize,
) -> BatchReport<E::Response> {
    let start = Instant::now();
    let signal = CancelSignal::new();
    let bucket = Arc::new(Bucket::new(burst));
    let gate = AdmissionGate::new(rate);

    let mut skipped: u64 = 0;
    let mut tasks = JoinSet::new();
    for (index, request) in requests.into_iter().enumerate() {
        let Some(request) = request else {
            warn!(index, "{}", PipelineError::InvalidRequest);
            skipped = skipped.saturating_add(1);
            continue;
        };
        let executor = Arc::clone(&executor);
        let bucket = Arc::clone(&bucket);
        let mut listener = signal.listener();
        tasks.spawn(async move {
            bucket.put(&mut listener).await?;
            executor
                .execute(request)
                .await
                .map_err(PipelineError::executor_failure)
        });
    }

    let total = u64::try_from(tasks.len()).unwrap_or(u64::MAX);
    let (pace, (responses, failed)) = tokio::join!(
        gate.consume(total, &bucket, signal.listener()),
        collect(&mut tasks)
    );

    let report = BatchReport {
        responses,
        failed,
        skipped,
        admitted: pace.admitted,
        elapsed: start.elapsed(),
    };
    info!(
        sent = total,
        succeeded = report.responses.len(),
        failed = report.failed,
        skipped = report.skipped,
        elapsed_ms = report.elapsed.as_millis(),
        "Batch finished"
    );
    report
}

async fn collect<T>(tasks: &mut JoinSet<Result<T, PipelineError>>) -> (Vec<T>, u64)
where
    T: Send + 'static,
{
    let mut responses = Vec::with_capacity(tasks.len());
    let mut failed: u64 = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(response)) => responses.push(response),
            Ok(Err(err)) => {
                failed = failed.saturating_add(1);
                error!("{}", err);
            }
            Err(err) => {
                failed = failed.saturating_add(1);
                error!("Batch task failed: {}", err);
            }
        }
    }
    (responses, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Debug, thiserror::Error)]
    #[error("refused")]
    struct Refused;

    #[derive(Default)]
    struct Doubler {
        calls: AtomicU64,
    }

    #[async_trait::async_trait]
    impl Executor for Doubler {
        type Request = u32;
        type Response = u32;
        type Error = Refused;

        async fn execute(&self, request: u32) -> Result<u32, Refused> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            request.checked_mul(2).ok_or(Refused)
        }
    }

    #[tokio::test]
    async fn batch_is_paced_and_counts_outcomes() -> Result<(), String> {
        let executor = Arc::new(Doubler::default());
        let rate = Rate::per_second(100.0).map_err(|err| err.to_string())?;
        let mut requests: Vec<Option<u32>> = (1..=10).map(Some).collect();
        requests.push(None);
        requests.push(Some(u32::MAX));

        let report = send_batch(Arc::clone(&executor), requests, rate, 0).await;

        let mut responses = report.responses.clone();
        responses.sort_unstable();
        let expected: Vec<u32> = (1..=10).map(|value: u32| value.saturating_mul(2)).collect();
        if responses != expected {
            return Err(format!("Unexpected responses: {:?}", responses));
        }
        if report.failed != 1 || report.skipped != 1 || report.admitted != 11 {
            return Err(format!(
                "Unexpected counts: failed={} skipped={} admitted={}",
                report.failed, report.skipped, report.admitted
            ));
        }
        if report.elapsed < Duration::from_millis(110) {
            return Err(format!("11 admissions at 100 QPS took {:?}", report.elapsed));
        }
        if report.effective_rate() > 100.0 {
            return Err(format!("Rate {} exceeded 100", report.effective_rate()));
        }
        if executor.calls.load(Ordering::SeqCst) != 11 {
            return Err("Expected one call per present request".to_owned());
        }
        Ok(())
    }

    #[tokio::test]
    async fn empty_batch_returns_immediately() -> Result<(), String> {
        let report = send_batch(
            Arc::new(Doubler::default()),
            vec![None, None],
            Rate::per_second(1.0).map_err(|err| err.to_string())?,
            0,
        )
        .await;
        if !report.responses.is_empty() || report.skipped != 2 || report.admitted != 0 {
            return Err(format!("Unexpected report: {:?}", report));
        }
        if report.elapsed > Duration::from_millis(500) {
            return Err("Empty batch should not wait on the gate".to_owned());
        }
        Ok(())
    }
}
