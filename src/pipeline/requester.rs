use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::PipelineError;
use crate::shutdown::CancelListener;

use super::bucket::Bucket;
use super::executor::Executor;
use super::stats::Counters;

/// Input stream shared by every requester of a pipeline.
pub(crate) type RequestSource<R> = Arc<Mutex<mpsc::Receiver<Option<R>>>>;

/// One worker: pulls requests, waits for admission, calls the executor.
pub(crate) struct Requester<E: Executor> {
    id: usize,
    executor: Arc<E>,
    bucket: Arc<Bucket>,
    counters: Arc<Counters>,
    buffer: usize,
}

impl<E: Executor> Requester<E> {
    pub(crate) const fn new(
        id: usize,
        executor: Arc<E>,
        bucket: Arc<Bucket>,
        counters: Arc<Counters>,
        buffer: usize,
    ) -> Self {
        Self {
            id,
            executor,
            bucket,
            counters,
            buffer,
        }
    }

    /// Starts the worker loop. The returned receiver closes when the loop
    /// ends, which happens on cancellation or once the input is closed and
    /// drained.
    pub(crate) fn spawn(
        self,
        source: RequestSource<E::Request>,
        cancel: CancelListener,
    ) -> (mpsc::Receiver<E::Response>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(self.buffer.max(1));
        let handle = tokio::spawn(self.run(source, tx, cancel));
        (rx, handle)
    }

    async fn run(
        self,
        source: RequestSource<E::Request>,
        tx: mpsc::Sender<E::Response>,
        mut cancel: CancelListener,
    ) {
        let worker = self.id;
        let mut calls: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                item = async { source.lock().await.recv().await } => item,
            };
            let Some(item) = next else {
                break;
            };
            let Some(request) = item else {
                warn!(worker, "{}", PipelineError::InvalidRequest);
                self.counters.record_skip();
                continue;
            };

            if self.bucket.put(&mut cancel).await.is_err() || cancel.is_cancelled() {
                break;
            }

            calls = calls.saturating_add(1);
            match self.executor.execute(request).await {
                Ok(response) => {
                    self.counters.record_success();
                    if cancel.is_cancelled() {
                        break;
                    }
                    let sent = tokio::select! {
                        biased;
                        () = cancel.cancelled() => false,
                        result = tx.send(response) => result.is_ok(),
                    };
                    if !sent {
                        break;
                    }
                }
                Err(err) => {
                    self.counters.record_failure();
                    error!(worker, "{}", PipelineError::executor_failure(err));
                }
            }
        }

        debug!(worker, calls, "Requester finished");
    }
}
