//! Admission-controlled concurrent request pipeline.
//!
//! Requests flow from one input stream through `workers` requesters. Each
//! requester places a token in the shared [`Bucket`] before calling the
//! [`Executor`]; the [`AdmissionGate`] drains the bucket at the configured
//! rate, so at most `burst` calls run ahead of the pace. Successful
//! responses from every requester are merged into one output stream.
pub mod batch;
pub mod bucket;
pub mod executor;
pub mod gate;
pub mod merge;
mod requester;
mod stats;


use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info};

use crate::error::{ConfigError, PipelineError};
use crate::rate::Rate;
use crate::shutdown::CancelSignal;

pub use bucket::Bucket;
pub use executor::Executor;
pub use gate::{AdmissionGate, PaceReport};
pub use merge::{Merged, merge};
pub use stats::PipelineStats;

use requester::Requester;
use stats::Counters;

const DEFAULT_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    rate: Rate,
    workers: NonZeroUsize,
    burst: usize,
    buffer: NonZeroUsize,
}

impl PipelineConfig {
    /// Creates a configuration with no burst and the default channel buffer.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ZeroWorkers` when `workers` is zero.
    pub fn new(rate: Rate, workers: usize) -> Result<Self, ConfigError> {
        let workers = NonZeroUsize::new(workers).ok_or(ConfigError::ZeroWorkers)?;
        Ok(Self {
            rate,
            workers,
            burst: 0,
            buffer: NonZeroUsize::new(DEFAULT_BUFFER).unwrap_or(NonZeroUsize::MIN),
        })
    }

    /// Number of tokens that may queue ahead of the gate.
    #[must_use]
    pub const fn with_burst(mut self, burst: usize) -> Self {
        self.burst = burst;
        self
    }

    /// Sets the capacity of the per-worker and merged output channels.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ZeroBuffer` when `buffer` is zero.
    pub fn with_buffer(mut self, buffer: usize) -> Result<Self, ConfigError> {
        self.buffer = NonZeroUsize::new(buffer).ok_or(ConfigError::ZeroBuffer)?;
        Ok(self)
    }

    #[must_use]
    pub const fn rate(&self) -> Rate {
        self.rate
    }

    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers.get()
    }

    #[must_use]
    pub const fn burst(&self) -> usize {
        self.burst
    }

    #[must_use]
    pub const fn buffer(&self) -> usize {
        self.buffer.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Stopped,
}

/// Stops a running pipeline from another task.
#[derive(Debug, Clone)]
pub struct StopHandle {
    signal: CancelSignal,
}

impl StopHandle {
    /// Returns `true` only for the call that actually stopped the pipeline.
    pub fn stop(&self) -> bool {
        fire(&self.signal)
    }
}

fn fire(signal: &CancelSignal) -> bool {
    let fired = signal.fire();
    if fired {
        info!("Pipeline stopping");
    }
    fired
}

struct Run {
    signal: CancelSignal,
    bucket: Arc<Bucket>,
    gate: Arc<AdmissionGate>,
    counters: Arc<Counters>,
    started: Instant,
    tasks: Vec<JoinHandle<()>>,
}

pub struct Pipeline<E: Executor> {
    config: PipelineConfig,
    executor: Arc<E>,
    run: Option<Run>,
}

impl<E: Executor> Pipeline<E> {
    #[must_use]
    pub const fn new(config: PipelineConfig, executor: Arc<E>) -> Self {
        Self {
            config,
            executor,
            run: None,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        match &self.run {
            None => Phase::Idle,
            Some(run) if run.signal.is_fired() => Phase::Stopped,
            Some(_) => Phase::Running,
        }
    }

    /// Starts the workers, the admission gate, and the merger.
    ///
    /// `None` items on `input` are logged and skipped. The returned stream
    /// yields successful responses and closes once `input` is exhausted and
    /// every worker has finished, or once the pipeline is stopped.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::AlreadyStarted` when called more than once.
    pub fn run(
        &mut self,
        input: mpsc::Receiver<Option<E::Request>>,
    ) -> Result<mpsc::Receiver<E::Response>, PipelineError> {
        if self.run.is_some() {
            return Err(PipelineError::AlreadyStarted);
        }

        let config = self.config;
        let signal = CancelSignal::new();
        let bucket = Arc::new(Bucket::new(config.burst()));
        let gate = Arc::new(AdmissionGate::new(config.rate()));
        let counters = Arc::new(Counters::default());
        let source = Arc::new(Mutex::new(input));
        let started = Instant::now();

        let mut outputs = Vec::with_capacity(config.workers());
        let mut tasks = Vec::with_capacity(config.workers().saturating_add(2));
        for id in 0..config.workers() {
            let requester = Requester::new(
                id,
                Arc::clone(&self.executor),
                Arc::clone(&bucket),
                Arc::clone(&counters),
                config.buffer(),
            );
            let (output, handle) = requester.spawn(Arc::clone(&source), signal.listener());
            outputs.push(output);
            tasks.push(handle);
        }

        let gate_task = {
            let gate = Arc::clone(&gate);
            let bucket = Arc::clone(&bucket);
            let listener = signal.listener();
            tokio::spawn(async move {
                gate.pace(&bucket, listener).await;
            })
        };
        tasks.push(gate_task);

        let Merged { output, handle } = merge(&signal.listener(), outputs, config.buffer());
        tasks.push(handle);

        info!(
            workers = config.workers(),
            burst = config.burst(),
            rate = %config.rate(),
            "Pipeline started"
        );

        self.run = Some(Run {
            signal,
            bucket,
            gate,
            counters,
            started,
            tasks,
        });
        Ok(output)
    }

    /// Cancels every wait in the pipeline. Returns `true` only for the call
    /// that stopped it; a no-op while idle or already stopped.
    pub fn stop(&self) -> bool {
        self.run.as_ref().is_some_and(|run| fire(&run.signal))
    }

    /// A cloneable handle for stopping from elsewhere. `None` before `run`.
    #[must_use]
    pub fn stop_handle(&self) -> Option<StopHandle> {
        self.run.as_ref().map(|run| StopHandle {
            signal: run.signal.clone(),
        })
    }

    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        self.run.as_ref().map_or_else(PipelineStats::default, |run| {
            run.counters
                .snapshot(run.gate.admitted(), run.started.elapsed())
        })
    }

    /// Tokens queued in the bucket and not yet admitted.
    #[must_use]
    pub fn queued_tokens(&self) -> usize {
        self.run.as_ref().map_or(0, |run| run.bucket.len())
    }

    /// Stops the pipeline if it is running and waits for every task.
    pub async fn join(mut self) -> PipelineStats {
        let Some(run) = self.run.take() else {
            return PipelineStats::default();
        };
        fire(&run.signal);
        for task in run.tasks {
            if let Err(err) = task.await {
                error!("Pipeline task failed: {}", err);
            }
        }
        let stats = run
            .counters
            .snapshot(run.gate.admitted(), run.started.elapsed());
        info!(
            admitted = stats.admitted,
            succeeded = stats.succeeded,
            failed = stats.failed,
            skipped = stats.skipped,
            elapsed_ms = stats.elapsed.as_millis(),
            "Pipeline finished"
        );
        stats
    }
}
