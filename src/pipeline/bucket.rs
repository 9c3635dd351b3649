use tokio::sync::Semaphore;

use crate::error::PipelineError;
use crate::shutdown::CancelListener;

/// Bounded, presence-only token queue shared by requesters and the gate.
///
/// Capacity 0 is a rendezvous: `put` completes only once a `take` is
/// waiting for it. Any other capacity lets that many tokens queue ahead of
/// the gate.
#[derive(Debug)]
pub struct Bucket {
    capacity: usize,
    tokens: Semaphore,
    slots: Semaphore,
}

impl Bucket {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(Semaphore::MAX_PERMITS);
        Self {
            capacity,
            tokens: Semaphore::new(0),
            slots: Semaphore::new(capacity),
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tokens currently queued and not yet taken by the gate.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.available_permits()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Places one token, waiting for space (or, when unbuffered, for a
    /// taker).
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Cancelled` when cancellation fires first.
    pub async fn put(&self, cancel: &mut CancelListener) -> Result<(), PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        let acquired = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PipelineError::Cancelled),
            permit = self.slots.acquire() => permit,
        };
        match acquired {
            Ok(permit) => permit.forget(),
            Err(_closed) => return Err(PipelineError::Cancelled),
        }
        self.tokens.add_permits(1);
        Ok(())
    }

    /// Removes one token, waiting until one is available.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Cancelled` when cancellation fires first.
    pub async fn take(&self, cancel: &mut CancelListener) -> Result<(), PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if self.capacity == 0 {
            // Unbuffered: announce demand so exactly one put can proceed.
            self.slots.add_permits(1);
        }
        let acquired = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PipelineError::Cancelled),
            permit = self.tokens.acquire() => permit,
        };
        match acquired {
            Ok(permit) => permit.forget(),
            Err(_closed) => return Err(PipelineError::Cancelled),
        }
        if self.capacity > 0 {
            self.slots.add_permits(1);
        }
        Ok(())
    }
}
