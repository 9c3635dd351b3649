use thiserror::Error;

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing request")]
    InvalidRequest,
    #[error("Request failed: {source}")]
    ExecutorFailure {
        #[source]
        source: BoxedError,
    },
    #[error("Operation cancelled.")]
    Cancelled,
    #[error("Pipeline was already started. Create a new pipeline for another run.")]
    AlreadyStarted,
}

impl PipelineError {
    pub fn executor_failure<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PipelineError::ExecutorFailure {
            source: Box::new(error),
        }
    }
}
