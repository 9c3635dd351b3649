mod app;
mod config;
mod http;
mod pipeline;
mod validation;

#[cfg(test)]
mod test_support;

pub use app::{AppError, AppResult};
pub use config::ConfigError;
pub use http::HttpError;
pub use pipeline::PipelineError;
pub use validation::ValidationError;
