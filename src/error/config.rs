use super::ValidationError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML config '{path}': {source}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to parse JSON config '{path}': {source}")]
    ParseJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unsupported config extension '{ext}'. Use .toml or .json.")]
    UnsupportedExtension { ext: String },
    #[error("Config file must have .toml or .json extension.")]
    MissingExtension,
    #[error("Rate must be >= 0, got {value}.")]
    NegativeRate { value: f64 },
    #[error("Rate must be a finite number, got {value}.")]
    NonFiniteRate { value: f64 },
    #[error("Rate {value} yields an admission interval that cannot be represented: {source}")]
    IntervalOutOfRange {
        value: f64,
        #[source]
        source: std::time::TryFromFloatSecsError,
    },
    #[error("Rate {value} yields an admission interval that rounds to zero.")]
    IntervalRoundsToZero { value: f64 },
    #[error("Worker count must be >= 1.")]
    ZeroWorkers,
    #[error("Channel buffer must be >= 1.")]
    ZeroBuffer,
    #[error("Invalid header: {source}")]
    InvalidHeader {
        #[source]
        source: ValidationError,
    },
    #[error("Config '{field}' must be >= 1: {source}")]
    FieldMustBePositive {
        field: String,
        #[source]
        source: ValidationError,
    },
    #[error("Invalid config '{field}': {source}")]
    InvalidField {
        field: &'static str,
        #[source]
        source: Box<super::AppError>,
    },
    #[cfg(test)]
    #[error("Test expectation failed: {message}")]
    TestExpectation { message: &'static str },
    #[cfg(test)]
    #[error("Test expectation failed: {message}: {value}")]
    TestExpectationValue {
        message: &'static str,
        value: String,
    },
}
