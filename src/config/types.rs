use serde::Deserialize;
use std::time::Duration;

use crate::args::{HttpMethod, parse_duration_arg};
use crate::error::{AppError, ValidationError};

/// Settings for `load`, plus an optional `[proxy]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub url: Option<String>,
    pub method: Option<HttpMethod>,
    pub headers: Option<Vec<String>>,
    pub data: Option<String>,
    pub requests: Option<u64>,
    pub rate: Option<f64>,
    pub workers: Option<usize>,
    pub burst: Option<usize>,
    pub timeout: Option<DurationValue>,
    pub proxy: Option<ProxyConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    pub listen: Option<String>,
    pub rate: Option<f64>,
    pub targets: Option<Vec<String>>,
    pub multi: Option<bool>,
}

/// Either whole seconds or a string with a unit (`500ms`, `2m`).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum DurationValue {
    Seconds(u64),
    Text(String),
}

impl DurationValue {
    pub(crate) fn to_duration(&self) -> Result<Duration, AppError> {
        match self {
            DurationValue::Seconds(0) => Err(AppError::validation(ValidationError::DurationZero)),
            DurationValue::Seconds(secs) => Ok(Duration::from_secs(*secs)),
            DurationValue::Text(text) => parse_duration_arg(text),
        }
    }
}
