//! Request-level and configuration error types.
//!
//! Per-case execution faults are [`ExecutionError`](crate::types::ExecutionError)
//! values recorded inside outcomes; the types here cover what can go wrong
//! around them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to find the function a harness should call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("no function definition found in submission")]
    NoEntryPointFound,
}

/// Failures that end a grading request before any test case runs.
///
/// Serialized as `{"kind": "..."}` inside the report's `error` object.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum GradingError {
    #[error("no function definition found in submission")]
    NoEntryPointFound,

    #[error("request contains no test cases")]
    EmptyTestSuite,
}

impl From<ResolutionError> for GradingError {
    fn from(err: ResolutionError) -> Self {
        match err {
            ResolutionError::NoEntryPointFound => GradingError::NoEntryPointFound,
        }
    }
}

/// Errors loading a [`GraderConfig`](crate::config::GraderConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Errors in the subprocess worker protocol.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed worker message: {0}")]
    Protocol(#[from] serde_json::Error),
}
