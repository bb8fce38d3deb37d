//! Sandbox-level types for the codegrade library.
//!
//! This module defines the data structures shared by every execution backend:
//! - [`ExecutionSettings`]: limits and isolation for running one test case
//! - [`Isolation`]: which backend hosts the interpreter
//! - [`ExecutionResult`]: what one harness run produced
//! - [`ExecutionError`]: structured failure variants
//! - [`DEFAULT_ALLOWED_MODULES`]: the default import allowlist
//!
//! Grading-level types (requests, outcomes, reports) live in [`crate::model`].

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Python standard library modules a submission may import by default.
///
/// Covers what typical exercise solutions reach for while leaving out network,
/// filesystem and subprocess modules (`os` included). The list gates `import`
/// statements only: anything reachable from an allowed module stays
/// reachable, `sys.modules` included. The `subprocess` backend is the
/// containment boundary.
pub const DEFAULT_ALLOWED_MODULES: &[&str] = &[
    "math",
    "re",
    "json",
    "datetime",
    "collections",
    "itertools",
    "functools",
    "string",
    "random",
    "sys",
];

/// Default per-case wall-clock limit: 5 seconds.
pub const DEFAULT_TIMEOUT_NS: u64 = 5_000_000_000;

/// Default combined stdout + stderr cap: 1 MiB.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1_048_576;

/// Where a test case's interpreter lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Isolation {
    /// Fresh interpreter per case on a dedicated thread. A case that overruns
    /// its deadline is interrupted with `TimeoutError`; one that ignores the
    /// interrupt is abandoned after a grace period.
    #[default]
    Thread,
    /// Pre-warmed interpreters on persistent slot threads; fresh scope per
    /// case and interpreter state restored after it.
    Pooled,
    /// Fresh worker process per case, killed when the deadline expires.
    Subprocess,
}

impl Isolation {
    pub fn as_str(self) -> &'static str {
        match self {
            Isolation::Thread => "thread",
            Isolation::Pooled => "pooled",
            Isolation::Subprocess => "subprocess",
        }
    }
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Isolation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "thread" => Ok(Isolation::Thread),
            "pooled" | "pool" => Ok(Isolation::Pooled),
            "subprocess" | "process" => Ok(Isolation::Subprocess),
            other => Err(format!(
                "unknown isolation '{other}' (expected thread, pooled or subprocess)"
            )),
        }
    }
}

/// Configuration that governs how a single test case is executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSettings {
    /// Maximum wall-clock time in nanoseconds before the case is aborted.
    /// Default: 5,000,000,000 ns (5 seconds).
    pub timeout_ns: u64,

    /// Maximum number of bytes that may be written to stdout + stderr combined.
    /// Default: 1,048,576 bytes (1 MiB).
    pub max_output_bytes: usize,

    /// Python modules that submission code is permitted to import.
    /// Any other `import` fails the case with
    /// [`ExecutionError::ModuleNotAllowed`].
    pub allowed_modules: Vec<String>,

    /// Execution backend.
    #[serde(default)]
    pub isolation: Isolation,

    /// Program spawned as `<program> worker` by [`Isolation::Subprocess`].
    /// Usually the `codegrade` binary itself.
    #[serde(default)]
    pub worker_program: Option<PathBuf>,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            timeout_ns: DEFAULT_TIMEOUT_NS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            allowed_modules: DEFAULT_ALLOWED_MODULES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            isolation: Isolation::default(),
            worker_program: None,
        }
    }
}

/// The outcome of running one harness (submission + one test case).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Everything written to `sys.stdout` during execution (UTF-8).
    pub stdout: String,

    /// Everything written to `sys.stderr` during execution (UTF-8).
    pub stderr: String,

    /// `str()` of the entry point's return value; `None` if execution failed
    /// before the call returned.
    pub return_value: Option<String>,

    /// `None` on success; `Some(e)` if execution was terminated by an error.
    pub error: Option<ExecutionError>,

    /// Elapsed wall-clock time in nanoseconds.
    pub duration_ns: u64,
}

/// Structured failure produced when a harness run does not complete.
///
/// Serialized with an internally-tagged `"type"` discriminator so the worker
/// protocol and JSON consumers can switch on `error.type`.
///
/// ```json
/// {"type":"SyntaxError","message":"invalid syntax","line":1,"col":5}
/// {"type":"RuntimeError","message":"division by zero","traceback":"..."}
/// {"type":"Timeout","limit_ns":5000000000}
/// ```
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionError {
    /// The harness could not be parsed.
    #[error("{message}")]
    SyntaxError {
        message: String,
        /// 1-based line number, or 0 if unknown.
        line: u32,
        /// 1-based column number, or 0 if unknown.
        col: u32,
    },

    /// A Python exception escaped the submission.
    #[error("{message}")]
    RuntimeError {
        /// The exception's `str()` (e.g. `"division by zero"`).
        message: String,
        /// Python-formatted traceback, or empty if unavailable.
        traceback: String,
    },

    /// The case exceeded [`ExecutionSettings::timeout_ns`].
    #[error("execution timed out after {} ms", .limit_ns / 1_000_000)]
    Timeout { limit_ns: u64 },

    /// Combined output exceeded [`ExecutionSettings::max_output_bytes`].
    #[error("output limit of {limit_bytes} bytes exceeded")]
    OutputLimitExceeded { limit_bytes: usize },

    /// The submission imported a module outside the allowlist.
    #[error("import of module '{module_name}' is not allowed")]
    ModuleNotAllowed { module_name: String },

    /// The execution backend itself failed (worker crash, VM panic,
    /// unreadable worker response).
    #[error("sandbox failure: {message}")]
    SandboxFailure { message: String },
}

impl ExecutionError {
    /// Stable kind label used in grading reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionError::SyntaxError { .. } => "SyntaxError",
            ExecutionError::RuntimeError { .. } => "RuntimeError",
            ExecutionError::Timeout { .. } => "ExecutionTimeout",
            ExecutionError::OutputLimitExceeded { .. } => "OutputLimitExceeded",
            ExecutionError::ModuleNotAllowed { .. } => "ModuleNotAllowed",
            ExecutionError::SandboxFailure { .. } => "SandboxFailure",
        }
    }

    /// Full trace for the error. Runtime errors carry the Python traceback;
    /// the other kinds get a synthesized two-line trace in the same shape.
    pub fn trace(&self) -> String {
        match self {
            ExecutionError::RuntimeError { traceback, message } => {
                if traceback.is_empty() {
                    message.clone()
                } else {
                    traceback.clone()
                }
            }
            ExecutionError::SyntaxError { message, line, col } => format!(
                "  File \"<submission>\", line {line}, column {col}\nSyntaxError: {message}"
            ),
            other => format!("{}: {}", other.kind(), other),
        }
    }
}
