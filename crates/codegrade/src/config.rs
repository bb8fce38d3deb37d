//! Grader configuration: TOML file plus environment overrides.
//!
//! ```toml
//! [sandbox]
//! timeout_ms = 2000
//! max_output_bytes = 65536
//! allowed_modules = ["math", "collections"]
//! isolation = "subprocess"
//! worker_program = "/usr/local/bin/codegrade"
//!
//! [resolver]
//! strategy = "syntax"
//! ```
//!
//! Every key is optional. Environment variables override the file:
//! `CODEGRADE_TIMEOUT_MS`, `CODEGRADE_MAX_OUTPUT_BYTES`,
//! `CODEGRADE_ISOLATION`, `CODEGRADE_RESOLVER`.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::resolver::ResolverStrategy;
use crate::types::{
    ExecutionSettings, Isolation, DEFAULT_ALLOWED_MODULES, DEFAULT_MAX_OUTPUT_BYTES,
    DEFAULT_TIMEOUT_NS,
};

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "codegrade.toml";

const NS_PER_MS: u64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub timeout_ms: u64,
    pub max_output_bytes: usize,
    pub allowed_modules: Vec<String>,
    /// Unset means the library default, so callers can pick their own.
    pub isolation: Option<Isolation>,
    pub worker_program: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_NS / NS_PER_MS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            allowed_modules: DEFAULT_ALLOWED_MODULES.iter().map(|s| s.to_string()).collect(),
            isolation: None,
            worker_program: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub strategy: ResolverStrategy,
}

/// Everything a [`Grader`](crate::grader::Grader) can be configured with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraderConfig {
    pub sandbox: SandboxConfig,
    pub resolver: ResolverConfig,
}

impl GraderConfig {
    /// Load from `path`, or from `codegrade.toml` in the working directory if
    /// it exists, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let local = PathBuf::from(DEFAULT_CONFIG_FILE);
                local.is_file().then_some(local)
            }
        };

        let mut config = match path {
            Some(path) => {
                let content =
                    std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                        path: path.clone(),
                        source,
                    })?;
                let config = Self::from_toml_str(&content)
                    .map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
                debug!(path = %path.display(), "loaded grader config");
                config
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Override fields from `lookup`, called with each `CODEGRADE_*` key.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("CODEGRADE_TIMEOUT_MS") {
            self.sandbox.timeout_ms = parse_value("CODEGRADE_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("CODEGRADE_MAX_OUTPUT_BYTES") {
            self.sandbox.max_output_bytes = parse_value("CODEGRADE_MAX_OUTPUT_BYTES", &value)?;
        }
        if let Some(value) = lookup("CODEGRADE_ISOLATION") {
            self.sandbox.isolation = Some(parse_value("CODEGRADE_ISOLATION", &value)?);
        }
        if let Some(value) = lookup("CODEGRADE_RESOLVER") {
            self.resolver.strategy = parse_value("CODEGRADE_RESOLVER", &value)?;
        }
        Ok(())
    }

    pub fn to_execution_settings(&self) -> ExecutionSettings {
        ExecutionSettings {
            timeout_ns: self.sandbox.timeout_ms.saturating_mul(NS_PER_MS),
            max_output_bytes: self.sandbox.max_output_bytes,
            allowed_modules: self.sandbox.allowed_modules.clone(),
            isolation: self.sandbox.isolation.unwrap_or_default(),
            worker_program: self.sandbox.worker_program.clone(),
        }
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|err: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: err.to_string(),
        })
}
