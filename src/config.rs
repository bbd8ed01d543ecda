//! # Configuration Module
//!
//! Loads the runner's execution settings from environment variables
//! (optionally via a `.env` file). Command-line flags override them later
//! in `main`.
//!
//! | Variable                       | Meaning                          |
//! |--------------------------------|----------------------------------|
//! | `SIGNAL_COLLECT_MODE`          | `synchronous` or `asynchronous`  |
//! | `SIGNAL_COLLECT_WORKERS`       | worker task count                |
//! | `SIGNAL_COLLECT_THRESHOLD`     | convergence threshold            |
//! | `SIGNAL_COLLECT_MAX_STEPS`     | step bound                       |
//! | `SIGNAL_COLLECT_TIME_LIMIT_MS` | time bound in milliseconds       |

use std::env;
use std::str::FromStr;
use std::time::Duration;

use signal_collect::{ExecutionConfig, ExecutionMode};
use thiserror::Error;

pub const MODE_VAR: &str = "SIGNAL_COLLECT_MODE";
pub const WORKERS_VAR: &str = "SIGNAL_COLLECT_WORKERS";
pub const THRESHOLD_VAR: &str = "SIGNAL_COLLECT_THRESHOLD";
pub const MAX_STEPS_VAR: &str = "SIGNAL_COLLECT_MAX_STEPS";
pub const TIME_LIMIT_VAR: &str = "SIGNAL_COLLECT_TIME_LIMIT_MS";

// =============================================================================
// ERRORS
// =============================================================================
/// # Rust Concept: Library-style Errors in an Application
///
/// `thiserror` derives `std::error::Error` and `Display` for an enum, so
/// callers can match on the variant while `anyhow` can still wrap it.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has invalid value {value:?}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid execution settings: {0}")]
    Invalid(#[from] signal_collect::GraphError),
}

// =============================================================================
// CONFIGURATION STRUCT
// =============================================================================
/// Execution settings for one run of the driver
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    pub mode: ExecutionMode,
    pub workers: usize,
    pub threshold: f64,
    pub max_steps: Option<usize>,
    pub time_limit: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        let defaults = ExecutionConfig::default();
        Self {
            mode: defaults.mode,
            workers: defaults.worker_count,
            threshold: defaults.convergence_threshold,
            max_steps: defaults.max_steps,
            time_limit: defaults.time_limit,
        }
    }
}

// =============================================================================
// CONFIGURATION LOADING
// =============================================================================
impl RunnerConfig {
    /// Load configuration from the environment.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    ///
    /// # Example
    /// ```ignore
    /// let config = RunnerConfig::from_env()?;
    /// println!("Running with {} workers", config.workers);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        // Missing .env is fine
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// # Rust Concept: Closures as Parameters
    ///
    /// Taking `impl Fn(&str) -> Option<String>` lets tests pass a map
    /// instead of touching the real process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = RunnerConfig::default();

        if let Some(value) = lookup(MODE_VAR) {
            config.mode = parse_mode(&value)?;
        }

        if let Some(workers) = parse_var::<usize>(&lookup, WORKERS_VAR)? {
            config.workers = workers;
        }

        if let Some(threshold) = parse_var::<f64>(&lookup, THRESHOLD_VAR)? {
            config.threshold = threshold;
        }

        if let Some(max_steps) = parse_var::<usize>(&lookup, MAX_STEPS_VAR)? {
            config.max_steps = Some(max_steps);
        }

        if let Some(millis) = parse_var::<u64>(&lookup, TIME_LIMIT_VAR)? {
            config.time_limit = Some(Duration::from_millis(millis));
        }

        Ok(config)
    }

    /// Engine configuration for these settings
    pub fn execution_config(&self) -> ExecutionConfig {
        let mut config = ExecutionConfig::new()
            .with_mode(self.mode)
            .with_worker_count(self.workers)
            .with_convergence_threshold(self.threshold);
        if let Some(max_steps) = self.max_steps {
            config = config.with_max_steps(max_steps);
        }
        if let Some(limit) = self.time_limit {
            config = config.with_time_limit(limit);
        }
        config
    }

    /// Fail fast on settings the engine would reject
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.execution_config().validate()?;
        Ok(())
    }
}

fn parse_mode(value: &str) -> Result<ExecutionMode, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "synchronous" | "sync" => Ok(ExecutionMode::Synchronous),
        "asynchronous" | "async" => Ok(ExecutionMode::Asynchronous),
        _ => Err(ConfigError::InvalidValue {
            var: MODE_VAR,
            value: value.to_string(),
            reason: "expected synchronous or asynchronous".to_string(),
        }),
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                var,
                value,
                reason: e.to_string(),
            }),
    }
}
