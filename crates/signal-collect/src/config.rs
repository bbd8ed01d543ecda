//! Execution and graph configuration
//!
//! `ExecutionConfig` controls a single `execute` call: execution mode,
//! convergence threshold, step and time bounds, and worker count.
//! `GraphConfig` controls how the graph store reacts to duplicate vertices
//! and edges whose target does not exist.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::GraphError;

/// How supersteps are scheduled across workers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Lock-step supersteps separated by a barrier.
    /// Vertices that received signals in superstep N run in superstep N+1.
    Synchronous,

    /// Event-driven: a vertex is scheduled as soon as a signal arrives.
    /// Terminates on confirmed quiescence.
    #[default]
    Asynchronous,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Synchronous => write!(f, "synchronous"),
            ExecutionMode::Asynchronous => write!(f, "asynchronous"),
        }
    }
}

/// Configuration for one execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Synchronous or asynchronous scheduling
    pub mode: ExecutionMode,

    /// A vertex signals only while its signal score exceeds this value
    pub convergence_threshold: f64,

    /// Maximum supersteps (synchronous) or rounds per worker (asynchronous)
    pub max_steps: Option<usize>,

    /// Wall-clock budget for the whole execution
    #[serde(default, with = "humantime_serde")]
    pub time_limit: Option<Duration>,

    /// Number of worker tasks (one partition each)
    pub worker_count: usize,

    /// Outstanding signal count at which a backlog warning is logged
    pub signal_high_watermark: Option<usize>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            convergence_threshold: 0.001,
            max_steps: None,
            time_limit: None,
            worker_count: num_cpus::get(),
            signal_high_watermark: Some(1_000_000),
        }
    }
}

impl ExecutionConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a synchronous configuration
    pub fn synchronous() -> Self {
        Self::default().with_mode(ExecutionMode::Synchronous)
    }

    /// Shorthand for an asynchronous configuration
    pub fn asynchronous() -> Self {
        Self::default().with_mode(ExecutionMode::Asynchronous)
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = threshold;
        self
    }

    pub fn with_max_steps(mut self, max: usize) -> Self {
        self.max_steps = Some(max);
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Set the worker count (validated on execute, zero is rejected)
    pub fn with_worker_count(mut self, workers: usize) -> Self {
        self.worker_count = workers;
        self
    }

    pub fn with_signal_high_watermark(mut self, watermark: usize) -> Self {
        self.signal_high_watermark = Some(watermark);
        self
    }

    /// Check the configuration before any worker is started
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.worker_count == 0 {
            return Err(GraphError::invalid_configuration(
                "worker count must be at least 1",
            ));
        }
        if !self.convergence_threshold.is_finite() || self.convergence_threshold < 0.0 {
            return Err(GraphError::invalid_configuration(format!(
                "convergence threshold must be finite and non-negative, got {}",
                self.convergence_threshold
            )));
        }
        if self.max_steps == Some(0) {
            return Err(GraphError::invalid_configuration(
                "max steps must be at least 1",
            ));
        }
        if self.time_limit == Some(Duration::ZERO) {
            return Err(GraphError::invalid_configuration(
                "time limit must be non-zero",
            ));
        }
        if self.signal_high_watermark == Some(0) {
            return Err(GraphError::invalid_configuration(
                "signal high watermark must be at least 1",
            ));
        }
        Ok(())
    }
}

/// What `add_vertex` does when the id is already present
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicateVertexPolicy {
    /// Fail with `DuplicateVertex`
    #[default]
    Reject,
    /// Replace behaviour and state, keeping already-added outgoing edges
    Replace,
}

/// What `add_edge` does when the target vertex is absent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingTargetPolicy {
    /// Fail with `UnknownTargetVertex`
    #[default]
    Reject,
    /// Create the target through the graph's vertex factory
    CreateOnDemand,
}

/// Graph store configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    pub duplicate_vertices: DuplicateVertexPolicy,
    pub missing_targets: MissingTargetPolicy,
}

impl GraphConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duplicate_vertices(mut self, policy: DuplicateVertexPolicy) -> Self {
        self.duplicate_vertices = policy;
        self
    }

    pub fn with_missing_targets(mut self, policy: MissingTargetPolicy) -> Self {
        self.missing_targets = policy;
        self
    }
}
