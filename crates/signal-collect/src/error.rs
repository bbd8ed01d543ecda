//! Error types for the signal/collect engine
//!
//! Build-time and call-time failures surface synchronously through
//! [`GraphError`]. Failures inside a single vertex's `collect` or `signal`
//! are reported as [`VertexError`] and isolated to that vertex.

use thiserror::Error;

use super::vertex::VertexId;

/// Errors returned by graph construction, inspection and execution
#[derive(Debug, Error)]
pub enum GraphError {
    /// A vertex with this id was already added
    #[error("Duplicate vertex: {0}")]
    DuplicateVertex(VertexId),

    /// Edge source does not exist in the graph
    #[error("Unknown source vertex: {0}")]
    UnknownSourceVertex(VertexId),

    /// Edge target does not exist and the graph does not create targets on demand
    #[error("Unknown target vertex: {0}")]
    UnknownTargetVertex(VertexId),

    /// Lookup of a vertex that is not in the graph
    #[error("Vertex not found: {0}")]
    VertexNotFound(VertexId),

    /// `execute` was called again without an intervening `reset`
    #[error("Graph has already been executed; call reset() before executing again")]
    AlreadyExecuted,

    /// Topology changes after the first execution
    #[error("Graph topology is frozen after execution")]
    TopologyFrozen,

    /// Invalid execution or graph configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Fatal worker-pool condition; aborts the whole execution
    #[error("Worker {worker} failed: {message}")]
    WorkerFailure { worker: usize, message: String },
}

impl GraphError {
    /// Create an invalid configuration error
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    /// Create a worker failure error
    pub fn worker_failure(worker: usize, message: impl Into<String>) -> Self {
        Self::WorkerFailure {
            worker,
            message: message.into(),
        }
    }

    /// Check if the error was raised while building the graph
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            GraphError::DuplicateVertex(_)
                | GraphError::UnknownSourceVertex(_)
                | GraphError::UnknownTargetVertex(_)
                | GraphError::TopologyFrozen
        )
    }

    /// Check if the error aborted a running execution
    pub fn is_fatal(&self) -> bool {
        matches!(self, GraphError::WorkerFailure { .. })
    }
}

/// Failure of a single vertex's `collect` or `signal` step
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct VertexError {
    message: String,
}

impl VertexError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Build an error from a caught panic payload
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            format!("panicked: {}", s)
        } else if let Some(s) = payload.downcast_ref::<String>() {
            format!("panicked: {}", s)
        } else {
            "panicked".to_string()
        };
        Self { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
