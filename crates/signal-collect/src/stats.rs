//! Execution statistics
//!
//! An immutable snapshot produced once per `execute` call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::config::ExecutionMode;

/// Why an execution stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// No vertex active and no signal in flight
    Converged,
    /// Step bound hit before convergence
    MaxStepsReached,
    /// Time bound hit before convergence
    TimeLimitReached,
}

impl TerminationReason {
    pub fn is_converged(&self) -> bool {
        matches!(self, TerminationReason::Converged)
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Converged => write!(f, "converged"),
            TerminationReason::MaxStepsReached => write!(f, "max steps reached"),
            TerminationReason::TimeLimitReached => write!(f, "time limit reached"),
        }
    }
}

/// Result of one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStatistics {
    /// Unique identifier of this execution (shows up in log fields)
    pub execution_id: String,
    pub mode: ExecutionMode,
    pub worker_count: usize,
    pub vertex_count: usize,
    pub edge_count: usize,
    /// Signals enqueued along edges
    pub signals_sent: u64,
    /// Signals consumed by collect (or discarded by failed vertices)
    pub signals_collected: u64,
    /// Signal steps executed (vertex scored above threshold)
    pub signal_operations: u64,
    /// Collect steps executed
    pub collect_operations: u64,
    /// Supersteps (synchronous) or maximum rounds of any worker (asynchronous)
    pub steps: usize,
    pub duration_millis: u64,
    pub converged: bool,
    pub termination: TerminationReason,
    /// Vertices whose collect or signal failed
    pub failed_vertices: usize,
    /// Vertices whose signal score is at or below the threshold at the end
    pub converged_vertices: usize,
    pub started_at: DateTime<Utc>,
}

impl ExecutionStatistics {
    /// Signals that were sent but never collected
    ///
    /// Zero after convergence; may be positive after a bounded stop.
    pub fn signals_in_flight(&self) -> u64 {
        self.signals_sent.saturating_sub(self.signals_collected)
    }
}

impl fmt::Display for ExecutionStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Execution {}", self.execution_id)?;
        writeln!(f, "  mode:               {}", self.mode)?;
        writeln!(f, "  workers:            {}", self.worker_count)?;
        writeln!(f, "  vertices:           {}", self.vertex_count)?;
        writeln!(f, "  edges:              {}", self.edge_count)?;
        writeln!(f, "  signals sent:       {}", self.signals_sent)?;
        writeln!(f, "  signals collected:  {}", self.signals_collected)?;
        writeln!(f, "  signal operations:  {}", self.signal_operations)?;
        writeln!(f, "  collect operations: {}", self.collect_operations)?;
        writeln!(f, "  steps:              {}", self.steps)?;
        writeln!(f, "  duration:           {} ms", self.duration_millis)?;
        writeln!(f, "  failed vertices:    {}", self.failed_vertices)?;
        writeln!(f, "  converged vertices: {}", self.converged_vertices)?;
        write!(
            f,
            "  converged:          {} ({})",
            self.converged, self.termination
        )
    }
}
