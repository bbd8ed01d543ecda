//! Vertex abstractions for the signal/collect engine
//!
//! A vertex holds application state and two operations: `collect` folds
//! arrived signals into a new state, `signal` derives the payload sent along
//! every outgoing edge. The engine owns vertex state; a [`Vertex`]
//! implementation only describes behaviour.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use super::error::VertexError;
use super::signal::SignalMessage;

/// Unique, totally ordered identifier for a vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VertexId(pub i64);

impl VertexId {
    /// Create a new VertexId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw id
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for VertexId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<i32> for VertexId {
    fn from(id: i32) -> Self {
        Self(i64::from(id))
    }
}

impl From<u32> for VertexId {
    fn from(id: u32) -> Self {
        Self(i64::from(id))
    }
}

impl std::fmt::Display for VertexId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trait bound for vertex state
///
/// `delta` measures how far a state moved from a previous one. The engine
/// compares it against the convergence threshold to decide whether a vertex
/// signals or goes dormant.
pub trait StateValue: Clone + Debug + Send + Sync + 'static {
    /// Magnitude of the change from `previous` to `self` (never negative)
    fn delta(&self, previous: &Self) -> f64;
}

impl StateValue for f64 {
    fn delta(&self, previous: &Self) -> f64 {
        // inf - inf is NaN; identical states never moved
        if self == previous {
            0.0
        } else {
            (self - previous).abs()
        }
    }
}

impl StateValue for f32 {
    fn delta(&self, previous: &Self) -> f64 {
        f64::from(*self).delta(&f64::from(*previous))
    }
}

macro_rules! integer_state_value {
    ($($t:ty),*) => {
        $(
            impl StateValue for $t {
                fn delta(&self, previous: &Self) -> f64 {
                    (*self as f64 - *previous as f64).abs()
                }
            }
        )*
    };
}

integer_state_value!(i32, i64, u32, u64, usize);

impl StateValue for bool {
    fn delta(&self, previous: &Self) -> f64 {
        if self == previous {
            0.0
        } else {
            1.0
        }
    }
}

impl<T: StateValue> StateValue for Option<T> {
    fn delta(&self, previous: &Self) -> f64 {
        match (self, previous) {
            (None, None) => 0.0,
            (Some(a), Some(b)) => a.delta(b),
            _ => f64::INFINITY,
        }
    }
}

/// Scheduling status of a vertex
///
/// - `Active`: Vertex signalled in its last step and may change neighbours
/// - `Dormant`: Delta fell to or below the threshold (reactivates on signal receipt)
/// - `Failed`: `collect` or `signal` failed; the vertex is excluded from execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VertexStatus {
    #[default]
    Active,
    Dormant,
    Failed,
}

impl VertexStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, VertexStatus::Active)
    }

    pub fn is_dormant(&self) -> bool {
        matches!(self, VertexStatus::Dormant)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, VertexStatus::Failed)
    }
}

/// Context provided to a vertex during `collect`
///
/// Provides access to:
/// - The signals that arrived since the last collect
/// - The most recent signal from every source that ever signalled this vertex
/// - The current state and step number
pub struct CollectContext<'a, S, M: SignalMessage> {
    vertex_id: VertexId,
    state: &'a S,
    signals: &'a [M],
    most_recent: &'a BTreeMap<VertexId, M>,
    step: usize,
}

impl<'a, S, M: SignalMessage> CollectContext<'a, S, M> {
    /// Create a new collect context
    pub fn new(
        vertex_id: VertexId,
        state: &'a S,
        signals: &'a [M],
        most_recent: &'a BTreeMap<VertexId, M>,
        step: usize,
    ) -> Self {
        Self {
            vertex_id,
            state,
            signals,
            most_recent,
            step,
        }
    }

    pub fn id(&self) -> VertexId {
        self.vertex_id
    }

    /// State before this collect
    pub fn state(&self) -> &S {
        self.state
    }

    /// Signals that arrived since the previous collect, in arrival order
    pub fn signals(&self) -> &[M] {
        self.signals
    }

    /// Latest signal per source, ordered by source id
    pub fn most_recent_signals(&self) -> impl Iterator<Item = &M> + '_ {
        self.most_recent.values()
    }

    /// Latest signal received from a specific source
    pub fn most_recent_from(&self, source: VertexId) -> Option<&M> {
        self.most_recent.get(&source)
    }

    /// Superstep (synchronous) or round (asynchronous) number, 0-indexed
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    pub fn has_signals(&self) -> bool {
        !self.signals.is_empty()
    }
}

/// The core vertex trait
///
/// # Type Parameters
///
/// - `S`: The vertex state type
/// - `M`: The signal payload type
///
/// # Example
///
/// ```ignore
/// struct MaxVertex {
///     id: VertexId,
///     initial: i64,
/// }
///
/// impl Vertex<i64, i64> for MaxVertex {
///     fn id(&self) -> VertexId {
///         self.id
///     }
///
///     fn initial_state(&self) -> i64 {
///         self.initial
///     }
///
///     fn collect(&self, ctx: &CollectContext<'_, i64, i64>) -> Result<i64, VertexError> {
///         Ok(ctx.signals().iter().copied().fold(*ctx.state(), i64::max))
///     }
///
///     fn signal(&self, state: &i64) -> Result<Option<i64>, VertexError> {
///         Ok(Some(*state))
///     }
/// }
/// ```
pub trait Vertex<S, M>: Send + Sync
where
    S: StateValue,
    M: SignalMessage,
{
    /// Get the vertex's unique identifier
    fn id(&self) -> VertexId;

    /// State the vertex starts with (and returns to on reset)
    fn initial_state(&self) -> S;

    /// Fold arrived signals into a new state
    fn collect(&self, ctx: &CollectContext<'_, S, M>) -> Result<S, VertexError>;

    /// Payload to send along every outgoing edge, `None` to stay silent
    fn signal(&self, state: &S) -> Result<Option<M>, VertexError>;

    /// Score deciding whether the vertex signals
    ///
    /// The vertex signals when the score exceeds the convergence threshold.
    /// Defaults to the state delta since the last signal, or infinity if the
    /// vertex never signalled.
    fn score_signal(&self, state: &S, last_signal_state: Option<&S>) -> f64 {
        match last_signal_state {
            Some(previous) => state.delta(previous),
            None => f64::INFINITY,
        }
    }
}

/// Boxed vertex for dynamic dispatch
pub type BoxedVertex<S, M> = Arc<dyn Vertex<S, M>>;
