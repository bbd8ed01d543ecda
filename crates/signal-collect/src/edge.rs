//! Directed edges and their signal transforms

use std::fmt;
use std::sync::Arc;

use super::vertex::VertexId;

/// Information about the edge a signal is travelling along
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalContext {
    pub source: VertexId,
    pub target: VertexId,
    /// Weight of this edge
    pub weight: f64,
    /// Number of outgoing edges of the source vertex
    pub out_degree: usize,
    /// Sum of the weights of all outgoing edges of the source vertex
    pub out_weight_sum: f64,
}

/// Function applied to a vertex's signal before delivery along one edge
pub type SignalTransform<M> = Arc<dyn Fn(&M, &SignalContext) -> M + Send + Sync>;

/// A directed edge from `source` to `target`
///
/// Edges are immutable once added to a graph.
pub struct Edge<M> {
    source: VertexId,
    target: VertexId,
    weight: f64,
    transform: Option<SignalTransform<M>>,
}

impl<M> Edge<M> {
    /// Create an edge with weight 1.0 that forwards signals unchanged
    pub fn new(source: impl Into<VertexId>, target: impl Into<VertexId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            weight: 1.0,
            transform: None,
        }
    }

    /// Set the edge weight
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Set the signal transform
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&M, &SignalContext) -> M + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn source(&self) -> VertexId {
        self.source
    }

    pub fn target(&self) -> VertexId {
        self.target
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn has_transform(&self) -> bool {
        self.transform.is_some()
    }
}

impl<M: Clone> Edge<M> {
    /// Produce the payload delivered to the target
    pub fn apply(&self, payload: &M, ctx: &SignalContext) -> M {
        match &self.transform {
            Some(transform) => transform(payload, ctx),
            None => payload.clone(),
        }
    }
}

impl<M> Clone for Edge<M> {
    fn clone(&self) -> Self {
        Self {
            source: self.source,
            target: self.target,
            weight: self.weight,
            transform: self.transform.clone(),
        }
    }
}

impl<M> fmt::Debug for Edge<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Edge")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("weight", &self.weight)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}
