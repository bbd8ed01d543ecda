//! Single-source shortest path
//!
//! State is the best known distance from the source (infinite until
//! reached). Edge weights are path lengths.

use crate::edge::Edge;
use crate::error::VertexError;
use crate::vertex::{CollectContext, Vertex, VertexId};

#[derive(Debug, Clone)]
pub struct ShortestPathVertex {
    id: VertexId,
    is_source: bool,
}

impl ShortestPathVertex {
    pub fn new(id: impl Into<VertexId>) -> Self {
        Self {
            id: id.into(),
            is_source: false,
        }
    }

    /// The vertex distances are measured from
    pub fn source(id: impl Into<VertexId>) -> Self {
        Self {
            id: id.into(),
            is_source: true,
        }
    }

    /// A road of the given length; negative lengths are not supported
    pub fn road(source: impl Into<VertexId>, target: impl Into<VertexId>, length: f64) -> Edge<f64> {
        Edge::<f64>::new(source, target)
            .with_weight(length)
            .with_transform(|distance, ctx| distance + ctx.weight)
    }
}

impl Vertex<f64, f64> for ShortestPathVertex {
    fn id(&self) -> VertexId {
        self.id
    }

    fn initial_state(&self) -> f64 {
        if self.is_source {
            0.0
        } else {
            f64::INFINITY
        }
    }

    fn collect(&self, ctx: &CollectContext<'_, f64, f64>) -> Result<f64, VertexError> {
        Ok(ctx.signals().iter().copied().fold(*ctx.state(), f64::min))
    }

    fn signal(&self, state: &f64) -> Result<Option<f64>, VertexError> {
        if state.is_finite() {
            Ok(Some(*state))
        } else {
            Ok(None)
        }
    }
}
