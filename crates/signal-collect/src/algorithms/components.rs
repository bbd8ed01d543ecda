//! Connected components
//!
//! Every vertex adopts the smallest id it hears about. Add edges in both
//! directions for undirected components.

use crate::edge::Edge;
use crate::error::VertexError;
use crate::vertex::{CollectContext, Vertex, VertexId};

#[derive(Debug, Clone)]
pub struct ComponentVertex {
    id: VertexId,
}

impl ComponentVertex {
    pub fn new(id: impl Into<VertexId>) -> Self {
        Self { id: id.into() }
    }

    /// Edges in both directions between `a` and `b`
    pub fn undirected(a: impl Into<VertexId>, b: impl Into<VertexId>) -> [Edge<i64>; 2] {
        let (a, b) = (a.into(), b.into());
        [Edge::new(a, b), Edge::new(b, a)]
    }
}

impl Vertex<i64, i64> for ComponentVertex {
    fn id(&self) -> VertexId {
        self.id
    }

    fn initial_state(&self) -> i64 {
        self.id.get()
    }

    fn collect(&self, ctx: &CollectContext<'_, i64, i64>) -> Result<i64, VertexError> {
        Ok(ctx.signals().iter().copied().fold(*ctx.state(), i64::min))
    }

    fn signal(&self, state: &i64) -> Result<Option<i64>, VertexError> {
        Ok(Some(*state))
    }
}
