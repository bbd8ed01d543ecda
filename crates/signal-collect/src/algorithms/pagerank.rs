//! PageRank
//!
//! Each page signals its rank; a link divides that rank by the page's total
//! outgoing link weight. A page's rank is `(1 - d) + d * Σ incoming`, summed
//! over the most recent contribution of every in-neighbour.

use crate::edge::Edge;
use crate::error::VertexError;
use crate::vertex::{CollectContext, Vertex, VertexId};

/// Damping factor used by [`PageRankVertex::new`]
pub const DEFAULT_DAMPING: f64 = 0.85;

#[derive(Debug, Clone)]
pub struct PageRankVertex {
    id: VertexId,
    damping: f64,
    initial: f64,
}

impl PageRankVertex {
    /// A page starting at the base rank `1 - d`
    pub fn new(id: impl Into<VertexId>) -> Self {
        Self {
            id: id.into(),
            damping: DEFAULT_DAMPING,
            initial: 1.0 - DEFAULT_DAMPING,
        }
    }

    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    pub fn with_initial_rank(mut self, rank: f64) -> Self {
        self.initial = rank;
        self
    }

    pub fn damping(&self) -> f64 {
        self.damping
    }

    /// A link that passes on the source's rank in proportion to its weight
    pub fn link(source: impl Into<VertexId>, target: impl Into<VertexId>) -> Edge<f64> {
        Edge::<f64>::new(source, target).with_transform(|rank, ctx| {
            if ctx.out_weight_sum > 0.0 {
                rank * ctx.weight / ctx.out_weight_sum
            } else {
                0.0
            }
        })
    }
}

impl Vertex<f64, f64> for PageRankVertex {
    fn id(&self) -> VertexId {
        self.id
    }

    fn initial_state(&self) -> f64 {
        self.initial
    }

    fn collect(&self, ctx: &CollectContext<'_, f64, f64>) -> Result<f64, VertexError> {
        let incoming: f64 = ctx.most_recent_signals().sum();
        Ok((1.0 - self.damping) + self.damping * incoming)
    }

    fn signal(&self, state: &f64) -> Result<Option<f64>, VertexError> {
        Ok(Some(*state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::SignalContext;
    use std::collections::BTreeMap;

    #[test]
    fn test_defaults() {
        let page = PageRankVertex::new(1);
        assert_eq!(page.id(), VertexId::new(1));
        assert_eq!(page.damping(), 0.85);
        assert!((page.initial_state() - 0.15).abs() < 1e-12);
        assert_eq!(page.signal(&0.4).unwrap(), Some(0.4));
    }

    #[test]
    fn test_collect_sums_most_recent() {
        let page = PageRankVertex::new(2);
        let state = 0.15;
        let mut recent = BTreeMap::new();
        recent.insert(VertexId::new(1), 0.5);
        recent.insert(VertexId::new(3), 0.5);
        let signals = [0.5];

        let ctx = CollectContext::new(VertexId::new(2), &state, &signals, &recent, 1);
        let rank = page.collect(&ctx).unwrap();
        assert!((rank - (0.15 + 0.85)).abs() < 1e-12);
    }

    #[test]
    fn test_link_splits_by_weight() {
        let link = PageRankVertex::link(2, 3).with_weight(1.0);
        let ctx = SignalContext {
            source: VertexId::new(2),
            target: VertexId::new(3),
            weight: 1.0,
            out_degree: 2,
            out_weight_sum: 2.0,
        };
        assert_eq!(link.apply(&1.0, &ctx), 0.5);

        let ctx = SignalContext {
            weight: 0.0,
            out_weight_sum: 0.0,
            ..ctx
        };
        assert_eq!(link.apply(&1.0, &ctx), 0.0);
    }
}
