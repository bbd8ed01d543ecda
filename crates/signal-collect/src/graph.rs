//! Graph façade
//!
//! The single entry point applications use: build a graph, execute it,
//! inspect the results, shut it down.
//!
//! # Lifecycle
//!
//! ```text
//! new ──► add_vertex / add_edge ──► execute ──► state / for_vertex_with_id ──► shutdown
//!                                      ▲                   │
//!                                      └────── reset ◄─────┘
//! ```
//!
//! Topology is frozen by the first `execute`. A second `execute` needs a
//! `reset` in between.

use std::sync::Arc;

use super::config::{ExecutionConfig, GraphConfig};
use super::coordinator;
use super::edge::Edge;
use super::error::GraphError;
use super::signal::SignalMessage;
use super::stats::ExecutionStatistics;
use super::store::{GraphStore, VertexFactory, VertexView};
use super::vertex::{BoxedVertex, StateValue, Vertex, VertexId};

/// A signal/collect graph
///
/// # Example
///
/// ```ignore
/// let mut graph = Graph::new();
/// graph.add_vertex(PageRankVertex::new(1))?;
/// graph.add_vertex(PageRankVertex::new(2))?;
/// graph.add_edge(PageRankVertex::link(1, 2))?;
///
/// let stats = graph.execute(ExecutionConfig::synchronous()).await?;
/// graph.for_vertex_with_id(1, |v| println!("{}", v))?;
/// graph.shutdown();
/// ```
pub struct Graph<S, M> {
    store: GraphStore<S, M>,
    executed: bool,
    frozen: bool,
    last_statistics: Option<ExecutionStatistics>,
}

impl<S: StateValue, M: SignalMessage> Graph<S, M> {
    /// Create an empty graph with the default store policies
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            store: GraphStore::new(config),
            executed: false,
            frozen: false,
            last_statistics: None,
        }
    }

    /// Set the factory that creates missing edge targets
    ///
    /// Only consulted with `MissingTargetPolicy::CreateOnDemand`.
    pub fn with_vertex_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(VertexId) -> BoxedVertex<S, M> + Send + Sync + 'static,
    {
        let factory: VertexFactory<S, M> = Arc::new(factory);
        self.store.set_vertex_factory(factory);
        self
    }

    pub fn config(&self) -> &GraphConfig {
        self.store.config()
    }

    /// Add a vertex
    pub fn add_vertex<V>(&mut self, vertex: V) -> Result<(), GraphError>
    where
        V: Vertex<S, M> + 'static,
    {
        self.add_boxed_vertex(Arc::new(vertex))
    }

    /// Add an already boxed vertex
    pub fn add_boxed_vertex(&mut self, vertex: BoxedVertex<S, M>) -> Result<(), GraphError> {
        if self.frozen {
            return Err(GraphError::TopologyFrozen);
        }
        self.store.add_vertex(vertex)
    }

    /// Add a directed edge; its source must already exist
    pub fn add_edge(&mut self, edge: Edge<M>) -> Result<(), GraphError> {
        if self.frozen {
            return Err(GraphError::TopologyFrozen);
        }
        self.store.add_edge(edge)
    }

    /// Run the signal/collect computation
    ///
    /// Blocks the caller (by awaiting) until the graph converges or a
    /// configured bound is hit. Configuration errors are reported before
    /// any work starts and leave the graph executable.
    pub async fn execute(&mut self, config: ExecutionConfig) -> Result<ExecutionStatistics, GraphError> {
        if self.executed {
            return Err(GraphError::AlreadyExecuted);
        }
        config.validate()?;

        self.frozen = true;
        self.executed = true;
        let stats = coordinator::execute(&mut self.store, &config).await?;
        self.last_statistics = Some(stats.clone());
        Ok(stats)
    }

    /// Statistics of the most recent successful execution
    pub fn last_statistics(&self) -> Option<&ExecutionStatistics> {
        self.last_statistics.as_ref()
    }

    /// Return every vertex to its initial state so the graph can run again
    ///
    /// Topology stays frozen.
    pub fn reset(&mut self) {
        self.store.reset();
        self.executed = false;
        self.last_statistics = None;
    }

    /// Current state of a vertex
    pub fn state(&self, id: impl Into<VertexId>) -> Result<S, GraphError> {
        let id = id.into();
        self.store
            .get(id)
            .map(|view| view.state().clone())
            .ok_or(GraphError::VertexNotFound(id))
    }

    /// Look up a single vertex without enumerating the graph
    pub fn for_vertex_with_id<F, R>(&self, id: impl Into<VertexId>, f: F) -> Result<R, GraphError>
    where
        F: FnOnce(&VertexView<'_, S, M>) -> R,
    {
        let id = id.into();
        let view = self.store.get(id).ok_or(GraphError::VertexNotFound(id))?;
        Ok(f(&view))
    }

    /// Visit every vertex in ascending id order
    pub fn for_each_vertex<F>(&self, mut f: F)
    where
        F: FnMut(&VertexView<'_, S, M>),
    {
        for view in self.store.iter() {
            f(&view);
        }
    }

    pub fn contains(&self, id: impl Into<VertexId>) -> bool {
        self.store.contains(id.into())
    }

    pub fn vertex_count(&self) -> usize {
        self.store.len()
    }

    pub fn edge_count(&self) -> usize {
        self.store.edge_count()
    }

    pub fn is_executed(&self) -> bool {
        self.executed
    }

    /// Release the graph and everything it owns
    pub fn shutdown(self) {
        tracing::debug!(
            vertices = self.store.len(),
            edges = self.store.edge_count(),
            "Graph shut down"
        );
    }
}

impl<S: StateValue, M: SignalMessage> Default for Graph<S, M> {
    fn default() -> Self {
        Self::new()
    }
}
