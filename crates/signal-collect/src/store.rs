//! Graph store
//!
//! The authoritative map of vertex id to vertex, including each vertex's
//! outgoing edges and engine bookkeeping. During an execution the store
//! hands its vertices to the workers as disjoint partitions and takes them
//! back afterwards; between executions it is the only owner.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use super::config::{DuplicateVertexPolicy, GraphConfig, MissingTargetPolicy};
use super::edge::Edge;
use super::error::GraphError;
use super::scheduler::should_signal;
use super::signal::{partition_of, SignalMessage};
use super::vertex::{BoxedVertex, StateValue, VertexId, VertexStatus};

/// Creates target vertices for `MissingTargetPolicy::CreateOnDemand`
pub type VertexFactory<S, M> = Arc<dyn Fn(VertexId) -> BoxedVertex<S, M> + Send + Sync>;

/// A vertex together with its state and engine bookkeeping
pub(crate) struct VertexEntry<S, M> {
    pub(crate) vertex: BoxedVertex<S, M>,
    pub(crate) state: S,
    /// State at the time of the last signal
    pub(crate) last_signal_state: Option<S>,
    pub(crate) status: VertexStatus,
    pub(crate) outgoing: Vec<Edge<M>>,
    /// Signals delivered but not yet collected, with their source
    pub(crate) uncollected: Vec<(VertexId, M)>,
    /// Latest signal per source
    pub(crate) most_recent: BTreeMap<VertexId, M>,
}

impl<S: StateValue, M: SignalMessage> VertexEntry<S, M> {
    fn new(vertex: BoxedVertex<S, M>) -> Self {
        let state = vertex.initial_state();
        Self {
            vertex,
            state,
            last_signal_state: None,
            status: VertexStatus::Active,
            outgoing: Vec::new(),
            uncollected: Vec::new(),
            most_recent: BTreeMap::new(),
        }
    }

    /// Return to the initial state, keeping edges
    fn reset(&mut self) {
        self.state = self.vertex.initial_state();
        self.last_signal_state = None;
        self.status = VertexStatus::Active;
        self.uncollected.clear();
        self.most_recent.clear();
    }
}

/// Read-only view of a vertex
///
/// Handed to inspection closures; there is no way to mutate the vertex
/// through it.
pub struct VertexView<'a, S, M> {
    id: VertexId,
    entry: &'a VertexEntry<S, M>,
}

impl<'a, S, M> VertexView<'a, S, M> {
    pub fn id(&self) -> VertexId {
        self.id
    }

    pub fn state(&self) -> &'a S {
        &self.entry.state
    }

    pub fn status(&self) -> VertexStatus {
        self.entry.status
    }

    /// State at the time the vertex last signalled
    pub fn last_signal_state(&self) -> Option<&'a S> {
        self.entry.last_signal_state.as_ref()
    }

    pub fn outgoing_edges(&self) -> &'a [Edge<M>] {
        &self.entry.outgoing
    }

    pub fn out_degree(&self) -> usize {
        self.entry.outgoing.len()
    }

    /// Signals delivered but not collected (non-zero only after a bounded stop)
    pub fn uncollected_signals(&self) -> usize {
        self.entry.uncollected.len()
    }
}

impl<S: fmt::Debug, M> fmt::Display for VertexView<'_, S, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Vertex(id={}, state={:?}, status={:?})",
            self.id, self.entry.state, self.entry.status
        )
    }
}

/// One worker's share of the vertices
pub(crate) type Partition<S, M> = BTreeMap<VertexId, VertexEntry<S, M>>;

/// Authoritative vertex and adjacency storage
pub struct GraphStore<S, M> {
    vertices: BTreeMap<VertexId, VertexEntry<S, M>>,
    config: GraphConfig,
    factory: Option<VertexFactory<S, M>>,
    edge_count: usize,
}

impl<S: StateValue, M: SignalMessage> GraphStore<S, M> {
    pub fn new(config: GraphConfig) -> Self {
        Self {
            vertices: BTreeMap::new(),
            config,
            factory: None,
            edge_count: 0,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Set the factory used to create missing edge targets
    pub fn set_vertex_factory(&mut self, factory: VertexFactory<S, M>) {
        self.factory = Some(factory);
    }

    /// Add a vertex
    ///
    /// A duplicate id fails with `DuplicateVertex` or replaces the existing
    /// vertex, depending on the configured policy.
    pub fn add_vertex(&mut self, vertex: BoxedVertex<S, M>) -> Result<(), GraphError> {
        let id = vertex.id();
        match self.vertices.get_mut(&id) {
            None => {
                self.vertices.insert(id, VertexEntry::new(vertex));
                Ok(())
            }
            Some(existing) => match self.config.duplicate_vertices {
                DuplicateVertexPolicy::Reject => Err(GraphError::DuplicateVertex(id)),
                DuplicateVertexPolicy::Replace => {
                    tracing::debug!(vertex_id = %id, "Replacing duplicate vertex");
                    existing.vertex = vertex;
                    existing.reset();
                    Ok(())
                }
            },
        }
    }

    /// Add an edge
    ///
    /// The source must exist. A missing target fails with
    /// `UnknownTargetVertex` or is created through the vertex factory,
    /// depending on the configured policy. The store is unchanged on error.
    pub fn add_edge(&mut self, edge: Edge<M>) -> Result<(), GraphError> {
        let source = edge.source();
        let target = edge.target();

        if !self.vertices.contains_key(&source) {
            return Err(GraphError::UnknownSourceVertex(source));
        }

        if !self.vertices.contains_key(&target) {
            match self.config.missing_targets {
                MissingTargetPolicy::Reject => {
                    return Err(GraphError::UnknownTargetVertex(target));
                }
                MissingTargetPolicy::CreateOnDemand => {
                    let factory = self.factory.as_ref().ok_or_else(|| {
                        GraphError::invalid_configuration(
                            "CreateOnDemand requires a vertex factory",
                        )
                    })?;
                    let created = factory(target);
                    if created.id() != target {
                        return Err(GraphError::invalid_configuration(format!(
                            "vertex factory returned id {} for target {}",
                            created.id(),
                            target
                        )));
                    }
                    tracing::debug!(vertex_id = %target, "Created edge target on demand");
                    self.vertices.insert(target, VertexEntry::new(created));
                }
            }
        }

        if let Some(entry) = self.vertices.get_mut(&source) {
            entry.outgoing.push(edge);
            self.edge_count += 1;
        }
        Ok(())
    }

    pub fn contains(&self, id: VertexId) -> bool {
        self.vertices.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn get(&self, id: VertexId) -> Option<VertexView<'_, S, M>> {
        self.vertices
            .get_key_value(&id)
            .map(|(id, entry)| VertexView { id: *id, entry })
    }

    /// Iterate all vertices in id order
    pub fn iter(&self) -> impl Iterator<Item = VertexView<'_, S, M>> {
        self.vertices
            .iter()
            .map(|(id, entry)| VertexView { id: *id, entry })
    }

    /// Return every vertex to its initial state
    pub fn reset(&mut self) {
        for entry in self.vertices.values_mut() {
            entry.reset();
        }
    }

    /// Vertices that have nothing left to signal at `threshold`
    ///
    /// Failed vertices never count as converged.
    pub(crate) fn converged_count(&self, threshold: f64) -> usize {
        self.vertices
            .values()
            .filter(|entry| !entry.status.is_failed())
            .filter(|entry| {
                // A vertex whose scoring panics is not converged
                catch_unwind(AssertUnwindSafe(|| {
                    entry
                        .vertex
                        .score_signal(&entry.state, entry.last_signal_state.as_ref())
                }))
                .map(|score| !should_signal(score, threshold))
                .unwrap_or(false)
            })
            .count()
    }

    /// Move all vertices out into `workers` disjoint partitions
    pub(crate) fn take_partitions(&mut self, workers: usize) -> Vec<Partition<S, M>> {
        let mut partitions: Vec<Partition<S, M>> = (0..workers).map(|_| BTreeMap::new()).collect();
        for (id, entry) in std::mem::take(&mut self.vertices) {
            partitions[partition_of(id, workers)].insert(id, entry);
        }
        partitions
    }

    /// Take back a partition handed out by `take_partitions`
    pub(crate) fn restore_partition(&mut self, partition: Partition<S, M>) {
        self.vertices.extend(partition);
    }
}

impl<S: StateValue, M: SignalMessage> Default for GraphStore<S, M> {
    fn default() -> Self {
        Self::new(GraphConfig::default())
    }
}
