//! Integration Tests for execution modes, bounds and failure isolation
//!
//! These tests verify:
//! - Graphs without edges finish after one collect/signal pass per vertex
//! - Step and time bounds stop non-converging graphs with `converged=false`
//! - A zero threshold only converges once every delta is exactly zero
//! - A failing vertex is isolated and counted, including panics while scoring
//! - A worker task that dies surfaces an error instead of hanging
//! - Invalid configurations are rejected before any work starts

use std::time::Duration;

use signal_collect::{
    CollectContext, ComponentVertex, Edge, ExecutionConfig, ExecutionMode, Graph, GraphError,
    ShortestPathVertex, StateValue, TerminationReason, Vertex, VertexError, VertexId,
    VertexStatus,
};

const MODES: [ExecutionMode; 2] = [ExecutionMode::Synchronous, ExecutionMode::Asynchronous];

/// Counts received signals and always forwards a tick; never converges on a cycle
struct Ticker {
    id: VertexId,
}

impl Vertex<u64, u64> for Ticker {
    fn id(&self) -> VertexId {
        self.id
    }

    fn initial_state(&self) -> u64 {
        0
    }

    fn collect(&self, ctx: &CollectContext<'_, u64, u64>) -> Result<u64, VertexError> {
        Ok(ctx.state() + ctx.signal_count() as u64)
    }

    fn signal(&self, _state: &u64) -> Result<Option<u64>, VertexError> {
        Ok(Some(1))
    }
}

fn ticker_ring(n: i64) -> Graph<u64, u64> {
    let mut graph = Graph::new();
    for id in 0..n {
        graph.add_vertex(Ticker { id: VertexId::new(id) }).unwrap();
    }
    for id in 0..n {
        graph.add_edge(Edge::new(id, (id + 1) % n)).unwrap();
    }
    graph
}

/// Minimum-label vertex that fails when it hears a forbidden label
struct Fragile {
    id: VertexId,
    forbidden: Option<i64>,
}

impl Vertex<i64, i64> for Fragile {
    fn id(&self) -> VertexId {
        self.id
    }

    fn initial_state(&self) -> i64 {
        self.id.get()
    }

    fn collect(&self, ctx: &CollectContext<'_, i64, i64>) -> Result<i64, VertexError> {
        if let Some(forbidden) = self.forbidden {
            if ctx.signals().contains(&forbidden) {
                return Err(VertexError::new(format!("refusing label {}", forbidden)));
            }
        }
        Ok(ctx.signals().iter().copied().fold(*ctx.state(), i64::min))
    }

    fn signal(&self, state: &i64) -> Result<Option<i64>, VertexError> {
        Ok(Some(*state))
    }
}

/// Minimum-label vertex whose scoring panics once it holds a given label
struct UnstableScore {
    id: VertexId,
    panic_at: Option<i64>,
}

impl Vertex<i64, i64> for UnstableScore {
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

    fn score_signal(&self, state: &i64, last_signal_state: Option<&i64>) -> f64 {
        if self.panic_at == Some(*state) {
            panic!("cannot score label {}", state);
        }
        match last_signal_state {
            Some(previous) => state.delta(previous),
            None => f64::INFINITY,
        }
    }
}

/// State whose clone panics on label 0; the engine clones state after signalling
#[derive(Debug)]
struct BrittleLabel(i64);

impl Clone for BrittleLabel {
    fn clone(&self) -> Self {
        if self.0 == 0 {
            panic!("cannot clone label 0");
        }
        BrittleLabel(self.0)
    }
}

impl StateValue for BrittleLabel {
    fn delta(&self, previous: &Self) -> f64 {
        (self.0 - previous.0).abs() as f64
    }
}

struct BrittleVertex {
    id: VertexId,
}

impl Vertex<BrittleLabel, i64> for BrittleVertex {
    fn id(&self) -> VertexId {
        self.id
    }

    fn initial_state(&self) -> BrittleLabel {
        BrittleLabel(self.id.get())
    }

    fn collect(
        &self,
        ctx: &CollectContext<'_, BrittleLabel, i64>,
    ) -> Result<BrittleLabel, VertexError> {
        Ok(BrittleLabel(
            ctx.signals().iter().copied().fold(ctx.state().0, i64::min),
        ))
    }

    fn signal(&self, state: &BrittleLabel) -> Result<Option<i64>, VertexError> {
        Ok(Some(state.0))
    }
}

fn components_graph(edges: &[(i64, i64)], vertices: i64) -> Graph<i64, i64> {
    let mut graph = Graph::new();
    for id in 0..vertices {
        graph.add_vertex(ComponentVertex::new(id)).unwrap();
    }
    for &(a, b) in edges {
        for edge in ComponentVertex::undirected(a, b) {
            graph.add_edge(edge).unwrap();
        }
    }
    graph
}

fn labels(graph: &Graph<i64, i64>) -> Vec<i64> {
    let mut labels = Vec::new();
    graph.for_each_vertex(|v| labels.push(*v.state()));
    labels
}

// =============================================================================
// Graphs Without Edges
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_no_edges_sends_no_signals() {
    for mode in MODES {
        let mut graph = components_graph(&[], 25);
        let stats = graph
            .execute(ExecutionConfig::new().with_mode(mode).with_worker_count(4))
            .await
            .unwrap();

        assert!(stats.converged, "{}", mode);
        assert_eq!(stats.signals_sent, 0, "{}", mode);
        assert_eq!(stats.signals_collected, 0, "{}", mode);
        assert_eq!(stats.collect_operations, 0, "{}", mode);
        assert_eq!(stats.signal_operations, 25, "{}", mode);
        assert_eq!(stats.converged_vertices, 25, "{}", mode);
        assert_eq!(stats.steps, 1, "{}", mode);
        assert_eq!(labels(&graph), (0..25).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn test_empty_graph() {
    for mode in MODES {
        let mut graph: Graph<i64, i64> = Graph::new();
        let stats = graph
            .execute(ExecutionConfig::new().with_mode(mode))
            .await
            .unwrap();
        assert!(stats.converged);
        assert_eq!(stats.steps, 0);
        assert_eq!(stats.vertex_count, 0);
    }
}

// =============================================================================
// Convergence
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_components_with_zero_threshold() {
    // Two components: {0,1,2,3} and {4,5}, plus isolated 6
    let edges = [(3, 2), (2, 1), (1, 0), (5, 4)];
    for mode in MODES {
        let mut graph = components_graph(&edges, 7);
        let stats = graph
            .execute(
                ExecutionConfig::new()
                    .with_mode(mode)
                    .with_convergence_threshold(0.0)
                    .with_worker_count(3),
            )
            .await
            .unwrap();

        assert!(stats.converged, "{}", mode);
        assert_eq!(stats.signals_sent, stats.signals_collected, "{}", mode);
        assert_eq!(labels(&graph), vec![0, 0, 0, 0, 4, 4, 6], "{}", mode);
        graph.for_each_vertex(|v| {
            // Converged means every vertex's last signal reflects its state
            assert_eq!(v.last_signal_state(), Some(v.state()), "{} vertex {}", mode, v.id());
        });
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shortest_paths() {
    for mode in MODES {
        let mut graph = Graph::new();
        graph.add_vertex(ShortestPathVertex::source(0)).unwrap();
        for id in 1..=4 {
            graph.add_vertex(ShortestPathVertex::new(id)).unwrap();
        }
        for (a, b, length) in [(0, 1, 4.0), (0, 2, 1.0), (2, 1, 2.0), (1, 3, 1.0), (2, 3, 5.0)] {
            graph.add_edge(ShortestPathVertex::road(a, b, length)).unwrap();
        }

        let stats = graph
            .execute(ExecutionConfig::new().with_mode(mode).with_worker_count(2))
            .await
            .unwrap();

        assert!(stats.converged);
        assert_eq!(graph.state(0).unwrap(), 0.0);
        assert_eq!(graph.state(1).unwrap(), 3.0);
        assert_eq!(graph.state(2).unwrap(), 1.0);
        assert_eq!(graph.state(3).unwrap(), 4.0);
        assert_eq!(graph.state(4).unwrap(), f64::INFINITY, "{}", mode);
    }
}

// =============================================================================
// Bounds
// =============================================================================

#[tokio::test]
async fn test_synchronous_max_steps() {
    let mut graph = ticker_ring(4);
    let stats = graph
        .execute(ExecutionConfig::synchronous().with_max_steps(5).with_worker_count(2))
        .await
        .unwrap();

    assert!(!stats.converged);
    assert_eq!(stats.termination, TerminationReason::MaxStepsReached);
    assert_eq!(stats.steps, 5);
    // Every vertex collected once per superstep after the first
    assert_eq!(graph.state(0).unwrap(), 4);
    assert_eq!(stats.signals_in_flight(), 4);

    // Signals from the last superstep stay on their targets
    let mut uncollected = 0;
    graph.for_each_vertex(|v| uncollected += v.uncollected_signals());
    assert_eq!(uncollected as u64, stats.signals_in_flight());
    assert_eq!(graph.for_vertex_with_id(1, |v| v.uncollected_signals()).unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_asynchronous_max_steps() {
    let mut graph = ticker_ring(6);
    let stats = graph
        .execute(ExecutionConfig::asynchronous().with_max_steps(10).with_worker_count(2))
        .await
        .unwrap();

    assert!(!stats.converged);
    assert_eq!(stats.termination, TerminationReason::MaxStepsReached);
    assert!(stats.steps <= 10);
    assert_eq!(graph.vertex_count(), 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_time_limit_stops_both_modes() {
    for mode in MODES {
        let mut graph = ticker_ring(3);
        let config = ExecutionConfig::new()
            .with_mode(mode)
            .with_worker_count(2)
            .with_time_limit(Duration::from_millis(100));

        let stats = tokio::time::timeout(Duration::from_secs(10), graph.execute(config))
            .await
            .expect("time limit not honoured")
            .unwrap();

        assert!(!stats.converged, "{}", mode);
        assert_eq!(stats.termination, TerminationReason::TimeLimitReached, "{}", mode);
        assert!(stats.duration_millis >= 100, "{}", mode);
        assert_eq!(graph.vertex_count(), 3);
        assert!(graph.state(0).unwrap() > 0);
    }
}

// =============================================================================
// Failure Isolation
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_vertex_is_isolated() {
    for mode in MODES {
        // Chain 0 - 1 - 2 - 3; vertex 2 refuses label 0
        let mut graph: Graph<i64, i64> = Graph::new();
        for id in 0..4 {
            let forbidden = if id == 2 { Some(0) } else { None };
            graph
                .add_vertex(Fragile {
                    id: VertexId::new(id),
                    forbidden,
                })
                .unwrap();
        }
        for (a, b) in [(0, 1), (1, 2), (2, 3)] {
            graph.add_edge(Edge::new(a, b)).unwrap();
            graph.add_edge(Edge::new(b, a)).unwrap();
        }

        let stats = graph
            .execute(ExecutionConfig::new().with_mode(mode).with_worker_count(2))
            .await
            .expect("vertex failure must not abort execution");

        assert!(stats.converged, "{}", mode);
        assert_eq!(stats.failed_vertices, 1, "{}", mode);
        assert_eq!(stats.converged_vertices, 3, "{}", mode);
        assert_eq!(stats.signals_sent, stats.signals_collected, "{}", mode);
        assert_eq!(graph.state(0).unwrap(), 0, "{}", mode);
        assert_eq!(graph.state(1).unwrap(), 0, "{}", mode);

        let status = graph.for_vertex_with_id(2, |v| v.status()).unwrap();
        assert_eq!(status, VertexStatus::Failed, "{}", mode);
        // Vertex 3 never hears label 0 through the failed vertex
        assert!(graph.state(3).unwrap() >= 1, "{}", mode);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panicking_score_is_isolated() {
    for mode in MODES {
        // Directed ring 0 -> 1 -> 2 -> 3 -> 0; vertex 3 panics when it adopts label 0
        let mut graph: Graph<i64, i64> = Graph::new();
        for id in 0..4 {
            let panic_at = if id == 3 { Some(0) } else { None };
            graph
                .add_vertex(UnstableScore {
                    id: VertexId::new(id),
                    panic_at,
                })
                .unwrap();
        }
        for id in 0..4 {
            graph.add_edge(Edge::new(id, (id + 1) % 4)).unwrap();
        }

        let config = ExecutionConfig::new().with_mode(mode).with_worker_count(2);
        let stats = tokio::time::timeout(Duration::from_secs(10), graph.execute(config))
            .await
            .expect("execution hung")
            .expect("scoring panic must not abort execution");

        assert!(stats.converged, "{}", mode);
        assert_eq!(stats.failed_vertices, 1, "{}", mode);
        assert_eq!(stats.converged_vertices, 3, "{}", mode);
        assert_eq!(stats.signals_sent, stats.signals_collected, "{}", mode);
        assert_eq!(graph.vertex_count(), 4, "{}", mode);
        for id in 0..3 {
            assert_eq!(graph.state(id).unwrap(), 0, "{} vertex {}", mode, id);
        }
        let status = graph.for_vertex_with_id(3, |v| v.status()).unwrap();
        assert_eq!(status, VertexStatus::Failed, "{}", mode);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dead_worker_fails_execution() {
    for mode in MODES {
        let mut graph: Graph<BrittleLabel, i64> = Graph::new();
        for id in 0..4 {
            graph
                .add_vertex(BrittleVertex { id: VertexId::new(id) })
                .unwrap();
        }
        for id in 0..4 {
            graph.add_edge(Edge::new(id, (id + 1) % 4)).unwrap();
        }

        let config = ExecutionConfig::new().with_mode(mode).with_worker_count(2);
        let result = tokio::time::timeout(Duration::from_secs(10), graph.execute(config))
            .await
            .expect("execution hung after a worker died");

        assert!(
            matches!(result, Err(GraphError::WorkerFailure { .. })),
            "{}: {:?}",
            mode,
            result.map(|stats| stats.termination)
        );
        assert!(graph.last_statistics().is_none(), "{}", mode);
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

#[tokio::test]
async fn test_invalid_configurations_rejected() {
    let invalid = [
        ExecutionConfig::new().with_worker_count(0),
        ExecutionConfig::new().with_convergence_threshold(-1.0),
        ExecutionConfig::new().with_max_steps(0),
        ExecutionConfig::new().with_time_limit(Duration::ZERO),
    ];

    for config in invalid {
        let mut graph = ticker_ring(2);
        let err = graph.execute(config).await.unwrap_err();
        assert!(matches!(err, GraphError::InvalidConfiguration(_)));
        assert!(!graph.is_executed());
    }
}

#[tokio::test]
async fn test_more_workers_than_vertices() {
    let mut graph = components_graph(&[(0, 1)], 2);
    let stats = graph
        .execute(ExecutionConfig::synchronous().with_worker_count(16))
        .await
        .unwrap();
    assert!(stats.converged);
    assert_eq!(stats.worker_count, 16);
    assert_eq!(labels(&graph), vec![0, 0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_low_watermark_never_blocks() {
    for mode in MODES {
        let edges: Vec<(i64, i64)> = (0..50).map(|i| (i, (i + 1) % 50)).collect();
        let mut graph = components_graph(&edges, 50);
        let stats = graph
            .execute(
                ExecutionConfig::new()
                    .with_mode(mode)
                    .with_worker_count(4)
                    .with_signal_high_watermark(1),
            )
            .await
            .unwrap();

        assert!(stats.converged, "{}", mode);
        assert!(labels(&graph).iter().all(|&label| label == 0), "{}", mode);
    }
}
