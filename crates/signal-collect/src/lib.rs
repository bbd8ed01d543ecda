//! signal-collect: vertex-centric graph computation engine
//!
//! Computations are expressed as vertices exchanging signals over directed
//! edges and iterated until no vertex has anything left to say.
//!
//! - **Vertex**: State plus `collect` (fold arrived signals) and `signal`
//!   (payload for every outgoing edge)
//! - **Edge**: Directed, optionally weighted, optionally transforming signals
//! - **Worker**: Task exclusively owning one partition of the vertices
//! - **Superstep**: Synchronous round bounded by a barrier across workers
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Graph                               │
//! │   add_vertex / add_edge ──► GraphStore (vertices + edges)    │
//! │                                   │ execute                  │
//! │                                   ▼                          │
//! │  ┌────────────────────── Coordinator ─────────────────────┐  │
//! │  │  partition ──► Worker 0   Worker 1   ...   Worker N-1  │  │
//! │  │                  ▲  │       ▲  │              ▲  │     │  │
//! │  │                  │  └──── SignalRouter (mpsc) ─┘  │     │  │
//! │  │  supersteps (sync) / quiescence detection (async)   │  │
//! │  └─────────────────────────────────────────────────────┘  │
//! │                                   │                          │
//! │                                   ▼                          │
//! │                        ExecutionStatistics                   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Execution Modes
//!
//! - `ExecutionMode::Synchronous`: lock-step supersteps. Vertices that
//!   received signals in superstep N run in superstep N+1.
//! - `ExecutionMode::Asynchronous` (default): a vertex runs as soon as a
//!   signal for it arrives. Terminates on confirmed quiescence.
//!
//! # Example
//!
//! ```rust,ignore
//! use signal_collect::{ExecutionConfig, Graph, PageRankVertex};
//!
//! let mut graph = Graph::new();
//! for id in 1..=3 {
//!     graph.add_vertex(PageRankVertex::new(id))?;
//! }
//! graph.add_edge(PageRankVertex::link(1, 2))?;
//! graph.add_edge(PageRankVertex::link(2, 1))?;
//!
//! let stats = graph.execute(ExecutionConfig::synchronous()).await?;
//! println!("{}", stats);
//! graph.for_vertex_with_id(1, |v| println!("{}", v))?;
//! graph.shutdown();
//! ```

pub mod algorithms;
pub mod config;
mod coordinator;
pub mod edge;
pub mod error;
pub mod graph;
mod scheduler;
pub mod signal;
pub mod stats;
pub mod store;
pub mod vertex;
mod worker;

// Re-exports
pub use algorithms::{ComponentVertex, PageRankVertex, ShortestPathVertex};
pub use config::{
    DuplicateVertexPolicy, ExecutionConfig, ExecutionMode, GraphConfig, MissingTargetPolicy,
};
pub use edge::{Edge, SignalContext, SignalTransform};
pub use error::{GraphError, VertexError};
pub use graph::Graph;
pub use signal::{partition_of, SignalEnvelope, SignalMessage};
pub use stats::{ExecutionStatistics, TerminationReason};
pub use store::{GraphStore, VertexFactory, VertexView};
pub use vertex::{BoxedVertex, CollectContext, StateValue, Vertex, VertexId, VertexStatus};
