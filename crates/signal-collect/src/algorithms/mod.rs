//! Reference vertex programs
//!
//! - [`PageRankVertex`]: damped PageRank over weighted links
//! - [`ShortestPathVertex`]: single-source shortest path
//! - [`ComponentVertex`]: connected components by minimum id

mod components;
mod pagerank;
mod sssp;

pub use components::ComponentVertex;
pub use pagerank::{PageRankVertex, DEFAULT_DAMPING};
pub use sssp::ShortestPathVertex;
