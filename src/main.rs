//! # Signal/Collect Runner
//!
//! Command-line driver for the signal/collect graph computation engine.
//!
//! It builds a PageRank graph (the built-in three-page example, or an edge
//! list file), executes it, prints the execution statistics and the state of
//! one vertex, then shuts the graph down.
//!
//! ## Quick Start
//! ```bash
//! cargo run -- --mode synchronous --threshold 1e-6
//! cargo run -- --edges web-graph.txt --all --json
//! ```

// =============================================================================
// MODULE DECLARATIONS
// =============================================================================

/// Environment configuration
mod config;

/// Edge list loading and graph construction
mod input;

// =============================================================================
// IMPORTS
// =============================================================================
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use serde::Serialize;
use signal_collect::{ExecutionMode, ExecutionStatistics, Graph, VertexStatus, VertexView};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::RunnerConfig;

// =============================================================================
// CLI ARGUMENTS
// =============================================================================
/// Execution mode as spelled on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Synchronous,
    Asynchronous,
}

impl From<ModeArg> for ExecutionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Synchronous => ExecutionMode::Synchronous,
            ModeArg::Asynchronous => ExecutionMode::Asynchronous,
        }
    }
}

/// # Rust Concept: Derive Macros with Clap
///
/// Every flag is optional; an absent flag falls back to the environment
/// (see `config.rs`) and then to the engine defaults.
#[derive(Parser, Debug)]
#[command(
    name = "signal-collect",
    version,
    about = "Run a PageRank computation on the signal/collect engine",
    long_about = r#"
Signal/Collect Runner

Builds a PageRank graph, runs it to convergence on the signal/collect engine
and prints the execution statistics.

Without --edges the built-in example is used: pages 1, 2 and 3 with links
1->2, 2->1, 2->3 and 3->2.

EXAMPLES:
  # Synchronous supersteps with a tight threshold
  signal-collect --mode synchronous --threshold 1e-6

  # Load a graph and print every page as JSON
  signal-collect --edges web-graph.txt --all --json
"#
)]
struct Args {
    /// Execution mode
    #[arg(short = 'm', long = "mode", value_enum)]
    mode: Option<ModeArg>,

    /// Number of worker tasks
    #[arg(short = 'w', long = "workers")]
    workers: Option<usize>,

    /// Convergence threshold
    #[arg(short = 't', long = "threshold")]
    threshold: Option<f64>,

    /// Stop after this many supersteps (or rounds per worker)
    #[arg(long = "max-steps")]
    max_steps: Option<usize>,

    /// Stop after this many milliseconds
    #[arg(long = "time-limit-ms")]
    time_limit_ms: Option<u64>,

    /// Edge list file, one `source target` pair per line
    #[arg(short = 'e', long = "edges", value_name = "FILE", env = "SIGNAL_COLLECT_EDGES")]
    edges: Option<PathBuf>,

    /// Vertex to print after execution
    #[arg(long = "vertex", default_value_t = 1)]
    vertex: i64,

    /// Print every vertex instead of one
    #[arg(short = 'a', long = "all", default_value = "false")]
    all: bool,

    /// Print the results as JSON
    #[arg(long = "json", default_value = "false")]
    json: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long = "verbose", default_value = "false")]
    verbose: bool,
}

impl Args {
    /// Command-line flags take precedence over the environment
    fn apply(&self, config: &mut RunnerConfig) {
        if let Some(mode) = self.mode {
            config.mode = mode.into();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if let Some(max_steps) = self.max_steps {
            config.max_steps = Some(max_steps);
        }
        if let Some(millis) = self.time_limit_ms {
            config.time_limit = Some(Duration::from_millis(millis));
        }
    }
}

// =============================================================================
// OUTPUT
// =============================================================================
#[derive(Debug, Serialize)]
struct VertexReport {
    id: i64,
    state: f64,
    status: VertexStatus,
}

#[derive(Debug, Serialize)]
struct RunReport {
    statistics: ExecutionStatistics,
    vertices: Vec<VertexReport>,
}

fn vertex_report(vertex: &VertexView<'_, f64, f64>) -> VertexReport {
    VertexReport {
        id: vertex.id().get(),
        state: *vertex.state(),
        status: vertex.status(),
    }
}

fn collect_vertices(graph: &Graph<f64, f64>, args: &Args) -> Result<Vec<VertexReport>> {
    if args.all {
        let mut vertices = Vec::with_capacity(graph.vertex_count());
        graph.for_each_vertex(|v| vertices.push(vertex_report(v)));
        Ok(vertices)
    } else {
        let vertex = graph
            .for_vertex_with_id(args.vertex, vertex_report)
            .with_context(|| format!("Cannot inspect vertex {}", args.vertex))?;
        Ok(vec![vertex])
    }
}

fn print_human(stats: &ExecutionStatistics, vertices: &[VertexReport]) {
    let verdict = if stats.converged {
        "CONVERGED".green().bold()
    } else {
        "NOT CONVERGED".yellow().bold()
    };

    println!("\n{}", "=".repeat(60));
    println!("EXECUTION RESULTS  {}", verdict);
    println!("{}\n", "=".repeat(60));
    println!("{}", stats);
    println!();
    for vertex in vertices {
        println!(
            "Vertex(id={}, state={:.6}, status={:?})",
            vertex.id.to_string().cyan(),
            vertex.state,
            vertex.status
        );
    }
    println!("\n{}", "=".repeat(60));
}

// =============================================================================
// MAIN FUNCTION
// =============================================================================
/// # Rust Concept: The #[tokio::main] Attribute
///
/// The engine runs its workers as tokio tasks, so `main` needs a runtime.
/// `#[tokio::main]` builds a multi-threaded one and blocks on the async body.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose)?;

    info!("Signal/collect runner starting up...");

    let mut config = RunnerConfig::from_env().context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate()?;

    info!(
        mode = %config.mode,
        workers = config.workers,
        threshold = config.threshold,
        "Configuration loaded"
    );

    let mut graph = match &args.edges {
        Some(path) => input::load_pagerank_graph(path)?,
        None => input::pagerank_graph(&input::EXAMPLE_EDGES)?,
    };
    info!(
        vertices = graph.vertex_count(),
        edges = graph.edge_count(),
        "Graph built"
    );

    let stats = match graph.execute(config.execution_config()).await {
        Ok(stats) => stats,
        Err(e) => {
            error!(error = %e, "Execution failed");
            eprintln!("\n{} {}", "Execution failed:".red().bold(), e);
            return Err(e.into());
        }
    };

    let vertices = collect_vertices(&graph, &args)?;

    if args.json {
        let report = RunReport {
            statistics: stats,
            vertices,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_human(&stats, &vertices);
    }

    graph.shutdown();
    info!("Run completed");
    Ok(())
}

// =============================================================================
// LOGGING INITIALIZATION
// =============================================================================
/// Initialize the tracing subscriber for structured logging.
///
/// `RUST_LOG` wins when set; otherwise `--verbose` picks debug over info.
fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}
