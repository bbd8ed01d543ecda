//! # Graph Input
//!
//! Builds the PageRank graph the driver executes: either the built-in
//! three-page example or a graph read from an edge list file.
//!
//! Edge list format: one `source target` pair of integer ids per line,
//! separated by whitespace. Blank lines and lines starting with `#` are
//! ignored.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use signal_collect::{Graph, PageRankVertex};

/// Pages and links of the built-in example
pub const EXAMPLE_EDGES: [(i64, i64); 4] = [(1, 2), (2, 1), (2, 3), (3, 2)];

/// Parse an edge list
///
/// # Rust Concept: Iterators with Error Propagation
///
/// Collecting an iterator of `Result<T>` into `Result<Vec<T>>` stops at the
/// first error, so one malformed line fails the whole parse.
pub fn parse_edge_list(text: &str) -> Result<Vec<(i64, i64)>> {
    text.lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line_no, line)| {
            let mut fields = line.split_whitespace();
            let (Some(source), Some(target), None) = (fields.next(), fields.next(), fields.next())
            else {
                anyhow::bail!("line {}: expected `source target`, got {:?}", line_no, line);
            };
            let source: i64 = source
                .parse()
                .with_context(|| format!("line {}: invalid source id {:?}", line_no, source))?;
            let target: i64 = target
                .parse()
                .with_context(|| format!("line {}: invalid target id {:?}", line_no, target))?;
            Ok((source, target))
        })
        .collect()
}

/// Build a PageRank graph with one page per id mentioned in `edges`
pub fn pagerank_graph(edges: &[(i64, i64)]) -> Result<Graph<f64, f64>> {
    let pages: BTreeSet<i64> = edges.iter().flat_map(|&(s, t)| [s, t]).collect();

    let mut graph = Graph::new();
    for id in pages {
        graph.add_vertex(PageRankVertex::new(id))?;
    }
    for &(source, target) in edges {
        graph.add_edge(PageRankVertex::link(source, target))?;
    }
    Ok(graph)
}

/// Load a PageRank graph from an edge list file
pub fn load_pagerank_graph(path: &Path) -> Result<Graph<f64, f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read edge list {}", path.display()))?;
    let edges = parse_edge_list(&text)
        .with_context(|| format!("Failed to parse edge list {}", path.display()))?;
    pagerank_graph(&edges)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_edge_list() {
        let text = "# pages\n1 2\n\n  2\t3  \n# done\n";
        assert_eq!(parse_edge_list(text).unwrap(), vec![(1, 2), (2, 3)]);
    }

    #[test]
    fn test_parse_edge_list_rejects_bad_lines() {
        let err = parse_edge_list("1 2\n3\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));

        assert!(parse_edge_list("1 2 3").is_err());
        assert!(parse_edge_list("a b").is_err());
    }

    #[test]
    fn test_example_graph() {
        let graph = pagerank_graph(&EXAMPLE_EDGES).unwrap();
        assert_eq!(graph.vertex_count(), 3);
        assert_eq!(graph.edge_count(), 4);
        assert!((graph.state(1).unwrap() - 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_missing_file() {
        let err = load_pagerank_graph(Path::new("/definitely/not/here.txt"))
            .err()
            .expect("expected an error for a missing file");
        assert!(err.to_string().contains("Failed to read edge list"));
    }
}
