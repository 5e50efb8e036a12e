//! DOT renderings of the node graph
//!
//! Debugging aid for the normalization passes: render the current graph as
//! Graphviz DOT text, or drop numbered snapshot files into a directory to
//! diff the topology before and after splitting. Not needed for
//! correctness.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::graph::NodeGraph;

/// Render the graph as DOT text
///
/// Nodes are labeled with their handle and type name; edges follow the
/// graph's output order, so repeated renders of the same graph are
/// identical.
pub fn render(graph: &NodeGraph) -> String {
    let mut out = String::from("digraph chains {\n");
    for node in graph.node_ids() {
        let label = graph
            .data(node)
            .and_then(|data| data.type_name())
            .unwrap_or("placeholder");
        let _ = writeln!(out, "    \"{node}\" [label=\"{node} {}\"];", escape(label));
    }
    for node in graph.node_ids() {
        for &output in graph.outputs(node) {
            let _ = writeln!(out, "    \"{node}\" -> \"{output}\";");
        }
    }
    out.push_str("}\n");
    out
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Writes numbered `dump-NNN.dot` snapshots into a directory
pub struct DotDumper {
    dir: PathBuf,
    counter: u32,
}

impl DotDumper {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: 0,
        }
    }

    /// Write the next snapshot and return its path
    pub fn dump(&mut self, graph: &NodeGraph) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("dump-{:03}.dot", self.counter));
        self.counter += 1;
        fs::write(&path, render(graph))?;
        log::debug!("wrote graph dump {}", path.display());
        Ok(path)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use graticule_node_contracts::ValueGroup;
    use tempfile::TempDir;

    use super::*;
    use crate::graph::{GraphBuilder, NodeData};

    fn sample_graph() -> NodeGraph {
        let mut builder = GraphBuilder::new();
        let s = builder.node(NodeData::new(vec![ValueGroup::single("Source", "a")]));
        let d = builder.node(NodeData::new(vec![ValueGroup::single("Data", "b")]));
        builder.edge(s, d);
        builder.build().unwrap()
    }

    #[test]
    fn test_render_lists_nodes_and_edges() {
        let rendered = render(&sample_graph());
        assert!(rendered.starts_with("digraph chains {"));
        assert!(rendered.contains("\"n0\" [label=\"n0 Source\"];"));
        assert!(rendered.contains("\"n1\" [label=\"n1 Data\"];"));
        assert!(rendered.contains("\"n0\" -> \"n1\";"));
    }

    #[test]
    fn test_render_escapes_quotes_in_type_names() {
        let mut builder = GraphBuilder::new();
        builder.node(NodeData::new(vec![ValueGroup::single("Na\"Cl", "x")]));
        let graph = builder.build().unwrap();

        let rendered = render(&graph);
        assert!(rendered.contains("Na\\\"Cl"));
    }

    #[test]
    fn test_dumps_are_numbered() {
        let dir = TempDir::new().unwrap();
        let graph = sample_graph();
        let mut dumper = DotDumper::new(dir.path().join("dots"));

        let first = dumper.dump(&graph).unwrap();
        let second = dumper.dump(&graph).unwrap();
        assert!(first.ends_with("dump-000.dot"));
        assert!(second.ends_with("dump-001.dot"));
        assert!(first.exists() && second.exists());
        assert_eq!(fs::read_to_string(&first).unwrap(), render(&graph));
    }
}
