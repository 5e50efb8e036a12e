//! Layer assignment and type reconciliation
//!
//! Layers are generation numbers counted from the zero-input end of the
//! graph: `layer = 1 + max(layer(input))`, `0` for nodes without inputs,
//! computed backward from the sink set a caller supplies. Nodes sharing a
//! layer are expected to share a semantic type; where they don't, phase 2
//! pushes some of them into later layers so that, once chains are written
//! out, columns of one type line up even across chains that skip layers.
//!
//! Both phases run lazily on the first query and are then served from
//! cache. The chain builder reports every split through
//! [`LayerAssigner::note_split`] so clones inherit their original's layer.

use std::collections::{HashMap, HashSet};

use crate::error::{Result, TableEngineError};
use crate::graph::{NodeGraph, NodeId};

/// Which side of a conflicting pair got shifted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shifted {
    N,
    M,
}

/// Assigns generation numbers to nodes and reconciles same-layer type
/// collisions
///
/// Seeded with the sink set of one conversion run. All queries take the
/// graph as an argument; the assigner itself stores only derived state.
pub struct LayerAssigner {
    seeds: Vec<NodeId>,
    layers: HashMap<NodeId, usize>,
    by_layer: Vec<Vec<NodeId>>,
    starts: Vec<NodeId>,
    computed: bool,
}

impl LayerAssigner {
    /// Create an assigner over the given sink set
    pub fn new(seeds: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            seeds: seeds.into_iter().collect(),
            layers: HashMap::new(),
            by_layer: Vec::new(),
            starts: Vec::new(),
            computed: false,
        }
    }

    /// Layer of `node`; an unknown handle is a contract violation
    pub fn layer_of(&mut self, graph: &NodeGraph, node: NodeId) -> Result<usize> {
        self.ensure_computed(graph)?;
        self.layers
            .get(&node)
            .copied()
            .ok_or(TableEngineError::UnknownNode(node))
    }

    /// Nodes of one layer, in reconciled sequence order
    ///
    /// Out-of-range layers are empty, not an error.
    pub fn layer_nodes(&mut self, graph: &NodeGraph, layer: usize) -> Result<&[NodeId]> {
        self.ensure_computed(graph)?;
        Ok(self
            .by_layer
            .get(layer)
            .map(|nodes| nodes.as_slice())
            .unwrap_or(&[]))
    }

    /// Zero-input nodes, in the order phase 1 discovered them
    pub fn start_nodes(&mut self, graph: &NodeGraph) -> Result<&[NodeId]> {
        self.ensure_computed(graph)?;
        Ok(&self.starts)
    }

    /// Number of layers after reconciliation
    pub fn layer_count(&mut self, graph: &NodeGraph) -> Result<usize> {
        self.ensure_computed(graph)?;
        Ok(self.by_layer.len())
    }

    /// Record that `original` was split and `clone` now stands in at the
    /// same layer
    pub fn note_split(&mut self, original: NodeId, clone: NodeId) {
        if let Some(&layer) = self.layers.get(&original) {
            self.layers.insert(clone, layer);
            if let Some(nodes) = self.by_layer.get_mut(layer) {
                nodes.push(clone);
            }
        }
    }

    fn ensure_computed(&mut self, graph: &NodeGraph) -> Result<()> {
        if self.computed {
            return Ok(());
        }
        for &seed in &self.seeds {
            if graph.data(seed).is_none() {
                return Err(TableEngineError::UnknownNode(seed));
            }
        }
        self.assign_layers(graph);
        self.reconcile(graph);
        self.computed = true;
        log::debug!(
            "layered {} nodes into {} layers ({} start nodes)",
            self.layers.len(),
            self.by_layer.len(),
            self.starts.len()
        );
        Ok(())
    }

    // ======= phase 1: untyped layering =======

    /// Depth-first walk backward from every seed, memoizing
    /// `1 + max(input layers)` and recording zero-input nodes as they are
    /// discovered. An explicit stack stands in for recursion; inputs are
    /// pushed reversed so the leftmost input is finished first, keeping the
    /// discovery order of the recursive formulation.
    fn assign_layers(&mut self, graph: &NodeGraph) {
        enum Visit {
            Enter(NodeId),
            Exit(NodeId),
        }

        let seeds = self.seeds.clone();
        let mut stack = Vec::new();
        for seed in seeds {
            stack.push(Visit::Enter(seed));
            while let Some(visit) = stack.pop() {
                match visit {
                    Visit::Enter(node) => {
                        if self.layers.contains_key(&node) {
                            continue;
                        }
                        let inputs = graph.inputs(node);
                        if inputs.is_empty() {
                            self.layers.insert(node, 0);
                            self.starts.push(node);
                            continue;
                        }
                        stack.push(Visit::Exit(node));
                        for &input in inputs.iter().rev() {
                            stack.push(Visit::Enter(input));
                        }
                    }
                    Visit::Exit(node) => {
                        // on an acyclic graph every input is computed by now
                        let layer = 1 + graph
                            .inputs(node)
                            .iter()
                            .filter_map(|input| self.layers.get(input))
                            .copied()
                            .max()
                            .unwrap_or(0);
                        self.layers.insert(node, layer);
                    }
                }
            }
        }

        if self.layers.is_empty() {
            return;
        }
        let max_layer = self.layers.values().copied().max().unwrap_or(0);
        self.by_layer = vec![Vec::new(); max_layer + 1];
        let mut ordered: Vec<(NodeId, usize)> =
            self.layers.iter().map(|(&node, &layer)| (node, layer)).collect();
        ordered.sort_by_key(|&(node, _)| node);
        for (node, layer) in ordered {
            self.by_layer[layer].push(node);
        }
    }

    // ======= phase 2: type reconciliation =======

    /// Walk each layer front to back (skipping the final layer), resolving
    /// every conflicting pair by shifting one side right. The layer count is
    /// re-read every round because cascades can append new layers, which are
    /// then reconciled in turn.
    fn reconcile(&mut self, graph: &NodeGraph) {
        let mut layer = 0;
        while layer + 1 < self.by_layer.len() {
            let mut i = 0;
            while i < self.by_layer[layer].len() {
                let n = self.by_layer[layer][i];
                let mut n_moved = false;
                let mut j = i + 1;
                while j < self.by_layer[layer].len() {
                    let m = self.by_layer[layer][j];
                    if node_type(graph, n) == node_type(graph, m) {
                        j += 1;
                        continue;
                    }
                    match self.resolve(graph, layer, i, j, n, m) {
                        Shifted::N => {
                            n_moved = true;
                            break;
                        }
                        // m left this layer; j already addresses its successor
                        Shifted::M => {}
                    }
                }
                if !n_moved {
                    i += 1;
                }
                // when n moved, the node that slid into position i is next
            }
            layer += 1;
        }
    }

    /// Decide which of a conflicting pair moves, and move it
    fn resolve(
        &mut self,
        graph: &NodeGraph,
        layer: usize,
        i: usize,
        j: usize,
        n: NodeId,
        m: NodeId,
    ) -> Shifted {
        let n_order = order_of(graph, n);
        let m_order = order_of(graph, m);

        let shifted = if n_order < 0 && m_order < 0 {
            // order-indifferent nodes defer to earlier-declared ones
            Shifted::M
        } else if n_order < 0 {
            match self.typed_neighbors(graph, layer, i) {
                Some((left, right)) => {
                    if right - m_order <= m_order - left {
                        Shifted::M
                    } else {
                        Shifted::N
                    }
                }
                None => Shifted::M,
            }
        } else if m_order < 0 {
            match self.typed_neighbors(graph, layer, j) {
                Some((left, right)) => {
                    if right - n_order <= n_order - left {
                        Shifted::N
                    } else {
                        Shifted::M
                    }
                }
                None => Shifted::N,
            }
        } else if m_order >= n_order {
            Shifted::M
        } else {
            Shifted::N
        };

        match shifted {
            Shifted::N => self.shift_right(graph, n),
            Shifted::M => self.shift_right(graph, m),
        }
        shifted
    }

    /// Nearest order values among hinted nodes strictly left and right of
    /// position `at` in the layer sequence; `None` when either side has no
    /// hinted node
    fn typed_neighbors(&self, graph: &NodeGraph, layer: usize, at: usize) -> Option<(i32, i32)> {
        let nodes = &self.by_layer[layer];
        let left = nodes[..at]
            .iter()
            .rev()
            .map(|&node| order_of(graph, node))
            .find(|&order| order >= 0)?;
        let right = nodes[at + 1..]
            .iter()
            .map(|&node| order_of(graph, node))
            .find(|&order| order >= 0)?;
        Some((left, right))
    }

    /// Move a node one layer right and pull its downstream neighbors along
    /// as far as needed to keep edges pointing to later layers
    ///
    /// One visited set per cascade: a node moves at most once per shift.
    fn shift_right(&mut self, graph: &NodeGraph, node: NodeId) {
        let mut visited = HashSet::new();
        self.shift_cascade(graph, node, &mut visited);
    }

    fn shift_cascade(&mut self, graph: &NodeGraph, node: NodeId, visited: &mut HashSet<NodeId>) {
        visited.insert(node);
        let Some(&old) = self.layers.get(&node) else {
            return;
        };
        let new = old + 1;

        if let Some(nodes) = self.by_layer.get_mut(old) {
            if let Some(pos) = nodes.iter().position(|&x| x == node) {
                nodes.remove(pos);
            }
        }
        while self.by_layer.len() <= new {
            self.by_layer.push(Vec::new());
        }
        self.by_layer[new].push(node);
        self.layers.insert(node, new);
        log::debug!("shift {node} from layer {old} to {new}");

        for &output in graph.outputs(node) {
            let lagging = self.layers.get(&output).is_some_and(|&l| l <= new);
            if lagging && !visited.contains(&output) {
                self.shift_cascade(graph, output, visited);
            }
        }
    }
}

fn node_type(graph: &NodeGraph, node: NodeId) -> Option<&str> {
    graph.data(node).and_then(|data| data.type_name())
}

fn order_of(graph: &NodeGraph, node: NodeId) -> i32 {
    graph
        .data(node)
        .map(|data| data.order_hint())
        .unwrap_or(graticule_node_contracts::NO_ORDER_HINT)
}

#[cfg(test)]
mod tests {
    use graticule_node_contracts::ValueGroup;

    use super::*;
    use crate::graph::{GraphBuilder, NodeData};

    fn typed(type_name: &str) -> NodeData {
        NodeData::new(vec![ValueGroup::single(type_name, "v")])
    }

    fn hinted(type_name: &str, order: i32) -> NodeData {
        typed(type_name).with_order_hint(order)
    }

    #[test]
    fn test_linear_chain_layers() {
        let mut builder = GraphBuilder::new();
        let s = builder.node(typed("Source"));
        let p = builder.node(typed("Sample"));
        let d = builder.node(typed("Data"));
        builder.edge(s, p).edge(p, d);
        let graph = builder.build().unwrap();

        let mut layers = LayerAssigner::new([d]);
        assert_eq!(layers.layer_of(&graph, s).unwrap(), 0);
        assert_eq!(layers.layer_of(&graph, p).unwrap(), 1);
        assert_eq!(layers.layer_of(&graph, d).unwrap(), 2);
        assert_eq!(layers.start_nodes(&graph).unwrap(), [s]);
        assert_eq!(layers.layer_count(&graph).unwrap(), 3);
    }

    #[test]
    fn test_diamond_takes_longest_path() {
        let mut builder = GraphBuilder::new();
        let s = builder.node(typed("Source"));
        let a = builder.node(typed("Sample"));
        let b = builder.node(typed("Sample"));
        let mid = builder.node(typed("Prep"));
        let d = builder.node(typed("Data"));
        // s -> a -> mid -> d and s -> b -> d
        builder.edge(s, a).edge(a, mid).edge(mid, d);
        builder.edge(s, b).edge(b, d);
        let graph = builder.build().unwrap();

        let mut layers = LayerAssigner::new([d]);
        assert_eq!(layers.layer_of(&graph, d).unwrap(), 3);
        assert_eq!(layers.layer_of(&graph, mid).unwrap(), 2);
    }

    #[test]
    fn test_start_nodes_in_discovery_order() {
        let mut builder = GraphBuilder::new();
        let s2 = builder.node(typed("Source"));
        let s1 = builder.node(typed("Source"));
        let d = builder.node(typed("Data"));
        // the sink lists s1 before s2, so discovery runs s1 first even
        // though s2 was created first
        builder.edge(s1, d).edge(s2, d);
        let graph = builder.build().unwrap();

        let mut layers = LayerAssigner::new([d]);
        assert_eq!(layers.start_nodes(&graph).unwrap(), [s1, s2]);
    }

    #[test]
    fn test_unknown_seed_is_rejected() {
        let graph = GraphBuilder::new().build().unwrap();
        let mut builder = GraphBuilder::new();
        let ghost = builder.node(typed("Data"));

        let mut layers = LayerAssigner::new([ghost]);
        assert!(matches!(
            layers.layer_of(&graph, ghost),
            Err(TableEngineError::UnknownNode(_))
        ));
    }

    #[test]
    fn test_skipped_layer_realigns_by_type() {
        // chain 1: s1 -> p1 -> d1, chain 2: s2 -> d2; d2 starts out in the
        // same layer as p1 and must be pushed right to join d1
        let mut builder = GraphBuilder::new();
        let s1 = builder.node(typed("Source"));
        let p1 = builder.node(typed("Prep"));
        let d1 = builder.node(typed("Data"));
        let s2 = builder.node(typed("Source"));
        let d2 = builder.node(typed("Data"));
        builder.edge(s1, p1).edge(p1, d1);
        builder.edge(s2, d2);
        let graph = builder.build().unwrap();

        let mut layers = LayerAssigner::new([d1, d2]);
        assert_eq!(layers.layer_of(&graph, p1).unwrap(), 1);
        assert_eq!(layers.layer_of(&graph, d2).unwrap(), 2);
        assert_eq!(layers.layer_nodes(&graph, 2).unwrap(), [d1, d2]);
    }

    #[test]
    fn test_both_hinted_shifts_larger_order() {
        let mut builder = GraphBuilder::new();
        let a = builder.node(hinted("Acid", 5));
        let b = builder.node(hinted("Base", 3));
        let da = builder.node(typed("Data"));
        let db = builder.node(typed("Data"));
        builder.edge(a, da).edge(b, db);
        let graph = builder.build().unwrap();

        let mut layers = LayerAssigner::new([da, db]);
        // a carries the larger order, so a is the one shifted right
        assert_eq!(layers.layer_of(&graph, b).unwrap(), 0);
        assert!(layers.layer_of(&graph, a).unwrap() > 0);
    }

    #[test]
    fn test_both_hinted_tie_shifts_later_node() {
        let mut builder = GraphBuilder::new();
        let a = builder.node(hinted("Acid", 4));
        let b = builder.node(hinted("Base", 4));
        let da = builder.node(typed("Data"));
        let db = builder.node(typed("Data"));
        builder.edge(a, da).edge(b, db);
        let graph = builder.build().unwrap();

        let mut layers = LayerAssigner::new([da, db]);
        assert_eq!(layers.layer_of(&graph, a).unwrap(), 0);
        assert!(layers.layer_of(&graph, b).unwrap() > 0);
    }

    #[test]
    fn test_hintless_defers_between_hinted_neighbors() {
        // layer 0 sequence: a(Acid,1), m(Mix,no hint), c(Acid,9); the pair
        // (a, m) resolves around m's neighborhood, a's order hugs the left
        // neighbor, so m is the one shifted
        let mut builder = GraphBuilder::new();
        let a = builder.node(hinted("Acid", 1));
        let m = builder.node(typed("Mix"));
        let c = builder.node(hinted("Acid", 9));
        let sink = builder.node(typed("Data"));
        builder.edge(a, sink).edge(m, sink).edge(c, sink);
        let graph = builder.build().unwrap();

        let mut layers = LayerAssigner::new([sink]);
        assert_eq!(layers.layer_of(&graph, a).unwrap(), 0);
        assert_eq!(layers.layer_of(&graph, c).unwrap(), 0);
        assert!(layers.layer_of(&graph, m).unwrap() > 0);
    }

    #[test]
    fn test_hinted_node_closer_to_right_moves_itself() {
        // same shape but a's order sits at the right neighbor's value, so
        // the hinted node a moves instead of the hintless m
        let mut builder = GraphBuilder::new();
        let a = builder.node(hinted("Acid", 9));
        let m = builder.node(typed("Mix"));
        let c = builder.node(hinted("Acid", 8));
        let sink = builder.node(typed("Data"));
        builder.edge(a, sink).edge(m, sink).edge(c, sink);
        let graph = builder.build().unwrap();

        let mut layers = LayerAssigner::new([sink]);
        assert!(layers.layer_of(&graph, a).unwrap() > 0);
        assert_eq!(layers.layer_of(&graph, m).unwrap(), 0);
    }

    #[test]
    fn test_shift_cascade_pulls_lagging_downstream() {
        // p2 conflicts with p1's type and gets shifted; its data node sits
        // exactly one layer later and must move along, while the far sink
        // of the other chain stays put
        let mut builder = GraphBuilder::new();
        let s1 = builder.node(typed("Source"));
        let p1 = builder.node(typed("Prep"));
        let d1 = builder.node(typed("Data"));
        let s2 = builder.node(typed("Source"));
        let p2 = builder.node(typed("Wash"));
        let d2 = builder.node(typed("Data"));
        builder.edge(s1, p1).edge(p1, d1);
        builder.edge(s2, p2).edge(p2, d2);
        let graph = builder.build().unwrap();

        let mut layers = LayerAssigner::new([d1, d2]);
        assert_eq!(layers.layer_of(&graph, p1).unwrap(), 1);
        assert_eq!(layers.layer_of(&graph, d1).unwrap(), 2);
        let p2_layer = layers.layer_of(&graph, p2).unwrap();
        assert!(p2_layer > 1);
        assert!(layers.layer_of(&graph, d2).unwrap() > p2_layer);
    }

    #[test]
    fn test_layer_monotonicity_after_reconciliation() {
        let mut builder = GraphBuilder::new();
        let s1 = builder.node(typed("Source"));
        let p1 = builder.node(typed("Prep"));
        let w1 = builder.node(typed("Wash"));
        let d1 = builder.node(typed("Data"));
        let s2 = builder.node(typed("Source"));
        let d2 = builder.node(typed("Data"));
        builder.edge(s1, p1).edge(p1, w1).edge(w1, d1);
        builder.edge(s2, d2);
        builder.edge(s2, w1);
        let graph = builder.build().unwrap();

        let mut layers = LayerAssigner::new([d1, d2]);
        for node in graph.node_ids() {
            let layer = layers.layer_of(&graph, node).unwrap();
            for &output in graph.outputs(node) {
                assert!(
                    layers.layer_of(&graph, output).unwrap() > layer,
                    "edge {node} -> {output} must point to a later layer"
                );
            }
        }
    }

    #[test]
    fn test_note_split_copies_layer() {
        let mut builder = GraphBuilder::new();
        let s = builder.node(typed("Source"));
        let d = builder.node(typed("Data"));
        builder.edge(s, d);
        let mut graph = builder.build().unwrap();

        let mut layers = LayerAssigner::new([d]);
        assert_eq!(layers.layer_of(&graph, d).unwrap(), 1);

        let clone = graph.create_isolated_clone(d).unwrap();
        layers.note_split(d, clone);
        assert_eq!(layers.layer_of(&graph, clone).unwrap(), 1);
        assert_eq!(layers.layer_nodes(&graph, 1).unwrap(), [d, clone]);
    }

    #[test]
    fn test_placeholder_type_collides_with_typed() {
        let mut builder = GraphBuilder::new();
        let a = builder.node(typed("Prep"));
        let ph = builder.placeholder();
        let da = builder.node(typed("Data"));
        let db = builder.node(typed("Data"));
        builder.edge(a, da).edge(ph, db);
        let graph = builder.build().unwrap();

        let mut layers = LayerAssigner::new([da, db]);
        // the placeholder has no type, which counts as a collision with
        // "Prep"; both lack hints, so the later node (the placeholder) moves
        assert_eq!(layers.layer_of(&graph, a).unwrap(), 0);
        assert!(layers.layer_of(&graph, ph).unwrap() > 0);
    }
}
