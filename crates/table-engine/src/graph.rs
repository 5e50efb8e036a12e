//! Arena-backed experimental graph
//!
//! Nodes live in a growable arena and are addressed by stable [`NodeId`]
//! handles; edges are handle lists kept symmetric by the mutators. The id
//! doubles as the node's creation order, which is the total order every
//! other component relies on (start-node ordering, layer reconciliation,
//! clone tiebreaks). Handles are only meaningful together with the graph
//! that issued them.
//!
//! # Usage
//!
//! ```ignore
//! use table_engine::{GraphBuilder, NodeData};
//! use graticule_node_contracts::ValueGroup;
//!
//! let mut builder = GraphBuilder::new();
//! let source = builder.node(NodeData::new(vec![ValueGroup::single("Source", "vial-1")]));
//! let sample = builder.node(NodeData::new(vec![ValueGroup::single("Sample", "s-1")]));
//! builder.edge(source, sample);
//! let graph = builder.build()?;
//! ```

use std::fmt;

use graticule_node_contracts::{NO_ORDER_HINT, TabularSource, ValueGroup};

use crate::error::{Result, TableEngineError};

/// Stable handle to a node in a [`NodeGraph`] arena
///
/// Ids are handed out in creation order and never reused, so comparing two
/// ids compares node creation times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Value payload of a node: its tabular contribution and ordering hint
///
/// The payload is captured once, when the node is created, and copied
/// verbatim when the node is cloned during splitting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeData {
    groups: Vec<ValueGroup>,
    order_hint: i32,
}

impl NodeData {
    /// Payload contributing the given groups, with no positional constraint
    pub fn new(groups: Vec<ValueGroup>) -> Self {
        Self {
            groups,
            order_hint: NO_ORDER_HINT,
        }
    }

    /// Structural placeholder: contributes no cells, only occupies a layer
    pub fn placeholder() -> Self {
        Self::new(Vec::new())
    }

    /// Capture a domain entity's contribution through the node contract
    pub fn from_source(source: &dyn TabularSource) -> Self {
        Self {
            groups: source.value_groups(),
            order_hint: source.order_hint(),
        }
    }

    /// Set the positional constraint used during layer reconciliation
    pub fn with_order_hint(mut self, hint: i32) -> Self {
        self.order_hint = hint;
        self
    }

    /// Tab value groups, in contribution order
    pub fn groups(&self) -> &[ValueGroup] {
        &self.groups
    }

    /// Positional constraint; `NO_ORDER_HINT` when indifferent
    pub fn order_hint(&self) -> i32 {
        self.order_hint
    }

    /// Semantic type: the first header of the first group, if any
    pub fn type_name(&self) -> Option<&str> {
        self.groups.first().map(|g| g.first_header())
    }

    /// True when the node contributes no cells at all
    pub fn is_placeholder(&self) -> bool {
        self.groups.is_empty()
    }
}

struct NodeSlot {
    data: NodeData,
    inputs: Vec<NodeId>,
    outputs: Vec<NodeId>,
}

/// Directed acyclic experimental graph over [`NodeData`] payloads
///
/// Input/output adjacency is symmetric at all times: `add_edge` and
/// `remove_edge` update both endpoints in one call. Edge lists are ordered
/// sets that preserve insertion order and ignore duplicates.
pub struct NodeGraph {
    nodes: Vec<NodeSlot>,
}

impl NodeGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Number of nodes currently in the arena
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All node ids, in creation order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// Allocate a new node carrying `data`, with empty edge lists
    pub fn add_node(&mut self, data: NodeData) -> Result<NodeId> {
        let id = u32::try_from(self.nodes.len()).map_err(|_| TableEngineError::GraphFull)?;
        if id == u32::MAX {
            return Err(TableEngineError::GraphFull);
        }
        self.nodes.push(NodeSlot {
            data,
            inputs: Vec::new(),
            outputs: Vec::new(),
        });
        Ok(NodeId(id))
    }

    /// Duplicate a node's payload into a fresh slot with no edges
    ///
    /// The clone carries an identical tabular contribution but a distinct
    /// identity, which is what lets split-off chain copies stay
    /// distinguishable.
    pub fn create_isolated_clone(&mut self, of: NodeId) -> Result<NodeId> {
        let data = self
            .nodes
            .get(of.index())
            .ok_or(TableEngineError::UnknownNode(of))?
            .data
            .clone();
        self.add_node(data)
    }

    /// Payload of a node, if the handle belongs to this graph
    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.index()).map(|slot| &slot.data)
    }

    /// Input neighbors in stable order; empty for foreign handles
    pub fn inputs(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.index())
            .map(|slot| slot.inputs.as_slice())
            .unwrap_or(&[])
    }

    /// Output neighbors in stable order; empty for foreign handles
    pub fn outputs(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.index())
            .map(|slot| slot.outputs.as_slice())
            .unwrap_or(&[])
    }

    /// Connect `from -> to`, maintaining adjacency symmetry
    ///
    /// Adding an edge that already exists is a no-op.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        self.check_id(from)?;
        self.check_id(to)?;
        if from == to {
            return Err(TableEngineError::SelfEdge(from));
        }
        if self.nodes[from.index()].outputs.contains(&to) {
            return Ok(());
        }
        self.nodes[from.index()].outputs.push(to);
        self.nodes[to.index()].inputs.push(from);
        Ok(())
    }

    /// Disconnect `from -> to` on both endpoints
    ///
    /// Removing an edge that is not present is a no-op.
    pub fn remove_edge(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        self.check_id(from)?;
        self.check_id(to)?;
        self.nodes[from.index()].outputs.retain(|&n| n != to);
        self.nodes[to.index()].inputs.retain(|&n| n != from);
        Ok(())
    }

    fn check_id(&self, id: NodeId) -> Result<()> {
        if id.index() < self.nodes.len() {
            Ok(())
        } else {
            Err(TableEngineError::UnknownNode(id))
        }
    }

    /// Adjacency symmetry check, used by tests after graph rewrites
    #[cfg(test)]
    pub(crate) fn is_symmetric(&self) -> bool {
        self.node_ids().all(|a| {
            self.outputs(a).iter().all(|&b| self.inputs(b).contains(&a))
                && self.inputs(a).iter().all(|&b| self.outputs(b).contains(&a))
        })
    }
}

impl Default for NodeGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Fluent construction of a [`NodeGraph`]
///
/// Node creation hands back the id immediately so edges can be declared in
/// reading order; failures (an exhausted arena, a bad edge endpoint) are
/// deferred and surfaced by [`GraphBuilder::build`].
///
/// Callers whose entities arrive keyed and possibly duplicated should use
/// [`crate::factory::NodeFactory`] instead, which memoizes wrapper creation.
pub struct GraphBuilder {
    graph: NodeGraph,
    deferred: Option<TableEngineError>,
}

impl GraphBuilder {
    /// Create a builder over an empty graph
    pub fn new() -> Self {
        Self {
            graph: NodeGraph::new(),
            deferred: None,
        }
    }

    /// Add a node carrying `data`
    pub fn node(&mut self, data: NodeData) -> NodeId {
        match self.graph.add_node(data) {
            Ok(id) => id,
            Err(err) => {
                self.remember(err);
                NodeId(u32::MAX)
            }
        }
    }

    /// Add a structural placeholder node
    pub fn placeholder(&mut self) -> NodeId {
        self.node(NodeData::placeholder())
    }

    /// Connect `from -> to`
    pub fn edge(&mut self, from: NodeId, to: NodeId) -> &mut Self {
        if let Err(err) = self.graph.add_edge(from, to) {
            self.remember(err);
        }
        self
    }

    /// Finish, returning the graph or the first deferred error
    pub fn build(self) -> Result<NodeGraph> {
        match self.deferred {
            Some(err) => Err(err),
            None => Ok(self.graph),
        }
    }

    fn remember(&mut self, err: TableEngineError) {
        if self.deferred.is_none() {
            self.deferred = Some(err);
        }
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}
