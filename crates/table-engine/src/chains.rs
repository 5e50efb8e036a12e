//! Chain normalization
//!
//! A table row is one chain: a path from a zero-input node to a zero-output
//! node in which every node has at most one input and one output. Real
//! graphs branch and merge, so before rows can be written the graph is
//! normalized: every node with more than one input or output is split into
//! value-equal clones until only parallel chains remain. Shared history is
//! duplicated in the process, which is exactly what a flat table needs,
//! since each row must spell out the full lineage of its endpoint.
//!
//! Normalization walks rightward from the chain start set, repairing
//! upstream fan-out by walking back leftward as clones pick up extra edges.
//! Clones of a chain start join the start set; every split is reported to
//! the layer assigner, when one is attached, so clones keep their
//! original's layer.
//!
//! # Usage
//!
//! ```ignore
//! let mut builder = ChainBuilder::new(&mut graph, &sinks, None)?;
//! let starts = builder.normalize()?;
//! for start in starts {
//!     // follow outputs[0] until the chain ends
//! }
//! ```

use std::collections::{BTreeSet, HashSet};

use crate::error::{Result, TableEngineError};
use crate::graph::{NodeGraph, NodeId};
use crate::layers::LayerAssigner;

/// Splits a graph into parallel chains, one conversion run at a time
///
/// Holds the graph mutably for the duration of the run. The start set is
/// seeded from the layer assigner's discovery pass when one is supplied,
/// otherwise from a backward walk over the given sinks.
pub struct ChainBuilder<'a> {
    graph: &'a mut NodeGraph,
    layers: Option<&'a mut LayerAssigner>,
    starts: BTreeSet<NodeId>,
}

impl<'a> ChainBuilder<'a> {
    /// Prepare a normalization run over the chains ending in `sinks`
    pub fn new(
        graph: &'a mut NodeGraph,
        sinks: &[NodeId],
        mut layers: Option<&'a mut LayerAssigner>,
    ) -> Result<Self> {
        let starts = match layers.as_deref_mut() {
            Some(assigner) => assigner.start_nodes(graph)?.iter().copied().collect(),
            None => discover_starts(graph, sinks)?,
        };
        Ok(Self {
            graph,
            layers,
            starts,
        })
    }

    /// Normalize the graph and return the final chain start set
    ///
    /// Only the subgraph reachable from the start set is touched. The
    /// returned set includes every clone that took over a start's role and
    /// iterates in ascending node order.
    pub fn normalize(mut self) -> Result<BTreeSet<NodeId>> {
        let seeds: Vec<NodeId> = self.starts.iter().copied().collect();
        for node in seeds {
            self.normalize_node(node, true)?;
        }
        log::debug!("normalized into {} chains", self.starts.len());
        Ok(self.starts)
    }

    /// Split `node` until it carries at most one input and one output, then
    /// recurse along the edges it had when this call began
    ///
    /// `rightward` is true when the walk arrived from an input. Edge lists
    /// are snapshotted on entry; splits rewire the live graph, and the
    /// recursion deliberately follows the pre-split snapshot so every
    /// branch of the original topology is visited exactly through the node
    /// that inherited it.
    fn normalize_node(&mut self, node: NodeId, rightward: bool) -> Result<()> {
        let inputs: Vec<NodeId> = self.graph.inputs(node).to_vec();
        let outputs: Vec<NodeId> = self.graph.outputs(node).to_vec();
        let num_in = inputs.len();
        let num_out = outputs.len();

        if num_in == 0 || self.starts.contains(&node) {
            // chain start: one clone per surplus output
            for &output in outputs.iter().skip(1) {
                self.split(node, None, Some(output))?;
            }
            if rightward {
                for &output in &outputs {
                    self.normalize_node(output, true)?;
                }
            }
        } else if num_out == 0 {
            // chain end: one clone per surplus input
            for &input in inputs.iter().skip(1) {
                self.split(node, Some(input), None)?;
            }
            if rightward {
                for &input in &inputs {
                    self.normalize_node(input, false)?;
                }
            }
        } else if num_in == 1 && num_out == 1 {
            if rightward {
                self.normalize_node(outputs[0], true)?;
            }
        } else if num_in >= num_out {
            // merge point: pair each surplus input with an output round-robin
            for i in 1..num_in {
                self.split(node, Some(inputs[i]), Some(outputs[i % num_out]))?;
            }
            if rightward {
                for &output in &outputs {
                    self.normalize_node(output, true)?;
                }
            }
        } else {
            // branch point: pair each surplus output with an input
            // round-robin; inputs that now feed several nodes are repaired
            // by the leftward walk
            for j in 1..num_out {
                self.split(node, Some(inputs[j % num_in]), Some(outputs[j]))?;
            }
            for &input in &inputs {
                self.normalize_node(input, false)?;
            }
            if rightward {
                for &output in &outputs {
                    self.normalize_node(output, true)?;
                }
            }
        }
        Ok(())
    }

    /// Clone `node` and hand the given edges over to the clone
    ///
    /// The original keeps an edge that would otherwise leave it with zero
    /// inputs or outputs; the clone is then an extra consumer of that edge's
    /// far end, which a later repair pass splits in turn.
    fn split(
        &mut self,
        node: NodeId,
        in_edge: Option<NodeId>,
        out_edge: Option<NodeId>,
    ) -> Result<NodeId> {
        let clone = self.graph.create_isolated_clone(node)?;
        if let Some(input) = in_edge {
            self.graph.add_edge(input, clone)?;
            if self.graph.inputs(node).len() > 1 {
                self.graph.remove_edge(input, node)?;
            }
        }
        if let Some(output) = out_edge {
            self.graph.add_edge(clone, output)?;
            if self.graph.outputs(node).len() > 1 {
                self.graph.remove_edge(node, output)?;
            }
        }
        if self.starts.contains(&node) {
            self.starts.insert(clone);
        }
        if let Some(layers) = self.layers.as_deref_mut() {
            layers.note_split(node, clone);
        }
        log::debug!("split {node} into {clone}");
        Ok(clone)
    }
}

/// Zero-input ancestors of the given sinks
fn discover_starts(graph: &NodeGraph, sinks: &[NodeId]) -> Result<BTreeSet<NodeId>> {
    let mut starts = BTreeSet::new();
    let mut visited = HashSet::new();
    let mut stack = Vec::new();
    for &sink in sinks {
        if graph.data(sink).is_none() {
            return Err(TableEngineError::UnknownNode(sink));
        }
        stack.push(sink);
    }
    while let Some(node) = stack.pop() {
        if !visited.insert(node) {
            continue;
        }
        let inputs = graph.inputs(node);
        if inputs.is_empty() {
            starts.insert(node);
        } else {
            stack.extend(inputs.iter().copied());
        }
    }
    Ok(starts)
}
