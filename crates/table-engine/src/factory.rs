//! Memoized node wrapper creation
//!
//! One factory per domain entity type. The factory owns the graph while it
//! is being populated and guarantees at most one node per distinct entity
//! key: concurrent producers can call [`NodeFactory::get_or_create`] freely,
//! the lookup-then-insert runs under one lock. When construction is done the
//! caller takes the graph out with [`NodeFactory::into_graph`] and hands it
//! to the tabulator, which requires exclusive ownership anyway.

use std::collections::HashMap;
use std::hash::Hash;

use graticule_node_contracts::TabularSource;
use parking_lot::Mutex;

use crate::error::Result;
use crate::graph::{NodeData, NodeGraph, NodeId};

/// Keyed, memoizing wrapper factory over a [`NodeGraph`]
///
/// `K` is whatever identifies a domain entity (a database id, a path, an
/// interned name). Same key in, same node handle out, for the lifetime of
/// the factory.
pub struct NodeFactory<K> {
    inner: Mutex<FactoryInner<K>>,
}

struct FactoryInner<K> {
    graph: NodeGraph,
    wrappers: HashMap<K, NodeId>,
}

impl<K: Eq + Hash> NodeFactory<K> {
    /// Create a factory over an empty graph
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(FactoryInner {
                graph: NodeGraph::new(),
                wrappers: HashMap::new(),
            }),
        }
    }

    /// Return the node for `key`, creating it on first sight
    ///
    /// Construction goes through the node contract: the entity's value
    /// groups and order hint are captured at this point and never re-read.
    pub fn get_or_create(&self, key: K, source: &dyn TabularSource) -> Result<NodeId> {
        let mut inner = self.inner.lock();
        if let Some(&id) = inner.wrappers.get(&key) {
            return Ok(id);
        }
        let id = inner.graph.add_node(NodeData::from_source(source))?;
        inner.wrappers.insert(key, id);
        log::debug!("factory created node {id}");
        Ok(id)
    }

    /// Look up the node for `key` without creating one
    pub fn get(&self, key: &K) -> Option<NodeId> {
        self.inner.lock().wrappers.get(key).copied()
    }

    /// Connect two previously created nodes
    pub fn connect(&self, from: NodeId, to: NodeId) -> Result<()> {
        self.inner.lock().graph.add_edge(from, to)
    }

    /// Number of distinct entities seen so far
    pub fn node_count(&self) -> usize {
        self.inner.lock().graph.node_count()
    }

    /// Take the populated graph out of the factory
    pub fn into_graph(self) -> NodeGraph {
        self.inner.into_inner().graph
    }
}

impl<K: Eq + Hash> Default for NodeFactory<K> {
    fn default() -> Self {
        Self::new()
    }
}
