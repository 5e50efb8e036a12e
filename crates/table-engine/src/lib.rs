//! Table Engine - Graph-to-table conversion for Graticule
//!
//! This crate converts directed acyclic experiment graphs into flat
//! tabular rows, where every maximal source-to-sink path becomes one row.
//! It supports:
//!
//! - Splitting arbitrary fan-in/fan-out graphs into parallel chains
//! - Layer assignment with type reconciliation across chains
//! - Sparse per-layer cell storage with incremental growth
//! - Merge logic that reuses columns of the same type across rows
//! - DOT snapshots of the graph for debugging
//!
//! # Architecture
//!
//! One conversion is a pipeline over an arena-backed node graph:
//!
//! - `NodeGraph`: arena of nodes with symmetric input/output edges
//! - `LayerAssigner`: generation numbers plus type conflict resolution
//! - `ChainBuilder`: node splitting until every node has degree <= 1
//! - `SparseTable`: per-layer headers and coordinate-addressed cells
//! - `Tabulator`: drives the pipeline and flattens the final view
//!
//! # Example
//!
//! ```ignore
//! use table_engine::{GraphBuilder, NodeData, TabulateOptions, Tabulator};
//! use graticule_node_contracts::ValueGroup;
//!
//! let mut builder = GraphBuilder::new();
//! let source = builder.node(NodeData::new(vec![ValueGroup::single("Source", "blood-7")]));
//! let data = builder.node(NodeData::new(vec![ValueGroup::single("Data", "run-1")]));
//! builder.edge(source, data);
//! let graph = builder.build()?;
//!
//! let flat = Tabulator::new(TabulateOptions::new()).tabulate(graph, &[data])?;
//! assert_eq!(flat.headers(), ["Source", "Data"]);
//! ```

pub mod chains;
pub mod dot;
pub mod error;
pub mod factory;
pub mod graph;
pub mod layers;
pub mod store;
pub mod tabulate;

// Re-export key types
pub use chains::ChainBuilder;
pub use error::{Result, TableEngineError};
pub use factory::NodeFactory;
pub use graph::{GraphBuilder, NodeData, NodeGraph, NodeId};
pub use layers::LayerAssigner;
pub use store::SparseTable;
pub use tabulate::{FlatTable, TabulateOptions, Tabulator};

// Re-export contract types that consumers will need
pub use graticule_node_contracts::{NO_ORDER_HINT, TabularSource, ValueGroup};
