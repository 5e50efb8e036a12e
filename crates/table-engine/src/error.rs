//! Error types for the table engine

use thiserror::Error;

use crate::graph::NodeId;

/// Result type alias using TableEngineError
pub type Result<T> = std::result::Result<T, TableEngineError>;

/// Errors that can occur in the table engine
///
/// Everything here is terminal for the current conversion: these signal a
/// caller or collaborator bug (contract violations) or resource exhaustion,
/// never bad input data, so nothing is retried.
#[derive(Debug, Error)]
pub enum TableEngineError {
    /// A node handle that does not belong to this graph
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// An edge from a node to itself
    #[error("self edge on node {0}")]
    SelfEdge(NodeId),

    /// A column index outside a layer's current header range
    #[error("column {col} out of range for layer {layer} ({cols} columns)")]
    ColumnOutOfRange {
        layer: usize,
        col: usize,
        cols: usize,
    },

    /// Node id space exhausted; conversion cannot proceed
    #[error("graph is full: node id space exhausted")]
    GraphFull,

    /// I/O error while writing a debug dump
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
