//! Graph to table conversion
//!
//! The [`Tabulator`] drives one conversion run: assign layers (optional),
//! normalize the graph into chains, then walk every chain writing each
//! node's value groups into a [`SparseTable`](crate::store::SparseTable)
//! at the node's layer, and finally flatten all layers into a single
//! row-oriented [`FlatTable`]. Each chain becomes one data row; columns of
//! the same type are reused across chains, and skipped layers are padded
//! with null rows so rows stay aligned.
//!
//! The graph is consumed by the run, since normalization rewrites it
//! destructively. The flattened view is the only artifact that survives.
//!
//! # Usage
//!
//! ```ignore
//! let tabulator = Tabulator::new(TabulateOptions::new());
//! let flat = tabulator.tabulate(graph, &sinks)?;
//! for row in flat.rows() {
//!     println!("{}", row.join(","));
//! }
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use graticule_node_contracts::ValueGroup;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chains::ChainBuilder;
use crate::dot::DotDumper;
use crate::error::{Result, TableEngineError};
use crate::graph::{NodeData, NodeGraph, NodeId};
use crate::layers::LayerAssigner;
use crate::store::SparseTable;

/// Settings for one conversion run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TabulateOptions {
    /// Assign layers from the sink set and align columns by type; when
    /// false, each chain position becomes its own layer
    pub layered: bool,
    /// Write numbered DOT snapshots of the graph into this directory
    pub dump_dir: Option<PathBuf>,
}

impl TabulateOptions {
    pub fn new() -> Self {
        Self {
            layered: true,
            dump_dir: None,
        }
    }

    pub fn with_layering(mut self, layered: bool) -> Self {
        self.layered = layered;
        self
    }

    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }
}

impl Default for TabulateOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// The flattened result of a conversion: one header row plus one data row
/// per chain
///
/// Cells that were never written read as empty strings. The view is
/// read-only; serializing it is the caller's business.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl FlatTable {
    /// Header row, duplicate-disambiguation suffixes already stripped
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Data rows in chain order
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.headers.is_empty()
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col).map(String::as_str)
    }
}

/// Converts node graphs into flat tables
#[derive(Debug)]
pub struct Tabulator {
    options: TabulateOptions,
}

impl Tabulator {
    pub fn new(options: TabulateOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TabulateOptions {
        &self.options
    }

    /// Run one conversion over the chains ending in `sinks`
    ///
    /// Consumes the graph, since normalization rewrites its topology. Every
    /// sink must belong to the graph, and the subgraph reachable from the
    /// sinks must be acyclic.
    pub fn tabulate(&self, mut graph: NodeGraph, sinks: &[NodeId]) -> Result<FlatTable> {
        let run = Uuid::new_v4();
        log::info!(
            "run {run}: tabulating {} nodes from {} sinks",
            graph.node_count(),
            sinks.len()
        );

        let mut dumper = self.options.dump_dir.as_ref().map(DotDumper::new);
        if let Some(dumper) = dumper.as_mut() {
            dumper.dump(&graph)?;
        }

        let mut layers = self
            .options
            .layered
            .then(|| LayerAssigner::new(sinks.iter().copied()));
        let starts = ChainBuilder::new(&mut graph, sinks, layers.as_mut())?.normalize()?;
        if let Some(dumper) = dumper.as_mut() {
            dumper.dump(&graph)?;
        }

        let mut writer = TableWriter::new();
        for start in starts {
            write_chain(&mut writer, &graph, start, layers.as_mut())?;
        }
        let flat = writer.flatten()?;
        log::info!(
            "run {run}: produced {} rows x {} columns",
            flat.row_count(),
            flat.column_count()
        );
        Ok(flat)
    }
}

impl Default for Tabulator {
    fn default() -> Self {
        Self::new(TabulateOptions::new())
    }
}

/// Walk one chain from its start, writing every node at its layer
///
/// Layers skipped between consecutive chain nodes get a null row each so
/// later layers stay row-aligned. When layering is active the chain also
/// pads every layer up to the table-wide row count once it ends, so the
/// next chain starts on a fresh row everywhere.
fn write_chain(
    writer: &mut TableWriter,
    graph: &NodeGraph,
    start: NodeId,
    mut layers: Option<&mut LayerAssigner>,
) -> Result<()> {
    let mut prev: Option<usize> = None;
    let mut current = Some(start);
    while let Some(node) = current {
        let layer = match layers.as_deref_mut() {
            Some(assigner) => assigner.layer_of(graph, node)?,
            None => prev.map_or(0, |p| p + 1),
        };
        for skipped in prev.map_or(0, |p| p + 1)..layer {
            writer.null_row(skipped);
        }

        let data = graph
            .data(node)
            .ok_or(TableEngineError::UnknownNode(node))?;
        if data.is_placeholder() {
            writer.null_row(layer);
        } else {
            writer.add_node(layer, data)?;
        }

        prev = Some(layer);
        current = graph.outputs(node).first().copied();
    }

    if let Some(assigner) = layers.as_deref_mut() {
        for layer in 0..assigner.layer_count(graph)? {
            while writer.layer_rows(layer) < writer.rows() {
                writer.null_row(layer);
            }
        }
    }
    Ok(())
}

/// Recorded position of one header group's columns within a layer
#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    width: usize,
}

/// Sparse table plus the per-layer bookkeeping of where each header group
/// got its columns
struct TableWriter {
    table: SparseTable,
    /// layer -> first header -> column spans in creation order
    positions: HashMap<usize, HashMap<String, Vec<Span>>>,
}

impl TableWriter {
    fn new() -> Self {
        Self {
            table: SparseTable::new(),
            positions: HashMap::new(),
        }
    }

    fn rows(&self) -> usize {
        self.table.rows()
    }

    fn layer_rows(&self, layer: usize) -> usize {
        self.table.layer_rows(layer)
    }

    fn null_row(&mut self, layer: usize) {
        self.table.add_null_row(layer);
    }

    /// Merge one node's value groups into its layer at the layer's current
    /// row
    fn add_node(&mut self, layer: usize, data: &NodeData) -> Result<()> {
        let row = self.table.layer_rows(layer);
        for group in data.groups() {
            self.merge_group(layer, row, group)?;
        }
        if self.table.layer_rows(layer) == row {
            // all groups were header-only; keep the row counter moving
            self.table.add_null_row(layer);
        }
        Ok(())
    }

    /// Write one group, reusing the first recorded span of its header that
    /// is still free in this row, or appending fresh columns at the end
    fn merge_group(&mut self, layer: usize, row: usize, group: &ValueGroup) -> Result<()> {
        let mut target = None;
        if let Some(spans) = self
            .positions
            .get(&layer)
            .and_then(|map| map.get(group.first_header()))
        {
            for span in spans {
                if self.table.get(layer, row, span.start)?.is_none() {
                    target = Some(*span);
                    break;
                }
            }
        }
        let span = match target {
            Some(span) => span,
            None => self.append_group(layer, group),
        };
        for (i, value) in group.values().iter().take(span.width).enumerate() {
            self.table.set(layer, row, span.start + i, value.clone())?;
        }
        Ok(())
    }

    /// Append a group's headers as trailing columns and record their span
    ///
    /// Repeat instances of a header get a `#<instance>` suffix so the raw
    /// header text stays unique within the layer; flattening strips it
    /// again. Spans of other headers recorded at or past the insertion
    /// point are re-indexed, which keeps lookups correct for any insertion
    /// position even though appends land at the end.
    fn append_group(&mut self, layer: usize, group: &ValueGroup) -> Span {
        let key = group.first_header();
        let positions = self.positions.entry(layer).or_default();
        let instance = positions.get(key).map_or(0, Vec::len);
        let first = if instance == 0 {
            key.to_string()
        } else {
            format!("{key}#{}", instance + 1)
        };
        let start = self.table.add_header(layer, first);
        for header in &group.headers()[1..] {
            self.table.add_header(layer, header.clone());
        }
        let width = group.headers().len();

        for (other, spans) in positions.iter_mut() {
            if other.as_str() == key {
                continue;
            }
            for span in spans.iter_mut() {
                if span.start >= start {
                    span.start += width;
                }
            }
        }
        let span = Span { start, width };
        positions.entry(key.to_string()).or_default().push(span);
        span
    }

    /// Concatenate all layers into the final row view
    fn flatten(self) -> Result<FlatTable> {
        let mut headers = Vec::new();
        for layer in 0..self.table.layer_count() {
            for header in self.table.headers(layer) {
                headers.push(display_header(header).to_string());
            }
        }
        let mut rows = Vec::with_capacity(self.table.rows());
        for row in 0..self.table.rows() {
            let mut cells = Vec::with_capacity(headers.len());
            for layer in 0..self.table.layer_count() {
                for col in 0..self.table.column_count(layer) {
                    let cell = self.table.get(layer, row, col)?.unwrap_or("");
                    cells.push(cell.to_string());
                }
            }
            rows.push(cells);
        }
        Ok(FlatTable { headers, rows })
    }
}

/// Strip a trailing `#<digits>` disambiguation suffix, if present
fn display_header(text: &str) -> &str {
    if let Some((base, digits)) = text.rsplit_once('#') {
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return base;
        }
    }
    text
}
