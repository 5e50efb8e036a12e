//! Sparse per-layer table storage
//!
//! One conversion run writes its cells here before flattening. Storage is
//! grouped by layer: each layer owns a growable header list and a
//! coordinate-addressed cell map, so a cell is written once and unset
//! coordinates simply read back as absent. Row counts are tracked per
//! column, per layer, and for the table as a whole; short columns read as
//! empty rather than shifting later rows up.
//!
//! The store only ever grows during a run and is discarded once the
//! flattened view has been produced.
//!
//! # Usage
//!
//! ```ignore
//! let mut table = SparseTable::new();
//! let col = table.add_header(0, "Source");
//! table.set(0, 0, col, "blood-7")?;
//! assert_eq!(table.get(0, 0, col)?, Some("blood-7"));
//! ```

use std::collections::HashMap;

use crate::error::{Result, TableEngineError};

/// Cells and headers for a single layer
#[derive(Debug, Default)]
struct LayerColumns {
    headers: Vec<String>,
    /// (column, row) -> cell text
    cells: HashMap<(usize, usize), String>,
    /// rows written per column
    col_rows: Vec<usize>,
    /// rows in this layer, null rows included
    rows: usize,
}

/// Coordinate-indexed table with per-layer columns and incremental growth
///
/// Layers come into existence the first time they are written to; reads of
/// a layer that was never written behave like reads of an empty layer.
/// A layer's row count never exceeds the table-wide row count.
#[derive(Debug, Default)]
pub struct SparseTable {
    layers: Vec<LayerColumns>,
    rows: usize,
}

impl SparseTable {
    pub fn new() -> Self {
        Self::default()
    }

    // ======= headers =======

    /// Append a header to a layer and return its column index
    pub fn add_header(&mut self, layer: usize, text: impl Into<String>) -> usize {
        let columns = self.layer_mut(layer);
        columns.headers.push(text.into());
        columns.col_rows.push(0);
        columns.headers.len() - 1
    }

    /// Insert a header at `index`, shifting existing columns at and right of
    /// it one column right
    ///
    /// Rewrites every affected cell coordinate, which is acceptable because
    /// header insertion is rare next to cell writes. Inserting past the end
    /// of the header list is a contract violation.
    pub fn insert_header(
        &mut self,
        layer: usize,
        index: usize,
        text: impl Into<String>,
    ) -> Result<()> {
        let cols = self.column_count(layer);
        if index > cols {
            return Err(TableEngineError::ColumnOutOfRange {
                layer,
                col: index,
                cols,
            });
        }
        let columns = self.layer_mut(layer);
        columns.headers.insert(index, text.into());
        columns.col_rows.insert(index, 0);
        let shifted = columns
            .cells
            .drain()
            .map(|((col, row), value)| {
                let col = if col >= index { col + 1 } else { col };
                ((col, row), value)
            })
            .collect();
        columns.cells = shifted;
        Ok(())
    }

    /// Headers of a layer, empty for layers never written
    pub fn headers(&self, layer: usize) -> &[String] {
        self.layers
            .get(layer)
            .map(|columns| columns.headers.as_slice())
            .unwrap_or(&[])
    }

    pub fn column_count(&self, layer: usize) -> usize {
        self.layers.get(layer).map_or(0, |columns| columns.headers.len())
    }

    // ======= cells =======

    /// Write one cell, extending the column, layer, and table row counts as
    /// needed
    ///
    /// The column must already have a header; writing past the header range
    /// is a contract violation.
    pub fn set(
        &mut self,
        layer: usize,
        row: usize,
        col: usize,
        value: impl Into<String>,
    ) -> Result<()> {
        let cols = self.column_count(layer);
        if col >= cols {
            return Err(TableEngineError::ColumnOutOfRange { layer, col, cols });
        }
        let columns = self.layer_mut(layer);
        columns.cells.insert((col, row), value.into());
        if row + 1 > columns.col_rows[col] {
            columns.col_rows[col] = row + 1;
        }
        if row + 1 > columns.rows {
            columns.rows = row + 1;
        }
        if row + 1 > self.rows {
            self.rows = row + 1;
        }
        Ok(())
    }

    /// Read one cell; unset coordinates are `None`, a column outside the
    /// layer's header range is a contract violation
    pub fn get(&self, layer: usize, row: usize, col: usize) -> Result<Option<&str>> {
        let cols = self.column_count(layer);
        if col >= cols {
            return Err(TableEngineError::ColumnOutOfRange { layer, col, cols });
        }
        Ok(self.layers[layer].cells.get(&(col, row)).map(String::as_str))
    }

    // ======= row tracking =======

    /// Advance a layer's row counter without writing data
    ///
    /// Used to pad skipped layers so chains of different length stay
    /// row-aligned.
    pub fn add_null_row(&mut self, layer: usize) {
        let columns = self.layer_mut(layer);
        columns.rows += 1;
        let rows = columns.rows;
        if rows > self.rows {
            self.rows = rows;
        }
    }

    /// Row count of the whole table
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Row count of one layer, zero for layers never written
    pub fn layer_rows(&self, layer: usize) -> usize {
        self.layers.get(layer).map_or(0, |columns| columns.rows)
    }

    /// Rows written in one column
    pub fn column_rows(&self, layer: usize, col: usize) -> Result<usize> {
        let cols = self.column_count(layer);
        if col >= cols {
            return Err(TableEngineError::ColumnOutOfRange { layer, col, cols });
        }
        Ok(self.layers[layer].col_rows[col])
    }

    /// Number of layers that have been written to
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn layer_mut(&mut self, layer: usize) -> &mut LayerColumns {
        while self.layers.len() <= layer {
            self.layers.push(LayerColumns::default());
        }
        &mut self.layers[layer]
    }
}
