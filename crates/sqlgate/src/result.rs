//! Tabular results for sqlgate
//!
//! A query's output is a flat, self-describing table: column count, row
//! count, and a row-major cell sequence of exactly `rows * columns` text
//! cells (`None` = SQL NULL). The materializer drains every pending row
//! of an executed statement — the transport requires full consumption
//! before the connection can be reused or closed cleanly, even when the
//! caller only wanted an existence check.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::transport::{TextRow, TransportHandle};

/// Upper bound on a single cell's text, in bytes. Longer values are
/// silently truncated at a character boundary; this mirrors the fixed
/// per-column bind buffers of DB-Library style clients.
pub const CELL_TEXT_MAX: usize = 256;

/// Flattened row-major result of a query, self-describing by row and
/// column counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabularResult {
    columns: usize,
    rows: usize,
    cells: Vec<Option<String>>,
}

impl TabularResult {
    /// An empty result with the given column count and no rows
    pub fn empty(columns: usize) -> Self {
        Self {
            columns,
            rows: 0,
            cells: Vec::new(),
        }
    }

    /// Build a result from complete rows. Each row is padded or cut to
    /// the column count and its cells clamped to [`CELL_TEXT_MAX`].
    pub fn from_rows(columns: usize, source: impl IntoIterator<Item = TextRow>) -> Self {
        let mut cells = Vec::new();
        let mut rows = 0;
        for mut row in source {
            row.resize(columns, None);
            cells.extend(row.into_iter().map(|c| c.map(clamp_cell)));
            rows += 1;
        }
        Self {
            columns,
            rows,
            cells,
        }
    }

    /// Number of result columns
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Number of result rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// The flattened row-major cell sequence, `rows * columns` long
    pub fn cells(&self) -> &[Option<String>] {
        &self.cells
    }

    /// Cell text at `(row, col)`, `None` for SQL NULL or out of range
    pub fn get(&self, row: usize, col: usize) -> Option<&str> {
        if row >= self.rows || col >= self.columns {
            return None;
        }
        self.cells[row * self.columns + col].as_deref()
    }

    /// One row's cells, or `None` when out of range
    pub fn row(&self, idx: usize) -> Option<&[Option<String>]> {
        if idx >= self.rows {
            return None;
        }
        let start = idx * self.columns;
        Some(&self.cells[start..start + self.columns])
    }

    /// Iterate rows as cell slices
    pub fn iter_rows(&self) -> impl Iterator<Item = &[Option<String>]> {
        self.cells.chunks_exact(self.columns.max(1)).take(self.rows)
    }

    /// Whether the result holds no rows
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }
}

/// Drain every pending row of an executed statement into a
/// [`TabularResult`].
///
/// Zero rows yield row count 0 and an empty cell sequence regardless of
/// the column count. A fetch failure propagates after however many rows
/// were consumed; the caller is expected to close the connection, which
/// resets the pending transport state.
pub async fn materialize(handle: &dyn TransportHandle) -> Result<TabularResult> {
    let columns = handle.column_count().await;

    let mut cells = Vec::new();
    let mut rows = 0;
    while let Some(mut row) = handle.next_row().await? {
        row.resize(columns, None);
        cells.extend(row.into_iter().map(|c| c.map(clamp_cell)));
        rows += 1;
    }

    Ok(TabularResult {
        columns,
        rows,
        cells,
    })
}

/// Clamp cell text to [`CELL_TEXT_MAX`] bytes on a character boundary
fn clamp_cell(mut text: String) -> String {
    if text.len() > CELL_TEXT_MAX {
        let mut end = CELL_TEXT_MAX;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}
