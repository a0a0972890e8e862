#![forbid(unsafe_code)]

use tracing::trace;

use crate::storage::{Leaf, TableSource};
use crate::types::{ColumnId, RowIndex, Value};

const UNMAPPED: Leaf<'static> = Leaf::Link(&[]);

/// Per-column cache of the storage leaf most recently touched.
///
/// The cursor covers the half-open interval `[leaf_start, leaf_end)`. It
/// starts out unmapped and asks the table for a new leaf only when a row
/// falls outside the cached interval.
pub struct LeafCursor<'a> {
    table: &'a dyn TableSource,
    column: ColumnId,
    leaf: Leaf<'a>,
    leaf_start: RowIndex,
    leaf_end: RowIndex,
}

impl<'a> LeafCursor<'a> {
    /// Creates an unmapped cursor over `column` of `table`.
    pub fn new(table: &'a dyn TableSource, column: ColumnId) -> Self {
        Self {
            table,
            column,
            leaf: UNMAPPED,
            leaf_start: 0,
            leaf_end: 0,
        }
    }

    /// Ensures the cached leaf covers `row`; returns whether a remap happened.
    #[inline]
    pub fn resolve(&mut self, row: RowIndex) -> bool {
        if row >= self.leaf_start && row < self.leaf_end {
            return false;
        }
        let (leaf, start) = self.table.leaf(self.column, row);
        self.leaf = leaf;
        self.leaf_start = start;
        self.leaf_end = start + leaf.len();
        trace!(
            column = self.column.0,
            leaf_start = start,
            leaf_len = leaf.len(),
            "query.cursor.remap"
        );
        true
    }

    /// Decoded value at `row`, remapping if needed.
    pub fn value_at(&mut self, row: RowIndex) -> Option<Value> {
        self.resolve(row);
        self.leaf.value(row - self.leaf_start)
    }

    /// Clamps `global_end` to the end of the cached leaf.
    #[inline]
    pub fn local_end(&self, global_end: RowIndex) -> RowIndex {
        global_end.min(self.leaf_end)
    }

    /// The cached leaf. Unmapped cursors return an empty leaf.
    #[inline]
    pub fn leaf(&self) -> Leaf<'a> {
        self.leaf
    }

    /// First row covered by the cached leaf.
    #[inline]
    pub fn leaf_start(&self) -> RowIndex {
        self.leaf_start
    }

    /// One past the last row covered by the cached leaf.
    #[inline]
    pub fn leaf_end(&self) -> RowIndex {
        self.leaf_end
    }
}
