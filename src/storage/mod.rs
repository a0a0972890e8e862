//! Storage-side contract consumed by the query engine, plus an in-memory
//! reference table.
//!
//! The engine never owns column data. It asks a [`TableSource`] for the leaf
//! covering a row, for search-index lookups, and for link and subtable
//! accessors. Anything implementing the trait can be queried.

/// Decoded leaf representations.
pub mod leaf;

/// Paged in-memory table used by tests, benches and embedders without a store.
pub mod memory;

pub use leaf::{bit_width, Leaf, Slab};
pub use memory::{shared, MemTable, SharedTable, DEFAULT_LEAF_SIZE};

use crate::types::{ColumnId, ColumnType, RowIndex};

/// Result of a search-index lookup for one key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexLookup<'a> {
    /// No row holds the key.
    NotFound,
    /// Exactly one row holds the key.
    Single(RowIndex),
    /// Several rows hold the key, sorted ascending.
    Many(&'a [RowIndex]),
}

/// Read access to one table's columns.
///
/// Implementations must be safe to read from several threads at once; the
/// engine only ever takes shared references. Row indices handed to leaf,
/// link and subtable accessors are always below [`TableSource::size`], and
/// leaf accessors are only called for columns whose type is leaf-backed
/// (everything except [`ColumnType::LinkList`] and [`ColumnType::Table`]).
pub trait TableSource: Send + Sync {
    /// Number of rows.
    fn size(&self) -> usize;

    /// Type of `column`, or `None` when the table has no such column.
    fn column_type(&self, column: ColumnId) -> Option<ColumnType>;

    /// Leaf covering `row` together with the row index of its first element.
    fn leaf(&self, column: ColumnId, row: RowIndex) -> (Leaf<'_>, RowIndex);

    /// Whether `column` carries a search index.
    fn has_search_index(&self, column: ColumnId) -> bool {
        let _ = column;
        false
    }

    /// Rows whose `column` equals `value` exactly, via the search index.
    fn find_all_via_index(&self, column: ColumnId, value: &str) -> IndexLookup<'_> {
        let _ = (column, value);
        IndexLookup::NotFound
    }

    /// Target of a single-link cell, decoding the `N + 1` raw encoding.
    fn resolve_single_link(&self, column: ColumnId, row: RowIndex) -> Option<RowIndex> {
        let (leaf, leaf_start) = self.leaf(column, row);
        match leaf {
            Leaf::Link(raw) => match raw[row - leaf_start] {
                0 => None,
                n => Some((n - 1) as RowIndex),
            },
            _ => None,
        }
    }

    /// Ordered targets of a link-list cell.
    fn link_list(&self, column: ColumnId, row: RowIndex) -> &[RowIndex];

    /// Nested table stored in a subtable cell.
    fn subtable(&self, column: ColumnId, row: RowIndex) -> &dyn TableSource;

    /// Whether this table is a structurally empty placeholder.
    fn is_degenerate(&self) -> bool {
        false
    }
}
