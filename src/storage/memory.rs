#![forbid(unsafe_code)]

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::debug;

use super::leaf::{bit_width, Leaf, Slab};
use super::{IndexLookup, TableSource};
use crate::error::{Result, SondaError};
use crate::types::{ColumnId, ColumnType, RowIndex};

/// Rows per leaf unless configured otherwise.
pub const DEFAULT_LEAF_SIZE: usize = 1000;

/// Table shared between threads; evaluation only ever takes the read side.
pub type SharedTable = Arc<RwLock<MemTable>>;

/// Wraps `table` for concurrent readers.
pub fn shared(table: MemTable) -> SharedTable {
    Arc::new(RwLock::new(table))
}

static DEGENERATE: MemTable = MemTable {
    leaf_size: DEFAULT_LEAF_SIZE,
    rows: 0,
    columns: Vec::new(),
    degenerate: true,
};

/// Column-organised in-memory table split into fixed-size leaves.
///
/// Columns are appended whole. The first column fixes the row count and every
/// later column must match it.
#[derive(Debug, Clone)]
pub struct MemTable {
    leaf_size: usize,
    rows: usize,
    columns: Vec<Column>,
    degenerate: bool,
}

#[derive(Debug, Clone)]
struct Column {
    name: String,
    ty: ColumnType,
    data: ColumnData,
    index: Option<FxHashMap<String, Vec<RowIndex>>>,
}

#[derive(Debug, Clone)]
enum ColumnData {
    Int {
        values: Vec<i64>,
        nulls: Option<Vec<bool>>,
        widths: Vec<u8>,
    },
    Float {
        values: Vec<f32>,
        nulls: Option<Vec<bool>>,
    },
    Double {
        values: Vec<f64>,
        nulls: Option<Vec<bool>>,
    },
    String(Vec<String>),
    StringEnum {
        keys: Vec<String>,
        codes: Vec<u32>,
    },
    Binary(Vec<Vec<u8>>),
    Link(Vec<u64>),
    LinkList(Vec<Vec<RowIndex>>),
    Table(Vec<Option<MemTable>>),
}

impl ColumnData {
    fn len(&self) -> usize {
        match self {
            ColumnData::Int { values, .. } => values.len(),
            ColumnData::Float { values, .. } => values.len(),
            ColumnData::Double { values, .. } => values.len(),
            ColumnData::String(values) => values.len(),
            ColumnData::StringEnum { codes, .. } => codes.len(),
            ColumnData::Binary(values) => values.len(),
            ColumnData::Link(values) => values.len(),
            ColumnData::LinkList(values) => values.len(),
            ColumnData::Table(values) => values.len(),
        }
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MemTable {
    /// Creates an empty table with [`DEFAULT_LEAF_SIZE`] rows per leaf.
    pub fn new() -> Self {
        Self {
            leaf_size: DEFAULT_LEAF_SIZE,
            rows: 0,
            columns: Vec::new(),
            degenerate: false,
        }
    }

    /// Creates an empty table whose columns are split every `leaf_size` rows.
    pub fn with_leaf_size(leaf_size: usize) -> Result<Self> {
        if leaf_size == 0 {
            return Err(SondaError::Invalid("leaf size must be at least 1"));
        }
        Ok(Self {
            leaf_size,
            ..Self::new()
        })
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Rows per leaf.
    pub fn leaf_size(&self) -> usize {
        self.leaf_size
    }

    /// Looks a column up by name.
    pub fn column_by_name(&self, name: &str) -> Option<ColumnId> {
        self.columns
            .iter()
            .position(|column| column.name == name)
            .map(ColumnId)
    }

    /// Appends an integer column.
    pub fn add_int_column(&mut self, name: &str, values: Vec<i64>) -> Result<ColumnId> {
        let widths = self.leaf_widths(&values);
        self.push_column(
            name,
            ColumnType::Int,
            ColumnData::Int {
                values,
                nulls: None,
                widths,
            },
        )
    }

    /// Appends an integer column with null cells.
    pub fn add_nullable_int_column(&mut self, name: &str, cells: Vec<Option<i64>>) -> Result<ColumnId> {
        let nulls = cells.iter().map(Option::is_none).collect();
        let values: Vec<i64> = cells.into_iter().map(|v| v.unwrap_or(0)).collect();
        let widths = self.leaf_widths(&values);
        self.push_column(
            name,
            ColumnType::Int,
            ColumnData::Int {
                values,
                nulls: Some(nulls),
                widths,
            },
        )
    }

    /// Appends a boolean column stored as `0` / `1` integers.
    pub fn add_bool_column(&mut self, name: &str, values: Vec<bool>) -> Result<ColumnId> {
        let values: Vec<i64> = values.into_iter().map(i64::from).collect();
        let widths = self.leaf_widths(&values);
        self.push_column(
            name,
            ColumnType::Bool,
            ColumnData::Int {
                values,
                nulls: None,
                widths,
            },
        )
    }

    /// Appends a timestamp column (seconds since the epoch).
    pub fn add_datetime_column(&mut self, name: &str, values: Vec<i64>) -> Result<ColumnId> {
        let widths = self.leaf_widths(&values);
        self.push_column(
            name,
            ColumnType::DateTime,
            ColumnData::Int {
                values,
                nulls: None,
                widths,
            },
        )
    }

    /// Appends a single-precision column.
    pub fn add_float_column(&mut self, name: &str, values: Vec<f32>) -> Result<ColumnId> {
        self.push_column(name, ColumnType::Float, ColumnData::Float { values, nulls: None })
    }

    /// Appends a single-precision column with null cells.
    pub fn add_nullable_float_column(&mut self, name: &str, cells: Vec<Option<f32>>) -> Result<ColumnId> {
        let nulls = cells.iter().map(Option::is_none).collect();
        let values = cells.into_iter().map(|v| v.unwrap_or(0.0)).collect();
        self.push_column(
            name,
            ColumnType::Float,
            ColumnData::Float {
                values,
                nulls: Some(nulls),
            },
        )
    }

    /// Appends a double-precision column.
    pub fn add_double_column(&mut self, name: &str, values: Vec<f64>) -> Result<ColumnId> {
        self.push_column(name, ColumnType::Double, ColumnData::Double { values, nulls: None })
    }

    /// Appends a double-precision column with null cells.
    pub fn add_nullable_double_column(&mut self, name: &str, cells: Vec<Option<f64>>) -> Result<ColumnId> {
        let nulls = cells.iter().map(Option::is_none).collect();
        let values = cells.into_iter().map(|v| v.unwrap_or(0.0)).collect();
        self.push_column(
            name,
            ColumnType::Double,
            ColumnData::Double {
                values,
                nulls: Some(nulls),
            },
        )
    }

    /// Appends a plain string column.
    pub fn add_string_column<S: Into<String>>(
        &mut self,
        name: &str,
        values: impl IntoIterator<Item = S>,
    ) -> Result<ColumnId> {
        let values = values.into_iter().map(Into::into).collect();
        self.push_column(name, ColumnType::String, ColumnData::String(values))
    }

    /// Appends a dictionary-coded string column; keys are assigned in first-seen order.
    pub fn add_enum_column<S: Into<String>>(
        &mut self,
        name: &str,
        values: impl IntoIterator<Item = S>,
    ) -> Result<ColumnId> {
        let mut keys: Vec<String> = Vec::new();
        let mut positions: FxHashMap<String, u32> = FxHashMap::default();
        let mut codes = Vec::new();
        for value in values {
            let value = value.into();
            let code = match positions.get(&value) {
                Some(&code) => code,
                None => {
                    let code = u32::try_from(keys.len())
                        .map_err(|_| SondaError::Invalid("too many distinct enum keys"))?;
                    positions.insert(value.clone(), code);
                    keys.push(value);
                    code
                }
            };
            codes.push(code);
        }
        self.push_column(name, ColumnType::StringEnum, ColumnData::StringEnum { keys, codes })
    }

    /// Appends a binary column.
    pub fn add_binary_column(&mut self, name: &str, values: Vec<Vec<u8>>) -> Result<ColumnId> {
        self.push_column(name, ColumnType::Binary, ColumnData::Binary(values))
    }

    /// Appends a single-link column; `None` leaves the link unset.
    pub fn add_link_column(&mut self, name: &str, targets: Vec<Option<RowIndex>>) -> Result<ColumnId> {
        let raw = targets
            .into_iter()
            .map(|target| target.map_or(0, |row| row as u64 + 1))
            .collect();
        self.push_column(name, ColumnType::Link, ColumnData::Link(raw))
    }

    /// Appends a link-list column.
    pub fn add_link_list_column(&mut self, name: &str, targets: Vec<Vec<RowIndex>>) -> Result<ColumnId> {
        self.push_column(name, ColumnType::LinkList, ColumnData::LinkList(targets))
    }

    /// Appends a subtable column; `None` cells report a degenerate table.
    pub fn add_subtable_column(&mut self, name: &str, tables: Vec<Option<MemTable>>) -> Result<ColumnId> {
        self.push_column(name, ColumnType::Table, ColumnData::Table(tables))
    }

    /// Builds a search index over a string column.
    pub fn add_search_index(&mut self, column: ColumnId) -> Result<()> {
        let entry = self
            .columns
            .get_mut(column.0)
            .ok_or(SondaError::ColumnNotFound { column })?;
        let mut index: FxHashMap<String, Vec<RowIndex>> = FxHashMap::default();
        match &entry.data {
            ColumnData::String(values) => {
                for (row, value) in values.iter().enumerate() {
                    index.entry(value.clone()).or_default().push(row);
                }
            }
            ColumnData::StringEnum { keys, codes } => {
                for (row, &code) in codes.iter().enumerate() {
                    index.entry(keys[code as usize].clone()).or_default().push(row);
                }
            }
            _ => {
                return Err(SondaError::ColumnType {
                    column,
                    found: entry.ty,
                    expected: "a string column",
                })
            }
        }
        debug!(column = column.0, keys = index.len(), "storage.memory.index");
        entry.index = Some(index);
        Ok(())
    }

    fn leaf_widths(&self, values: &[i64]) -> Vec<u8> {
        values.chunks(self.leaf_size).map(bit_width).collect()
    }

    fn push_column(&mut self, name: &str, ty: ColumnType, data: ColumnData) -> Result<ColumnId> {
        let len = data.len();
        if !self.columns.is_empty() && len != self.rows {
            return Err(SondaError::Invalid("column length does not match table size"));
        }
        self.rows = len;
        self.columns.push(Column {
            name: name.to_owned(),
            ty,
            data,
            index: None,
        });
        Ok(ColumnId(self.columns.len() - 1))
    }

    fn column(&self, column: ColumnId) -> &Column {
        match self.columns.get(column.0) {
            Some(entry) => entry,
            None => panic!("column {column} does not exist"),
        }
    }

    fn leaf_bounds(&self, row: RowIndex) -> (usize, usize) {
        let start = row - row % self.leaf_size;
        (start, (start + self.leaf_size).min(self.rows))
    }
}

fn nulls_slice(nulls: &Option<Vec<bool>>, start: usize, end: usize) -> Option<&[bool]> {
    nulls.as_deref().map(|nulls| &nulls[start..end])
}

impl TableSource for MemTable {
    fn size(&self) -> usize {
        self.rows
    }

    fn column_type(&self, column: ColumnId) -> Option<ColumnType> {
        self.columns.get(column.0).map(|entry| entry.ty)
    }

    fn leaf(&self, column: ColumnId, row: RowIndex) -> (Leaf<'_>, RowIndex) {
        let (start, end) = self.leaf_bounds(row);
        let leaf = match &self.column(column).data {
            ColumnData::Int {
                values,
                nulls,
                widths,
            } => Leaf::Int {
                values: Slab {
                    values: &values[start..end],
                    nulls: nulls_slice(nulls, start, end),
                },
                bit_width: widths[start / self.leaf_size],
            },
            ColumnData::Float { values, nulls } => Leaf::Float(Slab {
                values: &values[start..end],
                nulls: nulls_slice(nulls, start, end),
            }),
            ColumnData::Double { values, nulls } => Leaf::Double(Slab {
                values: &values[start..end],
                nulls: nulls_slice(nulls, start, end),
            }),
            ColumnData::String(values) => Leaf::String(&values[start..end]),
            ColumnData::StringEnum { keys, codes } => Leaf::StringEnum {
                keys,
                codes: &codes[start..end],
            },
            ColumnData::Binary(values) => Leaf::Binary(&values[start..end]),
            ColumnData::Link(values) => Leaf::Link(&values[start..end]),
            ColumnData::LinkList(_) | ColumnData::Table(_) => {
                panic!("column {column} is not leaf-backed")
            }
        };
        (leaf, start)
    }

    fn has_search_index(&self, column: ColumnId) -> bool {
        self.columns
            .get(column.0)
            .is_some_and(|entry| entry.index.is_some())
    }

    fn find_all_via_index(&self, column: ColumnId, value: &str) -> IndexLookup<'_> {
        let rows = self
            .columns
            .get(column.0)
            .and_then(|entry| entry.index.as_ref())
            .and_then(|index| index.get(value));
        match rows.map(Vec::as_slice) {
            None | Some([]) => IndexLookup::NotFound,
            Some([row]) => IndexLookup::Single(*row),
            Some(rows) => IndexLookup::Many(rows),
        }
    }

    fn link_list(&self, column: ColumnId, row: RowIndex) -> &[RowIndex] {
        match &self.column(column).data {
            ColumnData::LinkList(lists) => lists[row].as_slice(),
            _ => &[],
        }
    }

    fn subtable(&self, column: ColumnId, row: RowIndex) -> &dyn TableSource {
        match &self.column(column).data {
            ColumnData::Table(tables) => match &tables[row] {
                Some(table) => table,
                None => &DEGENERATE,
            },
            _ => &DEGENERATE,
        }
    }

    fn is_degenerate(&self) -> bool {
        self.degenerate
    }
}
