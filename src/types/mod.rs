#![forbid(unsafe_code)]

//! Identifiers and scalar values shared by the storage contract and the
//! query engine.

use std::fmt;

/// Position of a row inside a table.
pub type RowIndex = usize;

/// Column position inside a table schema.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ColumnId(pub usize);

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for ColumnId {
    fn from(value: usize) -> Self {
        ColumnId(value)
    }
}

/// Physical column encodings the engine knows how to scan.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ColumnType {
    /// Signed 64-bit integers.
    Int,
    /// Booleans stored as integers `0` / `1`.
    Bool,
    /// Timestamps stored as integer seconds.
    DateTime,
    /// Single-precision floats.
    Float,
    /// Double-precision floats.
    Double,
    /// Plain UTF-8 strings.
    String,
    /// Dictionary-coded strings.
    StringEnum,
    /// Arbitrary byte blobs.
    Binary,
    /// Single link to a row of a target table.
    Link,
    /// Ordered list of links to rows of a target table.
    LinkList,
    /// Nested subtable per row.
    Table,
}

impl ColumnType {
    /// Returns the numeric kind used when this column feeds an aggregate.
    pub fn value_kind(self) -> Option<ValueKind> {
        match self {
            ColumnType::Int | ColumnType::Bool | ColumnType::DateTime => Some(ValueKind::Int),
            ColumnType::Float => Some(ValueKind::Float),
            ColumnType::Double => Some(ValueKind::Double),
            _ => None,
        }
    }

    /// Whether values are stored in integer leaves.
    pub fn is_integer(self) -> bool {
        matches!(self, ColumnType::Int | ColumnType::Bool | ColumnType::DateTime)
    }

    /// Whether values are stored in floating-point leaves.
    pub fn is_floating(self) -> bool {
        matches!(self, ColumnType::Float | ColumnType::Double)
    }

    /// Whether values are stored as strings (plain or dictionary coded).
    pub fn is_string(self) -> bool {
        matches!(self, ColumnType::String | ColumnType::StringEnum)
    }
}

/// Numeric value classes an aggregate can be specialised for.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ValueKind {
    /// 64-bit integers (also booleans and timestamps).
    Int,
    /// Single-precision floats.
    Float,
    /// Double-precision floats.
    Double,
}

impl ValueKind {
    /// Whether the kind is single or double precision.
    pub fn is_floating(self) -> bool {
        matches!(self, ValueKind::Float | ValueKind::Double)
    }
}

/// Decoded numeric cell value.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Value {
    /// Integer payload.
    Int(i64),
    /// Single-precision payload.
    Float(f32),
    /// Double-precision payload.
    Double(f64),
}

impl Value {
    /// Widens the value to `f64`.
    pub fn as_f64(self) -> f64 {
        match self {
            Value::Int(v) => v as f64,
            Value::Float(v) => f64::from(v),
            Value::Double(v) => v,
        }
    }

    /// Returns the integer payload, if any.
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
        }
    }
}
