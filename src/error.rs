//! Crate-wide error type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::query::tree::TreeError;
use crate::types::{ColumnId, ColumnType};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SondaError>;

/// Errors surfaced while binding or running a predicate tree.
///
/// Scans themselves never fail for a validated, bound tree; everything here is
/// detected before the first row is examined, or while binding a nested
/// subtable.
#[derive(Debug, Error)]
pub enum SondaError {
    /// The predicate tree failed structural or literal validation.
    #[error("invalid predicate tree: {0}")]
    InvalidTree(#[from] TreeError),
    /// A condition referenced a column the table does not have.
    #[error("column {column} not found")]
    ColumnNotFound {
        /// Missing column.
        column: ColumnId,
    },
    /// A condition was bound to a column of an incompatible type.
    #[error("column {column} has type {found:?}, expected {expected}")]
    ColumnType {
        /// Offending column.
        column: ColumnId,
        /// Actual column type.
        found: ColumnType,
        /// Human readable description of the accepted types.
        expected: &'static str,
    },
    /// Engine options hold a value the scheduler cannot run with.
    #[error("invalid engine options: {0}")]
    Config(#[from] ConfigError),
    /// Caller supplied an argument the engine cannot honour.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
}
