//! Sonda evaluates predicate trees over columnar tables.
//!
//! Conditions are arranged in AND chains, OR and NOT nodes and nested
//! subtable blocks. Evaluation picks, chain by chain, the condition that is
//! currently cheapest to scan with and re-estimates costs as it goes, so a
//! selective condition placed last in a chain still ends up driving.
//!
//! ```
//! use sonda::{CompareOp, Condition, EngineOptions, MemTable, PredicateTree, Session};
//!
//! let mut table = MemTable::new();
//! let age = table.add_int_column("age", vec![10, 25, 7, 40, 25]).unwrap();
//! let tree = PredicateTree::single(Condition::int(age, CompareOp::Equal, 25));
//! let mut session = Session::new(&tree, &table, &EngineOptions::default()).unwrap();
//! assert_eq!(session.find_all(.., usize::MAX).unwrap(), vec![1, 4]);
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod query;
pub mod storage;
pub mod types;

pub use config::{ConfigError, EngineOptions};
pub use error::{Result, SondaError};
pub use query::{
    Action, Aggregate, AggregateState, BinaryOp, CompareOp, Condition, NodeId, NodeStats, PredicateTree,
    Session, StringOp,
};
pub use storage::{IndexLookup, Leaf, MemTable, SharedTable, TableSource};
pub use types::{ColumnId, ColumnType, RowIndex, Value, ValueKind};
