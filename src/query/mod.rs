#![forbid(unsafe_code)]

//! Predicate-tree evaluation.
//!
//! A [`PredicateTree`] is an arena of conditions linked into AND chains. A
//! [`Session`] binds the tree to a table and evaluates it with an adaptive
//! scheduler that lets the cheapest sibling of each chain drive the scan,
//! feeding matches into an [`AggregateState`].

/// Aggregate actions and the accumulator matches are folded into.
pub mod aggregate;

/// Condition variants and literal matching.
pub mod condition;

/// Leaf-granular column cursor.
pub mod cursor;

/// Optional scan counters, enabled through `SONDA_PROFILE`.
pub mod profile;

/// Evaluation sessions and per-node statistics.
pub mod session;

/// Node arena, AND chains and structural validation.
pub mod tree;

mod compound;
mod driver;
mod scan;

pub use aggregate::{Action, Aggregate, AggregateState};
pub use condition::{BinaryOp, CompareOp, Condition, FnPredicate, Predicate, RowPredicate, StringLiteral, StringOp};
pub use cursor::LeafCursor;
pub use profile::{profile_snapshot, QueryProfileSnapshot};
pub use session::{NodeStats, Session};
pub use tree::{Node, NodeId, PredicateTree, TreeError};
