#![forbid(unsafe_code)]

//! Condition node kinds and their operators.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::tree::NodeId;
use crate::storage::TableSource;
use crate::types::{ColumnId, RowIndex};

/// Relational operator shared by numeric and cross-column conditions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
}

impl CompareOp {
    /// Applies the operator with the cell on the left.
    #[inline]
    pub fn eval<T: PartialOrd>(self, lhs: T, rhs: T) -> bool {
        match self {
            CompareOp::Equal => lhs == rhs,
            CompareOp::NotEqual => lhs != rhs,
            CompareOp::Less => lhs < rhs,
            CompareOp::LessEqual => lhs <= rhs,
            CompareOp::Greater => lhs > rhs,
            CompareOp::GreaterEqual => lhs >= rhs,
        }
    }
}

/// String operators.
///
/// Case-insensitive variants of every operator compare the lower-case
/// foldings of cell and literal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StringOp {
    /// Whole-value equality.
    Equal,
    /// Whole-value inequality.
    NotEqual,
    /// Cell starts with the literal.
    BeginsWith,
    /// Cell ends with the literal.
    EndsWith,
    /// Cell contains the literal.
    Contains,
    /// Cell sorts before the literal.
    Less,
    /// Cell sorts before or equal to the literal.
    LessEqual,
    /// Cell sorts after the literal.
    Greater,
    /// Cell sorts after or equal to the literal.
    GreaterEqual,
}

impl StringOp {
    #[inline]
    fn eval(self, cell: &str, literal: &str) -> bool {
        match self {
            StringOp::Equal => cell == literal,
            StringOp::NotEqual => cell != literal,
            StringOp::BeginsWith => cell.starts_with(literal),
            StringOp::EndsWith => cell.ends_with(literal),
            StringOp::Contains => cell.contains(literal),
            StringOp::Less => cell < literal,
            StringOp::LessEqual => cell <= literal,
            StringOp::Greater => cell > literal,
            StringOp::GreaterEqual => cell >= literal,
        }
    }
}

/// Byte-string operators.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// Byte-wise equality.
    Equal,
    /// Byte-wise inequality.
    NotEqual,
    /// Cell starts with the literal.
    BeginsWith,
    /// Cell ends with the literal.
    EndsWith,
    /// Cell contains the literal.
    Contains,
}

impl BinaryOp {
    /// Applies the operator to one cell.
    #[inline]
    pub fn eval(self, cell: &[u8], literal: &[u8]) -> bool {
        match self {
            BinaryOp::Equal => cell == literal,
            BinaryOp::NotEqual => cell != literal,
            BinaryOp::BeginsWith => cell.starts_with(literal),
            BinaryOp::EndsWith => cell.ends_with(literal),
            BinaryOp::Contains => {
                literal.is_empty() || cell.windows(literal.len()).any(|window| window == literal)
            }
        }
    }
}

/// String literal with its case-folded forms computed once.
#[derive(Clone, Debug, PartialEq)]
pub struct StringLiteral {
    raw: Vec<u8>,
    text: String,
    lower: String,
    utf8_error: Option<String>,
}

impl StringLiteral {
    /// Copies `raw`; invalid UTF-8 is kept and reported by tree validation.
    pub fn new(raw: impl Into<Vec<u8>>) -> Self {
        let raw = raw.into();
        let (text, utf8_error) = match std::str::from_utf8(&raw) {
            Ok(text) => (text.to_owned(), None),
            Err(err) => (String::from_utf8_lossy(&raw).into_owned(), Some(err.to_string())),
        };
        let lower = text.to_lowercase();
        Self {
            raw,
            text,
            lower,
            utf8_error,
        }
    }

    /// Bytes as supplied.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Text form; lossy when the literal is malformed.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Lower-case folding.
    pub fn lower(&self) -> &str {
        &self.lower
    }

    /// Decoding error, if the bytes are not UTF-8.
    pub fn utf8_error(&self) -> Option<&str> {
        self.utf8_error.as_deref()
    }

    /// Tests `cell` against the literal. `scratch` receives the folded cell
    /// for case-insensitive operators other than (in)equality.
    pub fn matches(&self, op: StringOp, case_insensitive: bool, cell: &str, scratch: &mut String) -> bool {
        if !case_insensitive {
            return op.eval(cell, &self.text);
        }
        match op {
            StringOp::Equal => self.equals_folded(cell),
            StringOp::NotEqual => !self.equals_folded(cell),
            _ => {
                scratch.clear();
                scratch.extend(cell.chars().flat_map(char::to_lowercase));
                op.eval(scratch.as_str(), &self.lower)
            }
        }
    }

    fn equals_folded(&self, cell: &str) -> bool {
        cell.chars().flat_map(char::to_lowercase).eq(self.lower.chars())
    }
}

/// Opaque row predicate evaluated by expression nodes.
pub trait RowPredicate: Send + Sync {
    /// First row in `[start, end)` satisfying the predicate.
    fn find_first(&self, table: &dyn TableSource, start: RowIndex, end: RowIndex) -> Option<RowIndex>;
}

/// Adapts a per-row closure into a [`RowPredicate`].
pub struct FnPredicate<F>(pub F);

impl<F> RowPredicate for FnPredicate<F>
where
    F: Fn(&dyn TableSource, RowIndex) -> bool + Send + Sync,
{
    fn find_first(&self, table: &dyn TableSource, start: RowIndex, end: RowIndex) -> Option<RowIndex> {
        (start..end).find(|&row| (self.0)(table, row))
    }
}

/// Shared handle to an expression predicate.
#[derive(Clone)]
pub struct Predicate(pub Arc<dyn RowPredicate>);

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate(..)")
    }
}

/// One node's predicate.
///
/// Leaf kinds test a column; structural kinds reference other nodes of the
/// same [`PredicateTree`](super::tree::PredicateTree).
#[derive(Clone, Debug)]
pub enum Condition {
    /// Integer, boolean or timestamp column against a constant.
    Integer {
        /// Tested column.
        column: ColumnId,
        /// Operator.
        op: CompareOp,
        /// Constant.
        value: i64,
    },
    /// Float or double column against a constant.
    Float {
        /// Tested column.
        column: ColumnId,
        /// Operator.
        op: CompareOp,
        /// Constant; narrowed to `f32` for single-precision columns.
        value: f64,
    },
    /// String column against a literal.
    String {
        /// Tested column.
        column: ColumnId,
        /// Operator.
        op: StringOp,
        /// Compare case-folded forms.
        case_insensitive: bool,
        /// Literal.
        literal: StringLiteral,
    },
    /// Binary column against a byte literal.
    Binary {
        /// Tested column.
        column: ColumnId,
        /// Operator.
        op: BinaryOp,
        /// Literal.
        value: Vec<u8>,
    },
    /// Two columns of the same row compared with each other.
    TwoColumns {
        /// Left-hand column.
        left: ColumnId,
        /// Right-hand column.
        right: ColumnId,
        /// Operator.
        op: CompareOp,
    },
    /// Any branch matches; each branch heads its own AND chain.
    Or {
        /// Branch heads; `None` marks a missing operand.
        branches: Vec<Option<NodeId>>,
    },
    /// The operand chain does not match.
    Not {
        /// Operand head.
        operand: Option<NodeId>,
    },
    /// Link or link-list column points at `target`.
    LinksTo {
        /// Link column.
        column: ColumnId,
        /// Target row in the linked table.
        target: RowIndex,
    },
    /// Some row of the row's subtable matches `inner`.
    Subtable {
        /// Subtable column.
        column: ColumnId,
        /// Head of the inner query, evaluated against each subtable.
        inner: Option<NodeId>,
    },
    /// Row is one of a fixed, ascending set.
    RowSet {
        /// Sorted, deduplicated rows.
        rows: Arc<[RowIndex]>,
    },
    /// Externally supplied predicate.
    Expression(Predicate),
}

impl Condition {
    /// `column op value` over an integer-class column.
    pub fn int(column: ColumnId, op: CompareOp, value: i64) -> Self {
        Condition::Integer { column, op, value }
    }

    /// `column op value` over a float or double column.
    pub fn float(column: ColumnId, op: CompareOp, value: f64) -> Self {
        Condition::Float { column, op, value }
    }

    /// Case-sensitive string condition.
    pub fn string(column: ColumnId, op: StringOp, literal: impl Into<Vec<u8>>) -> Self {
        Condition::String {
            column,
            op,
            case_insensitive: false,
            literal: StringLiteral::new(literal),
        }
    }

    /// Case-insensitive string condition.
    pub fn string_ci(column: ColumnId, op: StringOp, literal: impl Into<Vec<u8>>) -> Self {
        Condition::String {
            column,
            op,
            case_insensitive: true,
            literal: StringLiteral::new(literal),
        }
    }

    /// Binary condition.
    pub fn binary(column: ColumnId, op: BinaryOp, value: impl Into<Vec<u8>>) -> Self {
        Condition::Binary {
            column,
            op,
            value: value.into(),
        }
    }

    /// `left op right` within one row.
    pub fn two_columns(left: ColumnId, op: CompareOp, right: ColumnId) -> Self {
        Condition::TwoColumns { left, right, op }
    }

    /// Disjunction of branch heads.
    pub fn or(branches: impl IntoIterator<Item = NodeId>) -> Self {
        Condition::Or {
            branches: branches.into_iter().map(Some).collect(),
        }
    }

    /// Negation of an operand chain.
    pub fn not(operand: NodeId) -> Self {
        Condition::Not {
            operand: Some(operand),
        }
    }

    /// Link membership.
    pub fn links_to(column: ColumnId, target: RowIndex) -> Self {
        Condition::LinksTo { column, target }
    }

    /// Subtable existence.
    pub fn subtable(column: ColumnId, inner: NodeId) -> Self {
        Condition::Subtable {
            column,
            inner: Some(inner),
        }
    }

    /// Restriction to `rows`; the list is sorted and deduplicated.
    pub fn row_set(rows: impl IntoIterator<Item = RowIndex>) -> Self {
        let mut rows: Vec<RowIndex> = rows.into_iter().collect();
        rows.sort_unstable();
        rows.dedup();
        Condition::RowSet { rows: rows.into() }
    }

    /// Externally supplied predicate.
    pub fn expression(predicate: impl RowPredicate + 'static) -> Self {
        Condition::Expression(Predicate(Arc::new(predicate)))
    }

    /// Expression from a per-row closure.
    pub fn matching<F>(predicate: F) -> Self
    where
        F: Fn(&dyn TableSource, RowIndex) -> bool + Send + Sync + 'static,
    {
        Self::expression(FnPredicate(predicate))
    }

    /// Node references held by this condition, excluding the AND chain.
    pub fn children(&self) -> SmallVec<[Option<NodeId>; 2]> {
        match self {
            Condition::Or { branches } => branches.iter().copied().collect(),
            Condition::Not { operand } => smallvec::smallvec![*operand],
            Condition::Subtable { inner, .. } => smallvec::smallvec![*inner],
            _ => SmallVec::new(),
        }
    }

    pub(crate) fn remap(&mut self, translation: &FxHashMap<NodeId, NodeId>) {
        let rewrite = |id: &mut Option<NodeId>| {
            if let Some(old) = *id {
                *id = translation.get(&old).copied();
            }
        };
        match self {
            Condition::Or { branches } => branches.iter_mut().for_each(rewrite),
            Condition::Not { operand } => rewrite(operand),
            Condition::Subtable { inner, .. } => rewrite(inner),
            _ => {}
        }
    }
}
