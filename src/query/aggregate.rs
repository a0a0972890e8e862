#![forbid(unsafe_code)]

//! Accumulators fed once per qualifying row.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{Result, SondaError};
use crate::types::{RowIndex, Value, ValueKind};

/// What an evaluation does with each qualifying row.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    /// Record the first match and stop.
    ReturnFirst,
    /// Count matches.
    Count,
    /// Sum the source column.
    Sum,
    /// Smallest source value.
    Min,
    /// Largest source value.
    Max,
    /// Collect every matching row index.
    FindAll,
    /// Hand each match to a caller-supplied callback.
    Callback,
}

impl Action {
    /// Whether the action reads a payload value from the source column.
    pub fn needs_payload(self) -> bool {
        matches!(self, Action::Sum | Action::Min | Action::Max)
    }
}

/// Final outcome of an aggregate.
#[derive(Clone, Debug, PartialEq)]
pub enum Aggregate {
    /// Number of matches.
    Count(usize),
    /// Sum; integer sources stay integral, floating sources widen to `f64`.
    Sum(Value),
    /// Minimum, `None` when no non-null value was seen.
    Min(Option<Value>),
    /// Maximum, `None` when no non-null value was seen.
    Max(Option<Value>),
    /// First matching row.
    First(Option<RowIndex>),
    /// All matching rows in ascending order.
    All(Vec<RowIndex>),
    /// Callback action finished after this many matches.
    Callback {
        /// Matches delivered to the callback.
        matches: usize,
    },
}

#[derive(Clone, Copy, Debug, Default)]
struct Accumulator {
    int: i64,
    wide: f64,
    best: Option<Value>,
    seen: usize,
}

type FoldFn = fn(&mut Accumulator, Value);

fn fold_nothing(_: &mut Accumulator, _: Value) {}

fn fold_sum_int(acc: &mut Accumulator, value: Value) {
    if let Value::Int(v) = value {
        acc.int = acc.int.wrapping_add(v);
        acc.seen += 1;
    }
}

fn fold_sum_wide(acc: &mut Accumulator, value: Value) {
    acc.wide += value.as_f64();
    acc.seen += 1;
}

fn compare(lhs: Value, rhs: Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(&b)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(&b),
        (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
    }
}

fn fold_min(acc: &mut Accumulator, value: Value) {
    acc.seen += 1;
    match acc.best {
        Some(best) if compare(value, best) != Some(Ordering::Less) => {}
        _ => acc.best = Some(value),
    }
}

fn fold_max(acc: &mut Accumulator, value: Value) {
    acc.seen += 1;
    match acc.best {
        Some(best) if compare(value, best) != Some(Ordering::Greater) => {}
        _ => acc.best = Some(value),
    }
}

/// Fold routine for one `(action, kind)` pair, chosen once per state.
fn fold_for(action: Action, kind: Option<ValueKind>) -> FoldFn {
    match (action, kind) {
        (Action::Sum, Some(ValueKind::Int)) => fold_sum_int,
        (Action::Sum, Some(ValueKind::Float | ValueKind::Double)) => fold_sum_wide,
        (Action::Min, Some(_)) => fold_min,
        (Action::Max, Some(_)) => fold_max,
        _ => fold_nothing,
    }
}

/// Running result of one evaluation call.
///
/// `apply` is called exactly once per qualifying row and returns whether the
/// scan should continue. Null payloads are the additive identity for sums and
/// are skipped by min and max.
pub struct AggregateState<'c> {
    action: Action,
    kind: Option<ValueKind>,
    limit: usize,
    matches: usize,
    fold: FoldFn,
    acc: Accumulator,
    first: Option<RowIndex>,
    rows: Vec<RowIndex>,
    callback: Option<Box<dyn FnMut(RowIndex) -> bool + 'c>>,
}

impl fmt::Debug for AggregateState<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateState")
            .field("action", &self.action)
            .field("kind", &self.kind)
            .field("limit", &self.limit)
            .field("matches", &self.matches)
            .finish_non_exhaustive()
    }
}

impl<'c> AggregateState<'c> {
    /// Creates a state for `action` over a source of `kind`, stopping after
    /// `limit` matches.
    pub fn new(action: Action, kind: Option<ValueKind>, limit: usize) -> Result<Self> {
        if action.needs_payload() && kind.is_none() {
            return Err(SondaError::Invalid("aggregate needs a numeric source column"));
        }
        if action == Action::Callback {
            return Err(SondaError::Invalid("callback aggregates are built with with_callback"));
        }
        Ok(Self::build(action, kind, limit, None))
    }

    /// Creates a callback state; the callback returns `false` to stop early.
    pub fn with_callback(callback: impl FnMut(RowIndex) -> bool + 'c, limit: usize) -> Self {
        Self::build(Action::Callback, None, limit, Some(Box::new(callback)))
    }

    fn build(
        action: Action,
        kind: Option<ValueKind>,
        limit: usize,
        callback: Option<Box<dyn FnMut(RowIndex) -> bool + 'c>>,
    ) -> Self {
        Self {
            action,
            kind,
            limit,
            matches: 0,
            fold: fold_for(action, kind),
            acc: Accumulator::default(),
            first: None,
            rows: Vec::new(),
            callback,
        }
    }

    /// Action this state performs.
    pub fn action(&self) -> Action {
        self.action
    }

    /// Source kind the state was specialised for.
    pub fn kind(&self) -> Option<ValueKind> {
        self.kind
    }

    /// Whether `apply` wants a payload value.
    #[inline]
    pub fn needs_payload(&self) -> bool {
        self.action.needs_payload()
    }

    /// Whether the limit has already been reached.
    pub fn is_satisfied(&self) -> bool {
        self.matches >= self.limit
    }

    /// Matches applied so far.
    pub fn matches(&self) -> usize {
        self.matches
    }

    /// Non-null payloads folded so far.
    pub fn value_count(&self) -> usize {
        self.acc.seen
    }

    /// Records a qualifying row; returns `false` once evaluation should stop.
    #[inline]
    pub fn apply(&mut self, row: RowIndex, payload: Option<Value>) -> bool {
        self.matches += 1;
        match self.action {
            Action::ReturnFirst => {
                self.first = Some(row);
                return false;
            }
            Action::Count => {}
            Action::Sum | Action::Min | Action::Max => {
                if let Some(value) = payload {
                    (self.fold)(&mut self.acc, value);
                }
            }
            Action::FindAll => self.rows.push(row),
            Action::Callback => {
                if let Some(callback) = self.callback.as_mut() {
                    if !callback(row) {
                        return false;
                    }
                }
            }
        }
        self.matches < self.limit
    }

    /// Current sum in the widened result type.
    pub fn sum(&self) -> Value {
        match self.kind {
            Some(ValueKind::Float | ValueKind::Double) => Value::Double(self.acc.wide),
            _ => Value::Int(self.acc.int),
        }
    }

    /// Current minimum or maximum.
    pub fn best(&self) -> Option<Value> {
        self.acc.best
    }

    /// First recorded row.
    pub fn first(&self) -> Option<RowIndex> {
        self.first
    }

    /// Takes the collected rows.
    pub fn take_rows(&mut self) -> Vec<RowIndex> {
        std::mem::take(&mut self.rows)
    }

    /// Consumes the state into its result.
    pub fn finish(mut self) -> Aggregate {
        match self.action {
            Action::ReturnFirst => Aggregate::First(self.first),
            Action::Count => Aggregate::Count(self.matches),
            Action::Sum => Aggregate::Sum(self.sum()),
            Action::Min => Aggregate::Min(self.best()),
            Action::Max => Aggregate::Max(self.best()),
            Action::FindAll => Aggregate::All(self.take_rows()),
            Action::Callback => Aggregate::Callback {
                matches: self.matches,
            },
        }
    }
}
