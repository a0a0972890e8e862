#![forbid(unsafe_code)]

//! Per-evaluation state and the public evaluation API.
//!
//! A [`Session`] binds an immutable [`PredicateTree`] to a table. It owns one
//! [`NodeState`] per arena slot holding statistics, leaf cursors and scan
//! caches, so any number of sessions can evaluate the same tree at once.

use std::ops::{Bound, RangeBounds};

use smallvec::SmallVec;
use tracing::debug;

use super::aggregate::{Action, AggregateState};
use super::compound::{BranchCache, NotMemo};
use super::condition::{Condition, StringOp};
use super::cursor::LeafCursor;
use super::profile;
use super::scan::SortedCursor;
use super::tree::{NodeId, PredicateTree};
use crate::config::EngineOptions;
use crate::error::{Result, SondaError};
use crate::storage::{IndexLookup, TableSource};
use crate::types::{ColumnId, ColumnType, RowIndex, Value, ValueKind};

/// Running scheduling statistics of one node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeStats {
    /// Average number of rows between two local matches. Always positive.
    pub avg_match_distance: f64,
    /// Relative cost of testing one row; a linear byte scan is about 1.0.
    pub unit_cost: f64,
    /// Local scans issued this session.
    pub probes: usize,
    /// Local matches found while driving.
    pub matches: usize,
}

impl NodeStats {
    fn prior(avg_match_distance: f64, unit_cost: f64) -> Self {
        Self {
            avg_match_distance: avg_match_distance.max(f64::MIN_POSITIVE),
            unit_cost,
            probes: 0,
            matches: 0,
        }
    }

    /// Estimated cost of driving with this node; lower is better.
    #[inline]
    pub fn cost(&self, options: &EngineOptions) -> f64 {
        options.selectivity_weight * options.time_unit / self.avg_match_distance + self.unit_cost
    }
}

pub(crate) enum ScanState<'a> {
    Unbound,
    Cursor(LeafCursor<'a>),
    Text {
        cursor: LeafCursor<'a>,
        scratch: String,
        enum_code: Option<u32>,
    },
    Indexed {
        lookup: IndexLookup<'a>,
        cursor: SortedCursor,
    },
    Pair(LeafCursor<'a>, LeafCursor<'a>),
    Or(Vec<BranchCache>),
    Not(NotMemo),
    RowSet(SortedCursor),
    Direct,
}

pub(crate) struct NodeState<'a> {
    pub(crate) table: &'a dyn TableSource,
    pub(crate) siblings: SmallVec<[NodeId; 4]>,
    pub(crate) stats: NodeStats,
    pub(crate) scan: ScanState<'a>,
}

impl<'a> NodeState<'a> {
    fn unbound(table: &'a dyn TableSource) -> Self {
        Self {
            table,
            siblings: SmallVec::new(),
            stats: NodeStats::prior(1.0, 0.0),
            scan: ScanState::Unbound,
        }
    }
}

/// One evaluation context over a table.
///
/// Every public call re-initialises node state, so results never depend on
/// earlier calls; the statistics of the latest call stay readable through
/// [`Session::node_stats`].
pub struct Session<'a> {
    pub(crate) tree: &'a PredicateTree,
    pub(crate) table: &'a dyn TableSource,
    pub(crate) options: EngineOptions,
    pub(crate) states: Vec<NodeState<'a>>,
    pub(crate) source: Option<LeafCursor<'a>>,
    pub(crate) failure: Option<SondaError>,
}

impl<'a> Session<'a> {
    /// Validates `tree` and `options` and binds the tree to `table`.
    pub fn new(tree: &'a PredicateTree, table: &'a dyn TableSource, options: &EngineOptions) -> Result<Self> {
        let options = options.clone().checked()?;
        if let Err(err) = tree.validate() {
            debug!(error = %err, "query.session.invalid");
            return Err(err.into());
        }
        let mut session = Self {
            tree,
            table,
            options,
            states: (0..tree.len()).map(|_| NodeState::unbound(table)).collect(),
            source: None,
            failure: None,
        };
        session.init()?;
        debug!(nodes = tree.len(), rows = table.size(), "query.session.bind");
        Ok(session)
    }

    /// Options the scheduler runs with.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Statistics of `node` after the most recent call.
    pub fn node_stats(&self, node: NodeId) -> Option<NodeStats> {
        self.states.get(node.index()).map(|state| state.stats)
    }

    /// First matching row in `range`.
    pub fn find_first(&mut self, range: impl RangeBounds<RowIndex>) -> Result<Option<RowIndex>> {
        let mut state = AggregateState::new(Action::ReturnFirst, None, 1)?;
        self.aggregate(&mut state, range, None)?;
        Ok(state.first())
    }

    /// Up to `limit` matching rows in ascending order.
    pub fn find_all(&mut self, range: impl RangeBounds<RowIndex>, limit: usize) -> Result<Vec<RowIndex>> {
        let mut state = AggregateState::new(Action::FindAll, None, limit)?;
        self.aggregate(&mut state, range, None)?;
        Ok(state.take_rows())
    }

    /// Number of matching rows, capped at `limit`.
    pub fn count(&mut self, range: impl RangeBounds<RowIndex>, limit: usize) -> Result<usize> {
        let mut state = AggregateState::new(Action::Count, None, limit)?;
        self.aggregate(&mut state, range, None)?;
        Ok(state.matches())
    }

    /// Sum of `column` over matching rows. Floating columns sum as `f64`.
    pub fn sum(&mut self, column: ColumnId, range: impl RangeBounds<RowIndex>) -> Result<Value> {
        let state = self.fold(Action::Sum, column, range)?;
        Ok(state.sum())
    }

    /// Smallest non-null `column` value over matching rows.
    pub fn min(&mut self, column: ColumnId, range: impl RangeBounds<RowIndex>) -> Result<Option<Value>> {
        let state = self.fold(Action::Min, column, range)?;
        Ok(state.best())
    }

    /// Largest non-null `column` value over matching rows.
    pub fn max(&mut self, column: ColumnId, range: impl RangeBounds<RowIndex>) -> Result<Option<Value>> {
        let state = self.fold(Action::Max, column, range)?;
        Ok(state.best())
    }

    /// Mean of the non-null `column` values over matching rows.
    pub fn average(&mut self, column: ColumnId, range: impl RangeBounds<RowIndex>) -> Result<Option<f64>> {
        let state = self.fold(Action::Sum, column, range)?;
        Ok(match state.value_count() {
            0 => None,
            n => Some(state.sum().as_f64() / n as f64),
        })
    }

    /// Calls `callback` for each match until it returns `false`; returns the
    /// number of matches delivered.
    pub fn for_each_match(
        &mut self,
        range: impl RangeBounds<RowIndex>,
        callback: impl FnMut(RowIndex) -> bool,
    ) -> Result<usize> {
        let mut state = AggregateState::with_callback(callback, usize::MAX);
        self.aggregate(&mut state, range, None)?;
        Ok(state.matches())
    }

    fn fold(
        &mut self,
        action: Action,
        column: ColumnId,
        range: impl RangeBounds<RowIndex>,
    ) -> Result<AggregateState<'static>> {
        let kind = self.source_kind(column)?;
        let mut state = AggregateState::new(action, Some(kind), usize::MAX)?;
        self.aggregate(&mut state, range, Some(column))?;
        Ok(state)
    }

    /// Runs the scheduler over `range`, feeding every match into `state`.
    ///
    /// `source` names the column payloads are read from; it is required
    /// when the action folds values and ignored otherwise.
    pub fn aggregate(
        &mut self,
        state: &mut AggregateState<'_>,
        range: impl RangeBounds<RowIndex>,
        source: Option<ColumnId>,
    ) -> Result<()> {
        let (start, end) = bounds(range, self.table.size());
        self.init()?;
        let source = if state.needs_payload() {
            let column = source.ok_or(SondaError::Invalid("aggregate requires a source column"))?;
            let kind = self.source_kind(column)?;
            if state.kind() != Some(kind) {
                return Err(SondaError::ColumnType {
                    column,
                    found: self.column_type(column)?,
                    expected: "a column of the aggregate's value kind",
                });
            }
            self.source = Some(LeafCursor::new(self.table, column));
            Some(column)
        } else {
            None
        };
        if start >= end || state.is_satisfied() {
            return Ok(());
        }

        let timer = profile::profile_timer();
        match self.tree.root() {
            Some(root) => {
                let _ = self.run_level(root, state, start, end, source);
            }
            None => {
                for row in start..end {
                    let payload = if state.needs_payload() { self.payload(row) } else { None };
                    if !state.apply(row, payload) {
                        break;
                    }
                }
            }
        }
        profile::record_aggregate_timer(timer);
        self.source = None;
        match self.failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn column_type(&self, column: ColumnId) -> Result<ColumnType> {
        self.table
            .column_type(column)
            .ok_or(SondaError::ColumnNotFound { column })
    }

    fn source_kind(&self, column: ColumnId) -> Result<ValueKind> {
        let ty = self.column_type(column)?;
        ty.value_kind().ok_or(SondaError::ColumnType {
            column,
            found: ty,
            expected: "a numeric column",
        })
    }

    fn init(&mut self) -> Result<()> {
        self.failure = None;
        self.source = None;
        match self.tree.root() {
            Some(root) => self.init_level(root, self.table),
            None => Ok(()),
        }
    }

    /// Binds every node of the level headed by `head` to `table`.
    pub(crate) fn init_level(&mut self, head: NodeId, table: &'a dyn TableSource) -> Result<()> {
        let level = self.tree.level(head);
        for &id in &level {
            let mut siblings = SmallVec::with_capacity(level.len());
            siblings.push(id);
            siblings.extend(level.iter().copied().filter(|&other| other != id));
            self.init_node(id, table, siblings)?;
        }
        Ok(())
    }

    fn init_node(
        &mut self,
        id: NodeId,
        table: &'a dyn TableSource,
        siblings: SmallVec<[NodeId; 4]>,
    ) -> Result<()> {
        let tree = self.tree;
        let (stats, scan) = match &tree.node(id).condition {
            Condition::Integer { column, .. } => {
                expect_column(table, *column, ColumnType::is_integer, "an integer column")?;
                (
                    NodeStats::prior(100.0, 0.25),
                    ScanState::Cursor(LeafCursor::new(table, *column)),
                )
            }
            Condition::Float { column, .. } => {
                expect_column(table, *column, ColumnType::is_floating, "a floating-point column")?;
                (
                    NodeStats::prior(100.0, 1.0),
                    ScanState::Cursor(LeafCursor::new(table, *column)),
                )
            }
            Condition::String {
                column,
                op,
                case_insensitive,
                literal,
            } => {
                let ty = expect_column(table, *column, ColumnType::is_string, "a string column")?;
                let exact = *op == StringOp::Equal && !*case_insensitive;
                if exact && table.has_search_index(*column) {
                    let lookup = table.find_all_via_index(*column, literal.as_str());
                    (
                        NodeStats::prior(10.0, 0.0),
                        ScanState::Indexed {
                            lookup,
                            cursor: SortedCursor::default(),
                        },
                    )
                } else {
                    let stats = match (op, ty) {
                        (StringOp::Equal, ColumnType::StringEnum) => NodeStats::prior(10.0, 1.0),
                        (StringOp::Equal, _) => NodeStats::prior(10.0, 10.0),
                        _ => NodeStats::prior(100.0, 10.0),
                    };
                    (
                        stats,
                        ScanState::Text {
                            cursor: LeafCursor::new(table, *column),
                            scratch: String::with_capacity(literal.lower().len() * 2),
                            enum_code: None,
                        },
                    )
                }
            }
            Condition::Binary { column, .. } => {
                expect_column(table, *column, |ty| ty == ColumnType::Binary, "a binary column")?;
                (
                    NodeStats::prior(100.0, 100.0),
                    ScanState::Cursor(LeafCursor::new(table, *column)),
                )
            }
            Condition::TwoColumns { left, right, .. } => {
                let numeric = |ty: ColumnType| ty.is_integer() || ty.is_floating();
                let left_ty = expect_column(table, *left, numeric, "a numeric column")?;
                let right_ty = expect_column(table, *right, numeric, "a numeric column")?;
                if left_ty.is_integer() != right_ty.is_integer() {
                    return Err(SondaError::ColumnType {
                        column: *right,
                        found: right_ty,
                        expected: if left_ty.is_integer() {
                            "an integer column"
                        } else {
                            "a floating-point column"
                        },
                    });
                }
                (
                    NodeStats::prior(100.0, 100.0),
                    ScanState::Pair(LeafCursor::new(table, *left), LeafCursor::new(table, *right)),
                )
            }
            Condition::Or { branches } => {
                for branch in branches.iter().flatten() {
                    self.init_level(*branch, table)?;
                }
                (
                    NodeStats::prior(10.0, 50.0),
                    ScanState::Or(vec![BranchCache::default(); branches.len()]),
                )
            }
            Condition::Not { operand } => {
                if let Some(operand) = operand {
                    self.init_level(*operand, table)?;
                }
                (NodeStats::prior(10.0, 50.0), ScanState::Not(NotMemo::default()))
            }
            Condition::LinksTo { column, .. } => {
                let ty = expect_column(
                    table,
                    *column,
                    |ty| matches!(ty, ColumnType::Link | ColumnType::LinkList),
                    "a link column",
                )?;
                let scan = match ty {
                    ColumnType::Link => ScanState::Cursor(LeafCursor::new(table, *column)),
                    _ => ScanState::Direct,
                };
                (NodeStats::prior(10.0, 50.0), scan)
            }
            Condition::Subtable { column, .. } => {
                expect_column(table, *column, |ty| ty == ColumnType::Table, "a subtable column")?;
                (NodeStats::prior(10.0, 100.0), ScanState::Direct)
            }
            Condition::RowSet { rows } => (
                NodeStats::prior(table.size() as f64 / (rows.len() + 1) as f64, 0.0),
                ScanState::RowSet(SortedCursor::default()),
            ),
            Condition::Expression(_) => (NodeStats::prior(10.0, 50.0), ScanState::Direct),
        };
        self.states[id.index()] = NodeState {
            table,
            siblings,
            stats,
            scan,
        };
        Ok(())
    }

    pub(crate) fn payload(&mut self, row: RowIndex) -> Option<Value> {
        self.source.as_mut().and_then(|cursor| cursor.value_at(row))
    }
}

fn expect_column(
    table: &dyn TableSource,
    column: ColumnId,
    accepts: fn(ColumnType) -> bool,
    expected: &'static str,
) -> Result<ColumnType> {
    let found = table
        .column_type(column)
        .ok_or(SondaError::ColumnNotFound { column })?;
    if accepts(found) {
        Ok(found)
    } else {
        Err(SondaError::ColumnType {
            column,
            found,
            expected,
        })
    }
}

fn bounds(range: impl RangeBounds<RowIndex>, size: usize) -> (RowIndex, RowIndex) {
    let start = match range.start_bound() {
        Bound::Included(&start) => start,
        Bound::Excluded(&start) => start.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&end) => end.saturating_add(1),
        Bound::Excluded(&end) => end,
        Bound::Unbounded => size,
    };
    (start.min(size), end.min(size))
}
