#![forbid(unsafe_code)]

//! Cost-based scheduling over a level of ANDed siblings.
//!
//! Each round the cheapest sibling drives: it collects up to `find_locals`
//! local matches, testing the other siblings at every candidate row. The
//! remaining siblings then drive a short probe window each so their
//! statistics stay current. Cost is
//! `selectivity_weight * time_unit / avg_match_distance + unit_cost`.

use std::ops::ControlFlow;

use tracing::trace;

use super::aggregate::AggregateState;
use super::condition::{CompareOp, Condition};
use super::profile::{record_profile_event, QueryProfileKind};
use super::scan::int_unit_cost;
use super::session::{NodeState, ScanState, Session};
use super::tree::NodeId;
use crate::storage::Leaf;
use crate::types::{ColumnId, RowIndex, Value, ValueKind};

impl<'a> Session<'a> {
    /// First row in `[start, end)` where every sibling of `head` matches.
    ///
    /// Siblings take turns jumping `start` forward until a full cycle agrees
    /// on the same row.
    pub(crate) fn find_in_level(&mut self, head: NodeId, mut start: RowIndex, end: RowIndex) -> Option<RowIndex> {
        let count = self.states[head.index()].siblings.len();
        assert!(count > 0, "node {head} evaluated before init");
        let mut next = 0;
        let mut first = 0;
        while start < end {
            let id = self.states[head.index()].siblings[next];
            let found = self.find_first_local(id, start, end)?;
            next = (next + 1) % count;
            if found == start {
                if next == first {
                    return Some(found);
                }
            } else {
                first = next;
                start = found;
            }
        }
        None
    }

    fn pick_driver(&self, head: NodeId) -> NodeId {
        let siblings = &self.states[head.index()].siblings;
        let mut best = siblings[0];
        let mut best_cost = self.states[best.index()].stats.cost(&self.options);
        for &id in &siblings[1..] {
            let cost = self.states[id.index()].stats.cost(&self.options);
            if cost < best_cost {
                best = id;
                best_cost = cost;
            }
        }
        trace!(node = best.index(), cost = best_cost, "query.driver.pick");
        best
    }

    /// Evaluates the level headed by `head` over `[start, end)`.
    pub(crate) fn run_level(
        &mut self,
        head: NodeId,
        state: &mut AggregateState<'_>,
        mut start: RowIndex,
        end: RowIndex,
        source: Option<ColumnId>,
    ) -> ControlFlow<()> {
        let find_locals = self.options.find_locals;
        let probe_matches = self.options.probe_matches;
        let best_dist = self.options.best_dist;
        let segment_rows = self.options.segment_rows;

        while start < end {
            let best = self.pick_driver(head);
            let segment_end = if self.states[best.index()].stats.unit_cost == 0.0 {
                end
            } else {
                start.saturating_add(segment_rows).min(end)
            };
            start = self.aggregate_local(best, state, start, segment_end, find_locals, source)?;

            let count = self.states[head.index()].siblings.len();
            for slot in 0..count {
                if start >= end {
                    break;
                }
                let id = self.states[head.index()].siblings[slot];
                if id == best {
                    continue;
                }
                let stats = self.states[id.index()].stats;
                if stats.unit_cost < stats.cost(&self.options) {
                    let window = if stats.unit_cost == 0.0 { end - start } else { best_dist };
                    let probe_end = start.saturating_add(window).min(end);
                    start = self.aggregate_local(id, state, start, probe_end, probe_matches, source)?;
                }
            }
        }
        ControlFlow::Continue(())
    }

    /// Drives `[start, end)` with `id`, stopping after `local_limit` local
    /// matches. Returns the first row not yet examined.
    fn aggregate_local(
        &mut self,
        id: NodeId,
        state: &mut AggregateState<'_>,
        start: RowIndex,
        end: RowIndex,
        local_limit: usize,
        source: Option<ColumnId>,
    ) -> ControlFlow<(), RowIndex> {
        if let Some((op, value)) = self.fused_int(id, source, state.kind()) {
            return self.aggregate_int_fused(id, op, value, state, start, end);
        }

        let probe_matches = self.options.probe_matches;
        let mut matches = 0;
        let mut row = start;
        loop {
            if matches == local_limit {
                self.update_distance(id, row - start, matches);
                return ControlFlow::Continue(row);
            }
            let Some(found) = self.find_first_local(id, row, end) else {
                self.update_distance(id, end - start, matches);
                return ControlFlow::Continue(end);
            };
            matches += 1;
            self.states[id.index()].stats.matches += 1;
            row = found + 1;
            if matches % probe_matches == 0 {
                self.update_distance(id, row - start, matches);
            }

            if self.siblings_agree(id, found) {
                let payload = if state.needs_payload() { self.payload(found) } else { None };
                if !state.apply(found, payload) {
                    return ControlFlow::Break(());
                }
            }
        }
    }

    fn siblings_agree(&mut self, id: NodeId, row: RowIndex) -> bool {
        let count = self.states[id.index()].siblings.len();
        for slot in 1..count {
            let sibling = self.states[id.index()].siblings[slot];
            record_profile_event(QueryProfileKind::SiblingProbe);
            if self.find_first_local(sibling, row, row + 1) != Some(row) {
                return false;
            }
        }
        true
    }

    fn update_distance(&mut self, id: NodeId, span: usize, matches: usize) {
        if span == 0 {
            return;
        }
        let distance = span as f64 / (matches + 1) as f64;
        self.states[id.index()].stats.avg_match_distance = distance;
    }

    /// Operator and constant of `id` when it can fuse scan and aggregate:
    /// a lone integer condition whose column is also the payload source.
    fn fused_int(&self, id: NodeId, source: Option<ColumnId>, kind: Option<ValueKind>) -> Option<(CompareOp, i64)> {
        if self.states[id.index()].siblings.len() != 1 || kind.is_some_and(ValueKind::is_floating) {
            return None;
        }
        match self.tree.node(id).condition {
            Condition::Integer { column, op, value } if source.map_or(true, |s| s == column) => {
                Some((op, value))
            }
            _ => None,
        }
    }

    fn aggregate_int_fused(
        &mut self,
        id: NodeId,
        op: CompareOp,
        value: i64,
        state: &mut AggregateState<'_>,
        start: RowIndex,
        end: RowIndex,
    ) -> ControlFlow<(), RowIndex> {
        record_profile_event(QueryProfileKind::FastPath);
        let wants_payload = state.needs_payload();
        let mut matches = 0;
        let mut row = start;
        let NodeState { stats, scan, .. } = &mut self.states[id.index()];
        let ScanState::Cursor(cursor) = scan else {
            panic!("integer node {id} scanned before init");
        };
        while row < end {
            if cursor.resolve(row) {
                stats.unit_cost = int_unit_cost(cursor.leaf());
            }
            let stop = cursor.local_end(end);
            if stop <= row {
                break;
            }
            let base = cursor.leaf_start();
            if let Leaf::Int { values, .. } = cursor.leaf() {
                for i in row - base..stop - base {
                    let Some(cell) = values.get(i) else {
                        continue;
                    };
                    if op.eval(cell, value) {
                        matches += 1;
                        if !state.apply(base + i, wants_payload.then_some(Value::Int(cell))) {
                            stats.matches += matches;
                            return ControlFlow::Break(());
                        }
                    }
                }
            }
            row = stop;
        }
        stats.matches += matches;
        self.update_distance(id, end - start, matches);
        ControlFlow::Continue(end)
    }
}
