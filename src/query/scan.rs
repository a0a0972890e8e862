#![forbid(unsafe_code)]

//! Local scan primitives of the leaf-level condition kinds.

use std::ops::Range;

use super::condition::{BinaryOp, CompareOp, Condition, StringLiteral, StringOp};
use super::cursor::LeafCursor;
use super::profile::{record_profile_event, QueryProfileKind};
use super::session::{NodeState, NodeStats, ScanState, Session};
use super::tree::NodeId;
use crate::storage::{IndexLookup, Leaf};
use crate::types::RowIndex;

/// Bits that cost one unit of linear scanning.
const BITWIDTH_TIME_UNIT: f64 = 64.0;

/// Forward cursor over an ascending row list.
///
/// Resumes from the previous position while `start` only moves forward and
/// rewinds when it moves backward.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct SortedCursor {
    next: usize,
    last_start: RowIndex,
}

impl SortedCursor {
    pub(crate) fn first_in(&mut self, rows: &[RowIndex], start: RowIndex, end: RowIndex) -> Option<RowIndex> {
        if start < self.last_start {
            self.next = 0;
        }
        self.last_start = start;
        self.next += rows[self.next..].partition_point(|&row| row < start);
        rows.get(self.next).copied().filter(|&row| row < end)
    }
}

/// Unit cost of scanning an integer leaf of the given packing.
pub(crate) fn int_unit_cost(leaf: Leaf<'_>) -> f64 {
    match leaf {
        Leaf::Int { bit_width: 0, values } => 1.0 / values.len().max(1) as f64,
        Leaf::Int { bit_width, .. } => f64::from(bit_width) / BITWIDTH_TIME_UNIT,
        _ => 1.0,
    }
}

impl<'a> Session<'a> {
    /// First row in `[start, end)` satisfying `id`'s own predicate.
    pub(crate) fn find_first_local(&mut self, id: NodeId, start: RowIndex, end: RowIndex) -> Option<RowIndex> {
        if start >= end {
            return None;
        }
        record_profile_event(QueryProfileKind::LocalScan);
        self.states[id.index()].stats.probes += 1;
        let tree = self.tree;
        match &tree.node(id).condition {
            Condition::Or { branches } => self.scan_or(id, branches, start, end),
            Condition::Not { operand } => self.scan_not(id, *operand, start, end),
            Condition::Subtable { column, inner } => self.scan_subtable(id, *column, *inner, start, end),
            condition => scan_leaf(condition, &mut self.states[id.index()], start, end),
        }
    }
}

fn scan_leaf(condition: &Condition, state: &mut NodeState<'_>, start: RowIndex, end: RowIndex) -> Option<RowIndex> {
    let NodeState {
        table, stats, scan, ..
    } = state;
    match (condition, scan) {
        (Condition::Integer { op, value, .. }, ScanState::Cursor(cursor)) => {
            scan_int(cursor, stats, *op, *value, start, end)
        }
        (Condition::Float { op, value, .. }, ScanState::Cursor(cursor)) => {
            scan_float(cursor, *op, *value, start, end)
        }
        (
            Condition::String {
                op,
                case_insensitive,
                literal,
                ..
            },
            ScanState::Text {
                cursor,
                scratch,
                enum_code,
            },
        ) => scan_text(cursor, scratch, enum_code, literal, *op, *case_insensitive, start, end),
        (Condition::String { .. }, ScanState::Indexed { lookup, cursor }) => match *lookup {
            IndexLookup::NotFound => None,
            IndexLookup::Single(row) => (start..end).contains(&row).then_some(row),
            IndexLookup::Many(rows) => cursor.first_in(rows, start, end),
        },
        (Condition::Binary { op, value, .. }, ScanState::Cursor(cursor)) => {
            scan_binary(cursor, *op, value, start, end)
        }
        (Condition::TwoColumns { op, .. }, ScanState::Pair(left, right)) => {
            scan_pair(left, right, *op, start, end)
        }
        (Condition::LinksTo { target, .. }, ScanState::Cursor(cursor)) => {
            let wanted = *target as u64 + 1;
            scan_leaves(cursor, start, end, |leaf, range, _| match leaf {
                Leaf::Link(raw) => range.into_iter().find(|&i| raw[i] == wanted),
                _ => None,
            })
        }
        (Condition::LinksTo { column, target }, ScanState::Direct) => {
            (start..end).find(|&row| table.link_list(*column, row).contains(target))
        }
        (Condition::RowSet { rows }, ScanState::RowSet(cursor)) => cursor.first_in(rows, start, end),
        (Condition::Expression(predicate), ScanState::Direct) => predicate.0.find_first(*table, start, end),
        (condition, _) => panic!("{condition:?} scanned before init"),
    }
}

/// Walks the leaves covering `[start, end)`, handing `find_in` each leaf, the
/// leaf-relative range to test and whether the leaf was just remapped.
#[inline]
fn scan_leaves<'a>(
    cursor: &mut LeafCursor<'a>,
    start: RowIndex,
    end: RowIndex,
    mut find_in: impl FnMut(Leaf<'a>, Range<usize>, bool) -> Option<usize>,
) -> Option<RowIndex> {
    let mut row = start;
    while row < end {
        let remapped = cursor.resolve(row);
        let stop = cursor.local_end(end);
        if stop <= row {
            return None;
        }
        let base = cursor.leaf_start();
        if let Some(i) = find_in(cursor.leaf(), row - base..stop - base, remapped) {
            return Some(base + i);
        }
        row = stop;
    }
    None
}

fn scan_int(
    cursor: &mut LeafCursor<'_>,
    stats: &mut NodeStats,
    op: CompareOp,
    value: i64,
    start: RowIndex,
    end: RowIndex,
) -> Option<RowIndex> {
    scan_leaves(cursor, start, end, |leaf, mut range, remapped| {
        if remapped {
            stats.unit_cost = int_unit_cost(leaf);
        }
        match leaf {
            Leaf::Int { values, .. } => range.find(|&i| values.get(i).is_some_and(|v| op.eval(v, value))),
            _ => None,
        }
    })
}

fn scan_float(cursor: &mut LeafCursor<'_>, op: CompareOp, value: f64, start: RowIndex, end: RowIndex) -> Option<RowIndex> {
    let narrow = value as f32;
    scan_leaves(cursor, start, end, |leaf, mut range, _| match leaf {
        Leaf::Float(values) => range.find(|&i| values.get(i).is_some_and(|v| op.eval(v, narrow))),
        Leaf::Double(values) => range.find(|&i| values.get(i).is_some_and(|v| op.eval(v, value))),
        _ => None,
    })
}

#[allow(clippy::too_many_arguments)]
fn scan_text(
    cursor: &mut LeafCursor<'_>,
    scratch: &mut String,
    enum_code: &mut Option<u32>,
    literal: &StringLiteral,
    op: StringOp,
    case_insensitive: bool,
    start: RowIndex,
    end: RowIndex,
) -> Option<RowIndex> {
    let exact = op == StringOp::Equal && !case_insensitive;
    scan_leaves(cursor, start, end, |leaf, mut range, remapped| match leaf {
        Leaf::StringEnum { keys, codes } if exact => {
            if remapped {
                *enum_code = keys
                    .iter()
                    .position(|key| key.as_str() == literal.as_str())
                    .and_then(|code| u32::try_from(code).ok());
            }
            let code = (*enum_code)?;
            range.find(|&i| codes[i] == code)
        }
        leaf => range.find(|&i| {
            leaf.str_at(i)
                .is_some_and(|cell| literal.matches(op, case_insensitive, cell, scratch))
        }),
    })
}

fn scan_binary(cursor: &mut LeafCursor<'_>, op: BinaryOp, value: &[u8], start: RowIndex, end: RowIndex) -> Option<RowIndex> {
    scan_leaves(cursor, start, end, |leaf, mut range, _| {
        range.find(|&i| leaf.bytes_at(i).is_some_and(|cell| op.eval(cell, value)))
    })
}

/// Lockstep scan of two columns over the intersection of their leaves.
fn scan_pair(
    left: &mut LeafCursor<'_>,
    right: &mut LeafCursor<'_>,
    op: CompareOp,
    start: RowIndex,
    end: RowIndex,
) -> Option<RowIndex> {
    let mut row = start;
    while row < end {
        left.resolve(row);
        right.resolve(row);
        let stop = left.local_end(right.local_end(end));
        if stop <= row {
            return None;
        }
        let (lb, rb) = (left.leaf_start(), right.leaf_start());
        let found = match (left.leaf(), right.leaf()) {
            // Two all-zero leaves compare equal everywhere. Every other width
            // pairing goes through the per-row loop below, which is the general
            // integer case.
            (
                Leaf::Int {
                    values: a,
                    bit_width: 0,
                },
                Leaf::Int {
                    values: b,
                    bit_width: 0,
                },
            ) if a.nulls.is_none() && b.nulls.is_none() => op.eval(0, 0).then_some(row),
            (Leaf::Int { values: a, .. }, Leaf::Int { values: b, .. }) => (row..stop).find(|&r| {
                match (a.get(r - lb), b.get(r - rb)) {
                    (Some(x), Some(y)) => op.eval(x, y),
                    _ => false,
                }
            }),
            (l, r) => (row..stop).find(|&i| match (l.value(i - lb), r.value(i - rb)) {
                (Some(x), Some(y)) => op.eval(x.as_f64(), y.as_f64()),
                _ => false,
            }),
        };
        if found.is_some() {
            return found;
        }
        row = stop;
    }
    None
}
