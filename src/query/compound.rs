#![forbid(unsafe_code)]

//! OR, NOT and subtable scans. Each evaluates nested AND chains through the
//! same session, caching what it learns between calls.

use tracing::{debug, trace};

use super::profile::{record_profile_event, QueryProfileKind};
use super::session::{ScanState, Session};
use super::tree::NodeId;
use crate::types::{ColumnId, RowIndex};

/// What an OR branch reported for the last range it searched.
///
/// The branch has no match in `[start, last)`; when `was_match` is set,
/// `last` itself matches.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct BranchCache {
    start: RowIndex,
    last: RowIndex,
    was_match: bool,
}

/// Interval memo of a NOT node: `first` is the first row in
/// `[known_start, known_end)` where the operand does not match.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct NotMemo {
    known_start: RowIndex,
    known_end: RowIndex,
    first: Option<RowIndex>,
}

impl<'a> Session<'a> {
    fn or_caches(&mut self, id: NodeId) -> &mut Vec<BranchCache> {
        match &mut self.states[id.index()].scan {
            ScanState::Or(caches) => caches,
            _ => panic!("OR node {id} scanned before init"),
        }
    }

    fn not_memo(&mut self, id: NodeId) -> &mut NotMemo {
        match &mut self.states[id.index()].scan {
            ScanState::Not(memo) => memo,
            _ => panic!("NOT node {id} scanned before init"),
        }
    }

    pub(crate) fn scan_or(
        &mut self,
        id: NodeId,
        branches: &[Option<NodeId>],
        start: RowIndex,
        end: RowIndex,
    ) -> Option<RowIndex> {
        let mut best: Option<RowIndex> = None;
        for (slot, branch) in branches.iter().enumerate() {
            let Some(branch) = *branch else {
                continue;
            };
            let mut cache = self.or_caches(id)[slot];
            if start < cache.start {
                cache.last = 0;
                cache.was_match = false;
            } else if cache.last >= end {
                continue;
            } else if cache.was_match && cache.last >= start {
                best = Some(best.map_or(cache.last, |row| row.min(cache.last)));
                continue;
            }

            cache.start = start;
            let found = self.find_in_level(branch, cache.last.max(start), end);
            cache.was_match = found.is_some();
            cache.last = found.unwrap_or(end);
            if let Some(row) = found {
                best = Some(best.map_or(row, |current| current.min(row)));
            }
            self.or_caches(id)[slot] = cache;
        }
        best
    }

    /// First row in `[start, end)` where `operand` fails, probing row by row.
    fn first_non_match(&mut self, operand: NodeId, start: RowIndex, end: RowIndex) -> Option<RowIndex> {
        (start..end).find(|&row| self.find_in_level(operand, row, row + 1).is_none())
    }

    pub(crate) fn scan_not(
        &mut self,
        id: NodeId,
        operand: Option<NodeId>,
        start: RowIndex,
        end: RowIndex,
    ) -> Option<RowIndex> {
        let operand = operand?;
        let memo = *self.not_memo(id);
        let (known_start, known_end) = (memo.known_start, memo.known_end);

        if start == known_start && end == known_end {
            trace!(node = id.index(), case = "exact", "query.not.memo");
            return memo.first;
        }

        if start <= known_start && end >= known_end {
            trace!(node = id.index(), case = "covers", "query.not.memo");
            if let Some(row) = self.first_non_match(operand, start, known_start) {
                self.remember(id, start, known_end, Some(row));
                return Some(row);
            }
            if memo.first.is_some() {
                self.remember(id, start, known_end, memo.first);
                return memo.first;
            }
            let found = self.first_non_match(operand, known_end, end);
            self.remember(id, start, end, found);
            return found;
        }

        if start >= known_start && end <= known_end {
            trace!(node = id.index(), case = "covered", "query.not.memo");
            return match memo.first {
                None => None,
                Some(row) if row >= end => None,
                Some(row) if row >= start => Some(row),
                Some(_) => self.first_non_match(operand, start, end),
            };
        }

        if start < known_start && end >= known_start {
            trace!(node = id.index(), case = "overlap_lower", "query.not.memo");
            let found = self.first_non_match(operand, start, known_start).or(memo.first);
            self.remember(id, start, known_end, found);
            return found.filter(|&row| row < end);
        }

        if start <= known_end && end > known_end {
            trace!(node = id.index(), case = "overlap_upper", "query.not.memo");
            return match memo.first {
                Some(row) if row >= start => {
                    self.remember(id, known_start, end, Some(row));
                    Some(row)
                }
                Some(row) => {
                    let found = self.first_non_match(operand, start, end);
                    self.remember(id, known_start, end, Some(row));
                    found
                }
                None => {
                    let found = self.first_non_match(operand, known_end, end);
                    self.remember(id, known_start, end, found);
                    found
                }
            };
        }

        trace!(node = id.index(), case = "disjoint", "query.not.memo");
        let found = self.first_non_match(operand, start, end);
        if end - start > known_end - known_start {
            self.remember(id, start, end, found);
        }
        found
    }

    fn remember(&mut self, id: NodeId, known_start: RowIndex, known_end: RowIndex, first: Option<RowIndex>) {
        *self.not_memo(id) = NotMemo {
            known_start,
            known_end,
            first,
        };
    }

    pub(crate) fn scan_subtable(
        &mut self,
        id: NodeId,
        column: ColumnId,
        inner: Option<NodeId>,
        start: RowIndex,
        end: RowIndex,
    ) -> Option<RowIndex> {
        let inner = inner?;
        if self.failure.is_some() {
            return None;
        }
        let table = self.states[id.index()].table;
        for row in start..end {
            let subtable = table.subtable(column, row);
            if subtable.is_degenerate() {
                continue;
            }
            record_profile_event(QueryProfileKind::SubtableEval);
            if let Err(err) = self.init_level(inner, subtable) {
                debug!(node = id.index(), row, error = %err, "query.subtable.bind_failed");
                self.failure = Some(err);
                return None;
            }
            if self.find_in_level(inner, 0, subtable.size()).is_some() {
                return Some(row);
            }
        }
        None
    }
}
