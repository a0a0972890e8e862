use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// Counters collected while `SONDA_PROFILE` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryProfileSnapshot {
    /// Calls to a node's local scan primitive.
    pub local_scan_count: u64,
    /// Segments handled by the fused integer scan+aggregate loop.
    pub fast_path_segments: u64,
    /// Single-row sibling checks made before accepting a candidate.
    pub sibling_probe_count: u64,
    /// Nested subtable evaluations.
    pub subtable_eval_count: u64,
    /// Total nanoseconds spent in top-level aggregate calls.
    pub aggregate_ns: u64,
    /// Number of top-level aggregate calls.
    pub aggregate_count: u64,
}

#[derive(Default)]
struct QueryProfileCounters {
    local_scan_count: AtomicU64,
    fast_path_segments: AtomicU64,
    sibling_probe_count: AtomicU64,
    subtable_eval_count: AtomicU64,
    aggregate_ns: AtomicU64,
    aggregate_count: AtomicU64,
}

static PROFILE_ENABLED: OnceLock<bool> = OnceLock::new();
static PROFILE_COUNTERS: OnceLock<QueryProfileCounters> = OnceLock::new();

fn profiling_enabled() -> bool {
    *PROFILE_ENABLED.get_or_init(|| std::env::var_os("SONDA_PROFILE").is_some())
}

fn counters() -> Option<&'static QueryProfileCounters> {
    profiling_enabled().then(|| PROFILE_COUNTERS.get_or_init(QueryProfileCounters::default))
}

pub(crate) fn profile_timer() -> Option<Instant> {
    profiling_enabled().then(Instant::now)
}

pub(crate) enum QueryProfileKind {
    LocalScan,
    FastPath,
    SiblingProbe,
    SubtableEval,
}

#[inline]
pub(crate) fn record_profile_event(kind: QueryProfileKind) {
    let Some(counters) = counters() else {
        return;
    };
    let counter = match kind {
        QueryProfileKind::LocalScan => &counters.local_scan_count,
        QueryProfileKind::FastPath => &counters.fast_path_segments,
        QueryProfileKind::SiblingProbe => &counters.sibling_probe_count,
        QueryProfileKind::SubtableEval => &counters.subtable_eval_count,
    };
    counter.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_aggregate_timer(start: Option<Instant>) {
    let Some(start) = start else {
        return;
    };
    let Some(counters) = counters() else {
        return;
    };
    let nanos = start.elapsed().as_nanos().min(u64::MAX as u128) as u64;
    counters.aggregate_ns.fetch_add(nanos, Ordering::Relaxed);
    counters.aggregate_count.fetch_add(1, Ordering::Relaxed);
}

/// Reads the counters, optionally resetting them.
///
/// Returns `None` unless the `SONDA_PROFILE` environment variable was set
/// when the first counter was touched.
///
/// ```no_run
/// use sonda::query::profile::profile_snapshot;
///
/// if let Some(snapshot) = profile_snapshot(true) {
///     println!("local scans: {}", snapshot.local_scan_count);
/// }
/// ```
pub fn profile_snapshot(reset: bool) -> Option<QueryProfileSnapshot> {
    let counters = counters()?;
    let load = |counter: &AtomicU64| {
        if reset {
            counter.swap(0, Ordering::Relaxed)
        } else {
            counter.load(Ordering::Relaxed)
        }
    };
    Some(QueryProfileSnapshot {
        local_scan_count: load(&counters.local_scan_count),
        fast_path_segments: load(&counters.fast_path_segments),
        sibling_probe_count: load(&counters.sibling_probe_count),
        subtable_eval_count: load(&counters.subtable_eval_count),
        aggregate_ns: load(&counters.aggregate_ns),
        aggregate_count: load(&counters.aggregate_count),
    })
}
