//! Query dispatch and the aggregation algorithms run against a
//! [`super::series::TimeSeries`].

use super::record::Label;
use super::series::{TimeSeries, Timestamp};

/// What a `QUERY` asks for, already decoded from the wire flags byte and
/// its optional trailing fields.
#[derive(Debug, Clone, PartialEq)]
pub enum QuerySelector {
    /// All points, in insertion (timestamp) order.
    Full,
    /// Only the earliest point.
    First,
    /// Only the latest point.
    Last,
    /// All points with `lo <= timestamp <= hi`, ties included on both ends.
    /// Either bound may be absent, defaulting to the series' first/last
    /// timestamp.
    Range { lo: Option<Timestamp>, hi: Option<Timestamp> },
    /// Windowed mean over the whole series. `window_ns` is already
    /// converted from the wire's milliseconds.
    MeanFull { window_ns: u64 },
    /// Windowed mean bounded to a range, optionally anchored to a fixed
    /// step origin rather than the first in-range timestamp.
    MeanRange {
        lo: Option<Timestamp>,
        hi: Option<Timestamp>,
        window_ns: u64,
        anchor: Option<Timestamp>,
    },
}

/// One row of a `QUERY_RESPONSE`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPoint {
    pub ts: Timestamp,
    pub value: f64,
    pub labels: Vec<Label>,
}

impl QueryPoint {
    fn plain(ts: Timestamp, value: f64) -> Self {
        QueryPoint { ts, value, labels: Vec::new() }
    }
}

/// Resolves a half-open-ish inclusive bound pair to concrete indices,
/// defaulting missing bounds to the series' extremes and expanding across
/// tied timestamps on both ends, per spec §4.3's range dispatch.
fn resolve_bounds(series: &TimeSeries, lo: Option<Timestamp>, hi: Option<Timestamp>) -> Option<(usize, usize)> {
    if series.is_empty() {
        return None;
    }
    let timestamps = series.timestamps();
    let lo_val = lo.unwrap_or(timestamps[0]);
    let hi_val = hi.unwrap_or(*timestamps.last().unwrap());
    if lo_val > hi_val {
        return None;
    }

    let mut lo_idx = series.lower_bound(lo_val);
    if lo_idx >= timestamps.len() {
        return None;
    }
    // lower_bound landed on the first timestamp >= lo_val; if it overshot
    // past hi_val there's nothing in range.
    if timestamps[lo_idx] > hi_val {
        return None;
    }
    let hi_idx = series.upper_bound(hi_val).saturating_sub(1);
    if hi_idx < lo_idx {
        return None;
    }

    // Expand to include ties that partition_point's strict `<`/`<=` split
    // already handles for the found bound, but guard the case where lo was
    // itself unspecified and should include every leading tie at
    // timestamps[0] (lower_bound already does this; kept explicit for
    // clarity when lo_val == timestamps[lo_idx]).
    while lo_idx > 0 && timestamps[lo_idx - 1] == timestamps[lo_idx] {
        lo_idx -= 1;
    }

    Some((lo_idx, hi_idx))
}

fn mean(records: &[super::record::Record], lo: usize, hi: usize) -> Option<f64> {
    if hi < lo {
        return None;
    }
    let slice = &records[lo..=hi];
    if slice.is_empty() {
        return None;
    }
    Some(slice.iter().map(|r| r.value).sum::<f64>() / slice.len() as f64)
}

/// Windowed mean over `[start, end]` (inclusive indices into `series`),
/// consuming consecutive windows of `window_ns` starting at each
/// not-yet-consumed timestamp. Mirrors spec §4.3's full-series algorithm,
/// reused for both the full-series and plain-range-bounded cases.
fn windowed_mean(series: &TimeSeries, start: usize, end: usize, window_ns: u64) -> Vec<QueryPoint> {
    let timestamps = series.timestamps();
    let records = series.records();
    let mut out = Vec::new();
    let mut i = start;
    while i <= end {
        let window_end = timestamps[i].saturating_add(window_ns);
        let mut j = i;
        while j <= end && timestamps[j] <= window_end {
            j += 1;
        }
        if let Some(v) = mean(records, i, j - 1) {
            out.push(QueryPoint::plain(timestamps[j - 1], v));
        }
        i = j;
    }
    out
}

/// Anchored windowed mean: windows are placed at fixed `step` boundaries
/// starting from `anchor` (normalized to ns) rather than from the first
/// in-range timestamp, per spec §4.3's anchored-mode rule.
fn anchored_windowed_mean(series: &TimeSeries, lo: usize, hi: usize, window_ns: u64, anchor: Timestamp) -> Vec<QueryPoint> {
    let timestamps = series.timestamps();
    let records = series.records();
    let mut out = Vec::new();

    // A zero-width window can never advance `step`: the alignment loop
    // below would spin forever closing the gap between `anchor` and
    // `timestamps[lo]` in increments of zero, and even past alignment the
    // main loop's `step = window_end` is a no-op, so `i` never moves past
    // its first stall. Per spec §9 open question 3's "MUST guard against"
    // clause, treat each point as its own window instead of looping.
    if window_ns == 0 {
        return timestamps[lo..=hi]
            .iter()
            .zip(&records[lo..=hi])
            .map(|(&ts, r)| QueryPoint::plain(ts, r.value))
            .collect();
    }

    let mut step = anchor;
    while timestamps[lo] > step && step.saturating_add(window_ns) < timestamps[lo] {
        step = step.saturating_add(window_ns);
    }

    let mut i = lo;
    while i <= hi {
        let window_end = step.saturating_add(window_ns);
        let mut j = i;
        while j <= hi && timestamps[j] <= window_end {
            j += 1;
        }
        if j > i {
            if let Some(v) = mean(records, i, j - 1) {
                out.push(QueryPoint::plain(step, v));
            }
        }
        i = j;
        step = window_end;
    }
    out
}

/// Runs a [`QuerySelector`] against `series`, returning the matching
/// points in the order spec §4.3 prescribes for each mode.
pub fn run(series: &TimeSeries, selector: &QuerySelector) -> Vec<QueryPoint> {
    match selector {
        QuerySelector::Full => series
            .timestamps()
            .iter()
            .zip(series.records())
            .map(|(&ts, r)| QueryPoint { ts, value: r.value, labels: r.labels.clone() })
            .collect(),

        QuerySelector::First => {
            if series.is_empty() {
                Vec::new()
            } else {
                let r = &series.records()[0];
                vec![QueryPoint { ts: series.timestamps()[0], value: r.value, labels: r.labels.clone() }]
            }
        }

        QuerySelector::Last => {
            if series.is_empty() {
                Vec::new()
            } else {
                let last = series.len() - 1;
                let r = &series.records()[last];
                vec![QueryPoint { ts: series.timestamps()[last], value: r.value, labels: r.labels.clone() }]
            }
        }

        QuerySelector::Range { lo, hi } => match resolve_bounds(series, *lo, *hi) {
            Some((lo_idx, hi_idx)) => (lo_idx..=hi_idx)
                .map(|i| QueryPoint {
                    ts: series.timestamps()[i],
                    value: series.records()[i].value,
                    labels: series.records()[i].labels.clone(),
                })
                .collect(),
            None => Vec::new(),
        },

        QuerySelector::MeanFull { window_ns } => {
            if series.is_empty() {
                Vec::new()
            } else {
                windowed_mean(series, 0, series.len() - 1, *window_ns)
            }
        }

        QuerySelector::MeanRange { lo, hi, window_ns, anchor } => match resolve_bounds(series, *lo, *hi) {
            Some((lo_idx, hi_idx)) => match anchor {
                Some(a) => anchored_windowed_mean(series, lo_idx, hi_idx, *window_ns, *a),
                None => windowed_mean(series, lo_idx, hi_idx, *window_ns),
            },
            None => Vec::new(),
        },
    }
}
