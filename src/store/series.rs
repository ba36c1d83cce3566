//! `TimeSeries`: a named, ordered, append-only sequence of points, plus its
//! tag index.

use super::record::{Label, Record};
use super::tag_index::TagIndex;

/// A nanosecond timestamp (`ts_sec * 1_000_000_000 + ts_nsec`), chosen so
/// direct numeric comparison and binary search work without unpacking a
/// (seconds, nanoseconds) pair.
pub type Timestamp = u64;

#[derive(Debug, Clone)]
pub struct TimeSeries {
    pub name: String,
    /// Advisory only — parsed and stored, never enforced (spec §9, open
    /// question 2).
    pub retention: u32,
    timestamps: Vec<Timestamp>,
    records: Vec<Record>,
    tags: TagIndex,
    next_ordinal: u64,
}

impl TimeSeries {
    pub fn new(name: String, retention: u32) -> Self {
        TimeSeries {
            name,
            retention,
            timestamps: Vec::new(),
            records: Vec::new(),
            tags: TagIndex::new(),
            next_ordinal: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[Timestamp] {
        &self.timestamps
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn tags(&self) -> &TagIndex {
        &self.tags
    }

    /// Appends a point, keeping `timestamps` (and the parallel `records`)
    /// sorted by insertion point rather than assuming monotone input.
    ///
    /// Per spec §9 open question 4, the source neither enforces nor
    /// documents an ordering requirement for append timestamps, which would
    /// silently break binary search on out-of-order input. This
    /// implementation resolves that by finding the point where `ts` belongs
    /// (ties land after any existing equal timestamps, preserving
    /// insertion order among same-timestamp points) and shifting everything
    /// after it — an O(log n) search plus an O(n) shift, which also means
    /// the record's final resting position isn't always its insertion
    /// ordinal: the `index` field on [`Record`] tracks that ordinal
    /// separately.
    ///
    /// Consequence: "the last element of `timestamps` is the timestamp just
    /// appended" only holds for monotone (non-decreasing) input. A point
    /// that sorts ahead of an existing one lands wherever it belongs, not
    /// at the end — see `append_out_of_order_does_not_land_last_appended_point_at_the_end`.
    pub fn append(&mut self, ts: Timestamp, value: f64, labels: Vec<Label>) {
        self.next_ordinal += 1;
        let record = Record::new(value, labels, self.next_ordinal);

        let pos = self.timestamps.partition_point(|&t| t <= ts);
        if pos < self.timestamps.len() {
            self.tags.shift_positions_from(pos);
        }

        self.tags.insert(pos, &record.labels);
        self.timestamps.insert(pos, ts);
        self.records.insert(pos, record);
    }

    /// Returns the index of the first timestamp `>= target`, i.e. a lower
    /// bound. Equivalent to `timestamps.partition_point(|&t| t < target)`.
    pub fn lower_bound(&self, target: Timestamp) -> usize {
        self.timestamps.partition_point(|&t| t < target)
    }

    /// Returns the index one past the last timestamp `<= target`, i.e. an
    /// upper bound suitable for a half-open range.
    pub fn upper_bound(&self, target: Timestamp) -> usize {
        self.timestamps.partition_point(|&t| t <= target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_keeps_parallel_arrays_in_lockstep() {
        let mut s = TimeSeries::new("t".into(), 0);
        s.append(100, 1.0, vec![]);
        s.append(200, 2.0, vec![]);
        s.append(300, 3.0, vec![]);

        assert_eq!(s.len(), s.records().len());
        assert_eq!(s.timestamps(), &[100, 200, 300]);
    }

    #[test]
    fn out_of_order_append_is_inserted_sorted() {
        let mut s = TimeSeries::new("t".into(), 0);
        s.append(300, 3.0, vec![]);
        s.append(100, 1.0, vec![]);
        s.append(200, 2.0, vec![]);

        assert_eq!(s.timestamps(), &[100, 200, 300]);
        assert_eq!(s.records()[0].value, 1.0);
        assert_eq!(s.records()[1].value, 2.0);
        assert_eq!(s.records()[2].value, 3.0);
    }

    #[test]
    fn append_out_of_order_does_not_land_last_appended_point_at_the_end() {
        // Out-of-order resolution (open question 4) scopes down the
        // "last element of `timestamps` is the just-appended point"
        // invariant to monotone input: appending 300 then 100 leaves
        // the just-appended 100 at the front, not the back.
        let mut s = TimeSeries::new("t".into(), 0);
        s.append(300, 3.0, vec![]);
        s.append(100, 1.0, vec![]);

        assert_eq!(s.timestamps(), &[100, 300]);
        assert_ne!(*s.timestamps().last().unwrap(), 100);
    }

    #[test]
    fn record_ordinal_tracks_append_order_not_position() {
        let mut s = TimeSeries::new("t".into(), 0);
        s.append(300, 3.0, vec![]); // ordinal 1, ends up at position 1
        s.append(100, 1.0, vec![]); // ordinal 2, ends up at position 0

        assert_eq!(s.records()[0].index, 2);
        assert_eq!(s.records()[1].index, 1);
    }

    #[test]
    fn tag_index_positions_track_reordering() {
        let mut s = TimeSeries::new("t".into(), 0);
        s.append(300, 3.0, vec![("k".into(), "v1".into())]);
        s.append(100, 1.0, vec![("k".into(), "v2".into())]);

        assert_eq!(s.tags().get("k", "v2"), Some(&[0usize][..]));
        assert_eq!(s.tags().get("k", "v1"), Some(&[1usize][..]));
    }

    #[test]
    fn bounds_expand_across_ties() {
        let mut s = TimeSeries::new("t".into(), 0);
        for ts in [100, 100, 200, 300, 300, 300] {
            s.append(ts, 0.0, vec![]);
        }

        assert_eq!(s.lower_bound(100), 0);
        assert_eq!(s.upper_bound(100), 2);
        assert_eq!(s.lower_bound(300), 3);
        assert_eq!(s.upper_bound(300), 6);
        assert_eq!(s.lower_bound(250), 3);
        assert_eq!(s.upper_bound(250), 3);
    }
}
