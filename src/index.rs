//! Nearest-timestamp lookup
//!
//! [`nearest`] is an exact-match binary search over timestamps sorted
//! ascending. The series itself is kept in arrival order, which may not be
//! timestamp order, so callers either check [`is_sorted`] or go through
//! [`TimestampIndex::build`], which sorts a copy first. Searching unsorted
//! input is memory safe but the result is meaningless.

use crate::types::Record;
use std::cmp::Ordering;

/// Seconds per day, for [`day_round`]
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Index of an element equal to `x` in ascending `sorted`, or `None`
///
/// No interpolation is done: a value between two entries is `None`.
pub fn nearest(sorted: &[f64], x: f64) -> Option<usize> {
    let mut low = 0;
    let mut high = sorted.len();

    while low < high {
        let mid = low + (high - low) / 2;
        match sorted[mid].partial_cmp(&x) {
            Some(Ordering::Equal) => return Some(mid),
            Some(Ordering::Less) => low = mid + 1,
            Some(Ordering::Greater) => high = mid,
            // NaN on either side never matches
            None => return None,
        }
    }

    None
}

/// Whether `values` is ascending (ties allowed)
pub fn is_sorted(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] <= w[1])
}

/// Round a position in epoch seconds to the nearest UTC midnight
///
/// Daily bars are centred on midnight, so a pointer anywhere over a bar
/// rounds to that bar's exact timestamp, which [`nearest`] can find.
pub fn day_round(x: f64) -> f64 {
    (x / SECONDS_PER_DAY).round() * SECONDS_PER_DAY
}

/// Records sorted by timestamp, with a parallel timestamp column
///
/// Built from one snapshot and only valid for it.
#[derive(Debug, Clone, Default)]
pub struct TimestampIndex {
    records: Vec<Record>,
    timestamps: Vec<f64>,
}

impl TimestampIndex {
    /// Sort a copy of `records` by timestamp
    ///
    /// The sort is stable, so records sharing a timestamp keep their
    /// arrival order.
    pub fn build(records: &[Record]) -> Self {
        let mut records = records.to_vec();
        if !is_sorted_by_timestamp(&records) {
            records.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        }
        let timestamps = records.iter().map(|r| r.timestamp).collect();
        Self { records, timestamps }
    }

    /// Record whose timestamp equals `x`
    pub fn lookup(&self, x: f64) -> Option<&Record> {
        nearest(&self.timestamps, x).map(|i| &self.records[i])
    }

    /// Record for the daily bar under `x`
    pub fn lookup_day(&self, x: f64) -> Option<&Record> {
        self.lookup(day_round(x))
    }

    /// Records in timestamp order
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    /// First and last timestamp
    pub fn range(&self) -> Option<(f64, f64)> {
        Some((*self.timestamps.first()?, *self.timestamps.last()?))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn is_sorted_by_timestamp(records: &[Record]) -> bool {
    records
        .windows(2)
        .all(|w| w[0].timestamp.total_cmp(&w[1].timestamp) != Ordering::Greater)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_exact_matches_only() {
        let sorted = [1.0, 2.0, 3.0, 5.0, 8.0];
        assert_eq!(nearest(&sorted, 3.0), Some(2));
        assert_eq!(nearest(&sorted, 4.0), None);
        assert_eq!(nearest(&sorted, 0.0), None);
        assert_eq!(nearest(&sorted, 9.0), None);
        assert_eq!(nearest(&sorted, 1.0), Some(0));
        assert_eq!(nearest(&sorted, 8.0), Some(4));
    }

    #[test]
    fn test_nearest_empty_and_single() {
        assert_eq!(nearest(&[], 1.0), None);
        assert_eq!(nearest(&[7.0], 7.0), Some(0));
        assert_eq!(nearest(&[7.0], 6.0), None);
        assert_eq!(nearest(&[7.0], 8.0), None);
    }

    #[test]
    fn test_nearest_nan() {
        assert_eq!(nearest(&[1.0, 2.0], f64::NAN), None);
    }

    #[test]
    fn test_nearest_unsorted_does_not_panic() {
        let unsorted = [8.0, 1.0, 5.0, 3.0, 2.0];
        for x in [0.0, 1.0, 2.0, 3.0, 5.0, 8.0, 100.0] {
            if let Some(i) = nearest(&unsorted, x) {
                assert_eq!(unsorted[i], x);
            }
        }
    }

    #[test]
    fn test_is_sorted() {
        assert!(is_sorted(&[]));
        assert!(is_sorted(&[1.0]));
        assert!(is_sorted(&[1.0, 1.0, 2.0]));
        assert!(!is_sorted(&[2.0, 1.0]));
    }

    #[test]
    fn test_day_round() {
        // 2024-03-15 00:00:00 UTC
        let day = 1_710_460_800.0;
        assert_eq!(day_round(day), day);
        assert_eq!(day_round(day + 11.0 * 3600.0), day);
        assert_eq!(day_round(day - 1.0), day);
        assert_eq!(day_round(day - 11.0 * 3600.0), day);
        assert_eq!(day_round(day + 13.0 * 3600.0), day + SECONDS_PER_DAY);
    }

    #[test]
    fn test_index_sorts_out_of_order_snapshot() {
        let records = vec![
            Record::new(3.0, 0.0, 0.0, 0.0, 0.0, 3),
            Record::new(1.0, 0.0, 0.0, 0.0, 0.0, 1),
            Record::new(2.0, 0.0, 0.0, 0.0, 0.0, 2),
        ];
        let index = TimestampIndex::build(&records);

        assert_eq!(index.timestamps(), &[1.0, 2.0, 3.0]);
        assert_eq!(index.lookup(2.0).map(|r| r.volume), Some(2));
        assert!(index.lookup(2.5).is_none());
        assert_eq!(index.range(), Some((1.0, 3.0)));
    }

    #[test]
    fn test_index_ties_keep_arrival_order() {
        let records = vec![
            Record::new(2.0, 0.0, 0.0, 0.0, 0.0, 10),
            Record::new(1.0, 0.0, 0.0, 0.0, 0.0, 20),
            Record::new(2.0, 0.0, 0.0, 0.0, 0.0, 30),
        ];
        let index = TimestampIndex::build(&records);
        let volumes: Vec<i64> = index.records().iter().map(|r| r.volume).collect();
        assert_eq!(volumes, vec![20, 10, 30]);
    }

    #[test]
    fn test_lookup_day() {
        let day = 1_710_460_800.0;
        let index = TimestampIndex::build(&[Record::new(day, 1.0, 2.0, 0.5, 1.5, 9)]);
        assert_eq!(index.lookup_day(day + 3600.0).map(|r| r.volume), Some(9));
        assert_eq!(index.lookup_day(day - 3600.0).map(|r| r.volume), Some(9));
        assert!(index.lookup_day(day + 0.6 * SECONDS_PER_DAY).is_none());
        assert!(index.lookup_day(day - 0.6 * SECONDS_PER_DAY).is_none());
        assert!(TimestampIndex::default().range().is_none());
    }
}
