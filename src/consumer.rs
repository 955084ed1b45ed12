//! Consumer side of the store
//!
//! [`SeriesView`] holds the consumer's own copy of the series plus an index
//! built from it. It only takes the store's lock when the ready signal says
//! there is something new, so it can be refreshed every frame.

use crate::cancel::CancelToken;
use crate::index::TimestampIndex;
use crate::store::TimeSeriesStore;
use crate::types::Record;
use std::time::Duration;

/// A consumer's snapshot of the series and its timestamp index
#[derive(Debug, Clone, Default)]
pub struct SeriesView {
    records: Vec<Record>,
    index: TimestampIndex,
    refreshes: u64,
}

impl SeriesView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick up new data if the store signalled any
    ///
    /// Returns `true` when the view changed.
    pub fn refresh(&mut self, store: &TimeSeriesStore) -> bool {
        if !store.is_ready() {
            return false;
        }
        store.clear_ready();

        self.records = store.snapshot();
        self.index = TimestampIndex::build(&self.records);
        self.refreshes += 1;
        true
    }

    /// Records in arrival order
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Timestamp-sorted index over the same records
    pub fn index(&self) -> &TimestampIndex {
        &self.index
    }

    /// Record for the day under a pointer position
    pub fn hovered(&self, x: f64) -> Option<&Record> {
        self.index.lookup_day(x)
    }

    pub fn latest(&self) -> Option<&Record> {
        self.records.last()
    }

    /// Number of times new data was taken
    pub fn refreshes(&self) -> u64 {
        self.refreshes
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Consume the store without a window, logging each batch of new records
///
/// Returns the number of records seen when cancelled.
pub fn run_headless(store: &TimeSeriesStore, cancel: &CancelToken, interval: Duration) -> usize {
    let mut view = SeriesView::new();
    let mut seen = 0;

    loop {
        if view.refresh(store) {
            let new = view.len().saturating_sub(seen);
            seen = view.len();
            if let Some(latest) = view.latest() {
                tracing::info!(
                    records = seen,
                    new,
                    timestamp = latest.timestamp,
                    close = latest.close,
                    volume = latest.volume,
                    "Series updated"
                );
            }
        }

        if cancel.sleep(interval) {
            break;
        }
    }

    // Pick up anything appended while we were waiting to stop
    view.refresh(store);
    view.len()
}
