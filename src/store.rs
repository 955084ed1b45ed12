//! Concurrent time-series store
//!
//! The store owns the received series. The ingest thread appends, any
//! number of consumer threads take copies. A reader-writer lock guards the
//! series only for the length of an append or a copy; the ready flag is a
//! separate atomic so a consumer can check for new data every frame without
//! touching the lock.
//!
//! # Consumer protocol
//!
//! ```ignore
//! if store.is_ready() {
//!     store.clear_ready();
//!     let records = store.snapshot();
//!     // render / query `records` for as long as needed
//! }
//! ```
//!
//! Clearing before copying means an append that races with the copy sets
//! the flag again, so it is picked up on the next check instead of lost.

use crate::types::Record;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared, append-only series of records with a single-slot ready signal
#[derive(Debug, Default)]
pub struct TimeSeriesStore {
    series: RwLock<Vec<Record>>,
    ready: AtomicBool,
}

impl TimeSeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size the series for an expected number of records
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            series: RwLock::new(Vec::with_capacity(capacity)),
            ready: AtomicBool::new(false),
        }
    }

    // A panic while holding the lock cannot leave a half-pushed record, so
    // poisoned guards are recovered rather than propagated.
    fn read(&self) -> RwLockReadGuard<'_, Vec<Record>> {
        self.series.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Record>> {
        self.series.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a record at the tail and raise the ready signal
    pub fn append(&self, record: Record) {
        self.write().push(record);
        self.ready.store(true, Ordering::Release);
    }

    /// Copy of the whole series as of now
    pub fn snapshot(&self) -> Vec<Record> {
        self.read().clone()
    }

    /// Copy of the records at positions `start..`
    ///
    /// Lets an incremental consumer fetch only what arrived since its last
    /// read. Returns an empty vector when `start` is past the end.
    pub fn snapshot_from(&self, start: usize) -> Vec<Record> {
        let series = self.read();
        series.get(start..).map(<[Record]>::to_vec).unwrap_or_default()
    }

    /// Whether records were appended since the last [`clear_ready`](Self::clear_ready)
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Lower the ready signal; call when committing to a snapshot
    pub fn clear_ready(&self) {
        self.ready.store(false, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Most recently appended record
    pub fn latest(&self) -> Option<Record> {
        self.read().last().copied()
    }
}
