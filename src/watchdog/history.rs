use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::events::HeartbeatRecord;
use super::stamp::Stamp;

pub const DEFAULT_HISTORY_CAPACITY: NonZeroUsize = match NonZeroUsize::new(25) {
    Some(capacity) => capacity,
    None => panic!("history capacity must be non zero"),
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("heartbeat history is empty")]
    Empty,
}

/// Bounded buffer of the most recent heartbeats in arrival order.
///
/// Once `capacity` records are held, every new record evicts the oldest one.
/// All operations take `&self` and only hold the internal lock for a bounded
/// copy, so the ingestion path and the diagnosis path can share one history.
#[derive(Debug)]
pub struct HeartbeatHistory {
    capacity: NonZeroUsize,
    records: Mutex<VecDeque<HeartbeatRecord>>,
}

impl Default for HeartbeatHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HeartbeatHistory {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity.get())),
        }
    }

    // A panic while holding the lock cannot leave the deque half written,
    // so a poisoned lock is still safe to use.
    fn records(&self) -> MutexGuard<'_, VecDeque<HeartbeatRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn record(&self, heartbeat: HeartbeatRecord) {
        let mut records = self.records();
        records.push_back(heartbeat);
        while records.len() > self.capacity.get() {
            records.pop_front();
        }
    }

    /// Copy of every held record in arrival order.
    pub fn snapshot(&self) -> Result<Vec<HeartbeatRecord>, HistoryError> {
        let records = self.records();
        if records.is_empty() {
            return Err(HistoryError::Empty);
        }
        Ok(records.iter().copied().collect())
    }

    /// Records whose timestamp lies within `[start, end]`, in arrival order.
    pub fn interval(&self, start: Stamp, end: Stamp) -> Vec<HeartbeatRecord> {
        self.records()
            .iter()
            .filter(|record| record.timestamp >= start && record.timestamp <= end)
            .copied()
            .collect()
    }

    pub fn oldest_time(&self) -> Result<Stamp, HistoryError> {
        self.records()
            .front()
            .map(|record| record.timestamp)
            .ok_or(HistoryError::Empty)
    }

    pub fn latest_time(&self) -> Result<Stamp, HistoryError> {
        self.records()
            .back()
            .map(|record| record.timestamp)
            .ok_or(HistoryError::Empty)
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    pub fn clear(&self) {
        self.records().clear();
    }
}
