//! Run progress tracking for concurrent pollers.
//!
//! One writer (the run loop, once per frame) and any number of pollers
//! share this keyed store. Records are overwritten, never appended; a
//! poller may read a stale record but never a torn one.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use ccount_models::{ProgressRecord, RunKey};

/// Concurrency-safe keyed progress store.
///
/// Cloning is cheap and shares the underlying map; create one tracker at
/// application startup and hand clones to runs and pollers. This is an
/// explicit dependency, not an ambient global.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    records: Arc<RwLock<HashMap<RunKey, ProgressRecord>>>,
}

impl ProgressTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the record for `key` with `current` of `total` frames.
    pub fn set(&self, key: &RunKey, current: u64, total: u64) {
        let record = ProgressRecord::new(current, total);
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), record);
    }

    /// Current record for `key`, or the zero-valued default when no run
    /// has started under that key.
    pub fn get(&self, key: &RunKey) -> ProgressRecord {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or_else(ProgressRecord::zero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_key_is_zero_valued() {
        let tracker = ProgressTracker::new();
        let record = tracker.get(&RunKey::from("video_/tmp/none.mp4"));
        assert_eq!(record, ProgressRecord::zero());
    }

    #[test]
    fn test_set_overwrites() {
        let tracker = ProgressTracker::new();
        let key = RunKey::from("video_/tmp/a.mp4");

        tracker.set(&key, 1, 10);
        assert_eq!(tracker.get(&key).percentage, 10);

        tracker.set(&key, 5, 10);
        let record = tracker.get(&key);
        assert_eq!(record.current, 5);
        assert_eq!(record.percentage, 50);
    }

    #[test]
    fn test_record_survives_completion_until_overwritten() {
        let tracker = ProgressTracker::new();
        let key = RunKey::from("video_/tmp/a.mp4");

        tracker.set(&key, 10, 10);
        assert_eq!(tracker.get(&key).percentage, 100);

        // A new run under the same key starts over.
        tracker.set(&key, 0, 20);
        assert_eq!(tracker.get(&key).percentage, 0);
    }

    #[test]
    fn test_keys_are_independent() {
        let tracker = ProgressTracker::new();
        tracker.set(&RunKey::from("a"), 5, 10);
        tracker.set(&RunKey::from("b"), 1, 10);
        assert_eq!(tracker.get(&RunKey::from("a")).current, 5);
        assert_eq!(tracker.get(&RunKey::from("b")).current, 1);
    }

    #[tokio::test]
    async fn test_concurrent_writer_and_pollers() {
        let tracker = ProgressTracker::new();
        let key = RunKey::from("video_/tmp/busy.mp4");

        let writer = {
            let tracker = tracker.clone();
            let key = key.clone();
            tokio::spawn(async move {
                for frame in 1..=200u64 {
                    tracker.set(&key, frame, 200);
                }
            })
        };

        let poller = {
            let tracker = tracker.clone();
            let key = key.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let record = tracker.get(&key);
                    // Never torn: percentage always matches current/total.
                    assert_eq!(record, ProgressRecord::new(record.current, record.total));
                }
            })
        };

        writer.await.unwrap();
        poller.await.unwrap();
    }
}
