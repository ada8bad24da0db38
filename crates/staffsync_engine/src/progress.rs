//! Batch windows and run counters.

use crate::job::Counters;
use staffsync_store::EntityKind;
use tracing::debug;

/// One page of a phase: `len` rows starting at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchWindow {
    /// Zero-based batch number.
    pub index: u64,
    /// Offset of the first row.
    pub offset: u64,
    /// Expected rows in the batch; the last one may be short.
    pub len: u64,
}

/// Splits `[0, total)` into windows of `page_size` rows.
///
/// A zero `page_size` yields no windows.
pub fn batch_windows(total: u64, page_size: u64) -> impl Iterator<Item = BatchWindow> {
    let batches = if page_size == 0 {
        0
    } else {
        total.div_ceil(page_size)
    };
    (0..batches).map(move |index| {
        let offset = index * page_size;
        BatchWindow {
            index,
            offset,
            len: page_size.min(total - offset),
        }
    })
}

/// Accumulates the counters of one run across both phases.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    counters: Counters,
    errors: Vec<String>,
}

impl ProgressTracker {
    /// Creates a tracker with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a successful record.
    pub fn record_success(&mut self) {
        self.counters.record_success();
    }

    /// Counts a failed record and keeps its message for the report.
    pub fn record_failure(&mut self, message: String) {
        self.counters.record_failure();
        self.errors.push(message);
    }

    /// Current counters.
    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// Messages of failed records, in processing order.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Logs the end of a batch and returns the counters to checkpoint.
    pub fn finish_batch(&self, kind: EntityKind, window: BatchWindow, fetched: usize) -> Counters {
        debug!(
            kind = %kind,
            batch = window.index,
            offset = window.offset,
            fetched,
            processed = self.counters.processed(),
            failed = self.counters.failed(),
            "Batch done"
        );
        self.counters
    }

    /// Consumes the tracker.
    pub fn into_parts(self) -> (Counters, Vec<String>) {
        (self.counters, self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn final_batch_is_short() {
        let windows: Vec<_> = batch_windows(5, 2).collect();
        assert_eq!(
            windows,
            vec![
                BatchWindow { index: 0, offset: 0, len: 2 },
                BatchWindow { index: 1, offset: 2, len: 2 },
                BatchWindow { index: 2, offset: 4, len: 1 },
            ]
        );
    }

    #[test]
    fn empty_inputs() {
        assert_eq!(batch_windows(0, 500).count(), 0);
        assert_eq!(batch_windows(10, 0).count(), 0);
    }

    #[test]
    fn tracker_keeps_messages_for_failures_only() {
        let mut tracker = ProgressTracker::new();
        tracker.record_success();
        tracker.record_failure("E002: first_name is required".into());
        let (counters, errors) = tracker.into_parts();
        assert_eq!(counters.processed(), 2);
        assert_eq!(counters.failed(), 1);
        assert_eq!(errors.len(), 1);
    }

    proptest! {
        #[test]
        fn windows_cover_range_exactly_once(total in 0u64..10_000, size in 1u64..3_000) {
            let mut next = 0u64;
            let mut count = 0u64;
            for window in batch_windows(total, size) {
                prop_assert_eq!(window.offset, next);
                prop_assert_eq!(window.index, count);
                prop_assert!(window.len >= 1 && window.len <= size);
                next += window.len;
                count += 1;
            }
            prop_assert_eq!(next, total);
            prop_assert_eq!(count, total.div_ceil(size));
        }

        #[test]
        fn counters_balance(outcomes in proptest::collection::vec(any::<bool>(), 0..200)) {
            let mut tracker = ProgressTracker::new();
            let mut previous = tracker.counters();
            for ok in outcomes {
                if ok {
                    tracker.record_success();
                } else {
                    tracker.record_failure("failed".into());
                }
                let now = tracker.counters();
                prop_assert_eq!(now.processed(), now.success() + now.failed());
                prop_assert!(now.dominates(&previous));
                previous = now;
            }
            prop_assert_eq!(tracker.errors().len() as u64, previous.failed());
        }
    }
}
