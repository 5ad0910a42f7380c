//! Run progress tracking.
//!
//! A collection run reports progress as a `(done, total)` pair. `total` may
//! be `-1` when the page space is not known up front (driving iterators,
//! striped pagination). Counters are atomic so completion handlers running
//! on concurrent fetch tasks can update them without coordination.

use std::sync::atomic::{AtomicI64, Ordering};

/// Total value meaning "size of the run is unknown".
pub const TOTAL_UNKNOWN: i64 = -1;

/// Atomic `(done, total)` progress counter for one collection run.
///
/// Shared between the collector and the embedding caller via `Arc`; the
/// caller reads, the collector's handlers write.
#[derive(Debug, Default)]
pub struct Progress {
    done: AtomicI64,
    total: AtomicI64,
}

impl Progress {
    /// Creates a counter at `(0, 0)`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces both counters at once.
    pub fn set(&self, done: i64, total: i64) {
        self.done.store(done, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
    }

    /// Adds `delta` to the done counter.
    pub fn inc(&self, delta: i64) {
        self.done.fetch_add(delta, Ordering::SeqCst);
    }

    /// Returns the number of completed units.
    #[must_use]
    pub fn done(&self) -> i64 {
        self.done.load(Ordering::SeqCst)
    }

    /// Returns the expected total, or [`TOTAL_UNKNOWN`].
    #[must_use]
    pub fn total(&self) -> i64 {
        self.total.load(Ordering::SeqCst)
    }

    /// Reads both counters. `done` and `total` are loaded independently, so
    /// the pair is only consistent once the run has quiesced.
    #[must_use]
    pub fn snapshot(&self) -> (i64, i64) {
        (self.done(), self.total())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_progress_starts_at_zero() {
        let progress = Progress::new();
        assert_eq!(progress.snapshot(), (0, 0));
    }

    #[test]
    fn test_progress_set_and_inc() {
        let progress = Progress::new();
        progress.set(1, 5);
        progress.inc(1);
        progress.inc(2);
        assert_eq!(progress.snapshot(), (4, 5));
    }

    #[test]
    fn test_progress_unknown_total() {
        let progress = Progress::new();
        progress.set(0, TOTAL_UNKNOWN);
        assert_eq!(progress.total(), -1);
    }

    #[test]
    fn test_progress_concurrent_increments() {
        use std::thread;

        let progress = Arc::new(Progress::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let progress = Arc::clone(&progress);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    progress.inc(1);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(progress.done(), 800);
    }
}
