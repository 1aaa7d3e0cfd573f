//! Recorder counters.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct StatsInner {
    pub recorded: AtomicU64,
    pub malformed_skipped: AtomicU64,
    pub duplicates: AtomicU64,
    pub checkpoints_created: AtomicU64,
    pub checkpoint_failures: AtomicU64,
    pub recovered_on_start: AtomicU64,
}

impl StatsInner {
    pub fn incr(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> RecorderStats {
        RecorderStats {
            recorded: self.recorded.load(Ordering::Relaxed),
            malformed_skipped: self.malformed_skipped.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            checkpoints_created: self.checkpoints_created.load(Ordering::Relaxed),
            checkpoint_failures: self.checkpoint_failures.load(Ordering::Relaxed),
            recovered_on_start: self.recovered_on_start.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time recorder counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecorderStats {
    /// Events durably appended this run
    pub recorded: u64,
    /// Incoming payloads that did not decode
    pub malformed_skipped: u64,
    /// Recorded events marked as repeats of a recent event
    pub duplicates: u64,
    pub checkpoints_created: u64,
    pub checkpoint_failures: u64,
    /// Entries restored from the recovery log when the recorder started
    pub recovered_on_start: u64,
}
