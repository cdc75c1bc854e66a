//! Listener counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the worker and read from any thread.
#[derive(Debug, Default)]
pub struct ListenerStats {
    chunks_processed: AtomicU64,
    chunks_dropped: AtomicU64,
    scans: AtomicU64,
    wake_detections: AtomicU64,
    commands_finalized: AtomicU64,
    ceiling_hits: AtomicU64,
}

impl ListenerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_chunk(&self) {
        self.chunks_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_dropped(&self, total: u64) {
        self.chunks_dropped.store(total, Ordering::Relaxed);
    }

    pub(crate) fn record_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_wake(&self) {
        self.wake_detections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_command(&self, hit_ceiling: bool) {
        self.commands_finalized.fetch_add(1, Ordering::Relaxed);
        if hit_ceiling {
            self.ceiling_hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            chunks_processed: self.chunks_processed.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
            scans: self.scans.load(Ordering::Relaxed),
            wake_detections: self.wake_detections.load(Ordering::Relaxed),
            commands_finalized: self.commands_finalized.load(Ordering::Relaxed),
            ceiling_hits: self.ceiling_hits.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ListenerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub chunks_processed: u64,
    pub chunks_dropped: u64,
    pub scans: u64,
    pub wake_detections: u64,
    pub commands_finalized: u64,
    pub ceiling_hits: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chunks {} (dropped {}), scans {}, wakes {}, commands {} (ceiling {})",
            self.chunks_processed,
            self.chunks_dropped,
            self.scans,
            self.wake_detections,
            self.commands_finalized,
            self.ceiling_hits
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = ListenerStats::new();
        stats.record_chunk();
        stats.record_chunk();
        stats.record_scan();
        stats.record_wake();
        stats.record_command(false);
        stats.record_command(true);
        stats.set_dropped(3);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.chunks_processed, 2);
        assert_eq!(snapshot.scans, 1);
        assert_eq!(snapshot.wake_detections, 1);
        assert_eq!(snapshot.commands_finalized, 2);
        assert_eq!(snapshot.ceiling_hits, 1);
        assert_eq!(snapshot.chunks_dropped, 3);
    }

    #[test]
    fn display_summarizes() {
        let snapshot = StatsSnapshot {
            chunks_processed: 10,
            commands_finalized: 1,
            ..Default::default()
        };
        assert_eq!(
            snapshot.to_string(),
            "chunks 10 (dropped 0), scans 0, wakes 0, commands 1 (ceiling 0)"
        );
    }
}
