//! Collector statistics: cycle counts, pause-time distribution, reclaimed
//! cells. Exists for production monitoring and tuning, not correctness -
//! nothing in the collector reads these back to make decisions.

pub mod gc_cycle;
pub mod histogram;
pub mod timer;

pub use gc_cycle::{AggregatedCycleStats, GcCycleStats, GcCycleStatsCollector};
pub use histogram::Histogram;
pub use timer::GcTimer;

use crate::gc::GcGeneration;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Central repository for collector-wide metrics, shared across every
/// cycle of one [`crate::gc::GarbageCollector`].
pub struct GcStats {
    total_cycles: AtomicU64,
    young_cycles: AtomicU64,
    full_cycles: AtomicU64,
    total_freed_cells: AtomicU64,
    pause_stats: Arc<Histogram>,
    start_time: std::time::Instant,
}

impl GcStats {
    pub fn new() -> Self {
        GcStats {
            total_cycles: AtomicU64::new(0),
            young_cycles: AtomicU64::new(0),
            full_cycles: AtomicU64::new(0),
            total_freed_cells: AtomicU64::new(0),
            pause_stats: Arc::new(Histogram::new()),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn pause_histogram(&self) -> Arc<Histogram> {
        self.pause_stats.clone()
    }

    pub fn record_collection(&self, _cycle: u64, generation: GcGeneration, duration: Duration, freed_cells: usize) {
        self.total_cycles.fetch_add(1, Ordering::Relaxed);
        match generation {
            GcGeneration::Young => self.young_cycles.fetch_add(1, Ordering::Relaxed),
            GcGeneration::Full => self.full_cycles.fetch_add(1, Ordering::Relaxed),
        };
        self.total_freed_cells.fetch_add(freed_cells as u64, Ordering::Relaxed);
        self.pause_stats.record(duration.as_nanos() as u64);
    }

    pub fn summary(&self) -> GcSummary {
        GcSummary {
            total_cycles: self.total_cycles.load(Ordering::Relaxed),
            young_cycles: self.young_cycles.load(Ordering::Relaxed),
            full_cycles: self.full_cycles.load(Ordering::Relaxed),
            total_freed_cells: self.total_freed_cells.load(Ordering::Relaxed),
            avg_pause_ms: self.pause_stats.mean() as f64 / 1_000_000.0,
            p99_pause_ms: self.pause_stats.p99() as f64 / 1_000_000.0,
            max_pause_ms: self.pause_stats.max() as f64 / 1_000_000.0,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn reset(&self) {
        self.total_cycles.store(0, Ordering::Relaxed);
        self.young_cycles.store(0, Ordering::Relaxed);
        self.full_cycles.store(0, Ordering::Relaxed);
        self.total_freed_cells.store(0, Ordering::Relaxed);
        self.pause_stats.clear();
    }
}

impl Default for GcStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time snapshot of [`GcStats`], cheap to clone and suitable for
/// serializing to a host's metrics sink.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct GcSummary {
    pub total_cycles: u64,
    pub young_cycles: u64,
    pub full_cycles: u64,
    pub total_freed_cells: u64,
    pub avg_pause_ms: f64,
    pub p99_pause_ms: f64,
    pub max_pause_ms: f64,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_tracks_generation_split() {
        let stats = GcStats::new();
        stats.record_collection(0, GcGeneration::Young, Duration::from_millis(1), 10);
        stats.record_collection(1, GcGeneration::Full, Duration::from_millis(5), 40);

        let summary = stats.summary();
        assert_eq!(summary.total_cycles, 2);
        assert_eq!(summary.young_cycles, 1);
        assert_eq!(summary.full_cycles, 1);
        assert_eq!(summary.total_freed_cells, 50);
        assert!(summary.max_pause_ms >= summary.avg_pause_ms);
    }

    #[test]
    fn reset_zeroes_counters() {
        let stats = GcStats::new();
        stats.record_collection(0, GcGeneration::Full, Duration::from_millis(1), 5);
        stats.reset();
        assert_eq!(stats.summary().total_cycles, 0);
    }
}
