//! Per-cycle statistics, kept as a bounded ring buffer so a host can inspect
//! the last N collections without the collector itself retaining unbounded
//! history.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Timings and counts for one mark-sweep cycle.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct GcCycleStats {
    pub cycle_id: u64,

    pub pause_mark_ns: u64,
    pub pause_sweep_ns: u64,

    pub heap_cells_before: usize,
    pub heap_cells_after: usize,
    pub cells_freed: usize,

    pub cells_scanned: u64,
    pub cells_marked: u64,

    pub gc_threads_used: usize,

    pub completed: bool,
    pub failure_reason: Option<String>,
}

impl GcCycleStats {
    pub fn new(cycle_id: u64) -> Self {
        GcCycleStats {
            cycle_id,
            ..Default::default()
        }
    }

    pub fn total_pause_time_ns(&self) -> u64 {
        self.pause_mark_ns + self.pause_sweep_ns
    }
}

/// Bounded history of recent cycles plus running totals across all of
/// them, independent of [`crate::stats::GcStats`]'s histogram-oriented
/// view.
pub struct GcCycleStatsCollector {
    current: RwLock<Option<GcCycleStats>>,
    history: RwLock<Vec<GcCycleStats>>,
    max_history: usize,

    total_cycles: AtomicU64,
    total_pause_ns: AtomicU64,
    total_cells_marked: AtomicU64,
    total_cells_freed: AtomicUsize,
    peak_pause_ns: AtomicU64,
}

impl GcCycleStatsCollector {
    pub fn new(max_history: usize) -> Self {
        GcCycleStatsCollector {
            current: RwLock::new(None),
            history: RwLock::new(Vec::with_capacity(max_history)),
            max_history,
            total_cycles: AtomicU64::new(0),
            total_pause_ns: AtomicU64::new(0),
            total_cells_marked: AtomicU64::new(0),
            total_cells_freed: AtomicUsize::new(0),
            peak_pause_ns: AtomicU64::new(0),
        }
    }

    pub fn start_cycle(&self, cycle_id: u64) {
        *self.current.write() = Some(GcCycleStats::new(cycle_id));
    }

    pub fn end_cycle(&self, stats: GcCycleStats) {
        self.total_cycles.fetch_add(1, Ordering::Relaxed);
        self.total_pause_ns.fetch_add(stats.total_pause_time_ns(), Ordering::Relaxed);
        self.total_cells_marked.fetch_add(stats.cells_marked, Ordering::Relaxed);
        self.total_cells_freed.fetch_add(stats.cells_freed, Ordering::Relaxed);

        let pause = stats.total_pause_time_ns();
        self.peak_pause_ns.fetch_max(pause, Ordering::Relaxed);

        let mut history = self.history.write();
        if history.len() >= self.max_history {
            history.remove(0);
        }
        history.push(stats);

        *self.current.write() = None;
    }

    pub fn current_cycle(&self) -> Option<GcCycleStats> {
        self.current.read().clone()
    }

    pub fn history(&self) -> Vec<GcCycleStats> {
        self.history.read().clone()
    }

    pub fn aggregated(&self) -> AggregatedCycleStats {
        let cycles = self.total_cycles.load(Ordering::Relaxed);
        AggregatedCycleStats {
            total_cycles: cycles,
            total_pause_ns: self.total_pause_ns.load(Ordering::Relaxed),
            total_cells_marked: self.total_cells_marked.load(Ordering::Relaxed),
            total_cells_freed: self.total_cells_freed.load(Ordering::Relaxed),
            avg_pause_ns: if cycles > 0 {
                self.total_pause_ns.load(Ordering::Relaxed) / cycles
            } else {
                0
            },
            peak_pause_ns: self.peak_pause_ns.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        *self.current.write() = None;
        self.history.write().clear();
        self.total_cycles.store(0, Ordering::Relaxed);
        self.total_pause_ns.store(0, Ordering::Relaxed);
        self.total_cells_marked.store(0, Ordering::Relaxed);
        self.total_cells_freed.store(0, Ordering::Relaxed);
        self.peak_pause_ns.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct AggregatedCycleStats {
    pub total_cycles: u64,
    pub total_pause_ns: u64,
    pub total_cells_marked: u64,
    pub total_cells_freed: usize,
    pub avg_pause_ns: u64,
    pub peak_pause_ns: u64,
}

impl AggregatedCycleStats {
    pub fn avg_pause_ms(&self) -> f64 {
        self.avg_pause_ns as f64 / 1_000_000.0
    }

    pub fn peak_pause_ms(&self) -> f64 {
        self.peak_pause_ns as f64 / 1_000_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_stats_sum_pause_phases() {
        let mut stats = GcCycleStats::new(1);
        stats.pause_mark_ns = 100_000;
        stats.pause_sweep_ns = 200_000;
        assert_eq!(stats.total_pause_time_ns(), 300_000);
    }

    #[test]
    fn collector_aggregates_across_cycles() {
        let collector = GcCycleStatsCollector::new(10);
        collector.start_cycle(1);
        let mut stats = collector.current_cycle().unwrap();
        stats.cells_marked = 1000;
        stats.cells_freed = 500;
        stats.pause_mark_ns = 100_000;
        collector.end_cycle(stats);

        let agg = collector.aggregated();
        assert_eq!(agg.total_cycles, 1);
        assert_eq!(agg.total_cells_marked, 1000);
        assert_eq!(agg.total_cells_freed, 500);
    }

    #[test]
    fn history_is_bounded() {
        let collector = GcCycleStatsCollector::new(2);
        for i in 0..5 {
            collector.start_cycle(i);
            let stats = collector.current_cycle().unwrap();
            collector.end_cycle(stats);
        }
        assert_eq!(collector.history().len(), 2);
    }
}
