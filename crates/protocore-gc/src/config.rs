//! Tuning parameters for the cell allocator and collector.

use crate::cell::CELL_SIZE;

/// Configuration for a [`crate::gc::GarbageCollector`].
///
/// Mirrors the shape of the teacher's region/TLAB-era `GcConfig` (heap size
/// bounds, generational ratio, target pause time, thread count) but with
/// fields re-targeted at a uniform-cell pool instead of byte-sized regions:
/// there is no `small_region_size`/`large_threshold`/NUMA/huge-page
/// knobs, because every allocation is exactly one 64-byte cell.
///
/// # Examples
///
/// ```rust
/// use protocore_gc::GcConfig;
///
/// let config = GcConfig::default();
/// let low_latency = GcConfig {
///     target_pause_time_ms: 2,
///     gc_threads: Some(8),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Minimum heap size, in cells. The heap never shrinks below this many
    /// allocated blocks.
    pub min_heap_cells: usize,

    /// Maximum heap size, in cells. Allocation past this bound triggers a
    /// collection first, and fails with `GcError::OutOfMemory` if that does
    /// not recover enough cells.
    pub max_heap_cells: usize,

    /// Number of cells per block requested from the global allocator. Each
    /// block is one contiguous, 64-byte-aligned allocation of
    /// `cells_per_block * 64` bytes.
    pub cells_per_block: usize,

    /// Number of cells moved at once between the global free-list and a
    /// thread's local cache. Larger batches reduce contention on the
    /// global free-list at the cost of higher per-thread slack.
    pub thread_free_list_batch: usize,

    /// Fraction of `max_heap_cells` at which falling global free-list
    /// occupancy wakes the collector (spec.md §4.10 trigger: "free-cells
    /// falling below a threshold").
    pub global_free_list_low_watermark: f32,

    /// Target stop-the-world pause time in milliseconds. Worker thread
    /// count and safepoint poll interval are tuned toward this target.
    pub target_pause_time_ms: u64,

    /// Number of marking worker threads. `None` auto-detects as
    /// `min(4, num_cpus / 2)`, floored at 1.
    pub gc_threads: Option<usize>,

    /// Interval, in milliseconds, at which a parked safepoint wait re-checks
    /// rather than blocking indefinitely on the resume condvar. Exists so a
    /// thread that missed a wakeup notification (spurious wake window)
    /// doesn't stall forever.
    pub safepoint_poll_interval_ms: u64,

    /// Whether young-generation promotion is tracked at all (spec.md §3.8's
    /// context young-generation hand-off). Disabling this makes every
    /// allocation immediately part of the old generation - useful for
    /// embedding contexts that never construct nested execution contexts.
    pub generational: bool,

    /// Number of context exits (hand-offs) a cell survives before being
    /// treated as old-generation for scanning-priority purposes (spec.md
    /// §3.9's tenuring concept, carried from the teacher's
    /// `tenure_threshold`). The collector doesn't copy or relocate cells, so
    /// this only affects which generation's roots get scanned on a given
    /// cycle, not physical placement.
    pub tenure_threshold: u8,

    /// Emit `log`/`GcEvent` output for cycle start/end and phase timings.
    pub verbose: bool,

    /// Enable `stats::GcStats` collection (pause histogram, cycle counts).
    pub stats_enabled: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        let cpus = num_cpus::get();
        GcConfig {
            min_heap_cells: 16 * 1024,
            max_heap_cells: 16 * 1024 * 1024,
            cells_per_block: 4096,
            thread_free_list_batch: 64,
            global_free_list_low_watermark: 0.1,
            target_pause_time_ms: 10,
            gc_threads: Some((cpus / 2).clamp(1, 4)),
            safepoint_poll_interval_ms: 10,
            generational: true,
            tenure_threshold: 9,
            verbose: false,
            stats_enabled: true,
        }
    }
}

impl GcConfig {
    /// Check that all values are internally consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_heap_cells == 0 {
            return Err(ConfigError::InvalidHeapSize(
                "max_heap_cells must be > 0".into(),
            ));
        }
        if self.min_heap_cells > self.max_heap_cells {
            return Err(ConfigError::InvalidHeapSize(
                "min_heap_cells cannot exceed max_heap_cells".into(),
            ));
        }
        if self.cells_per_block == 0 {
            return Err(ConfigError::InvalidBlockSize(
                "cells_per_block must be > 0".into(),
            ));
        }
        if self.thread_free_list_batch == 0 || self.thread_free_list_batch > self.cells_per_block {
            return Err(ConfigError::InvalidBlockSize(
                "thread_free_list_batch must be > 0 and <= cells_per_block".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.global_free_list_low_watermark) {
            return Err(ConfigError::InvalidWatermark(
                "global_free_list_low_watermark must be in [0, 1)".into(),
            ));
        }
        if let Some(threads) = self.gc_threads {
            if threads == 0 {
                return Err(ConfigError::InvalidGcThreads(
                    "gc_threads must be > 0".into(),
                ));
            }
        }
        if self.target_pause_time_ms == 0 {
            return Err(ConfigError::InvalidPauseTime(
                "target_pause_time_ms must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Build configuration from environment variables, overriding defaults:
    /// `PROTOCORE_MAX_HEAP_CELLS`, `PROTOCORE_MIN_HEAP_CELLS`,
    /// `PROTOCORE_PAUSE_TIME_MS`, `PROTOCORE_GC_THREADS`,
    /// `PROTOCORE_GC_VERBOSE`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PROTOCORE_MAX_HEAP_CELLS") {
            if let Ok(n) = val.parse() {
                config.max_heap_cells = n;
            }
        }
        if let Ok(val) = std::env::var("PROTOCORE_MIN_HEAP_CELLS") {
            if let Ok(n) = val.parse() {
                config.min_heap_cells = n;
            }
        }
        if let Ok(val) = std::env::var("PROTOCORE_PAUSE_TIME_MS") {
            if let Ok(ms) = val.parse() {
                config.target_pause_time_ms = ms;
            }
        }
        if let Ok(val) = std::env::var("PROTOCORE_GC_THREADS") {
            if let Ok(n) = val.parse() {
                config.gc_threads = Some(n);
            }
        }
        if let Ok(val) = std::env::var("PROTOCORE_GC_VERBOSE") {
            config.verbose = val == "1" || val.eq_ignore_ascii_case("true");
        }

        config
    }

    /// Bytes backing one block, for capacity planning and logging.
    pub fn block_bytes(&self) -> usize {
        self.cells_per_block * CELL_SIZE
    }
}

/// Errors raised by [`GcConfig::validate`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid heap size: {0}")]
    InvalidHeapSize(String),

    #[error("invalid block size: {0}")]
    InvalidBlockSize(String),

    #[error("invalid watermark: {0}")]
    InvalidWatermark(String),

    #[error("invalid GC threads: {0}")]
    InvalidGcThreads(String),

    #[error("invalid pause time: {0}")]
    InvalidPauseTime(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = GcConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.generational);
    }

    #[test]
    fn rejects_zero_max_heap() {
        let config = GcConfig {
            max_heap_cells: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_batch_larger_than_block() {
        let config = GcConfig {
            cells_per_block: 10,
            thread_free_list_batch: 11,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
