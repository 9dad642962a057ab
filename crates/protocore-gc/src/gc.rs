//! GC cycle orchestration (spec.md §4.10, C11).
//!
//! [`GarbageCollector`] wires together the four pieces the rest of this
//! crate defines: a [`Heap`] of blocks, a [`CellAllocator`] over it, a
//! [`Marker`]/[`RootRegistry`] pair for tracing, and a [`ThreadManager`] for
//! the safepoint protocol. A collection cycle is: request a stop-the-world
//! pause, take a root snapshot and mark from it, sweep every unmarked cell
//! back to the allocator, resume the world.

use crate::allocator::CellAllocator;
use crate::cell::{CellKind, CellPtr};
use crate::config::GcConfig;
use crate::error::{GcError, Result};
use crate::heap::Heap;
use crate::logging::{self, GcEvent};
use crate::marker::{Marker, RootHandle, RootProvider, RootRegistry};
use crate::runtime::{Finalizer, ThreadGuard, ThreadManager};
use crate::stats::{GcStats, GcSummary};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Coarse state of the collector, observable by a host for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcState {
    Idle,
    Marking,
    Sweeping,
}

/// Which generation a cycle targets.
///
/// This collector does not physically segregate generations (no
/// relocation, spec.md §9's "Non-goals"); `Young` and `Full` both run the
/// same mark-sweep over the whole heap. The distinction exists because
/// `protocore`'s execution contexts (spec.md §3.8) track a young-generation
/// list per context and report it as a separate [`RootProvider`] - a `Young`
/// cycle is a hint that the caller expects most garbage to be reachable
/// only from those lists, not a different algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcGeneration {
    Young,
    Full,
}

/// Why a cycle was triggered, for logging and stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcReason {
    LowWatermark,
    Explicit,
    ContextExit,
    Shutdown,
}

impl std::fmt::Display for GcReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GcReason::LowWatermark => "low-watermark",
            GcReason::Explicit => "explicit",
            GcReason::ContextExit => "context-exit",
            GcReason::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// Orchestrator for allocation and collection.
///
/// Owns the heap, allocator, marker, root registry, thread manager, and
/// finalizer queue. Embedders (in practice, `protocore::Space`) hold one of
/// these per space and register every durable root source with
/// [`GarbageCollector::roots`].
pub struct GarbageCollector {
    heap: Arc<Heap>,
    allocator: Arc<CellAllocator>,
    marker: Marker,
    roots: RootRegistry,
    threads: ThreadManager,
    finalizer: Finalizer,
    config: Arc<GcConfig>,
    stats: Arc<GcStats>,
    state: Mutex<GcState>,
    cycle_count: AtomicU64,
    shutdown: AtomicBool,
}

impl GarbageCollector {
    pub fn new(config: GcConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| GcError::Configuration(e.to_string()))?;

        let config = Arc::new(config);
        let heap = Arc::new(Heap::new(config.clone())?);
        let allocator = Arc::new(CellAllocator::new(heap.clone(), config.clone()));
        let worker_count = config.gc_threads.unwrap_or(1);
        let marker = Marker::new(heap.clone(), allocator.clone(), config.cells_per_block, worker_count);
        let finalizer = Finalizer::new(Duration::from_millis(config.safepoint_poll_interval_ms));
        finalizer.start()?;

        let gc = GarbageCollector {
            heap,
            allocator,
            marker,
            roots: RootRegistry::new(),
            threads: ThreadManager::new(&config),
            finalizer,
            config,
            stats: Arc::new(GcStats::new()),
            state: Mutex::new(GcState::Idle),
            cycle_count: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        };
        Ok(gc)
    }

    /// Register a thread with the safepoint protocol. The returned guard
    /// unregisters on drop; it also forwards [`ThreadGuard::poll`] so a
    /// host can check in at its own cadence (spec.md §5's suspension
    /// points: "any `alloc_cell`... and any blocking external call").
    pub fn register_thread(&self, name: impl Into<String>) -> ThreadGuard {
        self.threads.register(name)
    }

    /// Register a durable source of GC roots (spec.md §4.10's root list:
    /// thread/context chains, the mutable-root map, interner roots, module
    /// roots, the literal cache).
    pub fn register_roots(&self, provider: Arc<dyn RootProvider>) -> RootHandle {
        self.roots.register(provider)
    }

    /// Allocate one cell of `kind`. Parks at a safepoint first if a
    /// collection is in progress (spec.md §4.2's allocator policy, step on
    /// "if the global stop-the-world flag is set, the caller parks").
    /// Retries once through the allocator's GC-trigger hook if the heap
    /// cannot grow.
    pub fn allocate(&self, kind: CellKind) -> Result<CellPtr> {
        self.threads.poll_safepoint();

        if self.allocator.below_low_watermark() {
            let _ = self.collect_for(GcGeneration::Young, GcReason::LowWatermark);
        }

        self.allocator.allocate(kind)
    }

    /// Request a full stop-the-world collection (spec.md's `trigger_gc`
    /// embedder hook).
    pub fn trigger_gc(&self) -> Result<()> {
        self.collect_for(GcGeneration::Full, GcReason::Explicit)
    }

    /// Run one collection cycle with the default generation/reason
    /// (low-watermark trigger, matching `spec.md`'s "free-cells falling
    /// below a threshold").
    pub fn collect(&self) -> Result<()> {
        self.collect_for(GcGeneration::Full, GcReason::Explicit)
    }

    fn collect_for(&self, generation: GcGeneration, reason: GcReason) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state != GcState::Idle {
                return Ok(());
            }
            *state = GcState::Marking;
        }

        let cycle = self.cycle_count.load(Ordering::Relaxed);
        let timer = crate::stats::GcTimer::new();
        logging::log_event(GcEvent::CycleStart {
            generation: format!("{generation:?}"),
            reason: reason.to_string(),
            cycle,
        });

        // Stop-the-world: the guard keeps every registered thread parked
        // at its next safepoint poll until it is dropped.
        let _stop = self.threads.request_stop_the_world();

        let mark_stats = self.marker.mark(&self.roots);
        logging::log_event(GcEvent::MarkStats {
            marked_count: mark_stats.marked as u64,
        });

        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            *state = GcState::Sweeping;
        }
        let sweep_stats = self.marker.sweep();

        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            *state = GcState::Idle;
        }
        drop(_stop);

        let duration = timer.elapsed();
        self.stats.record_collection(cycle, generation, duration, sweep_stats.freed);
        self.cycle_count.fetch_add(1, Ordering::Relaxed);

        logging::log_event(GcEvent::CycleEnd {
            cycle,
            duration_ms: duration.as_secs_f64() * 1000.0,
            freed_cells: sweep_stats.freed,
        });
        log::info!(
            "gc cycle {cycle} ({generation:?}, {reason}) freed {} of {} cells in {:.2}ms",
            sweep_stats.freed,
            sweep_stats.freed + sweep_stats.retained,
            duration.as_secs_f64() * 1000.0
        );

        Ok(())
    }

    pub fn state(&self) -> GcState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn stats(&self) -> Arc<GcStats> {
        self.stats.clone()
    }

    pub fn summary(&self) -> GcSummary {
        self.stats.summary()
    }

    pub fn allocator_stats(&self) -> crate::allocator::AllocatorStats {
        self.allocator.stats()
    }

    pub fn heap_stats(&self) -> crate::heap::HeapStats {
        self.heap.stats()
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Run a final collection and stop the finalizer thread. Safe to call
    /// more than once.
    pub fn shutdown(&self) -> Result<()> {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.collect_for(GcGeneration::Full, GcReason::Shutdown)?;
        self.finalizer.stop()
    }
}

impl Drop for GarbageCollector {
    fn drop(&mut self) {
        let _ = self.finalizer.stop();
    }
}
