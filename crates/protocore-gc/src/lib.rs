//! # protocore-gc - cell allocator and concurrent stop-the-world collector
//!
//! This crate is the memory subsystem for the `protocore` value runtime
//! (spec.md components C2, C11, C12, C13). It knows nothing about value
//! tags, containers, or objects - its only unit of currency is a uniform,
//! 64-byte, 64-byte-aligned [`cell::Cell`], tagged with a small [`cell::CellKind`]
//! whose visiting/finalizing behavior is registered by the crate above this
//! one (see [`cell::register_kind`]).
//!
//! ## What this crate is not
//!
//! Every cell's address is stable for its entire lifetime: there is no
//! compaction, no relocation, and no colored/tagged pointer scheme. The
//! collector is a classic stop-the-world mark-sweep over a pool of
//! fixed-size blocks, not a concurrent incremental tracer - the "concurrent"
//! part of "concurrent generational GC" in spec.md §4.10 refers to the
//! *marking phase* being parallelized across worker threads while the world
//! is stopped (see [`marker::Marker::mark`]), not to marking running
//! alongside live mutators. That simplification is sound here specifically
//! *because* every user-visible structure above this crate is immutable
//! after publication (spec.md §4.10's "Incremental invariant"): there is no
//! write barrier to maintain because a mutator cannot rewrite a published
//! graph edge out from under a concurrent tracer.
//!
//! ## Modules
//!
//! - [`cell`]: the 64-byte cell, its kind registry, and the stable
//!   [`cell::CellPtr`] handle (C2's foundation).
//! - [`allocator`]: per-thread free-list caches over a global free list
//!   (C2's allocation policy).
//! - [`heap`]: the growable pool of fixed-size [`heap::Block`]s cells are
//!   carved from.
//! - [`marker`]: root registration, parallel mark, and sweep-to-free-list
//!   (C11's tracing and reclamation).
//! - [`runtime`]: thread registration, the safepoint protocol (C12), and
//!   deferred finalization for externally-owned resources (C13).
//! - [`gc`]: [`gc::GarbageCollector`], the orchestrator tying the above
//!   together into full collection cycles, plus a dedicated background
//!   collector thread.
//! - [`config`]: [`config::GcConfig`], tuning knobs for heap sizing,
//!   thread counts, and trigger thresholds.
//! - [`error`]: [`error::GcError`], this crate's fallible-operation surface.
//! - [`logging`]: structured [`logging::GcEvent`]s a host can subscribe to,
//!   alongside free-text `log` facade output.
//! - [`stats`]: pause-time histograms and per-cycle counters.
//! - [`util`]: alignment and atomic helpers shared across the crate.
//!
//! ## Example
//!
//! ```rust
//! use protocore_gc::{GarbageCollector, GcConfig};
//!
//! let config = GcConfig {
//!     min_heap_cells: 64,
//!     max_heap_cells: 4096,
//!     cells_per_block: 64,
//!     ..Default::default()
//! };
//! let gc = GarbageCollector::new(config).unwrap();
//! let guard = gc.register_thread("main");
//! let _cell = gc.allocate(protocore_gc::cell::CellKind(1));
//! gc.collect().unwrap();
//! drop(guard);
//! ```

pub mod allocator;
pub mod cell;
pub mod config;
pub mod error;
pub mod gc;
pub mod heap;
pub mod logging;
pub mod marker;
pub mod runtime;
pub mod stats;
pub mod util;

pub use config::GcConfig;
pub use error::{GcError, Result};
pub use gc::{GarbageCollector, GcGeneration, GcReason, GcState};

/// Crate version string, from `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
