//! Shared fixtures for the integration suites in this directory, following
//! `fgc/tests/common/mod.rs`'s per-crate test-fixture convention.

use protocore::{Space, SpaceConfig};
use std::sync::Arc;

/// A heap sized generously enough for the larger end-to-end scenarios
/// (hundreds of thousands of cells) without tripping `max_heap_cells`,
/// while still collecting promptly under `min_heap_cells`.
pub fn scenario_config() -> SpaceConfig {
    SpaceConfig {
        gc: protocore_gc::GcConfig {
            min_heap_cells: 4096,
            max_heap_cells: 8_000_000,
            cells_per_block: 4096,
            gc_threads: Some(2),
            ..Default::default()
        },
        ..SpaceConfig::default()
    }
}

/// A fresh, isolated space for one test.
pub fn new_space() -> Arc<Space> {
    Space::new(scenario_config()).expect("space config is valid")
}
