//! Heap management - a growable pool of fixed-size cell blocks.
//!
//! Unlike a region-based heap that carves variable-sized spans out of a
//! reserved virtual address range, this heap only ever grows by whole
//! [`Block`]s of uniform 64-byte cells. There is no relocation, no
//! commit/uncommit of virtual memory, and no NUMA placement - every cell
//! address is permanent once allocated, which is the property the
//! tagged-pointer encoding above this crate depends on.

pub mod block;

pub use block::Block;

use crate::cell::CELL_SIZE;
use crate::config::GcConfig;
use crate::error::{GcError, Result};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Pool of blocks backing the cell allocator.
///
/// `Heap` only manages address space: allocating new blocks and letting
/// collector code iterate every block for sweeping. It has no notion of
/// free vs. live cells - that split is owned by
/// [`crate::allocator::CellAllocator`] (for "which cells are available to
/// hand out") and [`crate::marker::bitmap::MarkBitmap`] (for "which cells
/// survived the last cycle").
pub struct Heap {
    blocks: RwLock<Vec<Arc<Block>>>,
    next_block_id: AtomicUsize,
    total_cells: AtomicUsize,
    config: Arc<GcConfig>,
}

impl Heap {
    /// Create a new heap and eagerly allocate enough blocks to cover
    /// `config.min_heap_cells`.
    pub fn new(config: Arc<GcConfig>) -> Result<Self> {
        let heap = Heap {
            blocks: RwLock::new(Vec::new()),
            next_block_id: AtomicUsize::new(0),
            total_cells: AtomicUsize::new(0),
            config,
        };

        let min_blocks = heap
            .config
            .min_heap_cells
            .div_ceil(heap.config.cells_per_block.max(1));
        for _ in 0..min_blocks {
            heap.grow()?;
        }

        Ok(heap)
    }

    /// Allocate and register one new block, returning it.
    ///
    /// Uses a CAS loop on `total_cells` so concurrent growth from multiple
    /// threads either both succeed within the heap's `max_heap_cells` bound
    /// or one of them observes the bound exceeded and backs off with
    /// `GcError::OutOfMemory`, mirroring the commit-size accounting a
    /// region-based heap would do per-region.
    pub fn grow(&self) -> Result<Arc<Block>> {
        let block_len = self.config.cells_per_block;

        loop {
            let current = self.total_cells.load(Ordering::Acquire);
            let next = current.saturating_add(block_len);
            if next > self.config.max_heap_cells {
                return Err(GcError::OutOfMemory {
                    used: current * CELL_SIZE,
                    capacity: self.config.max_heap_cells * CELL_SIZE,
                });
            }
            if self
                .total_cells
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }

        let id = self.next_block_id.fetch_add(1, Ordering::Relaxed);
        let block = block::Block::allocate(id, block_len).ok_or_else(|| {
            GcError::BlockAllocationFailed {
                reason: format!("allocator returned null for {block_len} cells"),
            }
        })?;
        let block = Arc::new(block);
        self.blocks.write().push(block.clone());
        Ok(block)
    }

    /// Snapshot of every block currently in the heap, for mark/sweep to
    /// iterate. The snapshot is stable even if another thread grows the
    /// heap concurrently - new blocks just won't be in this particular
    /// sweep pass, which is fine since they only hold free cells.
    pub fn blocks(&self) -> Vec<Arc<Block>> {
        self.blocks.read().clone()
    }

    /// Look up the block containing `addr`, if any.
    pub fn block_for(&self, addr: usize) -> Option<Arc<Block>> {
        self.blocks
            .read()
            .iter()
            .find(|b| b.contains(addr))
            .cloned()
    }

    pub fn block_by_id(&self, id: usize) -> Option<Arc<Block>> {
        self.blocks.read().iter().find(|b| b.id() == id).cloned()
    }

    /// Total cells across every allocated block (capacity, not live count).
    pub fn total_cells(&self) -> usize {
        self.total_cells.load(Ordering::Relaxed)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            total_cells: self.total_cells(),
            max_cells: self.config.max_heap_cells,
            block_count: self.block_count(),
        }
    }
}

/// Point-in-time heap capacity snapshot. Live/free split lives in
/// [`crate::allocator::AllocatorStats`] instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapStats {
    pub total_cells: usize,
    pub max_cells: usize,
    pub block_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(cells_per_block: usize, max_heap_cells: usize) -> Arc<GcConfig> {
        Arc::new(GcConfig {
            min_heap_cells: cells_per_block,
            max_heap_cells,
            cells_per_block,
            ..Default::default()
        })
    }

    #[test]
    fn new_heap_allocates_minimum_blocks() {
        let heap = Heap::new(config(64, 1024)).unwrap();
        assert_eq!(heap.block_count(), 1);
        assert_eq!(heap.total_cells(), 64);
    }

    #[test]
    fn grow_respects_max_heap_cells() {
        let heap = Heap::new(config(64, 64)).unwrap();
        assert!(heap.grow().is_err());
    }

    #[test]
    fn block_for_finds_containing_block() {
        let heap = Heap::new(config(16, 1024)).unwrap();
        let block = heap.blocks().into_iter().next().unwrap();
        let cell = block.cell_at(3);
        let found = heap.block_for(cell.addr()).unwrap();
        assert_eq!(found.id(), block.id());
    }
}
