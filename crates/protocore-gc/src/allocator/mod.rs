//! Cell allocation - global free-list plus per-thread batch caches.
//!
//! Every allocation is exactly one 64-byte [`Cell`], so there is no size-class
//! routing, no bump-pointer TLAB, and no large-object path: the only
//! question an allocation answers is "which free cell". The policy follows
//! the cell allocator described at the crate root: pop from the calling
//! thread's local cache, refill that cache from the global free list in
//! batches, and only touch the heap (growing it by a whole block) when the
//! global list itself runs dry.

use crate::cell::{Cell, CellKind, CellPtr};
use crate::config::GcConfig;
use crate::error::{GcError, Result};
use crate::heap::Heap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Lock-free singly-linked stack of free cells, threaded through each cell's
/// transient `next` link (see `cell::CellHeader::next`).
///
/// This is a classic Treiber stack. It has the classic Treiber-stack ABA
/// exposure, which is benign here: cells are never unmapped or reused for
/// anything other than another cell, so a stale `head` read can only ever
/// be popped into a still-valid `Cell`.
struct FreeList {
    head: AtomicUsize,
    len: AtomicUsize,
}

impl FreeList {
    fn new() -> Self {
        FreeList {
            head: AtomicUsize::new(0),
            len: AtomicUsize::new(0),
        }
    }

    fn push(&self, cell: CellPtr) {
        // SAFETY: the cell is not reachable from anywhere else once pushed
        // here; callers must not retain other references to it.
        unsafe { cell.as_ref().set_kind(CellKind::FREE) };
        loop {
            let head = self.head.load(Ordering::Acquire);
            unsafe {
                cell.set_next_link(CellPtr::from_addr(head));
            }
            if self
                .head
                .compare_exchange_weak(head, cell.addr(), Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                self.len.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
    }

    fn pop(&self) -> Option<CellPtr> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            let cell = unsafe { CellPtr::from_addr(head) }?;
            // SAFETY: `cell` came from a previous `push`, so it is a valid,
            // currently-free cell; reading its next link is sound.
            let next_addr = unsafe { cell.next_link() }.map(|c| c.addr()).unwrap_or(0);
            if self
                .head
                .compare_exchange_weak(head, next_addr, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                self.len.fetch_sub(1, Ordering::Relaxed);
                return Some(cell);
            }
        }
    }

    fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }
}

thread_local! {
    // Keyed by `CellAllocator::id` rather than a single `Vec` per thread:
    // a thread can and does call into more than one `CellAllocator` over
    // its lifetime (multiple embedded runtimes in one process, or simply
    // one test binary constructing many short-lived allocators), and
    // those caches must never mix cells from different heaps.
    static LOCAL_CACHE: RefCell<HashMap<usize, Vec<CellPtr>>> =
        RefCell::new(HashMap::new());
}

static NEXT_ALLOCATOR_ID: AtomicUsize = AtomicUsize::new(0);

/// Hands out cells and takes them back.
///
/// Owns the global free list and the heap the free list is refilled from.
/// Does not know about marking or kind semantics beyond tagging a cell with
/// the kind the caller asked for; mark/sweep calls back into this through
/// [`CellAllocator::reclaim`] once a collection cycle has identified garbage.
pub struct CellAllocator {
    id: usize,
    heap: Arc<Heap>,
    global_free: FreeList,
    config: Arc<GcConfig>,
    /// Set by the owning [`crate::gc::GarbageCollector`] so that an
    /// allocation which can't grow the heap any further can request a
    /// collection and retry once, instead of failing immediately.
    gc_trigger: parking_lot::Mutex<Option<Arc<dyn Fn() -> Result<()> + Send + Sync>>>,
}

impl CellAllocator {
    pub fn new(heap: Arc<Heap>, config: Arc<GcConfig>) -> Self {
        let allocator = CellAllocator {
            id: NEXT_ALLOCATOR_ID.fetch_add(1, Ordering::Relaxed),
            heap,
            global_free: FreeList::new(),
            config,
            gc_trigger: parking_lot::Mutex::new(None),
        };
        for block in allocator.heap.blocks() {
            for cell in block.cells() {
                allocator.global_free.push(cell);
            }
        }
        allocator
    }

    /// Install the callback used to request a collection when the heap
    /// can't grow any further. Called once during `GarbageCollector`
    /// construction, after both sides exist.
    pub fn set_gc_trigger(&self, trigger: Arc<dyn Fn() -> Result<()> + Send + Sync>) {
        *self.gc_trigger.lock() = Some(trigger);
    }

    /// Allocate one cell tagged with `kind`. The cell's payload is zeroed;
    /// its kind tag is set to `kind` before this returns.
    pub fn allocate(&self, kind: CellKind) -> Result<CellPtr> {
        debug_assert_ne!(kind, CellKind::FREE, "cannot allocate a cell as CellKind::FREE");

        if let Some(cell) = self.take_local() {
            return Ok(self.prepare(cell, kind));
        }

        self.refill_local()?;

        if let Some(cell) = self.take_local() {
            return Ok(self.prepare(cell, kind));
        }

        Err(GcError::OutOfMemory {
            used: self.heap.total_cells() * crate::cell::CELL_SIZE,
            capacity: self.config.max_heap_cells * crate::cell::CELL_SIZE,
        })
    }

    fn prepare(&self, cell: CellPtr, kind: CellKind) -> CellPtr {
        // SAFETY: `cell` just came off a free list; nothing else holds it.
        unsafe {
            cell.as_mut().payload_mut().fill(0);
            cell.as_ref().set_kind(kind);
        }
        cell
    }

    fn take_local(&self) -> Option<CellPtr> {
        LOCAL_CACHE.with(|c| c.borrow_mut().entry(self.id).or_default().pop())
    }

    /// Move up to `thread_free_list_batch` cells from the global free list
    /// into this thread's local cache, growing the heap by one block (and,
    /// if configured, requesting a collection first) if the global list is
    /// empty.
    fn refill_local(&self) -> Result<()> {
        let batch = self.config.thread_free_list_batch;

        let mut drained = self.drain_global(batch);
        if drained.is_empty() {
            if let Err(grow_err) = self.heap.grow() {
                let trigger = self.gc_trigger.lock().clone();
                match trigger {
                    Some(trigger) => {
                        trigger()?;
                        drained = self.drain_global(batch);
                        if drained.is_empty() {
                            self.heap.grow()?;
                            drained = self.drain_global(batch);
                        }
                    }
                    None => return Err(grow_err),
                }
            } else {
                drained = self.drain_global(batch);
            }
        }

        LOCAL_CACHE.with(|c| c.borrow_mut().entry(self.id).or_default().extend(drained));
        Ok(())
    }

    fn drain_global(&self, max: usize) -> Vec<CellPtr> {
        let mut out = Vec::with_capacity(max);
        while out.len() < max {
            match self.global_free.pop() {
                Some(cell) => out.push(cell),
                None => break,
            }
        }
        out
    }

    /// Return `cell` to this thread's local cache for reuse. The caller must
    /// have already run any finalizer the cell's former kind needed.
    ///
    /// If the local cache grows past twice the configured batch size, half
    /// of it spills back to the global free list so idle threads don't
    /// hoard cells other threads are waiting on.
    pub fn reclaim(&self, cell: CellPtr) {
        let batch = self.config.thread_free_list_batch;
        LOCAL_CACHE.with(|c| {
            let mut caches = c.borrow_mut();
            let local = caches.entry(self.id).or_default();
            local.push(cell);
            if local.len() > batch * 2 {
                let spill = local.len() - batch;
                for cell in local.drain(..spill) {
                    self.global_free.push(cell);
                }
            }
        });
    }

    /// Whether the global free list has fallen below the configured low
    /// watermark relative to total heap capacity - the signal this crate's
    /// collector uses to decide a cycle is due.
    pub fn below_low_watermark(&self) -> bool {
        let total = self.heap.total_cells().max(1);
        let free = self.global_free.len() as f32;
        free / total as f32 <= self.config.global_free_list_low_watermark
    }

    pub fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            global_free_cells: self.global_free.len(),
            total_cells: self.heap.total_cells(),
        }
    }
}

unsafe impl Send for CellAllocator {}
unsafe impl Sync for CellAllocator {}

/// Snapshot of allocator occupancy. Pairs with [`crate::heap::HeapStats`]
/// for the heap-capacity half of the picture.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllocatorStats {
    pub global_free_cells: usize,
    pub total_cells: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn make_allocator(cells_per_block: usize, max_heap_cells: usize) -> CellAllocator {
        let config = Arc::new(GcConfig {
            min_heap_cells: cells_per_block,
            max_heap_cells,
            cells_per_block,
            thread_free_list_batch: cells_per_block.min(8),
            ..Default::default()
        });
        let heap = Arc::new(Heap::new(config.clone()).unwrap());
        CellAllocator::new(heap, config)
    }

    #[test]
    fn allocate_tags_kind_and_zeroes_payload() {
        let allocator = make_allocator(32, 1024);
        let cell = allocator.allocate(CellKind(7)).unwrap();
        assert_eq!(cell.kind(), CellKind(7));
        unsafe {
            assert!(cell.as_ref().payload().iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn reclaimed_cell_is_reused() {
        let allocator = make_allocator(8, 8);
        let first = allocator.allocate(CellKind(1)).unwrap();
        let addr = first.addr();
        allocator.reclaim(first);
        let second = allocator.allocate(CellKind(2)).unwrap();
        assert_eq!(second.addr(), addr);
    }

    #[test]
    fn out_of_memory_without_gc_trigger() {
        let allocator = make_allocator(4, 4);
        for _ in 0..4 {
            allocator.allocate(CellKind(1)).unwrap();
        }
        assert!(allocator.allocate(CellKind(1)).is_err());
    }
}
