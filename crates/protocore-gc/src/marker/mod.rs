//! Concurrent marking and sweeping.
//!
//! Marking is a parallel graph traversal from registered roots, using a
//! work-stealing deque so idle worker threads pick up slack from busy ones.
//! There is no tri-color/incremental marking and no load barrier: a full
//! cycle always does a brief stop-the-world root snapshot (see
//! [`crate::runtime::safepoint`]), then marks and sweeps with the world
//! stopped. Because every cell this crate manages is immutable after
//! publication, there's no need to track mutator writes during marking -
//! the snapshot is the only synchronization point the graph shape depends
//! on.

pub mod bitmap;
pub mod roots;

pub use bitmap::MarkBitmap;
pub use roots::{RootHandle, RootProvider, RootRegistry};

use crate::allocator::CellAllocator;
use crate::cell::CellPtr;
use crate::heap::Heap;
use crossbeam_deque::{Injector, Steal, Stealer, Worker};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Marks live cells, then sweeps the rest back to the allocator.
pub struct Marker {
    heap: Arc<Heap>,
    allocator: Arc<CellAllocator>,
    bitmap: Arc<MarkBitmap>,
    worker_count: usize,
}

impl Marker {
    pub fn new(heap: Arc<Heap>, allocator: Arc<CellAllocator>, cells_per_block: usize, worker_count: usize) -> Self {
        Marker {
            heap,
            allocator,
            bitmap: Arc::new(MarkBitmap::new(cells_per_block)),
            worker_count: worker_count.max(1),
        }
    }

    fn try_mark(&self, cell: CellPtr) -> bool {
        match self.heap.block_for(cell.addr()) {
            Some(block) => {
                let slot = block
                    .slot_index(cell.addr())
                    .expect("root/edge pointed at a mid-cell address");
                self.bitmap.mark(block.id(), slot)
            }
            // A reference to a cell outside every known block is a bug in
            // the caller's visitor, not something the collector can fix up.
            None => false,
        }
    }

    /// Run one full marking pass from `roots`. Must be called with the
    /// world stopped - nothing here synchronizes against concurrent
    /// mutation of cell payloads.
    pub fn mark(&self, roots: &RootRegistry) -> MarkStats {
        self.bitmap.clear_all();

        let injector: Injector<CellPtr> = Injector::new();
        roots.visit_all(&mut |cell| {
            if self.try_mark(cell) {
                injector.push(cell);
            }
        });

        let workers: Vec<Worker<CellPtr>> = (0..self.worker_count)
            .map(|_| Worker::new_fifo())
            .collect();
        let stealers: Vec<Stealer<CellPtr>> = workers.iter().map(|w| w.stealer()).collect();
        let active = AtomicUsize::new(self.worker_count);

        std::thread::scope(|scope| {
            for local in workers {
                let injector = &injector;
                let stealers = &stealers;
                let active = &active;
                let this = &*self;
                scope.spawn(move || this.mark_worker(local, injector, stealers, active));
            }
        });

        MarkStats {
            marked: self.bitmap.total_marked(),
        }
    }

    fn mark_worker(
        &self,
        local: Worker<CellPtr>,
        injector: &Injector<CellPtr>,
        stealers: &[Stealer<CellPtr>],
        active: &AtomicUsize,
    ) {
        loop {
            if let Some(cell) = find_task(&local, injector, stealers) {
                cell.visit_refs(&mut |child| {
                    if self.try_mark(child) {
                        local.push(child);
                    }
                });
                continue;
            }

            if active.fetch_sub(1, Ordering::SeqCst) == 1 {
                // We were the last active worker and found nothing: the
                // graph is exhausted.
                return;
            }
            std::thread::yield_now();

            match find_task(&local, injector, stealers) {
                Some(cell) => {
                    active.fetch_add(1, Ordering::SeqCst);
                    cell.visit_refs(&mut |child| {
                        if self.try_mark(child) {
                            local.push(child);
                        }
                    });
                }
                None if active.load(Ordering::SeqCst) == 0 => return,
                None => {
                    active.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
    }

    /// Return every cell that wasn't marked in the last pass to the
    /// allocator, finalizing each one first. Must run after `mark`
    /// completes and before the world resumes.
    pub fn sweep(&self) -> SweepStats {
        let mut freed = 0usize;
        let mut retained = 0usize;

        for block in self.heap.blocks() {
            for slot in self.bitmap.unmarked_slots(block.id(), block.len()) {
                let cell = block.cell_at(slot);
                if cell.kind() == crate::cell::CellKind::FREE {
                    continue;
                }
                cell.finalize();
                self.allocator.reclaim(cell);
                freed += 1;
            }
            retained += self.bitmap.marked_count(block.id());
        }

        SweepStats { freed, retained }
    }

    pub fn bitmap(&self) -> &Arc<MarkBitmap> {
        &self.bitmap
    }
}

fn find_task(
    local: &Worker<CellPtr>,
    injector: &Injector<CellPtr>,
    stealers: &[Stealer<CellPtr>],
) -> Option<CellPtr> {
    if let Some(task) = local.pop() {
        return Some(task);
    }
    loop {
        match injector.steal_batch_and_pop(local) {
            Steal::Success(task) => return Some(task),
            Steal::Retry => continue,
            Steal::Empty => break,
        }
    }
    for stealer in stealers {
        loop {
            match stealer.steal() {
                Steal::Success(task) => return Some(task),
                Steal::Retry => continue,
                Steal::Empty => break,
            }
        }
    }
    None
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MarkStats {
    pub marked: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SweepStats {
    pub freed: usize,
    pub retained: usize,
}
