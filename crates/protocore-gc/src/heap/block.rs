//! A single contiguous allocation of cells.
//!
//! A block is the unit the heap grows by: one `cells_per_block`-sized,
//! 64-byte-aligned allocation, carved into individual [`Cell`]s. Blocks are
//! never returned to the OS or relocated once allocated - there is no
//! compaction in this design, so a block's base address and every cell
//! address within it are stable for the process's lifetime. That stability
//! is what lets [`crate::marker::bitmap::MarkBitmap`] index the live set by
//! `(block_id, slot_index)` instead of walking a map keyed by address.

use crate::cell::{Cell, CellKind, CellPtr, CELL_ALIGN, CELL_SIZE};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

/// One block of `len` contiguous cells.
pub struct Block {
    id: usize,
    ptr: NonNull<Cell>,
    len: usize,
    layout: Layout,
}

impl Block {
    /// Allocate a new zeroed block of `len` cells.
    ///
    /// Cells start zeroed, which makes every cell's `kind` byte
    /// `CellKind::FREE` (0) without an explicit initialization pass; the
    /// caller is still responsible for chaining them onto a free list.
    pub(super) fn allocate(id: usize, len: usize) -> Option<Block> {
        let layout = Layout::array::<Cell>(len).ok()?.align_to(CELL_ALIGN).ok()?;
        // SAFETY: layout has nonzero size for len > 0, which `Heap::grow`
        // guarantees by construction (cells_per_block is validated > 0).
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw as *mut Cell)?;
        Some(Block {
            id,
            ptr,
            len,
            layout,
        })
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn base_addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// The cell at `slot`, as a [`CellPtr`].
    ///
    /// # Panics
    /// Panics if `slot >= self.len()`.
    #[inline]
    pub fn cell_at(&self, slot: usize) -> CellPtr {
        assert!(slot < self.len, "slot {slot} out of range for block of {} cells", self.len);
        // SAFETY: slot is in-bounds for the block's allocation, which lives
        // as long as the block itself.
        unsafe {
            let p = self.ptr.as_ptr().add(slot);
            CellPtr::from_raw(NonNull::new_unchecked(p))
        }
    }

    /// Whether `addr` falls within this block's cell array.
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        let start = self.base_addr();
        let end = start + self.len * CELL_SIZE;
        addr >= start && addr < end
    }

    /// The slot index for `addr`, if it falls within this block and is
    /// cell-aligned.
    #[inline]
    pub fn slot_index(&self, addr: usize) -> Option<usize> {
        if !self.contains(addr) {
            return None;
        }
        let offset = addr - self.base_addr();
        if offset % CELL_SIZE != 0 {
            return None;
        }
        Some(offset / CELL_SIZE)
    }

    /// Iterate every cell in the block, in slot order. Used by the sweeper,
    /// which must visit every slot regardless of mark state.
    pub fn cells(&self) -> impl Iterator<Item = CellPtr> + '_ {
        (0..self.len).map(move |slot| self.cell_at(slot))
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        // SAFETY: layout matches the one used in `allocate`, and no CellPtr
        // derived from this block may outlive it - that's the same
        // lifetime contract CellPtr already carries everywhere.
        unsafe {
            dealloc(self.ptr.as_ptr() as *mut u8, self.layout);
        }
    }
}

// A Block is handed out as `Arc<Block>` and read from many mutator and
// collector threads concurrently; the cells it contains manage their own
// synchronization (see `CellHeader`).
unsafe impl Send for Block {}
unsafe impl Sync for Block {}

#[allow(dead_code)]
fn assert_free_kind_is_zero() {
    debug_assert_eq!(CellKind::FREE.0, 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshly_allocated_block_is_all_free() {
        let block = Block::allocate(0, 16).unwrap();
        for cell in block.cells() {
            assert_eq!(cell.kind(), CellKind::FREE);
        }
    }

    #[test]
    fn slot_index_round_trips() {
        let block = Block::allocate(3, 8).unwrap();
        let cell = block.cell_at(5);
        assert_eq!(block.slot_index(cell.addr()), Some(5));
        assert_eq!(block.slot_index(cell.addr() + 1), None);
        assert_eq!(block.slot_index(block.base_addr() + 1000 * CELL_SIZE), None);
    }
}
