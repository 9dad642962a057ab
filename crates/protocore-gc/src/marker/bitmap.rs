//! Live-set tracking via a per-block mark bitmap.
//!
//! The collector needs to know, for every cell, whether it was reached from
//! a root during the last marking pass. Rather than keying that live set by
//! address in an ordered map - which would pull `protocore`'s persistent map
//! (a layer above this crate) down into the collector - it is indexed
//! directly by `(block_id, slot_index)`: one bit per cell, grouped into
//! per-block bit-vectors. Cells live in a fixed, block-indexable address
//! space, so the two representations are equivalent in what they can
//! express; this one keeps the collector's dependency graph acyclic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

const BITS_PER_WORD: usize = 64;

struct BlockBits {
    words: Vec<AtomicU64>,
}

impl BlockBits {
    fn new(cells_per_block: usize) -> Self {
        let word_count = cells_per_block.div_ceil(BITS_PER_WORD);
        BlockBits {
            words: (0..word_count).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    fn clear(&self) {
        for w in &self.words {
            w.store(0, Ordering::Relaxed);
        }
    }

    fn count(&self) -> usize {
        self.words
            .iter()
            .map(|w| w.load(Ordering::Relaxed).count_ones() as usize)
            .sum()
    }
}

/// Tracks which cells, across every block in the heap, were reached during
/// the most recent marking pass.
pub struct MarkBitmap {
    cells_per_block: usize,
    blocks: RwLock<HashMap<usize, BlockBits>>,
}

impl MarkBitmap {
    pub fn new(cells_per_block: usize) -> Self {
        MarkBitmap {
            cells_per_block,
            blocks: RwLock::new(HashMap::new()),
        }
    }

    fn ensure_block(&self, block_id: usize) {
        if self.blocks.read().unwrap().contains_key(&block_id) {
            return;
        }
        self.blocks
            .write()
            .unwrap()
            .entry(block_id)
            .or_insert_with(|| BlockBits::new(self.cells_per_block));
    }

    /// Mark `slot` within `block_id` as live.
    ///
    /// Returns `true` if this call was the one that set the bit (i.e. the
    /// cell was not already marked), which is how the marker decides
    /// whether to push a cell's out-edges onto the work queue: a cell only
    /// needs scanning once per cycle.
    pub fn mark(&self, block_id: usize, slot: usize) -> bool {
        self.ensure_block(block_id);
        let blocks = self.blocks.read().unwrap();
        let bits = &blocks[&block_id];
        let word_index = slot / BITS_PER_WORD;
        let bit = 1u64 << (slot % BITS_PER_WORD);
        let previous = bits.words[word_index].fetch_or(bit, Ordering::AcqRel);
        previous & bit == 0
    }

    pub fn is_marked(&self, block_id: usize, slot: usize) -> bool {
        let blocks = self.blocks.read().unwrap();
        match blocks.get(&block_id) {
            Some(bits) => {
                let word_index = slot / BITS_PER_WORD;
                let bit = 1u64 << (slot % BITS_PER_WORD);
                bits.words[word_index].load(Ordering::Acquire) & bit != 0
            }
            None => false,
        }
    }

    /// Clear every bit, at the start of a new marking pass.
    pub fn clear_all(&self) {
        for bits in self.blocks.read().unwrap().values() {
            bits.clear();
        }
    }

    /// Slot indices within `block_id` that were not marked in the last pass
    /// - the sweeper's work list for that block.
    pub fn unmarked_slots(&self, block_id: usize, len: usize) -> Vec<usize> {
        let blocks = self.blocks.read().unwrap();
        match blocks.get(&block_id) {
            None => (0..len).collect(),
            Some(bits) => (0..len)
                .filter(|&slot| {
                    let word_index = slot / BITS_PER_WORD;
                    let bit = 1u64 << (slot % BITS_PER_WORD);
                    bits.words[word_index].load(Ordering::Acquire) & bit == 0
                })
                .collect(),
        }
    }

    pub fn marked_count(&self, block_id: usize) -> usize {
        self.blocks
            .read()
            .unwrap()
            .get(&block_id)
            .map(|b| b.count())
            .unwrap_or(0)
    }

    pub fn total_marked(&self) -> usize {
        self.blocks.read().unwrap().values().map(|b| b.count()).sum()
    }
}
