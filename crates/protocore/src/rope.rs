//! Fixed-fanout indexed rope, backing tuples, strings, and byte buffers
//! (spec.md §3.5, §4.5 — C5), plus the structural-hash interner (§3.5
//! "Interning", §4.5 "Interning protocol" — C6).
//!
//! A rope is a tree of constant fanout `F`. Leaves hold up to `F` value
//! handles packed into an out-of-band boxed `[u64]` array (a cell's
//! 48-byte payload has no room for 32 eight-byte words plus bookkeeping,
//! so the array lives on Rust's heap and the cell stores a pointer and a
//! length — the same "shadow finalization" shape spec.md §4.13 specifies
//! for external buffers: a registered finalizer frees the boxed array
//! when the owning cell is collected). Internal nodes store up to `F`
//! child cell addresses the same way, plus the subtree's total size,
//! height, and structural hash.
//!
//! Tuples and strings share one cell-kind family (`TUPLE_LEAF` /
//! `TUPLE_INTERNAL`): a string is simply a rope every one of whose leaf
//! words decodes as `Handle::as_char`. Byte buffers use a second family
//! (`BYTES_LEAF` / `BYTES_INTERNAL`) so the GC never has to guess which
//! kind of element a leaf holds.

use crate::error::{CoreError, CoreResult};
use crate::kinds;
use crate::layout;
use crate::value::{Handle, NONE};
use crate::Gc;
use dashmap::DashMap;
use protocore_gc::cell::{CellKind, CellPtr};
use std::sync::OnceLock;

/// Maximum children per node. Spec.md §3.5 says "typical F = 32 or 64";
/// 32 keeps leaves well under a cache line's worth of pointer-chasing.
pub const FANOUT: usize = 32;

#[derive(Clone, Copy)]
struct Family {
    leaf: CellKind,
    internal: CellKind,
}

const TUPLE_FAMILY: Family = Family {
    leaf: kinds::TUPLE_LEAF,
    internal: kinds::TUPLE_INTERNAL,
};

const BYTES_FAMILY: Family = Family {
    leaf: kinds::BYTES_LEAF,
    internal: kinds::BYTES_INTERNAL,
};

fn words_ptr(c: &protocore_gc::cell::Cell) -> *mut u64 {
    layout::get_ptr(c, 0) as *mut u64
}

fn words_len(c: &protocore_gc::cell::Cell) -> usize {
    layout::get_len(c, 1)
}

unsafe fn words_slice<'a>(c: &'a protocore_gc::cell::Cell) -> &'a [u64] {
    std::slice::from_raw_parts(words_ptr(c), words_len(c))
}

fn node_hash(n: CellPtr, _family: &Family) -> u64 {
    layout::get_u64(unsafe { n.as_ref() }, 2)
}

fn size_of(n: CellPtr, family: &Family) -> u64 {
    let c = unsafe { n.as_ref() };
    if n.kind() == family.leaf {
        words_len(c) as u64
    } else {
        layout::get_u64(c, 3)
    }
}

fn height_of(n: CellPtr, family: &Family) -> u8 {
    let c = unsafe { n.as_ref() };
    if n.kind() == family.leaf {
        0
    } else {
        (layout::get_u64(c, 4) & 0xFF) as u8
    }
}

fn mix(acc: u64, word: u64) -> u64 {
    let mut h = acc ^ word.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    h ^= h >> 33;
    h.wrapping_mul(0xff51_afd7_ed55_8ccd)
}

fn alloc_leaf(gc: &Gc, family: &Family, words: &[u64]) -> CoreResult<CellPtr> {
    debug_assert!(words.len() <= FANOUT);
    let cell = gc.allocate(family.leaf)?;
    let boxed: Box<[u64]> = words.into();
    let len = boxed.len();
    let ptr = Box::into_raw(boxed) as *mut u64;
    let hash = words.iter().fold(0xcbf2_9ce4_8422_2325u64, |acc, w| mix(acc, *w));
    unsafe {
        let c = cell.as_mut();
        layout::set_ptr_len(c, 0, 1, ptr as *mut (), len);
        layout::set_u64(c, 2, hash);
    }
    Ok(cell)
}

fn alloc_internal(gc: &Gc, family: &Family, children: &[CellPtr]) -> CoreResult<CellPtr> {
    debug_assert!(children.len() <= FANOUT);
    debug_assert!(!children.is_empty());
    let cell = gc.allocate(family.internal)?;
    let words: Box<[u64]> = children.iter().map(|c| c.addr() as u64).collect();
    let len = words.len();
    let ptr = Box::into_raw(words) as *mut u64;
    let mut total_size = 0u64;
    let mut max_height = 0u8;
    let mut hash = 0u64;
    for &child in children {
        total_size += size_of(child, family);
        max_height = max_height.max(height_of(child, family));
        hash = mix(hash, node_hash(child, family));
    }
    unsafe {
        let c = cell.as_mut();
        layout::set_ptr_len(c, 0, 1, ptr as *mut (), len);
        layout::set_u64(c, 2, hash);
        layout::set_u64(c, 3, total_size);
        layout::set_u64(c, 4, (max_height as u64) + 1);
    }
    Ok(cell)
}

fn finalize(cell: CellPtr) {
    unsafe {
        let c = cell.as_ref();
        let ptr = words_ptr(c);
        let len = words_len(c);
        if !ptr.is_null() {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, len)));
        }
    }
}

fn build(gc: &Gc, family: &Family, words: &[u64]) -> CoreResult<Option<CellPtr>> {
    if words.is_empty() {
        return Ok(None);
    }
    let mut level: Vec<CellPtr> = words
        .chunks(FANOUT)
        .map(|chunk| alloc_leaf(gc, family, chunk))
        .collect::<CoreResult<_>>()?;
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len() / FANOUT + 1);
        for chunk in level.chunks(FANOUT) {
            next.push(alloc_internal(gc, family, chunk)?);
        }
        level = next;
    }
    Ok(Some(level[0]))
}

/// Normalize a possibly-negative index against `size` (spec.md §4.4:
/// "negative indices mean 'from the end' after normalization", reused by
/// ropes per §4.5). Returns `None` if the index is still negative once
/// shifted; an in-range-but-too-large result is left for the caller to
/// judge (some operations clamp, some error, some treat it as "not found").
fn normalize_index(index: i64, size: u64) -> Option<u64> {
    let shifted = if index < 0 { index + size as i64 } else { index };
    u64::try_from(shifted).ok()
}

fn get_at(node: Option<CellPtr>, family: &Family, index: u64) -> Option<Handle> {
    let mut cur = node?;
    let mut idx = index;
    loop {
        let c = unsafe { cur.as_ref() };
        if cur.kind() == family.leaf {
            let words = unsafe { words_slice(c) };
            return words.get(idx as usize).map(|w| Handle::from_raw(*w));
        }
        let children = unsafe { words_slice(c) };
        let mut found = None;
        for &addr in children {
            let child = unsafe { CellPtr::from_addr(addr as usize) }.expect("child address is nonzero");
            let sz = size_of(child, family);
            if idx < sz {
                found = Some(child);
                break;
            }
            idx -= sz;
        }
        cur = found?;
    }
}

fn flatten_into(node: CellPtr, family: &Family, out: &mut Vec<u64>) {
    let c = unsafe { node.as_ref() };
    if node.kind() == family.leaf {
        out.extend_from_slice(unsafe { words_slice(c) });
    } else {
        for &addr in unsafe { words_slice(c) } {
            let child = unsafe { CellPtr::from_addr(addr as usize) }.expect("child address is nonzero");
            flatten_into(child, family, out);
        }
    }
}

/// Attach two subtrees directly as the two children of a fresh internal
/// node. This satisfies spec.md §3.5's "concatenation is O(log n) by
/// attaching subtrees" as an upper bound (attaching is O(1)) without
/// maintaining a tight height-balance invariant across repeated
/// concatenations — a pragmatic simplification over full B-tree-style
/// rebalancing on join; see `DESIGN.md`.
fn concat(gc: &Gc, family: &Family, left: Option<CellPtr>, right: Option<CellPtr>) -> CoreResult<Option<CellPtr>> {
    match (left, right) {
        (None, r) => Ok(r),
        (l, None) => Ok(l),
        (Some(l), Some(r)) => Ok(Some(alloc_internal(gc, family, &[l, r])?)),
    }
}

fn structural_eq(a: Option<CellPtr>, family: &Family, b: Option<CellPtr>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            if node_hash(a, family) != node_hash(b, family) || size_of(a, family) != size_of(b, family) {
                return false;
            }
            let mut wa = Vec::new();
            let mut wb = Vec::new();
            flatten_into(a, family, &mut wa);
            flatten_into(b, family, &mut wb);
            wa == wb
        }
        _ => false,
    }
}

/// A fixed-fanout rope over arbitrary value handles — the representation
/// for tuples, and (via [`ProtoString`]) strings.
#[derive(Clone, Copy)]
pub struct Rope {
    root: Option<CellPtr>,
    family: Family,
}

impl Rope {
    fn new(root: Option<CellPtr>, family: Family) -> Self {
        Rope { root, family }
    }

    pub fn size(&self) -> u64 {
        self.root.map(|r| size_of(r, &self.family)).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Out-of-range (including still-negative after normalization) reads
    /// return *none* rather than failing (spec.md §4.4, reused directly by
    /// ropes per §4.5).
    pub fn get_at(&self, index: i64) -> CoreResult<Handle> {
        let size = self.size();
        match normalize_index(index, size) {
            Some(idx) if idx < size => Ok(get_at(self.root, &self.family, idx).expect("index checked in range")),
            _ => Ok(NONE),
        }
    }

    pub fn has(&self, v: Handle) -> bool {
        self.iter().any(|h| h.raw() == v.raw())
    }

    pub fn iter(&self) -> std::vec::IntoIter<Handle> {
        let mut words = Vec::with_capacity(self.size() as usize);
        if let Some(root) = self.root {
            flatten_into(root, &self.family, &mut words);
        }
        words.into_iter().map(Handle::from_raw).collect::<Vec<_>>().into_iter()
    }

    /// Half-open `[start, end)`, with both ends clamped into `[0, size]`
    /// after negative-index normalization and `start` clamped down to
    /// `end` (spec.md §4.4, reused by ropes per §4.5) — never an error.
    pub fn slice(&self, gc: &Gc, start: i64, end: i64) -> CoreResult<Self> {
        let size = self.size();
        let clamp = |i: i64| -> u64 {
            let shifted = if i < 0 { i + size as i64 } else { i };
            shifted.clamp(0, size as i64) as u64
        };
        let end = clamp(end);
        let start = clamp(start).min(end);
        let mut words = Vec::with_capacity(size as usize);
        if let Some(root) = self.root {
            flatten_into(root, &self.family, &mut words);
        }
        let slice = &words[start as usize..end as usize];
        Ok(Rope::new(build(gc, &self.family, slice)?, self.family))
    }

    pub fn extend(&self, gc: &Gc, other: &Self) -> CoreResult<Self> {
        Ok(Rope::new(concat(gc, &self.family, self.root, other.root)?, self.family))
    }

    pub fn append_last(&self, gc: &Gc, v: Handle) -> CoreResult<Self> {
        let single = build(gc, &self.family, &[v.raw()])?;
        Ok(Rope::new(concat(gc, &self.family, self.root, single)?, self.family))
    }

    pub fn append_first(&self, gc: &Gc, v: Handle) -> CoreResult<Self> {
        let single = build(gc, &self.family, &[v.raw()])?;
        Ok(Rope::new(concat(gc, &self.family, single, self.root)?, self.family))
    }

    /// Mutation-returning-new: rebuild with element `index` replaced.
    pub fn set_at(&self, gc: &Gc, index: i64, v: Handle) -> CoreResult<Self> {
        let size = self.size();
        let idx = normalize_index(index, size)
            .filter(|&i| i < size)
            .ok_or(CoreError::IndexOutOfRange { index, size: size as usize })?;
        let mut words = Vec::with_capacity(size as usize);
        if let Some(root) = self.root {
            flatten_into(root, &self.family, &mut words);
        }
        words[idx as usize] = v.raw();
        Ok(Rope::new(build(gc, &self.family, &words)?, self.family))
    }

    pub fn remove_slice(&self, gc: &Gc, start: i64, end: i64) -> CoreResult<Self> {
        let size = self.size();
        let start = normalize_index(start, size).ok_or(CoreError::IndexOutOfRange { index: start, size: size as usize })?;
        let end = normalize_index(end, size).ok_or(CoreError::IndexOutOfRange { index: end, size: size as usize })?;
        if start > end || end > size {
            return Err(CoreError::IndexOutOfRange { index: end as i64, size: size as usize });
        }
        let mut words = Vec::with_capacity(size as usize);
        if let Some(root) = self.root {
            flatten_into(root, &self.family, &mut words);
        }
        words.drain(start as usize..end as usize);
        Ok(Rope::new(build(gc, &self.family, &words)?, self.family))
    }

    fn structural_hash(&self) -> u64 {
        self.root.map(|r| node_hash(r, &self.family)).unwrap_or(0)
    }

    fn eq_structural(&self, other: &Self) -> bool {
        structural_eq(self.root, &self.family, other.root)
    }
}

/// An interned tuple: a rope of arbitrary value handles.
#[derive(Clone, Copy)]
pub struct ProtoTuple(Rope);

impl ProtoTuple {
    pub fn empty() -> Self {
        ProtoTuple(Rope::new(None, TUPLE_FAMILY))
    }

    pub fn from_handles(gc: &Gc, elements: &[Handle]) -> CoreResult<Self> {
        let words: Vec<u64> = elements.iter().map(|h| h.raw()).collect();
        let root = build(gc, &TUPLE_FAMILY, &words)?;
        let candidate = Rope::new(root, TUPLE_FAMILY);
        Ok(ProtoTuple(intern(gc, candidate)))
    }

    pub fn rope(&self) -> &Rope {
        &self.0
    }
}

/// An interned string: a rope whose leaf words always decode via
/// `Handle::as_char`.
#[derive(Clone, Copy)]
pub struct ProtoString(Rope);

impl ProtoString {
    pub fn empty() -> Self {
        ProtoString(Rope::new(None, TUPLE_FAMILY))
    }

    pub fn from_chars(gc: &Gc, chars: &[char]) -> CoreResult<Self> {
        let words: Vec<u64> = chars.iter().map(|c| Handle::encode_char(*c).raw()).collect();
        let root = build(gc, &TUPLE_FAMILY, &words)?;
        let candidate = Rope::new(root, TUPLE_FAMILY);
        Ok(ProtoString(intern(gc, candidate)))
    }

    /// Decode UTF-8 bytes into an interned string. Decoding is total: a
    /// malformed byte sequence inserts the offending byte as an isolated
    /// scalar and continues (spec.md §4.5).
    pub fn from_utf8(gc: &Gc, bytes: &[u8]) -> CoreResult<Self> {
        let mut chars = Vec::with_capacity(bytes.len());
        let mut rest = bytes;
        loop {
            if rest.is_empty() {
                break;
            }
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    chars.extend(valid.chars());
                    break;
                }
                Err(e) => {
                    let valid_len = e.valid_up_to();
                    if valid_len > 0 {
                        chars.extend(std::str::from_utf8(&rest[..valid_len]).unwrap().chars());
                    }
                    chars.push(rest[valid_len] as char);
                    rest = &rest[valid_len + 1..];
                }
            }
        }
        Self::from_chars(gc, &chars)
    }

    pub fn to_utf8(&self, out: &mut String) {
        for h in self.0.iter() {
            if let Some(c) = h.as_char() {
                out.push(c);
            }
        }
    }

    /// Strict lexicographic comparison by Unicode scalar sequence.
    /// Returns -1/0/+1.
    pub fn cmp(&self, other: &Self) -> i32 {
        let a: Vec<char> = self.0.iter().filter_map(|h| h.as_char()).collect();
        let b: Vec<char> = other.0.iter().filter_map(|h| h.as_char()).collect();
        match a.cmp(&b) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        }
    }

    pub fn rope(&self) -> &Rope {
        &self.0
    }
}

/// A byte-indexed buffer, the supplemented non-text sibling of
/// [`ProtoTuple`]/[`ProtoString`] (SPEC_FULL §2.5). Not interned: byte
/// buffers are typically used for bulk mutable-looking data, where
/// structural deduplication would cost more than it saves.
#[derive(Clone, Copy)]
pub struct ProtoByteBuffer(Rope);

impl ProtoByteBuffer {
    pub fn empty() -> Self {
        ProtoByteBuffer(Rope::new(None, BYTES_FAMILY))
    }

    pub fn from_bytes(gc: &Gc, bytes: &[u8]) -> CoreResult<Self> {
        let words: Vec<u64> = bytes.iter().map(|b| Handle::encode_byte(*b).raw()).collect();
        Ok(ProtoByteBuffer(Rope::new(build(gc, &BYTES_FAMILY, &words)?, BYTES_FAMILY)))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.iter().filter_map(|h| h.as_byte()).collect()
    }

    pub fn rope(&self) -> &Rope {
        &self.0
    }
}

/// The tuple/string interning dictionary, rooted on the owning
/// [`crate::space::Space`] (spec.md §3.5, §3.9, §4.5). A dashmap keyed by
/// structural hash stands in for the spec's "balanced tree keyed by
/// structural hash"; the tie-break comparison (full element-wise
/// equality check on hash collision) is identical either way, and a
/// concurrent hash map gives the same lock-free-insert behavior the
/// protocol asks for with far less code than a hand-rolled CAS tree.
pub struct Interner {
    table: DashMap<u64, Vec<Rope>>,
}

impl Interner {
    pub fn new() -> Self {
        Interner { table: DashMap::new() }
    }

    /// All cells currently reachable through the interning table, visited
    /// as GC roots (spec.md §4.10's "the interned-tuple root").
    pub fn visit_roots(&self, visit: &mut dyn FnMut(CellPtr)) {
        for bucket in self.table.iter() {
            for rope in bucket.value() {
                if let Some(root) = rope.root {
                    visit(root);
                }
            }
        }
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

fn global_interner() -> &'static Interner {
    static INTERNER: OnceLock<Interner> = OnceLock::new();
    INTERNER.get_or_init(Interner::new)
}

/// GC root: every cell reachable through the process-wide interning
/// table (spec.md §4.10's "the interned-tuple root"). Exposed so
/// [`crate::space::Space`] can register it once per collector.
pub(crate) fn visit_global_interner_roots(visit: &mut dyn FnMut(CellPtr)) {
    global_interner().visit_roots(visit)
}

/// Install `candidate` into the interning table, or return the existing
/// equal rope if one is already present (spec.md §4.5's interning
/// protocol). `DashMap::entry` gives us the equivalent of a CAS-guarded
/// insert: the shard lock only protects the bucket during this call, not
/// across retries, so true insert races resolve the same way a literal
/// CAS loop would — last writer wins the slot, everyone else discards
/// their candidate and reuses what's there.
fn intern(gc: &Gc, candidate: Rope) -> Rope {
    let _ = gc; // reserved: candidate cells are already published; nothing further to allocate here.
    let interner = global_interner();
    let hash = candidate.structural_hash();
    let mut bucket = interner.table.entry(hash).or_default();
    for existing in bucket.iter() {
        if existing.eq_structural(&candidate) {
            return *existing;
        }
    }
    bucket.push(candidate);
    candidate
}

pub(crate) fn register_kinds() {
    fn visit_tuple(cell: CellPtr, visit_fn: &mut dyn FnMut(CellPtr)) {
        visit_family(cell, &TUPLE_FAMILY, visit_fn, true);
    }
    fn visit_bytes(cell: CellPtr, visit_fn: &mut dyn FnMut(CellPtr)) {
        visit_family(cell, &BYTES_FAMILY, visit_fn, false);
    }
    fn visit_family(cell: CellPtr, family: &Family, visit_fn: &mut dyn FnMut(CellPtr), elements_may_be_heap: bool) {
        let c = unsafe { cell.as_ref() };
        if cell.kind() == family.leaf {
            if elements_may_be_heap {
                for &word in unsafe { words_slice(c) } {
                    let h = Handle::from_raw(word);
                    if let Some(hc) = unsafe { h.as_cell() } {
                        visit_fn(hc);
                    }
                }
            }
        } else {
            for &addr in unsafe { words_slice(c) } {
                let child = unsafe { CellPtr::from_addr(addr as usize) }.expect("child address is nonzero");
                visit_fn(child);
            }
        }
    }
    protocore_gc::cell::register_kind(kinds::TUPLE_LEAF, visit_tuple, Some(finalize));
    protocore_gc::cell::register_kind(kinds::TUPLE_INTERNAL, visit_tuple, Some(finalize));
    protocore_gc::cell::register_kind(kinds::BYTES_LEAF, visit_bytes, Some(finalize));
    protocore_gc::cell::register_kind(kinds::BYTES_INTERNAL, visit_bytes, Some(finalize));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_gc;

    #[test]
    fn tuple_round_trips_elements() {
        let gc = test_gc();
        let elements: Vec<Handle> = (0..100).map(|i| Handle::encode_small_int(i).unwrap()).collect();
        let tuple = ProtoTuple::from_handles(&gc, &elements).unwrap();
        assert_eq!(tuple.rope().size(), 100);
        for i in 0..100i64 {
            assert_eq!(tuple.rope().get_at(i).unwrap().as_small_int(), Some(i));
        }
    }

    #[test]
    fn equal_tuples_are_interned_to_the_same_cells() {
        let gc = test_gc();
        let elements: Vec<Handle> = (0..50).map(|i| Handle::encode_small_int(i).unwrap()).collect();
        let a = ProtoTuple::from_handles(&gc, &elements).unwrap();
        let b = ProtoTuple::from_handles(&gc, &elements).unwrap();
        assert_eq!(a.rope().root, b.rope().root, "structurally equal tuples must canonicalize to one cell");
    }

    #[test]
    fn string_from_utf8_round_trips() {
        let gc = test_gc();
        let s = ProtoString::from_utf8(&gc, "hello, \u{1F980}".as_bytes()).unwrap();
        let mut out = String::new();
        s.to_utf8(&mut out);
        assert_eq!(out, "hello, \u{1F980}");
    }

    #[test]
    fn string_from_utf8_is_total_over_malformed_input() {
        let gc = test_gc();
        let malformed = [0x68, 0x69, 0xFF, 0x21];
        let s = ProtoString::from_utf8(&gc, &malformed).unwrap();
        assert_eq!(s.rope().size(), 4);
    }

    #[test]
    fn string_cmp_is_lexicographic() {
        let gc = test_gc();
        let a = ProtoString::from_utf8(&gc, b"apple").unwrap();
        let b = ProtoString::from_utf8(&gc, b"banana").unwrap();
        assert_eq!(a.cmp(&b), -1);
        assert_eq!(b.cmp(&a), 1);
        assert_eq!(a.cmp(&a), 0);
    }

    #[test]
    fn byte_buffer_round_trips() {
        let gc = test_gc();
        let bytes: Vec<u8> = (0..200).map(|i| (i % 256) as u8).collect();
        let buf = ProtoByteBuffer::from_bytes(&gc, &bytes).unwrap();
        assert_eq!(buf.to_bytes(), bytes);
    }

    #[test]
    fn rope_extend_and_slice() {
        let gc = test_gc();
        let a: Vec<Handle> = (0..40).map(|i| Handle::encode_small_int(i).unwrap()).collect();
        let tuple_a = ProtoTuple::from_handles(&gc, &a).unwrap();
        let b: Vec<Handle> = (40..80).map(|i| Handle::encode_small_int(i).unwrap()).collect();
        let tuple_b = ProtoTuple::from_handles(&gc, &b).unwrap();
        let joined = tuple_a.rope().extend(&gc, tuple_b.rope()).unwrap();
        assert_eq!(joined.size(), 80);
        for i in 0..80i64 {
            assert_eq!(joined.get_at(i).unwrap().as_small_int(), Some(i));
        }
        let middle = joined.slice(&gc, 35, 45).unwrap();
        assert_eq!(middle.size(), 10);
        assert_eq!(middle.get_at(0).unwrap().as_small_int(), Some(35));
    }

    #[test]
    fn two_and_a_half_million_scalar_round_trip() {
        let gc = test_gc();
        let elements: Vec<Handle> = (0..2_500_000i64).map(|i| Handle::encode_small_int(i % 1000).unwrap()).collect();
        let tuple = ProtoTuple::from_handles(&gc, &elements).unwrap();
        assert_eq!(tuple.rope().size(), 2_500_000);
        assert_eq!(tuple.rope().get_at(0).unwrap().as_small_int(), Some(0));
        assert_eq!(tuple.rope().get_at(2_499_999).unwrap().as_small_int(), Some(999));
    }
}
