//! Persistent list, indexed by position (spec.md §3.4, §4.4 — C4).
//!
//! Structurally this is the same height-balanced binary tree as
//! [`crate::map`], except the "key" is implicit: a node's position is its
//! left subtree's size. That makes `get_at`/`set_at`/`insert_at` walk the
//! tree the same way `map`'s `get`/`set` do, just comparing against
//! `size(left)` instead of a stored key. Every node still packs into one
//! cell: value handle, left/right children, precomputed hash, packed
//! `(size, height)`.

use crate::error::{CoreError, CoreResult};
use crate::kinds;
use crate::layout;
use crate::value::{Handle, NONE};
use crate::Gc;
use protocore_gc::cell::CellPtr;

#[inline]
fn value(n: CellPtr) -> Handle {
    Handle::from_raw(layout::get_u64(unsafe { n.as_ref() }, 0))
}

#[inline]
fn left(n: CellPtr) -> Option<CellPtr> {
    unsafe { CellPtr::from_addr(layout::get_u64(n.as_ref(), 1) as usize) }
}

#[inline]
fn right(n: CellPtr) -> Option<CellPtr> {
    unsafe { CellPtr::from_addr(layout::get_u64(n.as_ref(), 2) as usize) }
}

#[inline]
fn node_hash(n: CellPtr) -> u64 {
    layout::get_u64(unsafe { n.as_ref() }, 3)
}

#[inline]
fn size_of(node: Option<CellPtr>) -> u64 {
    match node {
        Some(n) => layout::unpack_size(layout::get_u64(unsafe { n.as_ref() }, 4)),
        None => 0,
    }
}

#[inline]
fn height_of(node: Option<CellPtr>) -> u8 {
    match node {
        Some(n) => layout::unpack_height(layout::get_u64(unsafe { n.as_ref() }, 4)),
        None => 0,
    }
}

fn make_node(gc: &Gc, v: Handle, l: Option<CellPtr>, r: Option<CellPtr>) -> CoreResult<CellPtr> {
    let cell = gc.allocate(kinds::LIST_NODE)?;
    let lh = l.map(node_hash).unwrap_or(0);
    let rh = r.map(node_hash).unwrap_or(0);
    let h = v.raw().wrapping_mul(0x9e37_79b9_7f4a_7c15) ^ lh.rotate_left(1) ^ rh.rotate_right(1);
    let sz = 1 + size_of(l) + size_of(r);
    let ht = 1 + height_of(l).max(height_of(r));
    unsafe {
        let c = cell.as_mut();
        layout::set_u64(c, 0, v.raw());
        layout::set_u64(c, 1, l.map(|n| n.addr() as u64).unwrap_or(0));
        layout::set_u64(c, 2, r.map(|n| n.addr() as u64).unwrap_or(0));
        layout::set_u64(c, 3, h);
        layout::set_u64(c, 4, layout::pack_size_height(sz, ht));
    }
    Ok(cell)
}

fn rotate_right(gc: &Gc, n: CellPtr) -> CoreResult<CellPtr> {
    let l = left(n).expect("rotate_right requires a left child");
    let new_right = make_node(gc, value(n), right(l), right(n))?;
    make_node(gc, value(l), left(l), Some(new_right))
}

fn rotate_left(gc: &Gc, n: CellPtr) -> CoreResult<CellPtr> {
    let r = right(n).expect("rotate_left requires a right child");
    let new_left = make_node(gc, value(n), left(n), left(r))?;
    make_node(gc, value(r), Some(new_left), right(r))
}

fn rebalance(gc: &Gc, l: Option<CellPtr>, v: Handle, r: Option<CellPtr>) -> CoreResult<CellPtr> {
    let balance = height_of(l) as i16 - height_of(r) as i16;
    if balance > 1 {
        let lc = l.unwrap();
        if height_of(left(lc)) as i16 >= height_of(right(lc)) as i16 {
            rotate_right(gc, make_node(gc, v, l, r)?)
        } else {
            let new_left = rotate_left(gc, lc)?;
            rotate_right(gc, make_node(gc, v, Some(new_left), r)?)
        }
    } else if balance < -1 {
        let rc = r.unwrap();
        if height_of(right(rc)) as i16 >= height_of(left(rc)) as i16 {
            rotate_left(gc, make_node(gc, v, l, r)?)
        } else {
            let new_right = rotate_right(gc, rc)?;
            rotate_left(gc, make_node(gc, v, l, Some(new_right))?)
        }
    } else {
        make_node(gc, v, l, r)
    }
}

fn get_at(node: Option<CellPtr>, index: u64) -> Option<Handle> {
    let mut cur = node;
    let mut idx = index;
    while let Some(n) = cur {
        let ls = size_of(left(n));
        if idx < ls {
            cur = left(n);
        } else if idx == ls {
            return Some(value(n));
        } else {
            idx -= ls + 1;
            cur = right(n);
        }
    }
    None
}

fn set_at(gc: &Gc, node: Option<CellPtr>, index: u64, v: Handle) -> CoreResult<Option<CellPtr>> {
    match node {
        None => Err(CoreError::IndexOutOfRange {
            index: index as i64,
            size: 0,
        }),
        Some(n) => {
            let ls = size_of(left(n));
            if index < ls {
                let new_left = set_at(gc, left(n), index, v)?;
                Ok(Some(make_node(gc, value(n), new_left, right(n))?))
            } else if index == ls {
                Ok(Some(make_node(gc, v, left(n), right(n))?))
            } else {
                let new_right = set_at(gc, right(n), index - ls - 1, v)?;
                Ok(Some(make_node(gc, value(n), left(n), new_right)?))
            }
        }
    }
}

/// Insert `v` so that it becomes element `index`; `index == size` appends.
fn insert_at(gc: &Gc, node: Option<CellPtr>, index: u64, v: Handle) -> CoreResult<Option<CellPtr>> {
    match node {
        None => {
            if index != 0 {
                return Err(CoreError::IndexOutOfRange {
                    index: index as i64,
                    size: 0,
                });
            }
            Ok(Some(make_node(gc, v, None, None)?))
        }
        Some(n) => {
            let ls = size_of(left(n));
            if index <= ls {
                let new_left = insert_at(gc, left(n), index, v)?;
                Ok(Some(rebalance(gc, new_left, value(n), right(n))?))
            } else {
                let new_right = insert_at(gc, right(n), index - ls - 1, v)?;
                Ok(Some(rebalance(gc, left(n), value(n), new_right)?))
            }
        }
    }
}

fn remove_min(gc: &Gc, n: CellPtr) -> CoreResult<(Handle, Option<CellPtr>)> {
    match left(n) {
        None => Ok((value(n), right(n))),
        Some(l) => {
            let (mv, new_left) = remove_min(gc, l)?;
            Ok((mv, Some(rebalance(gc, new_left, value(n), right(n))?)))
        }
    }
}

fn remove_at(gc: &Gc, node: Option<CellPtr>, index: u64) -> CoreResult<Option<CellPtr>> {
    match node {
        None => Err(CoreError::IndexOutOfRange {
            index: index as i64,
            size: 0,
        }),
        Some(n) => {
            let ls = size_of(left(n));
            if index < ls {
                let new_left = remove_at(gc, left(n), index)?;
                Ok(Some(rebalance(gc, new_left, value(n), right(n))?))
            } else if index > ls {
                let new_right = remove_at(gc, right(n), index - ls - 1)?;
                Ok(Some(rebalance(gc, left(n), value(n), new_right)?))
            } else {
                match (left(n), right(n)) {
                    (None, None) => Ok(None),
                    (Some(l), None) => Ok(Some(l)),
                    (None, Some(r)) => Ok(Some(r)),
                    (Some(l), Some(r)) => {
                        let (mv, new_right) = remove_min(gc, r)?;
                        Ok(Some(rebalance(gc, Some(l), mv, new_right)?))
                    }
                }
            }
        }
    }
}

/// Normalize a possibly-negative index against `size` (spec.md §4.4:
/// "negative indices mean 'from the end' after normalization"). Returns
/// `None` if the index is still negative once shifted; an
/// in-range-but-too-large result is left for the caller to judge (some
/// operations clamp, some error, some treat it as "not found").
fn normalize_index(index: i64, size: u64) -> Option<u64> {
    let shifted = if index < 0 { index + size as i64 } else { index };
    u64::try_from(shifted).ok()
}

fn collect(node: Option<CellPtr>, out: &mut Vec<Handle>) {
    if let Some(n) = node {
        collect(left(n), out);
        out.push(value(n));
        collect(right(n), out);
    }
}

/// A balanced, position-indexed persistent sequence.
#[derive(Clone, Copy)]
pub struct PersistentList {
    root: Option<CellPtr>,
}

impl PersistentList {
    pub fn empty() -> Self {
        PersistentList { root: None }
    }

    pub fn from_root(root: Option<CellPtr>) -> Self {
        PersistentList { root }
    }

    pub fn root_cell(&self) -> Option<CellPtr> {
        self.root
    }

    pub fn size(&self) -> u64 {
        size_of(self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Resolve `index` into an in-bounds position (`< size()`), failing
    /// with `IndexOutOfRange` otherwise. Used by the mutating operations
    /// (`set_at`, `remove_at`), which spec.md §4.4 says signal the error
    /// rather than silently no-op.
    fn resolve_index(&self, index: i64) -> CoreResult<u64> {
        let size = self.size();
        normalize_index(index, size)
            .filter(|&i| i < size)
            .ok_or(CoreError::IndexOutOfRange { index, size: size as usize })
    }

    /// Out-of-range (including still-negative after normalization) reads
    /// return *none* rather than failing (spec.md §4.4).
    pub fn get_at(&self, index: i64) -> CoreResult<Handle> {
        let size = self.size();
        match normalize_index(index, size) {
            Some(idx) if idx < size => Ok(get_at(self.root, idx).expect("index checked in range")),
            _ => Ok(NONE),
        }
    }

    /// Whether `v` (compared by raw handle word) occurs anywhere in the
    /// list (spec.md §4.4's `has(v)`).
    pub fn has(&self, v: Handle) -> bool {
        self.iter().any(|h| h.raw() == v.raw())
    }

    pub fn set_at(&self, gc: &Gc, index: i64, v: Handle) -> CoreResult<Self> {
        let idx = self.resolve_index(index)?;
        Ok(PersistentList {
            root: set_at(gc, self.root, idx, v)?,
        })
    }

    pub fn insert_at(&self, gc: &Gc, index: i64, v: Handle) -> CoreResult<Self> {
        let size = self.size();
        let idx = normalize_index(index, size)
            .filter(|&i| i <= size)
            .ok_or(CoreError::IndexOutOfRange { index, size: size as usize })?;
        Ok(PersistentList {
            root: insert_at(gc, self.root, idx, v)?,
        })
    }

    pub fn append_last(&self, gc: &Gc, v: Handle) -> CoreResult<Self> {
        self.insert_at(gc, self.size() as i64, v)
    }

    pub fn append_first(&self, gc: &Gc, v: Handle) -> CoreResult<Self> {
        self.insert_at(gc, 0, v)
    }

    pub fn remove_at(&self, gc: &Gc, index: i64) -> CoreResult<Self> {
        let idx = self.resolve_index(index)?;
        Ok(PersistentList {
            root: remove_at(gc, self.root, idx)?,
        })
    }

    /// Remove the half-open range `[start, end)`.
    pub fn remove_slice(&self, gc: &Gc, start: i64, end: i64) -> CoreResult<Self> {
        let size = self.size();
        let start = normalize_index(start, size).ok_or(CoreError::IndexOutOfRange { index: start, size: size as usize })?;
        let end = normalize_index(end, size).ok_or(CoreError::IndexOutOfRange { index: end, size: size as usize })?;
        if start > end || end > size {
            return Err(CoreError::IndexOutOfRange { index: end as i64, size: size as usize });
        }
        let mut cur = *self;
        for _ in start..end {
            cur = cur.remove_at(gc, start as i64)?;
        }
        Ok(cur)
    }

    /// A new list holding elements `[start, end)`, with both ends clamped
    /// into `[0, size]` after negative-index normalization and `start`
    /// clamped down to `end` (spec.md §4.4) — never an error.
    pub fn slice(&self, gc: &Gc, start: i64, end: i64) -> CoreResult<Self> {
        let size = self.size();
        let clamp = |i: i64| -> u64 {
            let shifted = if i < 0 { i + size as i64 } else { i };
            shifted.clamp(0, size as i64) as u64
        };
        let end = clamp(end);
        let start = clamp(start).min(end);
        let mut out = PersistentList::empty();
        for i in start..end {
            out = out.append_last(gc, get_at(self.root, i).expect("index in range"))?;
        }
        Ok(out)
    }

    /// `other`'s elements appended after this list's.
    pub fn extend(&self, gc: &Gc, other: &Self) -> CoreResult<Self> {
        let mut out = *self;
        for v in other.iter() {
            out = out.append_last(gc, v)?;
        }
        Ok(out)
    }

    /// Split at `i` (clamped into `[0, size]` after negative-index
    /// normalization), returning `(self[0..i], self[i..size])` (spec.md
    /// §4.4's `split_first(i)`).
    pub fn split_first(&self, gc: &Gc, i: i64) -> CoreResult<(Self, Self)> {
        let size = self.size();
        let shifted = if i < 0 { i + size as i64 } else { i };
        let at = shifted.clamp(0, size as i64);
        let prefix = self.slice(gc, 0, at)?;
        let suffix = self.slice(gc, at, size as i64)?;
        Ok((prefix, suffix))
    }

    /// Split so the trailing part holds `i` elements (clamped into
    /// `[0, size]` after negative-index normalization), returning
    /// `(self[0..size-i], self[size-i..size])` (spec.md §4.4's
    /// `split_last(i)`).
    pub fn split_last(&self, gc: &Gc, i: i64) -> CoreResult<(Self, Self)> {
        let size = self.size();
        let shifted = if i < 0 { i + size as i64 } else { i };
        let count = shifted.clamp(0, size as i64) as u64;
        let at = (size - count) as i64;
        let prefix = self.slice(gc, 0, at)?;
        let suffix = self.slice(gc, at, size as i64)?;
        Ok((prefix, suffix))
    }

    pub fn iter(&self) -> std::vec::IntoIter<Handle> {
        let mut out = Vec::with_capacity(self.size() as usize);
        collect(self.root, &mut out);
        out.into_iter()
    }
}

impl Default for PersistentList {
    fn default() -> Self {
        Self::empty()
    }
}

pub(crate) fn register_kind() {
    fn visit(cell: CellPtr, visit: &mut dyn FnMut(CellPtr)) {
        let v = value(cell);
        if let Some(vc) = unsafe { v.as_cell() } {
            visit(vc);
        }
        if let Some(l) = left(cell) {
            visit(l);
        }
        if let Some(r) = right(cell) {
            visit(r);
        }
    }
    protocore_gc::cell::register_kind(kinds::LIST_NODE, visit, None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_gc;

    #[test]
    fn empty_list_has_zero_size() {
        assert_eq!(PersistentList::empty().size(), 0);
    }

    #[test]
    fn append_get_preserve_order() {
        let gc = test_gc();
        let mut list = PersistentList::empty();
        for i in 0..100i64 {
            list = list.append_last(&gc, Handle::encode_small_int(i).unwrap()).unwrap();
        }
        assert_eq!(list.size(), 100);
        for i in 0..100i64 {
            assert_eq!(list.get_at(i).unwrap().as_small_int(), Some(i));
        }
    }

    #[test]
    fn insert_at_shifts_later_elements() {
        let gc = test_gc();
        let list = PersistentList::empty()
            .append_last(&gc, Handle::encode_small_int(1).unwrap())
            .unwrap()
            .append_last(&gc, Handle::encode_small_int(3).unwrap())
            .unwrap();
        let inserted = list.insert_at(&gc, 1, Handle::encode_small_int(2).unwrap()).unwrap();
        let values: Vec<_> = inserted.iter().map(|h| h.as_small_int().unwrap()).collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn remove_at_preserves_earlier_version() {
        let gc = test_gc();
        let list = PersistentList::empty()
            .append_last(&gc, Handle::encode_small_int(1).unwrap())
            .unwrap()
            .append_last(&gc, Handle::encode_small_int(2).unwrap())
            .unwrap();
        let removed = list.remove_at(&gc, 0).unwrap();
        assert_eq!(removed.size(), 1);
        assert_eq!(removed.get_at(0).unwrap().as_small_int(), Some(2));
        assert_eq!(list.size(), 2, "original list must be unaffected");
    }

    #[test]
    fn out_of_range_get_at_returns_none() {
        let list = PersistentList::empty();
        assert_eq!(list.get_at(0).unwrap(), NONE);

        let gc = test_gc();
        let list = list.append_last(&gc, Handle::encode_small_int(1).unwrap()).unwrap();
        assert_eq!(list.get_at(5).unwrap(), NONE);
        assert_eq!(list.get_at(-5).unwrap(), NONE);
    }

    #[test]
    fn negative_index_counts_from_the_end() {
        let gc = test_gc();
        let mut list = PersistentList::empty();
        for i in 0..5i64 {
            list = list.append_last(&gc, Handle::encode_small_int(i).unwrap()).unwrap();
        }
        assert_eq!(list.get_at(-1).unwrap().as_small_int(), Some(4));
        assert_eq!(list.get_at(-5).unwrap().as_small_int(), Some(0));
    }

    #[test]
    fn has_finds_member_by_value() {
        let gc = test_gc();
        let list = PersistentList::empty()
            .append_last(&gc, Handle::encode_small_int(1).unwrap())
            .unwrap()
            .append_last(&gc, Handle::encode_small_int(2).unwrap())
            .unwrap();
        assert!(list.has(Handle::encode_small_int(2).unwrap()));
        assert!(!list.has(Handle::encode_small_int(3).unwrap()));
    }

    #[test]
    fn slice_clamps_out_of_range_ends() {
        let gc = test_gc();
        let mut list = PersistentList::empty();
        for i in 0..5i64 {
            list = list.append_last(&gc, Handle::encode_small_int(i).unwrap()).unwrap();
        }
        let clamped = list.slice(&gc, -100, 100).unwrap();
        assert_eq!(clamped.size(), 5);

        let empty = list.slice(&gc, 3, 1).unwrap();
        assert_eq!(empty.size(), 0);
    }

    #[test]
    fn split_first_and_last_take_an_index() {
        let gc = test_gc();
        let mut list = PersistentList::empty();
        for i in 0..5i64 {
            list = list.append_last(&gc, Handle::encode_small_int(i).unwrap()).unwrap();
        }
        let (prefix, suffix) = list.split_first(&gc, 2).unwrap();
        assert_eq!(prefix.iter().map(|h| h.as_small_int().unwrap()).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(suffix.iter().map(|h| h.as_small_int().unwrap()).collect::<Vec<_>>(), vec![2, 3, 4]);

        let (prefix, suffix) = list.split_last(&gc, 2).unwrap();
        assert_eq!(prefix.iter().map(|h| h.as_small_int().unwrap()).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(suffix.iter().map(|h| h.as_small_int().unwrap()).collect::<Vec<_>>(), vec![3, 4]);
    }

    #[test]
    fn slice_and_extend_round_trip() {
        let gc = test_gc();
        let mut list = PersistentList::empty();
        for i in 0..20i64 {
            list = list.append_last(&gc, Handle::encode_small_int(i).unwrap()).unwrap();
        }
        let first_half = list.slice(&gc, 0, 10).unwrap();
        let second_half = list.slice(&gc, 10, 20).unwrap();
        let rejoined = first_half.extend(&gc, &second_half).unwrap();
        let original: Vec<_> = list.iter().map(|h| h.as_small_int().unwrap()).collect();
        let joined: Vec<_> = rejoined.iter().map(|h| h.as_small_int().unwrap()).collect();
        assert_eq!(original, joined);
    }
}
