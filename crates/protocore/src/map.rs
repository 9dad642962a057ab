//! Persistent ordered map, keyed by 64-bit hash (spec.md §3.3, §4.3 — C3).
//!
//! Backs attribute dictionaries (§3.7) and sparse integer-keyed maps. Every
//! node is one GC cell holding six `u64` fields: key, value handle, left
//! and right subtree addresses, a precomputed subtree hash, and a packed
//! `(size, height)` pair. Mutating operations never touch a published node
//! in place; they build new nodes bottom-up and return a new root, sharing
//! every subtree that didn't change (spec.md §8 invariant 1).
//!
//! Balancing is classic AVL: at most one single or double rotation per
//! inserted/removed path segment, keeping every operation `O(log n)` in
//! cell count.

use crate::error::CoreResult;
use crate::kinds;
use crate::layout;
use crate::value::Handle;
use crate::Gc;
use protocore_gc::cell::CellPtr;

#[inline]
fn key(n: CellPtr) -> u64 {
    layout::get_u64(unsafe { n.as_ref() }, 0)
}

#[inline]
fn value(n: CellPtr) -> Handle {
    Handle::from_raw(layout::get_u64(unsafe { n.as_ref() }, 1))
}

#[inline]
fn left(n: CellPtr) -> Option<CellPtr> {
    unsafe { CellPtr::from_addr(layout::get_u64(n.as_ref(), 2) as usize) }
}

#[inline]
fn right(n: CellPtr) -> Option<CellPtr> {
    unsafe { CellPtr::from_addr(layout::get_u64(n.as_ref(), 3) as usize) }
}

#[inline]
fn node_hash(n: CellPtr) -> u64 {
    layout::get_u64(unsafe { n.as_ref() }, 4)
}

#[inline]
fn size_of(node: Option<CellPtr>) -> u64 {
    match node {
        Some(n) => layout::unpack_size(layout::get_u64(unsafe { n.as_ref() }, 5)),
        None => 0,
    }
}

#[inline]
fn height_of(node: Option<CellPtr>) -> u8 {
    match node {
        Some(n) => layout::unpack_height(layout::get_u64(unsafe { n.as_ref() }, 5)),
        None => 0,
    }
}

#[inline]
fn mix_hash(k: u64, v: u64) -> u64 {
    // A simple multiplicative mix (splitmix64-style); collisions here only
    // cost an extra hash comparison during interning, never correctness.
    let mut h = k ^ v.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    h
}

fn make_node(gc: &Gc, k: u64, v: Handle, l: Option<CellPtr>, r: Option<CellPtr>) -> CoreResult<CellPtr> {
    let cell = gc.allocate(kinds::MAP_NODE)?;
    let lh = l.map(node_hash).unwrap_or(0);
    let rh = r.map(node_hash).unwrap_or(0);
    let h = mix_hash(k, v.raw()) ^ lh ^ rh;
    let sz = 1 + size_of(l) + size_of(r);
    let ht = 1 + height_of(l).max(height_of(r));
    unsafe {
        let c = cell.as_mut();
        layout::set_u64(c, 0, k);
        layout::set_u64(c, 1, v.raw());
        layout::set_u64(c, 2, l.map(|n| n.addr() as u64).unwrap_or(0));
        layout::set_u64(c, 3, r.map(|n| n.addr() as u64).unwrap_or(0));
        layout::set_u64(c, 4, h);
        layout::set_u64(c, 5, layout::pack_size_height(sz, ht));
    }
    Ok(cell)
}

fn rotate_right(gc: &Gc, n: CellPtr) -> CoreResult<CellPtr> {
    let l = left(n).expect("rotate_right requires a left child");
    let new_right = make_node(gc, key(n), value(n), right(l), right(n))?;
    make_node(gc, key(l), value(l), left(l), Some(new_right))
}

fn rotate_left(gc: &Gc, n: CellPtr) -> CoreResult<CellPtr> {
    let r = right(n).expect("rotate_left requires a right child");
    let new_left = make_node(gc, key(n), value(n), left(n), left(r))?;
    make_node(gc, key(r), value(r), Some(new_left), right(r))
}

fn rebalance(gc: &Gc, l: Option<CellPtr>, k: u64, v: Handle, r: Option<CellPtr>) -> CoreResult<CellPtr> {
    let balance = height_of(l) as i16 - height_of(r) as i16;
    if balance > 1 {
        let lc = l.unwrap();
        if height_of(left(lc)) as i16 >= height_of(right(lc)) as i16 {
            rotate_right(gc, make_node(gc, k, v, l, r)?)
        } else {
            let new_left = rotate_left(gc, lc)?;
            rotate_right(gc, make_node(gc, k, v, Some(new_left), r)?)
        }
    } else if balance < -1 {
        let rc = r.unwrap();
        if height_of(right(rc)) as i16 >= height_of(left(rc)) as i16 {
            rotate_left(gc, make_node(gc, k, v, l, r)?)
        } else {
            let new_right = rotate_right(gc, rc)?;
            rotate_left(gc, make_node(gc, k, v, l, Some(new_right))?)
        }
    } else {
        make_node(gc, k, v, l, r)
    }
}

fn insert(gc: &Gc, node: Option<CellPtr>, k: u64, v: Handle) -> CoreResult<Option<CellPtr>> {
    // "setting none is equivalent to remove" (spec.md §4.3).
    if v.is_none() {
        return remove(gc, node, k);
    }
    match node {
        None => Ok(Some(make_node(gc, k, v, None, None)?)),
        Some(n) => {
            let nk = key(n);
            if k == nk {
                Ok(Some(make_node(gc, k, v, left(n), right(n))?))
            } else if k < nk {
                let new_left = insert(gc, left(n), k, v)?;
                Ok(Some(rebalance(gc, new_left, nk, value(n), right(n))?))
            } else {
                let new_right = insert(gc, right(n), k, v)?;
                Ok(Some(rebalance(gc, left(n), nk, value(n), new_right)?))
            }
        }
    }
}

fn remove_min(gc: &Gc, n: CellPtr) -> CoreResult<(u64, Handle, Option<CellPtr>)> {
    match left(n) {
        None => Ok((key(n), value(n), right(n))),
        Some(l) => {
            let (mk, mv, new_left) = remove_min(gc, l)?;
            Ok((mk, mv, Some(rebalance(gc, new_left, key(n), value(n), right(n))?)))
        }
    }
}

fn remove(gc: &Gc, node: Option<CellPtr>, k: u64) -> CoreResult<Option<CellPtr>> {
    match node {
        None => Ok(None),
        Some(n) => {
            let nk = key(n);
            if k < nk {
                let new_left = remove(gc, left(n), k)?;
                Ok(Some(rebalance(gc, new_left, nk, value(n), right(n))?))
            } else if k > nk {
                let new_right = remove(gc, right(n), k)?;
                Ok(Some(rebalance(gc, left(n), nk, value(n), new_right)?))
            } else {
                match (left(n), right(n)) {
                    (None, None) => Ok(None),
                    (Some(l), None) => Ok(Some(l)),
                    (None, Some(r)) => Ok(Some(r)),
                    (Some(l), Some(r)) => {
                        let (mk, mv, new_right) = remove_min(gc, r)?;
                        Ok(Some(rebalance(gc, Some(l), mk, mv, new_right)?))
                    }
                }
            }
        }
    }
}

fn get(node: Option<CellPtr>, k: u64) -> Handle {
    let mut cur = node;
    while let Some(n) = cur {
        let nk = key(n);
        if k == nk {
            return value(n);
        }
        cur = if k < nk { left(n) } else { right(n) };
    }
    Handle::from_raw(0)
}

fn collect_in_order(node: Option<CellPtr>, out: &mut Vec<(u64, Handle)>) {
    if let Some(n) = node {
        collect_in_order(left(n), out);
        out.push((key(n), value(n)));
        collect_in_order(right(n), out);
    }
}

/// A persistent, hash-keyed ordered map. `Copy` because it is only ever a
/// root cell address (or none); cloning a map never copies its contents.
#[derive(Clone, Copy)]
pub struct PersistentMap {
    root: Option<CellPtr>,
}

impl PersistentMap {
    pub fn empty() -> Self {
        PersistentMap { root: None }
    }

    pub fn from_root(root: Option<CellPtr>) -> Self {
        PersistentMap { root }
    }

    pub fn root_cell(&self) -> Option<CellPtr> {
        self.root
    }

    pub fn get(&self, k: u64) -> Handle {
        get(self.root, k)
    }

    pub fn has(&self, k: u64) -> bool {
        !get(self.root, k).is_none()
    }

    pub fn set(&self, gc: &Gc, k: u64, v: Handle) -> CoreResult<Self> {
        Ok(PersistentMap {
            root: insert(gc, self.root, k, v)?,
        })
    }

    pub fn remove(&self, gc: &Gc, k: u64) -> CoreResult<Self> {
        Ok(PersistentMap {
            root: remove(gc, self.root, k)?,
        })
    }

    pub fn size(&self) -> u64 {
        size_of(self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// In-order iterator over `(key, value)` pairs (spec.md §4.3's `iter`).
    pub fn iter(&self) -> std::vec::IntoIter<(u64, Handle)> {
        let mut out = Vec::with_capacity(self.size() as usize);
        collect_in_order(self.root, &mut out);
        out.into_iter()
    }
}

impl Default for PersistentMap {
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
    protocore_gc::cell::register_kind(kinds::MAP_NODE, visit, None);
}
