//! The object model: prototype/parent-link chains, attribute storage, and
//! controlled mutable identity (spec.md §3.7, §4.7 — C8).
//!
//! An object cell has three fields: a parent-link chain head, an
//! attribute map root, and a mutable-ref id (0 for immutable objects).
//! Mutable objects are a level of indirection on top of that: the handle
//! a caller holds never changes (it *is* the object's identity), but its
//! attribute map and parent chain live in the space's
//! [`MutableRootMap`], addressed by the id stored in the handle's own
//! cell. Reading a mutable object means resolving through that map first;
//! writing means a CAS loop against it. This is the split the overview
//! calls "identity separate from value".

use crate::error::{CoreError, CoreResult};
use crate::kinds;
use crate::layout;
use crate::map::PersistentMap;
use crate::value::Handle;
use crate::Gc;
use protocore_gc::cell::CellPtr;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

fn chain_head(cell: CellPtr) -> Option<CellPtr> {
    unsafe { CellPtr::from_addr(layout::get_u64(cell.as_ref(), 0) as usize) }
}

fn attr_map_root(cell: CellPtr) -> Option<CellPtr> {
    unsafe { CellPtr::from_addr(layout::get_u64(cell.as_ref(), 1) as usize) }
}

fn mutable_ref_of(cell: CellPtr) -> u64 {
    layout::get_u64(unsafe { cell.as_ref() }, 2)
}

fn alloc_object(gc: &Gc, chain: Option<CellPtr>, attrs: Option<CellPtr>, mutable_ref: u64) -> CoreResult<CellPtr> {
    let cell = gc.allocate(kinds::OBJECT)?;
    unsafe {
        let c = cell.as_mut();
        layout::set_u64(c, 0, chain.map(|p| p.addr() as u64).unwrap_or(0));
        layout::set_u64(c, 1, attrs.map(|p| p.addr() as u64).unwrap_or(0));
        layout::set_u64(c, 2, mutable_ref);
    }
    Ok(cell)
}

fn alloc_link(gc: &Gc, object: Handle, next: Option<CellPtr>) -> CoreResult<CellPtr> {
    let cell = gc.allocate(kinds::PARENT_LINK)?;
    unsafe {
        let c = cell.as_mut();
        layout::set_u64(c, 0, object.raw());
        layout::set_u64(c, 1, next.map(|n| n.addr() as u64).unwrap_or(0));
    }
    Ok(cell)
}

fn chain_to_vec(head: Option<CellPtr>) -> Vec<Handle> {
    let mut out = Vec::new();
    let mut cur = head;
    while let Some(link) = cur {
        let c = unsafe { link.as_ref() };
        out.push(Handle::from_raw(layout::get_u64(c, 0)));
        cur = unsafe { CellPtr::from_addr(layout::get_u64(c, 1) as usize) };
    }
    out
}

fn vec_to_chain(gc: &Gc, handles: &[Handle]) -> CoreResult<Option<CellPtr>> {
    let mut next = None;
    for h in handles.iter().rev() {
        next = Some(alloc_link(gc, *h, next)?);
    }
    Ok(next)
}

/// The process-wide (per-space) mutable-root table (spec.md §3.7, §3.9's
/// "mutable-root map"): a CAS loop over the atomic address of a
/// [`PersistentMap`] root, keyed by mutable-ref id.
pub struct MutableRootMap {
    root_addr: AtomicU64,
    next_id: AtomicU64,
}

impl MutableRootMap {
    pub fn new() -> Self {
        MutableRootMap {
            root_addr: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    fn load(&self) -> PersistentMap {
        let addr = self.root_addr.load(Ordering::Acquire);
        PersistentMap::from_root(unsafe { CellPtr::from_addr(addr as usize) })
    }

    pub fn get(&self, id: u64) -> Option<CellPtr> {
        unsafe { self.load().get(id).as_cell() }
    }

    /// Allocate a fresh mutable-ref id and install `initial` as its
    /// current value.
    pub fn insert_new(&self, gc: &Gc, initial: CellPtr) -> CoreResult<u64> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        loop {
            let before = self.root_addr.load(Ordering::Acquire);
            let map = PersistentMap::from_root(unsafe { CellPtr::from_addr(before as usize) });
            let new_map = map.set(gc, id, Handle::from_cell(initial))?;
            let after = new_map.root_cell().map(|c| c.addr() as u64).unwrap_or(0);
            if self
                .root_addr
                .compare_exchange(before, after, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(id);
            }
        }
    }

    /// Read the current cell for `id`, derive a new one from it, and CAS
    /// the map forward. Retries on a losing race (spec.md §4.7: "read
    /// root, derive new immutable state from the stored one, produce new
    /// root with updated slot, CAS").
    pub fn update<F>(&self, gc: &Gc, id: u64, derive: F) -> CoreResult<CellPtr>
    where
        F: Fn(CellPtr) -> CoreResult<CellPtr>,
    {
        loop {
            let before = self.root_addr.load(Ordering::Acquire);
            let map = PersistentMap::from_root(unsafe { CellPtr::from_addr(before as usize) });
            let current = unsafe { map.get(id).as_cell() }.expect("mutable-ref id must have a live entry");
            let new_cell = derive(current)?;
            let new_map = map.set(gc, id, Handle::from_cell(new_cell))?;
            let after = new_map.root_cell().map(|c| c.addr() as u64).unwrap_or(0);
            if self
                .root_addr
                .compare_exchange(before, after, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(new_cell);
            }
        }
    }

    /// GC root: every object cell reachable through the mutable-root map
    /// (spec.md §4.10's "the mutable-root map").
    pub fn visit_roots(&self, visit: &mut dyn FnMut(CellPtr)) {
        if let Some(root) = self.load().root_cell() {
            visit(root);
        }
    }
}

impl Default for MutableRootMap {
    fn default() -> Self {
        Self::new()
    }
}

/// A handle known to reference an `OBJECT` cell.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ObjectRef(Handle);

impl ObjectRef {
    pub fn handle(&self) -> Handle {
        self.0
    }

    pub fn from_handle(h: Handle) -> CoreResult<Self> {
        let cell = unsafe { h.as_cell() }.ok_or(CoreError::WrongKind {
            expected: "object",
            actual: "non-heap value",
        })?;
        if cell.kind() != kinds::OBJECT {
            return Err(CoreError::WrongKind {
                expected: "object",
                actual: "heap cell of a different kind",
            });
        }
        Ok(ObjectRef(h))
    }

    fn own_cell(&self) -> CellPtr {
        unsafe { self.0.as_cell() }.expect("ObjectRef always wraps a live object cell")
    }

    pub fn is_mutable(&self) -> bool {
        mutable_ref_of(self.own_cell()) != 0
    }

    /// The cell currently authoritative for this object's state: itself,
    /// or — if this is a mutable reference — whatever the mutable-root
    /// map currently holds for its id (spec.md §4.8 step 2: "if the node
    /// is a mutable reference, substitute its current immutable state").
    pub fn resolve_current(&self, roots: &MutableRootMap) -> CellPtr {
        let cell = self.own_cell();
        let id = mutable_ref_of(cell);
        if id == 0 {
            cell
        } else {
            roots.get(id).unwrap_or(cell)
        }
    }

    pub fn parent_chain(&self, roots: &MutableRootMap) -> Vec<Handle> {
        chain_to_vec(chain_head(self.resolve_current(roots)))
    }

    pub fn attributes(&self, roots: &MutableRootMap) -> PersistentMap {
        PersistentMap::from_root(attr_map_root(self.resolve_current(roots)))
    }

    pub fn has_parent(&self, roots: &MutableRootMap, p: Handle) -> bool {
        self.parent_chain(roots).iter().any(|h| h.raw() == p.raw())
    }

    pub fn new_object(gc: &Gc, roots: &MutableRootMap, mutable: bool) -> CoreResult<Self> {
        if !mutable {
            let cell = alloc_object(gc, None, None, 0)?;
            return Ok(ObjectRef(Handle::from_cell(cell)));
        }
        let initial = alloc_object(gc, None, None, 0)?;
        let placeholder = alloc_object(gc, None, None, 0)?; // identity cell, id filled in below
        let id = roots.insert_new(gc, initial)?;
        unsafe {
            layout::set_u64(placeholder.as_mut(), 2, id);
        }
        Ok(ObjectRef(Handle::from_cell(placeholder)))
    }

    /// A new object sharing `self`'s current parent chain and attribute
    /// map. A mutable clone gets a freshly allocated mutable-ref id.
    pub fn clone_object(&self, gc: &Gc, roots: &MutableRootMap, mutable: bool) -> CoreResult<Self> {
        let current = self.resolve_current(roots);
        let chain = chain_head(current);
        let attrs = attr_map_root(current);
        if !mutable {
            let cell = alloc_object(gc, chain, attrs, 0)?;
            return Ok(ObjectRef(Handle::from_cell(cell)));
        }
        let initial = alloc_object(gc, chain, attrs, 0)?;
        let placeholder = alloc_object(gc, chain, attrs, 0)?;
        let id = roots.insert_new(gc, initial)?;
        unsafe {
            layout::set_u64(placeholder.as_mut(), 2, id);
        }
        Ok(ObjectRef(Handle::from_cell(placeholder)))
    }

    /// A new object whose parent chain begins with a link to `self`,
    /// followed by `self`'s own chain.
    pub fn new_child(&self, gc: &Gc, roots: &MutableRootMap, mutable: bool) -> CoreResult<Self> {
        let link = alloc_link(gc, self.0, chain_head(self.resolve_current(roots)))?;
        if !mutable {
            let cell = alloc_object(gc, Some(link), None, 0)?;
            return Ok(ObjectRef(Handle::from_cell(cell)));
        }
        let initial = alloc_object(gc, Some(link), None, 0)?;
        let placeholder = alloc_object(gc, Some(link), None, 0)?;
        let id = roots.insert_new(gc, initial)?;
        unsafe {
            layout::set_u64(placeholder.as_mut(), 2, id);
        }
        Ok(ObjectRef(Handle::from_cell(placeholder)))
    }

    /// Linearize `p` and its ancestors into `self`'s chain (spec.md
    /// §4.7). A no-op if `p` is already present; an error if accepting
    /// `p` would make `self` its own ancestor.
    pub fn add_parent(&self, gc: &Gc, roots: &MutableRootMap, p: Handle) -> CoreResult<Self> {
        let own_chain = self.parent_chain(roots);
        if own_chain.iter().any(|h| h.raw() == p.raw()) {
            return Ok(*self);
        }
        if p.raw() == self.0.raw() {
            return Err(CoreError::CycleInPrototype);
        }
        let p_obj = ObjectRef::from_handle(p)?;
        let p_chain = p_obj.parent_chain(roots);
        if p_chain.iter().any(|h| h.raw() == self.0.raw()) {
            return Err(CoreError::CycleInPrototype);
        }
        let existing: HashSet<u64> = own_chain.iter().map(|h| h.raw()).collect();
        let mut full = own_chain;
        full.extend(p_chain.into_iter().filter(|h| !existing.contains(&h.raw())));
        full.push(p);

        let new_chain = vec_to_chain(gc, &full)?;
        self.with_chain(gc, roots, new_chain)
    }

    pub fn set_attribute(&self, gc: &Gc, roots: &MutableRootMap, key: u64, value: Handle) -> CoreResult<Self> {
        let attrs = self.attributes(roots).set(gc, key, value)?;
        self.with_attrs(gc, roots, attrs.root_cell())
    }

    fn with_chain(&self, gc: &Gc, roots: &MutableRootMap, new_chain: Option<CellPtr>) -> CoreResult<Self> {
        let cell = self.own_cell();
        let id = mutable_ref_of(cell);
        if id == 0 {
            let attrs = attr_map_root(cell);
            let new_cell = alloc_object(gc, new_chain, attrs, 0)?;
            Ok(ObjectRef(Handle::from_cell(new_cell)))
        } else {
            roots.update(gc, id, |current| {
                let attrs = attr_map_root(current);
                alloc_object(gc, new_chain, attrs, 0)
            })?;
            Ok(*self)
        }
    }

    fn with_attrs(&self, gc: &Gc, roots: &MutableRootMap, new_attrs: Option<CellPtr>) -> CoreResult<Self> {
        let cell = self.own_cell();
        let id = mutable_ref_of(cell);
        if id == 0 {
            let chain = chain_head(cell);
            let new_cell = alloc_object(gc, chain, new_attrs, 0)?;
            Ok(ObjectRef(Handle::from_cell(new_cell)))
        } else {
            roots.update(gc, id, |current| {
                let chain = chain_head(current);
                alloc_object(gc, chain, new_attrs, 0)
            })?;
            Ok(*self)
        }
    }
}

pub(crate) fn register_kinds() {
    fn visit_object(cell: CellPtr, visit: &mut dyn FnMut(CellPtr)) {
        if let Some(chain) = chain_head(cell) {
            visit(chain);
        }
        if let Some(attrs) = attr_map_root(cell) {
            visit(attrs);
        }
    }
    fn visit_link(cell: CellPtr, visit: &mut dyn FnMut(CellPtr)) {
        let c = unsafe { cell.as_ref() };
        let object = Handle::from_raw(layout::get_u64(c, 0));
        if let Some(oc) = unsafe { object.as_cell() } {
            visit(oc);
        }
        if let Some(next) = unsafe { CellPtr::from_addr(layout::get_u64(c, 1) as usize) } {
            visit(next);
        }
    }
    protocore_gc::cell::register_kind(kinds::OBJECT, visit_object, None);
    protocore_gc::cell::register_kind(kinds::PARENT_LINK, visit_link, None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_gc;

    #[test]
    fn new_object_has_empty_chain_and_attrs() {
        let gc = test_gc();
        let roots = MutableRootMap::new();
        let o = ObjectRef::new_object(&gc, &roots, false).unwrap();
        assert!(o.parent_chain(&roots).is_empty());
        assert_eq!(o.attributes(&roots).size(), 0);
        assert!(!o.is_mutable());
    }

    #[test]
    fn immutable_set_attribute_returns_new_handle() {
        let gc = test_gc();
        let roots = MutableRootMap::new();
        let o = ObjectRef::new_object(&gc, &roots, false).unwrap();
        let updated = o.set_attribute(&gc, &roots, 1, Handle::encode_small_int(9).unwrap()).unwrap();
        assert_ne!(o.handle().raw(), updated.handle().raw());
        assert_eq!(updated.attributes(&roots).get(1).as_small_int(), Some(9));
        assert_eq!(o.attributes(&roots).size(), 0, "original object is untouched");
    }

    #[test]
    fn mutable_set_attribute_keeps_the_same_handle() {
        let gc = test_gc();
        let roots = MutableRootMap::new();
        let o = ObjectRef::new_object(&gc, &roots, true).unwrap();
        assert!(o.is_mutable());
        let updated = o.set_attribute(&gc, &roots, 1, Handle::encode_small_int(9).unwrap()).unwrap();
        assert_eq!(o.handle().raw(), updated.handle().raw(), "mutable objects keep one stable identity");
        assert_eq!(o.attributes(&roots).get(1).as_small_int(), Some(9), "reads through the mutable-root map see the update");
    }

    #[test]
    fn new_child_prepends_parent_link() {
        let gc = test_gc();
        let roots = MutableRootMap::new();
        let parent = ObjectRef::new_object(&gc, &roots, false).unwrap();
        let child = parent.new_child(&gc, &roots, false).unwrap();
        assert!(child.has_parent(&roots, parent.handle()));
    }

    #[test]
    fn add_parent_linearizes_diamond_inheritance() {
        let gc = test_gc();
        let roots = MutableRootMap::new();
        let a = ObjectRef::new_object(&gc, &roots, false).unwrap();
        let b = a.new_child(&gc, &roots, false).unwrap();
        let c = a.new_child(&gc, &roots, false).unwrap();
        let d = ObjectRef::new_object(&gc, &roots, false).unwrap();
        let d = d.add_parent(&gc, &roots, b.handle()).unwrap();
        let d = d.add_parent(&gc, &roots, c.handle()).unwrap();
        let chain = d.parent_chain(&roots);
        let raws: Vec<u64> = chain.iter().map(|h| h.raw()).collect();
        assert!(raws.contains(&b.handle().raw()));
        assert!(raws.contains(&c.handle().raw()));
        assert!(raws.contains(&a.handle().raw()), "a reachable through both b and c must still appear");
        assert_eq!(raws.iter().filter(|&&r| r == a.handle().raw()).count(), 1, "a must not appear twice");
    }

    #[test]
    fn add_parent_is_noop_if_already_present() {
        let gc = test_gc();
        let roots = MutableRootMap::new();
        let a = ObjectRef::new_object(&gc, &roots, false).unwrap();
        let b = a.new_child(&gc, &roots, false).unwrap();
        let b2 = b.add_parent(&gc, &roots, a.handle()).unwrap();
        assert_eq!(b.parent_chain(&roots).len(), b2.parent_chain(&roots).len());
    }

    #[test]
    fn add_parent_rejects_cycles() {
        let gc = test_gc();
        let roots = MutableRootMap::new();
        let a = ObjectRef::new_object(&gc, &roots, false).unwrap();
        let b = a.new_child(&gc, &roots, false).unwrap();
        assert!(a.add_parent(&gc, &roots, b.handle()).is_err());
    }
}
