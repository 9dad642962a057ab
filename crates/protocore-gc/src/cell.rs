//! The 64-byte heap cell.
//!
//! Every object this collector manages occupies exactly one cell: a fixed,
//! cache-line-sized, 64-byte-aligned slot. There is no variable-length
//! allocation and no compaction - a cell's address never changes for its
//! lifetime, which is what lets the tagged-pointer encoding above this crate
//! treat a cell address as a stable identity.
//!
//! The collector itself never interprets a cell's payload. Each cell carries
//! a small `CellKind` tag; the owning crate registers a [`VisitFn`] and
//! [`FinalizeFn`] for that kind once, at startup, through [`register_kind`].
//! Marking and sweeping dispatch through that registry instead of a vtable
//! pointer embedded in the cell, so the 64 bytes are spent entirely on
//! payload rather than on dispatch machinery.

use static_assertions::const_assert_eq;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Size of a single heap cell, in bytes. Every allocation is exactly this
/// size; values that don't fit are built from multiple linked cells by the
/// layer above this crate (ropes, maps), not by this crate.
pub const CELL_SIZE: usize = 64;

/// Required alignment of a cell's address.
pub const CELL_ALIGN: usize = 64;

/// A small integer identifying what kind of object occupies a cell.
///
/// Kinds are registered once, during startup, by the crate that defines
/// them (`protocore`'s value/container layer). The GC never hardcodes a set
/// of kinds; it only ever calls through the function pointers registered
/// for whatever kind tag it finds in a cell's header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKind(pub u8);

impl CellKind {
    /// Reserved for a cell sitting on the allocator's free list. No visitor
    /// ever needs to run on a free cell; the mark/sweep paths special-case
    /// it directly rather than looking it up in the registry.
    pub const FREE: CellKind = CellKind(0);
}

/// Maximum number of distinct kinds that can be registered.
const MAX_KINDS: usize = 256;

/// Visits every outgoing reference a cell holds, reporting each as a
/// [`CellPtr`] to `visit`. Called by the marker during graph traversal.
///
/// Implementations must be exhaustive: a pointer this function fails to
/// report can be collected out from under a live object.
pub type VisitFn = fn(cell: CellPtr, visit: &mut dyn FnMut(CellPtr));

/// Runs any cleanup a cell's payload needs before its memory is returned to
/// the free list (spec C13: external-buffer release for byte-ropes,
/// dropping interned-string table entries, etc). Called by the sweeper for
/// every unmarked cell, exactly once, never concurrently with marking.
pub type FinalizeFn = fn(cell: CellPtr);

struct KindOps {
    visit: VisitFn,
    finalize: Option<FinalizeFn>,
}

// Registration happens once per kind at process startup (before any thread
// allocates), so a plain static array guarded by an atomic count is enough;
// there is no need for a lock here.
static mut KIND_TABLE: [Option<KindOps>; MAX_KINDS] = [const { None }; MAX_KINDS];
static KIND_TABLE_LEN: AtomicU8 = AtomicU8::new(1); // slot 0 is CellKind::FREE

/// Register the visitor (and optional finalizer) for a cell kind.
///
/// Must be called before any cell of this kind is allocated, and is not
/// safe to call concurrently with allocation or collection. Typical use is
/// a `std::sync::Once`-guarded call during a runtime's construction.
///
/// # Panics
/// Panics if `kind` is [`CellKind::FREE`] or if more than 255 kinds have
/// been registered.
pub fn register_kind(kind: CellKind, visit: VisitFn, finalize: Option<FinalizeFn>) {
    assert_ne!(kind, CellKind::FREE, "CellKind::FREE is reserved");
    let idx = kind.0 as usize;
    assert!(idx < MAX_KINDS, "cell kind {} out of range", kind.0);
    // SAFETY: single-writer-before-any-reader discipline documented above.
    unsafe {
        KIND_TABLE[idx] = Some(KindOps { visit, finalize });
    }
    let mut len = KIND_TABLE_LEN.load(Ordering::Relaxed);
    while (idx as u8) >= len {
        match KIND_TABLE_LEN.compare_exchange_weak(
            len,
            idx as u8 + 1,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => len = actual,
        }
    }
}

fn kind_ops(kind: CellKind) -> &'static KindOps {
    let idx = kind.0 as usize;
    // SAFETY: reads only happen after registration has completed (see
    // `register_kind`'s contract); the table is never mutated concurrently
    // with a read in well-formed use.
    unsafe {
        KIND_TABLE[idx]
            .as_ref()
            .unwrap_or_else(|| panic!("cell kind {} was never registered", kind.0))
    }
}

/// Raw 64-byte payload of a cell, accessible to the owning crate but opaque
/// to the allocator and collector.
#[repr(C, align(64))]
pub struct Cell {
    header: CellHeader,
    payload: [u8; CELL_SIZE - CellHeader::SIZE],
}

const_assert_eq!(std::mem::size_of::<Cell>(), CELL_SIZE);
const_assert_eq!(std::mem::align_of::<Cell>(), CELL_ALIGN);

#[repr(C)]
struct CellHeader {
    /// `CellKind::FREE` while on the free list, the live kind otherwise.
    kind: AtomicU8,
    _reserved: [u8; 7],
    /// Address of the next cell in whatever transient, singly-linked list
    /// currently owns this cell (spec.md §3.2's "next link used transiently
    /// by context bump lists and free-lists"), or 0 if none. The allocator's
    /// free lists and `protocore`'s per-context young-generation list both
    /// reuse this same field - a cell belongs to at most one such list at a
    /// time, so there is no conflict.
    next: AtomicUsize,
}

impl CellHeader {
    const SIZE: usize = 16;
}

impl Cell {
    #[inline]
    pub fn kind(&self) -> CellKind {
        CellKind(self.header.kind.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn set_kind(&self, kind: CellKind) {
        self.header.kind.store(kind.0, Ordering::Release);
    }

    /// Read the transient link-list field (see [`CellHeader::next`]).
    ///
    /// # Safety
    /// Callers must only interpret this as belonging to whichever list
    /// (free list or young-generation list) they know currently owns the
    /// cell; there is no tag distinguishing the two uses.
    #[inline]
    pub unsafe fn next_link(&self) -> usize {
        self.header.next.load(Ordering::Relaxed)
    }

    /// # Safety
    /// See [`Cell::next_link`].
    #[inline]
    pub unsafe fn set_next_link(&self, addr: usize) {
        self.header.next.store(addr, Ordering::Relaxed);
    }

    /// Payload bytes available to the owning crate for its own encoding.
    #[inline]
    pub fn payload(&self) -> &[u8; CELL_SIZE - CellHeader::SIZE] {
        &self.payload
    }

    /// Mutable payload access. Callers must not mutate a published
    /// (multi-thread-visible) cell's payload - the collector assumes
    /// published data is immutable except through the mutable-root
    /// indirection described at the crate root.
    #[inline]
    pub fn payload_mut(&mut self) -> &mut [u8; CELL_SIZE - CellHeader::SIZE] {
        &mut self.payload
    }
}

/// A stable, non-null pointer to a live or free cell.
///
/// `CellPtr` carries no lifetime and no ownership; it is exactly as safe as
/// the raw address it wraps. Code that holds a `CellPtr` past a safepoint
/// without having registered it as a root (directly or via a
/// [`crate::roots::RootProvider`]) has a use-after-free bug, not a borrow
/// checker violation the compiler can catch.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellPtr(std::ptr::NonNull<Cell>);

impl CellPtr {
    /// # Safety
    /// `ptr` must point to a valid, live `Cell` for the duration any copy of
    /// the returned `CellPtr` is used.
    #[inline]
    pub unsafe fn from_raw(ptr: std::ptr::NonNull<Cell>) -> Self {
        CellPtr(ptr)
    }

    #[inline]
    pub fn as_ptr(self) -> *mut Cell {
        self.0.as_ptr()
    }

    #[inline]
    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }

    #[inline]
    pub fn kind(self) -> CellKind {
        // SAFETY: see struct-level contract.
        unsafe { (*self.as_ptr()).kind() }
    }

    /// Reconstruct a `CellPtr` from an address previously obtained from
    /// [`CellPtr::addr`] or from [`Cell::next_link`]. Returns `None` for the
    /// null/"no next" sentinel (0).
    ///
    /// # Safety
    /// `addr` must be either 0 or a live cell address.
    #[inline]
    pub unsafe fn from_addr(addr: usize) -> Option<Self> {
        std::ptr::NonNull::new(addr as *mut Cell).map(CellPtr)
    }

    /// # Safety
    /// See [`Cell::next_link`].
    #[inline]
    pub unsafe fn next_link(self) -> Option<CellPtr> {
        CellPtr::from_addr((*self.as_ptr()).next_link())
    }

    /// # Safety
    /// See [`Cell::next_link`].
    #[inline]
    pub unsafe fn set_next_link(self, next: Option<CellPtr>) {
        (*self.as_ptr()).set_next_link(next.map(|c| c.addr()).unwrap_or(0));
    }

    /// # Safety
    /// The cell must still be live (not yet swept).
    #[inline]
    pub unsafe fn as_ref<'a>(self) -> &'a Cell {
        &*self.as_ptr()
    }

    /// # Safety
    /// The cell must still be live and not concurrently accessed elsewhere.
    #[inline]
    pub unsafe fn as_mut<'a>(self) -> &'a mut Cell {
        &mut *self.as_ptr()
    }

    /// Report every cell this one points to, dispatching through the
    /// registered visitor for its kind. Called by the marker.
    #[inline]
    pub fn visit_refs(self, visit: &mut dyn FnMut(CellPtr)) {
        (kind_ops(self.kind()).visit)(self, visit);
    }

    /// Run the registered finalizer, if any, for this cell's kind. Called
    /// by the sweeper exactly once, before the cell returns to the free
    /// list.
    #[inline]
    pub(crate) fn finalize(self) {
        if let Some(f) = kind_ops(self.kind()).finalize {
            f(self);
        }
    }
}

// CellPtr crosses thread boundaries constantly (every mutator thread can
// observe cells published by another); the data it points to is either
// immutable or protected by its own synchronization (mutable-ref slots).
unsafe impl Send for CellPtr {}
unsafe impl Sync for CellPtr {}

impl std::fmt::Debug for CellPtr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CellPtr({:#x}, kind={})", self.addr(), self.kind().0)
    }
}
