//! External resources: cells that own or borrow memory outside the GC
//! heap, reclaimed via "shadow finalization" (spec.md §3.9, §4.13 — C13).
//!
//! Two shapes:
//! - [`ExternalBuffer`] owns a boxed byte buffer allocated on Rust's
//!   heap; the GC frees it for you when the cell is collected, the same
//!   way [`crate::rope`] frees a leaf's boxed word array.
//! - [`ExternalPointer`] wraps a raw pointer this crate does not own
//!   (handed in by an embedder), with an optional finalizer callback the
//!   embedder supplies to release whatever the pointer refers to.
//!
//! Both finalizers run synchronously, inline, during sweep — there is no
//! deferred finalization queue for cell-kind finalizers in this crate
//! (see `DESIGN.md`).

use crate::error::{CoreError, CoreResult};
use crate::kinds;
use crate::layout;
use crate::Gc;
use protocore_gc::cell::CellPtr;

/// Runs once, synchronously, when an [`ExternalPointer`]'s owning cell is
/// collected. Receives the raw pointer and its declared length.
pub type FinalizerFn = fn(ptr: *mut u8, len: usize);

fn ptr_of(c: &protocore_gc::cell::Cell) -> *mut u8 {
    layout::get_ptr(c, 0) as *mut u8
}

fn len_of(c: &protocore_gc::cell::Cell) -> usize {
    layout::get_len(c, 1)
}

/// A handle known to reference an `EXTERNAL_BUFFER` cell: a byte buffer
/// this crate allocated and owns outright.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ExternalBuffer(protocore_gc::cell::CellPtr);

impl ExternalBuffer {
    pub fn handle(&self) -> crate::value::Handle {
        crate::value::Handle::from_cell(self.0)
    }

    pub fn from_handle(h: crate::value::Handle) -> CoreResult<Self> {
        let cell = unsafe { h.as_cell() }.ok_or(CoreError::WrongKind {
            expected: "external buffer",
            actual: "non-heap value",
        })?;
        if cell.kind() != kinds::EXTERNAL_BUFFER {
            return Err(CoreError::WrongKind {
                expected: "external buffer",
                actual: "heap cell of a different kind",
            });
        }
        Ok(ExternalBuffer(cell))
    }

    pub fn alloc(gc: &Gc, bytes: &[u8]) -> CoreResult<Self> {
        let cell = gc.allocate(kinds::EXTERNAL_BUFFER)?;
        let boxed: Box<[u8]> = bytes.into();
        let len = boxed.len();
        let ptr = Box::into_raw(boxed) as *mut u8;
        unsafe {
            layout::set_ptr_len(cell.as_mut(), 0, 1, ptr as *mut (), len);
        }
        Ok(ExternalBuffer(cell))
    }

    pub fn as_slice(&self) -> &[u8] {
        let c = unsafe { self.0.as_ref() };
        unsafe { std::slice::from_raw_parts(ptr_of(c), len_of(c)) }
    }

    pub fn len(&self) -> usize {
        len_of(unsafe { self.0.as_ref() })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn finalize_buffer(cell: CellPtr) {
    unsafe {
        let c = cell.as_ref();
        let ptr = ptr_of(c);
        let len = len_of(c);
        if !ptr.is_null() {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, len)));
        }
    }
}

/// A handle known to reference an `EXTERNAL_POINTER` cell: a pointer an
/// embedder handed in, with an optional finalizer it supplies to release
/// whatever the pointer refers to (spec.md §4.13's "shadow finalization"
/// for resources this crate does not itself own).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ExternalPointer(protocore_gc::cell::CellPtr);

impl ExternalPointer {
    pub fn handle(&self) -> crate::value::Handle {
        crate::value::Handle::from_cell(self.0)
    }

    pub fn from_handle(h: crate::value::Handle) -> CoreResult<Self> {
        let cell = unsafe { h.as_cell() }.ok_or(CoreError::WrongKind {
            expected: "external pointer",
            actual: "non-heap value",
        })?;
        if cell.kind() != kinds::EXTERNAL_POINTER {
            return Err(CoreError::WrongKind {
                expected: "external pointer",
                actual: "heap cell of a different kind",
            });
        }
        Ok(ExternalPointer(cell))
    }

    /// Wrap `ptr`/`len`, calling `finalizer` (if any) exactly once, when
    /// the returned handle's cell is collected. `ptr` is never
    /// dereferenced by this crate; it is opaque embedder state.
    pub fn wrap(gc: &Gc, ptr: *mut u8, len: usize, finalizer: Option<FinalizerFn>) -> CoreResult<Self> {
        let cell = gc.allocate(kinds::EXTERNAL_POINTER)?;
        unsafe {
            let c = cell.as_mut();
            layout::set_ptr_len(c, 0, 1, ptr as *mut (), len);
            layout::set_u64(c, 2, finalizer.map(|f| f as usize as u64).unwrap_or(0));
        }
        Ok(ExternalPointer(cell))
    }

    pub fn as_ptr(&self) -> *mut u8 {
        ptr_of(unsafe { self.0.as_ref() })
    }

    pub fn len(&self) -> usize {
        len_of(unsafe { self.0.as_ref() })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn finalize_pointer(cell: CellPtr) {
    let c = unsafe { cell.as_ref() };
    let bits = layout::get_u64(c, 2);
    if bits == 0 {
        return;
    }
    let finalizer: FinalizerFn = unsafe { std::mem::transmute(bits) };
    finalizer(ptr_of(c), len_of(c));
}

pub(crate) fn register_kinds() {
    fn visit_none(_cell: CellPtr, _visit: &mut dyn FnMut(CellPtr)) {
        // External cells hold raw bytes/pointers, not handles; they have
        // no outgoing references for the marker to follow.
    }
    protocore_gc::cell::register_kind(kinds::EXTERNAL_BUFFER, visit_none, Some(finalize_buffer));
    protocore_gc::cell::register_kind(kinds::EXTERNAL_POINTER, visit_none, Some(finalize_pointer));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_gc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn buffer_round_trips_bytes() {
        let gc = test_gc();
        let buf = ExternalBuffer::alloc(&gc, b"hello").unwrap();
        assert_eq!(buf.as_slice(), b"hello");
        assert_eq!(buf.len(), 5);
        let roundtrip = ExternalBuffer::from_handle(buf.handle()).unwrap();
        assert_eq!(roundtrip.as_slice(), b"hello");
    }

    #[test]
    fn from_handle_rejects_wrong_kind() {
        let gc = test_gc();
        let buf = ExternalBuffer::alloc(&gc, b"x").unwrap();
        assert!(ExternalPointer::from_handle(buf.handle()).is_err());
    }

    static FINALIZED_LEN: AtomicUsize = AtomicUsize::new(0);

    fn record_len(_ptr: *mut u8, len: usize) {
        FINALIZED_LEN.store(len, Ordering::SeqCst);
    }

    #[test]
    fn pointer_wraps_opaque_state_without_dereferencing() {
        let gc = test_gc();
        let mut payload = vec![1u8, 2, 3];
        let ptr = ExternalPointer::wrap(&gc, payload.as_mut_ptr(), payload.len(), Some(record_len)).unwrap();
        assert_eq!(ptr.len(), 3);
        assert_eq!(ptr.as_ptr(), payload.as_mut_ptr());
    }
}
