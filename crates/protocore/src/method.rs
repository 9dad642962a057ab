//! Native method cells: a receiver, a function pointer, and a closure
//! environment bundled into one handle (spec.md §3.8, §4.7's "method
//! binding" — C8 continued).
//!
//! A method is how a native (Rust) function gets attached to an object
//! as an attribute and later invoked through the same call path a
//! user-defined callable would use. Binding a method to a receiver
//! produces a new [`MethodRef`] sharing the same callback and closure,
//! so the bound and unbound forms are two handles into otherwise
//! identical state — matching the persistent-sharing style the rest of
//! this crate's node types use.

use crate::error::{CoreError, CoreResult};
use crate::kinds;
use crate::layout;
use crate::map::PersistentMap;
use crate::value::Handle;
use crate::Gc;
use protocore_gc::cell::CellPtr;

/// A native method body: takes the bound receiver, the positional
/// arguments, and the closure environment, and returns a result handle.
pub type NativeFn = fn(receiver: Handle, args: &[Handle], closure: PersistentMap) -> CoreResult<Handle>;

fn receiver_of(cell: CellPtr) -> Handle {
    Handle::from_raw(layout::get_u64(unsafe { cell.as_ref() }, 0))
}

fn callback_of(cell: CellPtr) -> NativeFn {
    let bits = layout::get_u64(unsafe { cell.as_ref() }, 1);
    unsafe { std::mem::transmute::<u64, NativeFn>(bits) }
}

fn closure_root(cell: CellPtr) -> Option<CellPtr> {
    unsafe { CellPtr::from_addr(layout::get_u64(cell.as_ref(), 2) as usize) }
}

fn alloc(gc: &Gc, receiver: Handle, callback: NativeFn, closure: PersistentMap) -> CoreResult<CellPtr> {
    let cell = gc.allocate(kinds::METHOD_CELL)?;
    unsafe {
        let c = cell.as_mut();
        layout::set_u64(c, 0, receiver.raw());
        layout::set_u64(c, 1, callback as usize as u64);
        layout::set_u64(c, 2, closure.root_cell().map(|p| p.addr() as u64).unwrap_or(0));
    }
    Ok(cell)
}

/// A handle known to reference a `METHOD_CELL`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MethodRef(Handle);

impl MethodRef {
    pub fn handle(&self) -> Handle {
        self.0
    }

    pub fn from_handle(h: Handle) -> CoreResult<Self> {
        let cell = unsafe { h.as_cell() }.ok_or(CoreError::WrongKind {
            expected: "method",
            actual: "non-heap value",
        })?;
        if cell.kind() != kinds::METHOD_CELL {
            return Err(CoreError::WrongKind {
                expected: "method",
                actual: "heap cell of a different kind",
            });
        }
        Ok(MethodRef(h))
    }

    fn cell(&self) -> CellPtr {
        unsafe { self.0.as_cell() }.expect("MethodRef always wraps a live method cell")
    }

    /// A new, unbound method (receiver is `none`) closing over `closure`.
    pub fn unbound(gc: &Gc, callback: NativeFn, closure: PersistentMap) -> CoreResult<Self> {
        let cell = alloc(gc, Handle::from_raw(0), callback, closure)?;
        Ok(MethodRef(Handle::from_cell(cell)))
    }

    pub fn receiver(&self) -> Handle {
        receiver_of(self.cell())
    }

    pub fn closure(&self) -> PersistentMap {
        PersistentMap::from_root(closure_root(self.cell()))
    }

    /// A new method sharing this one's callback and closure, bound to
    /// `receiver` (spec.md §4.7: "binding produces a new method value
    /// sharing the same callback and closure").
    pub fn bind(&self, gc: &Gc, receiver: Handle) -> CoreResult<Self> {
        let cell = alloc(gc, receiver, callback_of(self.cell()), self.closure())?;
        Ok(MethodRef(Handle::from_cell(cell)))
    }

    /// Invoke the method's callback with its bound receiver, `args`, and
    /// closure.
    pub fn call(&self, args: &[Handle]) -> CoreResult<Handle> {
        let cell = self.cell();
        (callback_of(cell))(receiver_of(cell), args, self.closure())
    }
}

pub(crate) fn register_kind() {
    fn visit(cell: CellPtr, visit: &mut dyn FnMut(CellPtr)) {
        let receiver = receiver_of(cell);
        if let Some(rc) = unsafe { receiver.as_cell() } {
            visit(rc);
        }
        if let Some(closure) = closure_root(cell) {
            visit(closure);
        }
    }
    protocore_gc::cell::register_kind(kinds::METHOD_CELL, visit, None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_gc;

    fn add_closure_value(receiver: Handle, args: &[Handle], closure: PersistentMap) -> CoreResult<Handle> {
        let bonus = closure.get(1).as_small_int().unwrap_or(0);
        let recv = receiver.as_small_int().unwrap_or(0);
        let arg = args.first().and_then(|h| h.as_small_int()).unwrap_or(0);
        Handle::encode_small_int(recv + arg + bonus)
    }

    #[test]
    fn unbound_method_has_no_receiver() {
        let gc = test_gc();
        let m = MethodRef::unbound(&gc, add_closure_value, PersistentMap::empty()).unwrap();
        assert!(m.receiver().is_none());
    }

    #[test]
    fn bind_shares_callback_and_closure() {
        let gc = test_gc();
        let closure = PersistentMap::empty().set(&gc, 1, Handle::encode_small_int(100).unwrap()).unwrap();
        let unbound = MethodRef::unbound(&gc, add_closure_value, closure).unwrap();
        let bound = unbound.bind(&gc, Handle::encode_small_int(5).unwrap()).unwrap();
        assert_eq!(bound.receiver().as_small_int(), Some(5));

        let result = bound.call(&[Handle::encode_small_int(3).unwrap()]).unwrap();
        assert_eq!(result.as_small_int(), Some(5 + 3 + 100));
    }

    #[test]
    fn from_handle_rejects_non_method_cells() {
        let gc = test_gc();
        let map_handle = {
            let map = PersistentMap::empty().set(&gc, 1, Handle::encode_small_int(1).unwrap()).unwrap();
            Handle::from_cell(map.root_cell().unwrap())
        };
        assert!(MethodRef::from_handle(map_handle).is_err());
    }
}
