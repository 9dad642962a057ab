//! Central registry of [`CellKind`] ids used by every heap-allocated
//! container and object kind this crate defines, plus the one-time
//! registration call that wires each kind's visitor/finalizer into
//! `protocore-gc`.
//!
//! Ids are assigned here, in one place, so two modules never accidentally
//! claim the same kind.

use protocore_gc::cell::CellKind;

pub const MAP_NODE: CellKind = CellKind(1);
pub const LIST_NODE: CellKind = CellKind(2);
pub const TUPLE_LEAF: CellKind = CellKind(3);
pub const TUPLE_INTERNAL: CellKind = CellKind(4);
pub const STRING_LEAF: CellKind = CellKind(5);
pub const STRING_INTERNAL: CellKind = CellKind(6);
pub const BYTES_LEAF: CellKind = CellKind(7);
pub const BYTES_INTERNAL: CellKind = CellKind(8);
pub const OBJECT: CellKind = CellKind(9);
pub const PARENT_LINK: CellKind = CellKind(10);
pub const METHOD_CELL: CellKind = CellKind(11);
pub const EXTERNAL_BUFFER: CellKind = CellKind(12);
pub const EXTERNAL_POINTER: CellKind = CellKind(13);
pub const BIG_INT: CellKind = CellKind(14);
pub const RETURN_REF: CellKind = CellKind(15);

/// Register every kind this crate defines. Idempotent-by-convention: callers
/// (in practice only [`crate::space::Space::new`]) guard this with a
/// [`std::sync::Once`] so it only ever runs once per process, matching
/// `protocore_gc::cell::register_kind`'s "before any allocation" contract.
pub(crate) fn register_all() {
    crate::map::register_kind();
    crate::list::register_kind();
    crate::rope::register_kinds();
    crate::object::register_kinds();
    crate::method::register_kind();
    crate::external::register_kinds();
    crate::bigint::register_kind();
    crate::context::register_return_ref_kind();
}
