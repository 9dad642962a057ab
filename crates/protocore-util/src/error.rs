//! Shared error support for the protocore workspace.
//!
//! `protocore-util` itself is nearly infallible (interning never fails), so
//! this module holds only the small error type its own operations can
//! raise. The value/object-level error taxonomy lives in `protocore::error`
//! and the allocator/GC one in `protocore_gc::error`; both follow the same
//! `thiserror` shape as this one.

use thiserror::Error;

/// Errors raised by `protocore-util` operations.
#[derive(Debug, Error)]
pub enum UtilError {
    #[error("id space exhausted: {0}")]
    IdSpaceExhausted(&'static str),
}

pub type UtilResult<T> = std::result::Result<T, UtilError>;
