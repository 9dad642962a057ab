//! Value- and object-level error taxonomy.
//!
//! `protocore_gc::GcError` covers allocation/heap/safepoint failures one
//! level down; everything a value, container, or object operation can fail
//! with lives here instead, following the same `thiserror` shape.

use thiserror::Error;

/// Errors raised by `protocore` value, container, and object operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("wrong kind: expected {expected}, got {actual}")]
    WrongKind {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("index {index} out of range for size {size}")]
    IndexOutOfRange { index: i64, size: usize },

    #[error("key not found")]
    KeyNotFound,

    #[error("divide by zero")]
    DivideByZero,

    #[error("integer overflow converting to bounded type")]
    Overflow,

    #[error("invalid conversion from {from} to {to}")]
    InvalidConversion {
        from: &'static str,
        to: &'static str,
    },

    #[error("argument mismatch: {0}")]
    ArgumentMismatch(String),

    #[error("out of memory")]
    OutOfMemory(#[from] protocore_gc::GcError),

    #[error("adding this parent would create a cycle in the prototype chain")]
    CycleInPrototype,
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Whether this error is meant to be surfaced to the caller by default
    /// (spec.md §7's "Surfaced" recovery column) rather than handled by a
    /// space callback first.
    pub fn is_surfaced_by_default(&self) -> bool {
        !matches!(
            self,
            CoreError::KeyNotFound | CoreError::InvalidConversion { .. } | CoreError::ArgumentMismatch(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_not_found_is_not_surfaced_by_default() {
        assert!(!CoreError::KeyNotFound.is_surfaced_by_default());
    }

    #[test]
    fn wrong_kind_is_surfaced_by_default() {
        assert!(CoreError::WrongKind {
            expected: "tuple",
            actual: "list"
        }
        .is_surfaced_by_default());
    }
}
