//! Error types for the cell allocator and collector.

use std::sync::PoisonError;
use thiserror::Error;

/// Errors raised by allocation, collection, and runtime-registration
/// operations in this crate.
#[derive(Debug, Error)]
pub enum GcError {
    #[error("out of memory: heap at {used} of {capacity} bytes")]
    OutOfMemory { used: usize, capacity: usize },

    #[error("heap initialization failed: {0}")]
    HeapInitialization(String),

    #[error("block allocation failed: {reason}")]
    BlockAllocationFailed { reason: String },

    #[error("GC cycle failed: {reason}")]
    GcCycleFailed { reason: String },

    #[error("marking phase failed: {0}")]
    MarkingFailed(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("safepoint wait timed out after {0:?}")]
    SafepointTimeout(std::time::Duration),

    #[error("thread {0} is not registered with the runtime")]
    UnknownThread(u64),
}

impl GcError {
    /// Whether retrying the operation (e.g. after a GC cycle) could
    /// plausibly succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GcError::OutOfMemory { .. } | GcError::SafepointTimeout(_))
    }

    /// Whether this error indicates a programming error rather than a
    /// resource or environment condition.
    pub fn is_bug(&self) -> bool {
        matches!(
            self,
            GcError::InvalidState { .. } | GcError::Internal(_) | GcError::LockPoisoned(_)
        )
    }
}

impl<T> From<PoisonError<T>> for GcError {
    fn from(err: PoisonError<T>) -> Self {
        GcError::LockPoisoned(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GcError>;

/// Map a `std::sync::Mutex`/`RwLock` lock result into [`GcError`].
#[macro_export]
macro_rules! lock_result {
    ($lock:expr) => {
        $lock.map_err(|e| $crate::error::GcError::from(e))
    };
}

/// Early-return with a [`GcError`].
#[macro_export]
macro_rules! bail {
    ($err:expr) => {
        return Err($err.into())
    };
}

/// Return an error unless the condition holds.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
}
