//! protocore-util - shared foundation types for the protocore workspace
//!
//! This crate carries the ambient utilities every other crate in the
//! workspace leans on: name interning for attribute/parameter names
//! ([`symbol::Symbol`]), typed process-wide id newtypes ([`ids`]), and a
//! small shared error type. It has no knowledge of values, cells, or the
//! garbage collector - those live in `protocore` and `protocore-gc`
//! respectively.

pub mod error;
pub mod ids;
pub mod symbol;

pub use error::{UtilError, UtilResult};
pub use symbol::Symbol;

// Re-exported for crates that want a fast, non-cryptographic hash map
// without pulling in their own `rustc-hash` dependency.
pub use rustc_hash::{FxHashMap, FxHashSet};
