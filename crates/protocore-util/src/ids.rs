//! Typed identifier newtypes and a generic atomic generator.
//!
//! Several parts of the runtime need a process-wide unique integer id:
//! mutable-reference slots (`spec.md` §3.7), thread ids (§3.9), and module
//! cache keys. Rather than pass around bare `u64`s, every id space gets its
//! own newtype via [`define_id`], so a `ThreadId` can never be confused with
//! a `MutableRefId` at a call site.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonically-increasing generator for a 64-bit id space.
///
/// Ids start at 1; 0 is reserved so that, for example, a mutable-ref slot of
/// 0 can mean "immutable" (`spec.md` §3.7 invariant (b)) without clashing
/// with a real allocated id.
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next id in the sequence. Never returns 0.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Define a `Copy` newtype wrapping a `u64` id, plus a process-wide
/// generator static for it.
#[macro_export]
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $gen_name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
        pub struct $name(pub u64);

        impl $name {
            pub const NONE: $name = $name(0);

            #[inline]
            pub fn is_none(self) -> bool {
                self.0 == 0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        static $gen_name: $crate::ids::IdGenerator = $crate::ids::IdGenerator::new();

        impl $name {
            /// Allocate a fresh, process-wide unique id.
            pub fn fresh() -> Self {
                $name($gen_name.next())
            }
        }
    };
}
