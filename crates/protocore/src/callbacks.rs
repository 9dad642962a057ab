//! Embedding-API callback table (spec.md §6 — C11).
//!
//! An embedder installs zero or more of these on a [`crate::space::Space`]
//! to recover from conditions this crate would otherwise only be able to
//! surface as an error or a silent `none`. Every callback is optional;
//! an unset slot falls back to the default behavior spec.md §6/§7
//! describe for that condition (usually: surface `none`, or propagate
//! the error). A callback that itself wants to signal "unhandled"
//! returns `none` (`Handle`'s null word).

use crate::context::Context;
use crate::value::Handle;

/// A call targeted a value that wasn't callable (spec.md §6).
pub type NonMethodCallFn = fn(ctx: &Context, target: Handle, args: &[Handle]) -> Handle;

/// An attribute lookup exhausted the prototype chain (spec.md §4.8, §6).
pub type AttributeNotFoundGetFn = fn(ctx: &Context, object: Handle, name_hash: u64) -> Handle;

/// A keyword argument named a parameter the callee doesn't have
/// (spec.md §4.9, §6).
pub type ParameterNotFoundFn = fn(ctx: &Context, name_hash: u64, value: Handle) -> Handle;

/// A keyword argument targeted a parameter already bound positionally
/// (spec.md §4.9, §6).
pub type ParameterTwiceAssignedFn = fn(ctx: &Context, name_hash: u64, value: Handle) -> Handle;

/// The collector could not satisfy an allocation even after a full
/// collection (spec.md §6, mirroring `protocore_gc::GcError::OutOfMemory`).
pub type OutOfMemoryFn = fn(ctx: &Context) -> Handle;

/// A conversion between value representations isn't defined for the
/// operand's actual kind (spec.md §6, §7's `InvalidConversion`).
pub type InvalidConversionFn = fn(ctx: &Context, value: Handle, to: &'static str) -> Handle;

/// The full set of embedding-API recovery hooks a [`crate::space::Space`]
/// may install. Every field defaults to `None`, meaning "use the
/// default behavior" (spec.md §6: "absent a callback, the condition is
/// surfaced to the caller in the way §7 describes").
#[derive(Clone, Copy, Default)]
pub struct Callbacks {
    pub non_method_call: Option<NonMethodCallFn>,
    pub attribute_not_found_get: Option<AttributeNotFoundGetFn>,
    pub parameter_not_found: Option<ParameterNotFoundFn>,
    pub parameter_twice_assigned: Option<ParameterTwiceAssignedFn>,
    pub out_of_memory: Option<OutOfMemoryFn>,
    pub invalid_conversion: Option<InvalidConversionFn>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_callbacks_are_all_unset() {
        let callbacks = Callbacks::default();
        assert!(callbacks.non_method_call.is_none());
        assert!(callbacks.attribute_not_found_get.is_none());
        assert!(callbacks.parameter_not_found.is_none());
        assert!(callbacks.parameter_twice_assigned.is_none());
        assert!(callbacks.out_of_memory.is_none());
        assert!(callbacks.invalid_conversion.is_none());
    }
}
