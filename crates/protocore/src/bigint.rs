//! Heap big-integer cell (spec.md §3.1: "A large-integer heap cell also
//! has its own tag"; §4.1's promotion/demotion contract).
//!
//! Real arbitrary-precision arithmetic is explicitly out of scope
//! (spec.md §1's Non-goals list "arbitrary-precision integer arithmetic
//! algorithms beyond the contract that small integers auto-promote to
//! heap big-integers and that all arithmetic is total"). A 128-bit signed
//! magnitude is wide enough that every small integer overflowing `i54`
//! (spec.md's embedded range) still promotes cleanly, while giving the
//! exact boundary behavior the spec asks for: promote past `i54`, demote
//! back whenever the result fits, keep `n -> big -> n` the identity. See
//! `DESIGN.md` for why `i128` stands in for a limb vector here.

use crate::error::{CoreError, CoreResult};
use crate::kinds;
use crate::layout;
use crate::value::{Handle, SMALL_INT_MAX, SMALL_INT_MIN};
use crate::Gc;
use protocore_gc::cell::CellPtr;

fn pack(cell: &mut protocore_gc::cell::Cell, v: i128) {
    let bytes = v.to_ne_bytes();
    let lo = u64::from_ne_bytes(bytes[0..8].try_into().unwrap());
    let hi = u64::from_ne_bytes(bytes[8..16].try_into().unwrap());
    layout::set_u64(cell, 0, lo);
    layout::set_u64(cell, 1, hi);
}

fn unpack(cell: &protocore_gc::cell::Cell) -> i128 {
    let lo = layout::get_u64(cell, 0);
    let hi = layout::get_u64(cell, 1);
    let mut bytes = [0u8; 16];
    bytes[0..8].copy_from_slice(&lo.to_ne_bytes());
    bytes[8..16].copy_from_slice(&hi.to_ne_bytes());
    i128::from_ne_bytes(bytes)
}

/// Unconditionally box `v` as a big-integer cell. Most callers want
/// [`demote_or_box`] instead.
pub fn alloc(gc: &Gc, v: i128) -> CoreResult<Handle> {
    let cell = gc.allocate(kinds::BIG_INT)?;
    unsafe { pack(cell.as_mut(), v) };
    Ok(Handle::from_cell(cell))
}

/// Box `v` as a big-integer cell only if it doesn't fit `i54`; otherwise
/// return the cheaper embedded small-integer handle (spec.md §4.1's
/// demotion contract, §8 property 8's `n -> big -> n` round-trip).
pub fn demote_or_box(gc: &Gc, v: i128) -> CoreResult<Handle> {
    if (SMALL_INT_MIN as i128..=SMALL_INT_MAX as i128).contains(&v) {
        Ok(Handle::encode_small_int(v as i64).expect("range checked above"))
    } else {
        alloc(gc, v)
    }
}

pub fn is_big_int(h: Handle) -> bool {
    unsafe { h.as_cell() }.map(|c| c.kind() == kinds::BIG_INT).unwrap_or(false)
}

/// Decode a handle as a 128-bit integer, whether it's an embedded small
/// int or a boxed big-integer cell. Returns `None` for anything else.
pub fn as_i128(h: Handle) -> Option<i128> {
    if let Some(n) = h.as_small_int() {
        return Some(n as i128);
    }
    let cell = unsafe { h.as_cell() }?;
    if cell.kind() != kinds::BIG_INT {
        return None;
    }
    Some(unpack(unsafe { cell.as_ref() }))
}

/// Convert a big-integer handle down to a bounded `i64`, failing with
/// `Overflow` if it doesn't fit (spec.md §7's `Overflow`: "Converting a
/// big-integer to a bounded machine integer").
pub fn to_bounded_i64(h: Handle) -> CoreResult<i64> {
    let v = as_i128(h).ok_or(CoreError::WrongKind {
        expected: "integer",
        actual: "non-integer value",
    })?;
    i64::try_from(v).map_err(|_| CoreError::Overflow)
}

pub(crate) fn register_kind() {
    fn visit(_cell: CellPtr, _visit: &mut dyn FnMut(CellPtr)) {
        // A big-integer cell's payload is a plain 128-bit magnitude; it
        // holds no outgoing references.
    }
    protocore_gc::cell::register_kind(kinds::BIG_INT, visit, None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_gc;

    #[test]
    fn small_values_demote_to_embedded() {
        let gc = test_gc();
        let h = demote_or_box(&gc, 42).unwrap();
        assert!(!is_big_int(h));
        assert_eq!(h.as_small_int(), Some(42));
    }

    #[test]
    fn values_past_i54_box_to_a_cell() {
        let gc = test_gc();
        let past_small = SMALL_INT_MAX as i128 + 1;
        let h = demote_or_box(&gc, past_small).unwrap();
        assert!(is_big_int(h));
        assert_eq!(as_i128(h), Some(past_small));
    }

    #[test]
    fn big_demotes_back_when_it_fits() {
        let gc = test_gc();
        let boxed = alloc(&gc, 7).unwrap();
        assert!(is_big_int(boxed));
        let redemoted = demote_or_box(&gc, as_i128(boxed).unwrap()).unwrap();
        assert!(!is_big_int(redemoted));
        assert_eq!(redemoted.as_small_int(), Some(7));
    }

    #[test]
    fn to_bounded_i64_overflows_past_i64_range() {
        let gc = test_gc();
        let huge = alloc(&gc, i128::from(i64::MAX) + 1).unwrap();
        assert!(matches!(to_bounded_i64(huge), Err(CoreError::Overflow)));
    }

    #[test]
    fn negative_values_round_trip() {
        let gc = test_gc();
        let h = demote_or_box(&gc, SMALL_INT_MIN as i128 - 1).unwrap();
        assert!(is_big_int(h));
        assert_eq!(as_i128(h), Some(SMALL_INT_MIN as i128 - 1));
    }
}
