//! Total arithmetic contract over small integers and big integers
//! (spec.md §4.1, §7 — C1).
//!
//! `add`/`subtract`/`multiply` never fail: the operands are widened to
//! `i128` (wide enough that the multiplication of two `i54` magnitudes
//! never overflows it), and the result demotes back to an embedded small
//! int whenever it fits. `divide`/`modulo` fail only on a zero divisor;
//! division floors toward negative infinity and the modulo result takes
//! the divisor's sign, resolving spec.md's open question 9(a).

use crate::bigint;
use crate::error::{CoreError, CoreResult};
use crate::value::Handle;
use crate::Gc;

fn operand(h: Handle) -> CoreResult<i128> {
    bigint::as_i128(h).ok_or(CoreError::WrongKind {
        expected: "integer",
        actual: "non-integer value",
    })
}

pub fn add(gc: &Gc, a: Handle, b: Handle) -> CoreResult<Handle> {
    let (a, b) = (operand(a)?, operand(b)?);
    bigint::demote_or_box(gc, a + b)
}

pub fn subtract(gc: &Gc, a: Handle, b: Handle) -> CoreResult<Handle> {
    let (a, b) = (operand(a)?, operand(b)?);
    bigint::demote_or_box(gc, a - b)
}

pub fn multiply(gc: &Gc, a: Handle, b: Handle) -> CoreResult<Handle> {
    let (a, b) = (operand(a)?, operand(b)?);
    bigint::demote_or_box(gc, a * b)
}

/// Floor division: `q` such that `q * b + r == a` with `0 <= |r| < |b|`
/// and `r`'s sign matching `b`'s (Euclidean-ish floor semantics, not
/// Rust's default truncating `/`).
fn floor_div_rem(a: i128, b: i128) -> (i128, i128) {
    let q = a / b;
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) {
        (q - 1, r + b)
    } else {
        (q, r)
    }
}

pub fn divide(gc: &Gc, a: Handle, b: Handle) -> CoreResult<Handle> {
    let (a, b) = (operand(a)?, operand(b)?);
    if b == 0 {
        return Err(CoreError::DivideByZero);
    }
    let (q, _) = floor_div_rem(a, b);
    bigint::demote_or_box(gc, q)
}

/// `a mod b`, sign of `b` (spec.md §7, resolving open question 9(a)).
pub fn modulo(gc: &Gc, a: Handle, b: Handle) -> CoreResult<Handle> {
    let (a, b) = (operand(a)?, operand(b)?);
    if b == 0 {
        return Err(CoreError::DivideByZero);
    }
    let (_, r) = floor_div_rem(a, b);
    bigint::demote_or_box(gc, r)
}

pub fn negate(gc: &Gc, a: Handle) -> CoreResult<Handle> {
    let a = operand(a)?;
    bigint::demote_or_box(gc, -a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_gc;
    use crate::value::{SMALL_INT_MAX, SMALL_INT_MIN};

    fn int(gc: &Gc, n: i128) -> Handle {
        bigint::demote_or_box(gc, n).unwrap()
    }

    #[test]
    fn addition_promotes_past_small_int_range() {
        let gc = test_gc();
        let a = int(&gc, SMALL_INT_MAX as i128);
        let b = int(&gc, 1);
        let sum = add(&gc, a, b).unwrap();
        assert!(bigint::is_big_int(sum));
        assert_eq!(bigint::as_i128(sum), Some(SMALL_INT_MAX as i128 + 1));
    }

    #[test]
    fn subtraction_demotes_back_down() {
        let gc = test_gc();
        let a = int(&gc, SMALL_INT_MAX as i128 + 1);
        let b = int(&gc, 1);
        let diff = subtract(&gc, a, b).unwrap();
        assert!(!bigint::is_big_int(diff));
        assert_eq!(diff.as_small_int(), Some(SMALL_INT_MAX));
    }

    #[test]
    fn division_floors_toward_negative_infinity() {
        let gc = test_gc();
        let a = int(&gc, -7);
        let b = int(&gc, 2);
        let q = divide(&gc, a, b).unwrap();
        assert_eq!(q.as_small_int(), Some(-4));
    }

    #[test]
    fn modulo_takes_the_divisors_sign() {
        let gc = test_gc();
        let a = int(&gc, -7);
        let b = int(&gc, 2);
        let r = modulo(&gc, a, b).unwrap();
        assert_eq!(r.as_small_int(), Some(1));

        let a = int(&gc, 7);
        let b = int(&gc, -2);
        let r = modulo(&gc, a, b).unwrap();
        assert_eq!(r.as_small_int(), Some(-1));
    }

    #[test]
    fn division_by_zero_fails() {
        let gc = test_gc();
        let a = int(&gc, 1);
        let z = int(&gc, 0);
        assert!(matches!(divide(&gc, a, z), Err(CoreError::DivideByZero)));
        assert!(matches!(modulo(&gc, a, z), Err(CoreError::DivideByZero)));
    }

    #[test]
    fn multiply_never_overflows_i128() {
        let gc = test_gc();
        let a = int(&gc, SMALL_INT_MAX as i128);
        let b = int(&gc, SMALL_INT_MAX as i128);
        let prod = multiply(&gc, a, b).unwrap();
        assert_eq!(
            bigint::as_i128(prod),
            Some((SMALL_INT_MAX as i128) * (SMALL_INT_MAX as i128))
        );
    }

    #[test]
    fn negate_round_trips_the_minimum() {
        let gc = test_gc();
        let a = int(&gc, SMALL_INT_MIN as i128);
        let negated = negate(&gc, a).unwrap();
        assert_eq!(bigint::as_i128(negated), Some(-(SMALL_INT_MIN as i128)));
    }
}
