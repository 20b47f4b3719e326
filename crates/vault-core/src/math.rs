// vault-core/src/math.rs

//! Exact integer helpers for share and pricing math.
//!
//! Share accounting and the swap invariant must be penny-exact: floating
//! point drift would break the `balanceOf == supply * shares / totalShares`
//! identity and the donation-resistance bound, so everything here stays in
//! `BigUint` with full intermediate precision.

use num_bigint::BigUint;
use num_traits::Zero;

/// `a * b / d`, rounding down. `None` when `d` is zero.
pub fn mul_div(a: &BigUint, b: &BigUint, d: &BigUint) -> Option<BigUint> {
    if d.is_zero() {
        return None;
    }
    Some(a * b / d)
}

/// `x * x`
pub fn square(x: &BigUint) -> BigUint {
    x * x
}
