//! Exact wide-integer helpers over [`alloy_primitives::U256`].
//!
//! Sums of squared 128-bit demand deltas and `price * amount * step`
//! products exceed 128 bits. Keeping them exact means every node compares
//! objectives and computes price steps bit-identically.

use alloy_primitives::Uint;

pub use alloy_primitives::U256;

/// 512-bit integer for products of four 64-bit factors and a fee.
pub type U512 = Uint<512, 8>;

/// Full 256-bit product of two 128-bit values. Cannot overflow.
#[must_use]
pub fn product(a: u128, b: u128) -> U256 {
    U256::from(a) * U256::from(b)
}

/// `v * v` for a signed 128-bit value.
#[must_use]
pub fn square(v: i128) -> U256 {
    let abs = v.unsigned_abs();
    product(abs, abs)
}

/// `lhs -= rhs`.
///
/// Precondition: `rhs <= lhs`. Violations saturate at zero.
pub fn subtract_smaller(lhs: &mut U256, rhs: &U256) {
    debug_assert!(rhs <= lhs, "subtract_smaller: rhs exceeds lhs");
    *lhs = lhs.saturating_sub(*rhs);
}

/// `value >> radix`, saturating at `i64::MAX`.
#[must_use]
pub fn compress(value: &U256, radix: u32) -> i64 {
    let Ok(shift) = usize::try_from(radix) else {
        return 0;
    };
    if shift >= U256::BITS {
        return 0;
    }
    let shifted = *value >> shift;
    u64::try_from(shifted)
        .ok()
        .and_then(|v| i64::try_from(v).ok())
        .unwrap_or(i64::MAX)
}

/// Saturating conversion of a 256-bit value down to `i128`.
#[must_use]
pub fn saturating_i128(value: &U256) -> i128 {
    u128::try_from(*value)
        .ok()
        .and_then(|v| i128::try_from(v).ok())
        .unwrap_or(i128::MAX)
}
