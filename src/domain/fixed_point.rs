//! 18-decimal fixed-point arithmetic matching the ledger's own integer math.
//!
//! Everything here works on `U256` so results are bit-identical to what the
//! contracts compute; floats never enter the fee or ratio paths.

use alloy_primitives::U256;

/// 1e18, the scale of every rate and amount read from the ledger.
pub const DECIMAL_PRECISION: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// 1e20, the scale of the nominal collateral ratio used as the sorted-list key.
pub const NOMINAL_RATIO_PRECISION: U256 =
    U256::from_limbs([0x6bc7_5e2d_6310_0000, 0x5, 0, 0]);

/// Exponent cap applied by the ledger before `dec_pow` (1000 years of minutes).
pub const MAX_DECAY_MINUTES: u64 = 525_600_000;

/// `x * y / 1e18`, rounding half up.
pub fn dec_mul(x: U256, y: U256) -> U256 {
    x.saturating_mul(y)
        .saturating_add(DECIMAL_PRECISION / U256::from(2u8))
        / DECIMAL_PRECISION
}

/// `base ^ minutes` in 1e18 fixed point by exponentiation by squaring.
pub fn dec_pow(base: U256, minutes: u64) -> U256 {
    let minutes = minutes.min(MAX_DECAY_MINUTES);
    if minutes == 0 {
        return DECIMAL_PRECISION;
    }

    let mut y = DECIMAL_PRECISION;
    let mut x = base;
    let mut n = minutes;
    while n > 1 {
        if n % 2 == 0 {
            x = dec_mul(x, x);
            n /= 2;
        } else {
            y = dec_mul(x, y);
            x = dec_mul(x, x);
            n = (n - 1) / 2;
        }
    }
    dec_mul(x, y)
}

/// Floor of `value * scale / 1e18`, the ledger's plain fixed-point product.
pub fn mul_div_precision(value: U256, scale: U256) -> U256 {
    value.saturating_mul(scale) / DECIMAL_PRECISION
}

pub fn ether(units: u64) -> U256 {
    U256::from(units) * DECIMAL_PRECISION
}
