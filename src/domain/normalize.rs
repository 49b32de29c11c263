use crate::domain::fixed_point::DECIMAL_PRECISION;
use alloy_primitives::{Sign, I256, U256};

pub const DEFAULT_DISPLAY_DECIMALS: u32 = 2;
pub const RATE_DISPLAY_DECIMALS: u32 = 4;

/// Converts a signed 1e18 fixed-point value to `f64`, truncating toward zero
/// at `decimals` fractional digits.
pub fn normalize(raw: I256, decimals: u32) -> f64 {
    let (sign, magnitude) = raw.into_sign_and_abs();
    let value = normalize_unsigned(magnitude, decimals);
    match sign {
        Sign::Negative => -value,
        Sign::Positive => value,
    }
}

pub fn normalize_unsigned(raw: U256, decimals: u32) -> f64 {
    let scale = U256::from(10u64).saturating_pow(U256::from(decimals));
    let truncated = raw.saturating_mul(scale) / DECIMAL_PRECISION;
    u256_to_f64(truncated) / 10f64.powi(decimals as i32)
}

/// Rate in percent, as shown next to fees: four decimals then scaled by 100.
pub fn percent_from_fixed_point(rate: U256) -> f64 {
    normalize_unsigned(rate, RATE_DISPLAY_DECIMALS) * 100.0
}

fn u256_to_f64(value: U256) -> f64 {
    match u128::try_from(value) {
        Ok(small) => small as f64,
        // loses precision beyond 2^53 either way
        Err(_) => value.to_string().parse::<f64>().unwrap_or(f64::INFINITY),
    }
}
