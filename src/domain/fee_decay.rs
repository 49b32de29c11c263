//! Replica of the ledger's time-decayed borrowing fee.
//!
//! The base rate decays by `MINUTE_DECAY_FACTOR` for every whole minute since
//! the last fee operation, then the floor is added and the result capped. A
//! projection that diverges from the ledger by even one wei can move the
//! predicted nominal ratio and make a hint stale.

use crate::domain::fixed_point::{dec_pow, mul_div_precision, DECIMAL_PRECISION};
use alloy_primitives::U256;

/// 0.999037758833783 in 1e18 fixed point: a half-life of 12 hours.
pub const MINUTE_DECAY_FACTOR: U256 = U256::from_limbs([999_037_758_833_783_000, 0, 0, 0]);

pub const SECONDS_IN_ONE_MINUTE: u64 = 60;

/// Whole minutes between the last fee operation and `block_timestamp + elapsed_seconds`.
/// A last-operation time in the future (clock skew) counts as zero minutes.
pub fn minutes_since_last_fee_operation(
    block_timestamp: u64,
    elapsed_seconds: u64,
    last_fee_operation_time: u64,
) -> u64 {
    block_timestamp
        .saturating_add(elapsed_seconds)
        .saturating_sub(last_fee_operation_time)
        / SECONDS_IN_ONE_MINUTE
}

pub fn decayed_base_rate(
    base_rate_without_decay: U256,
    minute_decay_factor: U256,
    minutes: u64,
) -> U256 {
    mul_div_precision(base_rate_without_decay, dec_pow(minute_decay_factor, minutes))
}

/// Borrowing rate the ledger will charge `elapsed_seconds` after `block_timestamp`.
#[allow(clippy::too_many_arguments)]
pub fn decayed_rate(
    block_timestamp: u64,
    elapsed_seconds: u64,
    last_fee_operation_time: u64,
    minute_decay_factor: U256,
    base_rate_without_decay: U256,
    floor_rate: U256,
    ceiling_rate: U256,
    in_recovery_mode: bool,
) -> U256 {
    if in_recovery_mode {
        return U256::ZERO;
    }
    let minutes =
        minutes_since_last_fee_operation(block_timestamp, elapsed_seconds, last_fee_operation_time);
    let base = decayed_base_rate(base_rate_without_decay, minute_decay_factor, minutes);
    floor_rate.saturating_add(base).min(ceiling_rate)
}

/// `amount` plus the borrowing fee charged on it at `rate`.
pub fn total_debt_with_fee(amount: U256, rate: U256) -> U256 {
    amount.saturating_add(mul_div_precision(amount, rate))
}

/// Fee inputs read from the trove manager in one batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeeSchedule {
    pub last_fee_operation_time: u64,
    pub base_rate: U256,
    pub borrowing_fee_floor: U256,
    pub max_borrowing_fee: U256,
    pub minute_decay_factor: U256,
    pub recovery_mode: bool,
}

impl FeeSchedule {
    pub fn rate_at(&self, block_timestamp: u64, elapsed_seconds: u64) -> U256 {
        decayed_rate(
            block_timestamp,
            elapsed_seconds,
            self.last_fee_operation_time,
            self.minute_decay_factor,
            self.base_rate,
            self.borrowing_fee_floor,
            self.max_borrowing_fee,
            self.recovery_mode,
        )
    }
}

/// Per-collateral system totals as returned by `fetchBalances()`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SystemBalances {
    pub collaterals: Vec<U256>,
    pub debts: Vec<U256>,
    pub prices: Vec<U256>,
}

impl SystemBalances {
    /// Total collateral ratio in 1e18 scale, `None` when the system holds no debt.
    pub fn total_collateral_ratio(&self) -> Option<U256> {
        let mut priced_collateral = U256::ZERO;
        let mut total_debt = U256::ZERO;
        for (index, collateral) in self.collaterals.iter().enumerate() {
            let price = self.prices.get(index).copied().unwrap_or_default();
            let debt = self.debts.get(index).copied().unwrap_or_default();
            priced_collateral = priced_collateral.saturating_add(collateral.saturating_mul(price));
            total_debt = total_debt.saturating_add(debt);
        }
        if total_debt.is_zero() {
            return None;
        }
        Some(priced_collateral / total_debt)
    }

    pub fn is_recovery_mode(&self, critical_collateral_ratio: U256) -> bool {
        self.total_collateral_ratio()
            .map(|tcr| tcr < critical_collateral_ratio)
            .unwrap_or(false)
    }
}

/// Fee amount for display: `rate` applied to `amount`, both 1e18 scale.
pub fn fee_for(amount: U256, rate: U256) -> U256 {
    mul_div_precision(amount, rate)
}
