use crate::domain::error::{ClientError, Result};
use crate::domain::fee_decay::total_debt_with_fee;
use crate::domain::fixed_point::{mul_div_precision, NOMINAL_RATIO_PRECISION};
use alloy_primitives::{Address, U256};

/// Upper bound of trials per `getApproxHint` call; beyond it the ledger call
/// exceeds its gas and response budget.
pub const MAX_TRIALS_PER_CALL: u64 = 2_500;

/// A trove and its reward snapshot as read from the trove manager.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PositionSnapshot {
    pub current_debt: U256,
    pub current_collateral: U256,
    pub stake: U256,
    pub snapshot_collateral: U256,
    pub snapshot_debt: U256,
    pub l_collateral: U256,
    pub l_debt: U256,
}

impl PositionSnapshot {
    pub fn pending_collateral_reward(&self) -> U256 {
        pending_reward(self.l_collateral, self.snapshot_collateral, self.stake)
    }

    pub fn pending_debt_reward(&self) -> U256 {
        pending_reward(self.l_debt, self.snapshot_debt, self.stake)
    }

    /// Collateral including redistribution gains.
    pub fn entire_collateral(&self) -> U256 {
        self.current_collateral
            .saturating_add(self.pending_collateral_reward())
    }

    /// Debt including redistributed debt.
    pub fn entire_debt(&self) -> U256 {
        self.current_debt.saturating_add(self.pending_debt_reward())
    }
}

fn pending_reward(accumulator: U256, snapshot: U256, stake: U256) -> U256 {
    if accumulator > snapshot {
        mul_div_precision(accumulator - snapshot, stake)
    } else {
        U256::ZERO
    }
}

/// Collateral and debt changes requested by the caller, 1e18 scale.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OperationDeltas {
    pub borrow_debt: U256,
    pub repay_debt: U256,
    pub deposit_collateral: U256,
    pub withdraw_collateral: U256,
}

impl OperationDeltas {
    pub fn borrow(amount: U256) -> Self {
        Self {
            borrow_debt: amount,
            ..Self::default()
        }
    }

    pub fn repay(amount: U256) -> Self {
        Self {
            repay_debt: amount,
            ..Self::default()
        }
    }

    pub fn deposit(amount: U256) -> Self {
        Self {
            deposit_collateral: amount,
            ..Self::default()
        }
    }

    pub fn withdraw(amount: U256) -> Self {
        Self {
            withdraw_collateral: amount,
            ..Self::default()
        }
    }

    pub fn is_borrowing(&self) -> bool {
        !self.borrow_debt.is_zero()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectedState {
    pub projected_collateral: U256,
    pub projected_net_debt: U256,
    pub nominal_ratio: U256,
}

/// Neighbours to pass to the ledger's insert or reinsert call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hints {
    pub prev: Address,
    pub next: Address,
}

/// Answer of the hint helpers for a redemption: the first trove to redeem
/// from, the nominal ratio the partially redeemed trove will have, and the
/// debt amount that can actually be redeemed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RedemptionHints {
    pub first_redemption_hint: Address,
    pub partial_redemption_hint_nicr: U256,
    pub truncated_debt_amount: U256,
}

impl Hints {
    pub const EMPTY: Hints = Hints {
        prev: Address::ZERO,
        next: Address::ZERO,
    };
}

/// Debt after repaying and borrowing `borrow_debt` at `borrowing_rate`.
pub fn project_net_debt(
    snapshot: &PositionSnapshot,
    deltas: &OperationDeltas,
    borrowing_rate: U256,
) -> Result<U256> {
    let after_repay = snapshot
        .entire_debt()
        .checked_sub(deltas.repay_debt)
        .ok_or_else(|| {
            ClientError::InvalidOperation(format!(
                "repay amount {} exceeds trove debt {}",
                deltas.repay_debt,
                snapshot.entire_debt()
            ))
        })?;
    if !deltas.is_borrowing() {
        return Ok(after_repay);
    }
    Ok(after_repay.saturating_add(total_debt_with_fee(deltas.borrow_debt, borrowing_rate)))
}

pub fn project_collateral(snapshot: &PositionSnapshot, deltas: &OperationDeltas) -> Result<U256> {
    let collateral = snapshot.entire_collateral();
    collateral
        .saturating_add(deltas.deposit_collateral)
        .checked_sub(deltas.withdraw_collateral)
        .ok_or_else(|| {
            ClientError::InvalidOperation(format!(
                "withdraw amount {} exceeds trove collateral {}",
                deltas.withdraw_collateral, collateral
            ))
        })
}

/// `collateral * 1e20 / net_debt`; the sort key of the trove list.
pub fn nominal_ratio(collateral: U256, net_debt: U256) -> Result<U256> {
    if net_debt.is_zero() {
        return Err(ClientError::InvalidOperation(
            "projected net debt must be strictly positive".to_string(),
        ));
    }
    Ok(collateral.saturating_mul(NOMINAL_RATIO_PRECISION) / net_debt)
}

pub fn project_state(
    snapshot: &PositionSnapshot,
    deltas: &OperationDeltas,
    borrowing_rate: U256,
) -> Result<ProjectedState> {
    let projected_net_debt = project_net_debt(snapshot, deltas, borrowing_rate)?;
    let projected_collateral = project_collateral(snapshot, deltas)?;
    let nominal_ratio = nominal_ratio(projected_collateral, projected_net_debt)?;
    Ok(ProjectedState {
        projected_collateral,
        projected_net_debt,
        nominal_ratio,
    })
}

/// `ceil(10 * sqrt(trove_count))` split into calls of at most `MAX_TRIALS_PER_CALL`.
pub fn trial_chunks(trove_count: u64) -> Vec<u64> {
    let mut remaining = total_trials(trove_count);
    let mut chunks = Vec::new();
    while remaining > 0 {
        let chunk = remaining.min(MAX_TRIALS_PER_CALL);
        chunks.push(chunk);
        remaining -= chunk;
    }
    chunks
}

pub fn total_trials(trove_count: u64) -> u64 {
    (10.0 * (trove_count as f64).sqrt()).ceil() as u64
}

/// Candidate from one `getApproxHint` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApproxHint {
    pub hint_address: Address,
    pub diff: U256,
}

/// Smallest `diff` wins; ties keep the earliest candidate.
pub fn best_candidate(candidates: &[ApproxHint]) -> Option<ApproxHint> {
    candidates.iter().copied().reduce(|best, candidate| {
        if candidate.diff < best.diff {
            candidate
        } else {
            best
        }
    })
}

/// A null neighbour is replaced by the other side; the ledger walks the whole
/// list when handed the sentinel.
pub fn replace_zero_neighbour(hints: Hints) -> Hints {
    if hints.prev == Address::ZERO {
        Hints {
            prev: hints.next,
            next: hints.next,
        }
    } else if hints.next == Address::ZERO {
        Hints {
            prev: hints.prev,
            next: hints.prev,
        }
    } else {
        hints
    }
}
