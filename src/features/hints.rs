//! Insert-position hints for the sorted trove list.
//!
//! The list is keyed by nominal collateral ratio and lives on the ledger. The
//! resolver predicts the key a trove will have after an operation, samples the
//! list for a nearby node through the hint helpers, then asks the list for the
//! exact neighbours around that node. Every step is a separate round trip and
//! later steps depend on values returned by earlier ones.

use crate::config::{ClientConfig, ProtocolAddresses};
use crate::domain::error::{ClientError, Result};
use crate::domain::fee_decay::{FeeSchedule, SystemBalances, MINUTE_DECAY_FACTOR};
use crate::domain::position::{
    best_candidate, project_net_debt, project_state, replace_zero_neighbour, trial_chunks,
    ApproxHint, Hints, OperationDeltas, PositionSnapshot, RedemptionHints,
};
use crate::domain::types::{BatchResults, CallBatch, CallDescriptor, Strictness};
use crate::features::multicall::AggregatorClient;
use crate::features::rpc::{EvmCallProvider, HttpEvmRpcClient};
use crate::timing::{DECAY_TOLERANCE_MINUTES, DECAY_TOLERANCE_SECS};
use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, U256};
use rand::Rng;
use std::sync::Arc;

const TROVES: &str =
    "function Troves(address) view returns (uint256, uint256, uint256, uint8, uint128, uint256)";
const REWARD_SNAPSHOTS: &str = "function rewardSnapshots(address) view returns (uint256, uint256)";
const L_COLLATERAL: &str = "function L_collateral() view returns (uint256)";
const L_DEBT: &str = "function L_debt() view returns (uint256)";

const GET_TROVE_OWNERS_COUNT: &str = "function getTroveOwnersCount() view returns (uint256)";
const GET_FIRST: &str = "function getFirst() view returns (address)";
const GET_PREV: &str = "function getPrev(address) view returns (address)";
const GET_NEXT: &str = "function getNext(address) view returns (address)";
const FIND_INSERT_POSITION: &str =
    "function findInsertPosition(uint256, address, address) view returns (address, address)";
const GET_APPROX_HINT: &str =
    "function getApproxHint(address, uint256, uint256, uint256) view returns (address, uint256, uint256)";
const GET_REDEMPTION_HINTS: &str =
    "function getRedemptionHints(address, uint256, uint256, uint256) view returns (address, uint256, uint256)";

const FETCH_BALANCES: &str =
    "function fetchBalances() view returns ((uint256[], uint256[], uint256[]))";
const CCR: &str = "function CCR() view returns (uint256)";
const LAST_FEE_OPERATION_TIME: &str = "function lastFeeOperationTime() view returns (uint256)";
const BASE_RATE: &str = "function baseRate() view returns (uint256)";
const BORROWING_FEE_FLOOR: &str = "function borrowingFeeFloor() view returns (uint256)";
const MAX_BORROWING_FEE: &str = "function maxBorrowingFee() view returns (uint256)";

/// The first sampling seed is drawn below 2^53.
pub const SEED_UPPER_BOUND: u64 = 1 << 53;

/// Per-collateral contracts of one trove.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TroveRefs {
    pub trove_manager: Address,
    pub sorted_troves: Address,
    /// Smallest net debt the ledger accepts, 1e18 scale.
    pub minimum_net_debt: U256,
}

#[derive(Clone)]
pub struct HintResolver {
    aggregator: AggregatorClient,
    protocol: ProtocolAddresses,
}

impl HintResolver {
    pub fn new(aggregator: AggregatorClient, protocol: ProtocolAddresses) -> Result<Self> {
        if protocol.hint_helpers == Address::ZERO {
            return Err(ClientError::configuration(
                "hint helpers address is not configured",
            ));
        }
        if protocol.borrower_operations == Address::ZERO {
            return Err(ClientError::configuration(
                "borrower operations address is not configured",
            ));
        }
        Ok(Self {
            aggregator,
            protocol,
        })
    }

    /// HTTP provider, chain id and aggregator map all taken from `config`.
    pub async fn from_config(config: &ClientConfig) -> Result<Self> {
        let provider: Arc<dyn EvmCallProvider> = Arc::new(HttpEvmRpcClient::from_config(config)?);
        let aggregator =
            AggregatorClient::connect(provider, config.chain_id, config.aggregator_registry())
                .await?;
        Self::new(aggregator, config.protocol.clone())
    }

    pub fn aggregator(&self) -> &AggregatorClient {
        &self.aggregator
    }

    pub fn protocol(&self) -> &ProtocolAddresses {
        &self.protocol
    }

    /// Neighbours for `owner`'s trove after applying `deltas`.
    pub async fn find_hints(
        &self,
        owner: Address,
        trove: &TroveRefs,
        deltas: &OperationDeltas,
    ) -> Result<Hints> {
        let snapshot = self.position_snapshot(owner, trove.trove_manager).await?;

        let borrowing_rate = if deltas.is_borrowing() {
            let schedule = self.fee_schedule(trove.trove_manager).await?;
            let block_timestamp = self.aggregator.provider().latest_block_timestamp().await?;
            check_decay_tolerance(&snapshot, deltas, &schedule, block_timestamp, trove)?;
            schedule.rate_at(block_timestamp, 0)
        } else {
            U256::ZERO
        };

        let state = project_state(&snapshot, deltas, borrowing_rate)?;
        tracing::debug!(
            %owner,
            net_debt = %state.projected_net_debt,
            collateral = %state.projected_collateral,
            nominal_ratio = %state.nominal_ratio,
            "trove_projected"
        );

        let hints = self
            .find_hints_for_nominal_ratio(state.nominal_ratio, trove, Some(owner))
            .await?;
        tracing::info!(%owner, prev = %hints.prev, next = %hints.next, "hints_resolved");
        Ok(hints)
    }

    /// Neighbours for a node with `nominal_ratio`. `owner` is the trove being
    /// reinserted, if any; it is never returned as its own neighbour.
    pub async fn find_hints_for_nominal_ratio(
        &self,
        nominal_ratio: U256,
        trove: &TroveRefs,
        owner: Option<Address>,
    ) -> Result<Hints> {
        let sorted_troves = trove.sorted_troves;
        let list = self
            .aggregator
            .aggregate(
                &CallBatch::new()
                    .with(CallDescriptor::from_signature(
                        trove.trove_manager,
                        GET_TROVE_OWNERS_COUNT,
                        vec![],
                    )?)
                    .with(CallDescriptor::from_signature(sorted_troves, GET_FIRST, vec![])?),
                Strictness::Lenient,
            )
            .await?;
        let trove_count = u256_to_u64(list.uint(0)?, "getTroveOwnersCount")?;
        let head = list.address(1)?;

        if trove_count == 0 {
            return Ok(Hints::EMPTY);
        }
        if nominal_ratio == U256::MAX {
            return Ok(Hints {
                prev: Address::ZERO,
                next: head,
            });
        }

        let candidate = self
            .approximate_hint(nominal_ratio, trove, trove_count)
            .await?
            .map(|hint| hint.hint_address)
            .unwrap_or(head);

        let exact = self
            .single_call(CallDescriptor::from_signature(
                sorted_troves,
                FIND_INSERT_POSITION,
                vec![
                    DynSolValue::Uint(nominal_ratio, 256),
                    DynSolValue::Address(candidate),
                    DynSolValue::Address(candidate),
                ],
            )?)
            .await?;
        let mut hints = Hints {
            prev: exact.address_field(0, 0)?,
            next: exact.address_field(0, 1)?,
        };

        if let Some(owner) = owner {
            hints = self.exclude_owner(hints, owner, sorted_troves).await?;
        }
        Ok(replace_zero_neighbour(hints))
    }

    /// Samples the list in chunks; each call consumes the seed returned by the
    /// previous one, so the calls run strictly in sequence.
    async fn approximate_hint(
        &self,
        nominal_ratio: U256,
        trove: &TroveRefs,
        trove_count: u64,
    ) -> Result<Option<ApproxHint>> {
        let mut seed = U256::from(random_seed());
        let mut candidates = Vec::new();
        for trials in trial_chunks(trove_count) {
            let answer = self
                .single_call(CallDescriptor::from_signature(
                    self.protocol.hint_helpers,
                    GET_APPROX_HINT,
                    vec![
                        DynSolValue::Address(trove.trove_manager),
                        DynSolValue::Uint(nominal_ratio, 256),
                        DynSolValue::Uint(U256::from(trials), 256),
                        DynSolValue::Uint(seed, 256),
                    ],
                )?)
                .await?;
            let hint = ApproxHint {
                hint_address: answer.address_field(0, 0)?,
                diff: answer.uint_field(0, 1)?,
            };
            seed = answer.uint_field(0, 2)?;
            tracing::debug!(
                trials,
                hint = %hint.hint_address,
                diff = %hint.diff,
                "approx_hint_sampled"
            );
            candidates.push(hint);
        }
        Ok(best_candidate(&candidates))
    }

    async fn exclude_owner(
        &self,
        hints: Hints,
        owner: Address,
        sorted_troves: Address,
    ) -> Result<Hints> {
        if hints.prev == owner {
            let prev = self.neighbour(sorted_troves, GET_PREV, hints.prev).await?;
            return Ok(Hints { prev, ..hints });
        }
        if hints.next == owner {
            let next = self.neighbour(sorted_troves, GET_NEXT, hints.next).await?;
            return Ok(Hints { next, ..hints });
        }
        Ok(hints)
    }

    async fn neighbour(
        &self,
        sorted_troves: Address,
        signature: &str,
        node: Address,
    ) -> Result<Address> {
        self.single_call(CallDescriptor::from_signature(
            sorted_troves,
            signature,
            vec![DynSolValue::Address(node)],
        )?)
        .await?
        .address(0)
    }

    async fn single_call(&self, call: CallDescriptor) -> Result<BatchResults> {
        self.aggregator
            .aggregate(&CallBatch::new().with(call), Strictness::Strict)
            .await
    }

    /// Where a redemption of `debt_amount` at `price` starts and where it stops
    /// part-way through a trove. `max_iterations` of zero lets the helper walk
    /// the whole list. Read leniently so a revert surfaces as `MissingResult`
    /// and callers can poll until the helper answers.
    pub async fn redemption_hints(
        &self,
        trove_manager: Address,
        debt_amount: U256,
        price: U256,
        max_iterations: u64,
    ) -> Result<RedemptionHints> {
        let batch = CallBatch::new().with(CallDescriptor::from_signature(
            self.protocol.hint_helpers,
            GET_REDEMPTION_HINTS,
            vec![
                DynSolValue::Address(trove_manager),
                DynSolValue::Uint(debt_amount, 256),
                DynSolValue::Uint(price, 256),
                DynSolValue::Uint(U256::from(max_iterations), 256),
            ],
        )?);
        let results = self.aggregator.aggregate(&batch, Strictness::Lenient).await?;
        let hints = RedemptionHints {
            first_redemption_hint: results.address_field(0, 0)?,
            partial_redemption_hint_nicr: results.uint_field(0, 1)?,
            truncated_debt_amount: results.uint_field(0, 2)?,
        };
        tracing::debug!(
            first = %hints.first_redemption_hint,
            partial_nicr = %hints.partial_redemption_hint_nicr,
            truncated = %hints.truncated_debt_amount,
            "redemption_hints_resolved"
        );
        Ok(hints)
    }

    /// Trove and accumulated redistribution state of `owner`, read in one batch.
    pub async fn position_snapshot(
        &self,
        owner: Address,
        trove_manager: Address,
    ) -> Result<PositionSnapshot> {
        let batch = CallBatch::new()
            .with(CallDescriptor::from_signature(
                trove_manager,
                TROVES,
                vec![DynSolValue::Address(owner)],
            )?)
            .with(CallDescriptor::from_signature(
                trove_manager,
                REWARD_SNAPSHOTS,
                vec![DynSolValue::Address(owner)],
            )?)
            .with(CallDescriptor::from_signature(trove_manager, L_COLLATERAL, vec![])?)
            .with(CallDescriptor::from_signature(trove_manager, L_DEBT, vec![])?);
        let results = self.aggregator.aggregate(&batch, Strictness::Lenient).await?;

        Ok(PositionSnapshot {
            current_debt: results.uint_field(0, 0)?,
            current_collateral: results.uint_field(0, 1)?,
            stake: results.uint_field(0, 2)?,
            snapshot_collateral: results.uint_field(1, 0)?,
            snapshot_debt: results.uint_field(1, 1)?,
            l_collateral: results.uint(2)?,
            l_debt: results.uint(3)?,
        })
    }

    /// Fee inputs and recovery-mode state, read in one batch.
    pub async fn fee_schedule(&self, trove_manager: Address) -> Result<FeeSchedule> {
        let borrower_operations = self.protocol.borrower_operations;
        let batch = CallBatch::new()
            .with(CallDescriptor::from_signature(
                borrower_operations,
                FETCH_BALANCES,
                vec![],
            )?)
            .with(CallDescriptor::from_signature(borrower_operations, CCR, vec![])?)
            .with(CallDescriptor::from_signature(
                trove_manager,
                LAST_FEE_OPERATION_TIME,
                vec![],
            )?)
            .with(CallDescriptor::from_signature(trove_manager, BASE_RATE, vec![])?)
            .with(CallDescriptor::from_signature(
                trove_manager,
                BORROWING_FEE_FLOOR,
                vec![],
            )?)
            .with(CallDescriptor::from_signature(
                trove_manager,
                MAX_BORROWING_FEE,
                vec![],
            )?);
        let results = self.aggregator.aggregate(&batch, Strictness::Lenient).await?;

        let balances = SystemBalances {
            collaterals: results.uint_array_field(0, 0)?,
            debts: results.uint_array_field(0, 1)?,
            prices: results.uint_array_field(0, 2)?,
        };
        let critical_collateral_ratio = results.uint(1)?;
        Ok(FeeSchedule {
            last_fee_operation_time: u256_to_u64(results.uint(2)?, "lastFeeOperationTime")?,
            base_rate: results.uint(3)?,
            borrowing_fee_floor: results.uint(4)?,
            max_borrowing_fee: results.uint(5)?,
            minute_decay_factor: MINUTE_DECAY_FACTOR,
            recovery_mode: balances.is_recovery_mode(critical_collateral_ratio),
        })
    }

    /// Borrowing rate the ledger will charge `elapsed_seconds` after the latest block.
    pub async fn borrowing_rate(
        &self,
        trove_manager: Address,
        elapsed_seconds: u64,
    ) -> Result<U256> {
        let schedule = self.fee_schedule(trove_manager).await?;
        let block_timestamp = self.aggregator.provider().latest_block_timestamp().await?;
        Ok(schedule.rate_at(block_timestamp, elapsed_seconds))
    }
}

/// Fails when the debt, with the fee decayed `DECAY_TOLERANCE_SECS` ahead,
/// would drop under the ledger minimum by the time the transaction lands.
fn check_decay_tolerance(
    snapshot: &PositionSnapshot,
    deltas: &OperationDeltas,
    schedule: &FeeSchedule,
    block_timestamp: u64,
    trove: &TroveRefs,
) -> Result<()> {
    let future_rate = schedule.rate_at(block_timestamp, DECAY_TOLERANCE_SECS);
    let projected = project_net_debt(snapshot, deltas, future_rate)?;
    if projected < trove.minimum_net_debt {
        return Err(ClientError::DebtBelowMinimum {
            minimum: trove.minimum_net_debt,
            projected,
            tolerance_minutes: DECAY_TOLERANCE_MINUTES,
        });
    }
    Ok(())
}

fn random_seed() -> u64 {
    rand::thread_rng().gen_range(0..SEED_UPPER_BOUND)
}

fn u256_to_u64(value: U256, method: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| ClientError::decode(method, format!("{value} exceeds u64")))
}
