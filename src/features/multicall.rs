use crate::domain::error::{ClientError, Result};
use crate::domain::types::{BatchResults, CallBatch, CallOutcome, CallResult, Strictness};
use crate::features::rpc::EvmCallProvider;
use alloy_primitives::{address, Address, Bytes};
use alloy_sol_types::{sol, SolCall};
use std::collections::BTreeMap;
use std::sync::Arc;

sol! {
    interface IMulticall {
        struct Call {
            address target;
            bytes callData;
        }

        struct CallResponse {
            bool success;
            bytes returnData;
        }

        function aggregate(Call[] calls, bool strict)
            external
            view
            returns (uint256 blockNumber, CallResponse[] returnData);
    }
}

impl From<IMulticall::CallResponse> for CallResult {
    fn from(response: IMulticall::CallResponse) -> Self {
        Self {
            success: response.success,
            return_data: response.returnData,
        }
    }
}

/// Chain id to aggregator contract address.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AggregatorRegistry {
    addresses: BTreeMap<u64, Address>,
}

impl AggregatorRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Known aggregator deployments.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for (chain_id, aggregator) in [
            (1, address!("5eb3fa2dfecdde21c950813c665e9364fa609bd2")),
            (56, address!("7F14bc487e63DDB4655e898CcaAff53e1B36262F")),
            (66, address!("cdbbbf1dfc46f8bb799699d22c41205cc1627adf")),
            (128, address!("cdbbbf1dfc46f8bb799699d22c41205cc1627adf")),
            (137, address!("663fc157456c6315053b434783fef65221f75d1a")),
            (250, address!("232da5cd7a7f006564b21769f1457d36cb669b79")),
            (43_114, address!("663fc157456c6315053b434783fef65221f75d1a")),
            (42_161, address!("71f2b84cde0a773e2b7d9a05b4363992ec9ee335")),
            (31_337, address!("5eb3fa2dfecdde21c950813c665e9364fa609bd2")),
            (1_337, address!("9342D3814CeF43efA4b711f8062eA2c65087ca09")),
            (534_352, address!("9342D3814CeF43efA4b711f8062eA2c65087ca09")),
        ] {
            registry.set_address(chain_id, aggregator);
        }
        registry
    }

    pub fn set_address(&mut self, chain_id: u64, aggregator: Address) -> Option<Address> {
        self.addresses.insert(chain_id, aggregator)
    }

    pub fn address(&self, chain_id: u64) -> Option<Address> {
        self.addresses.get(&chain_id).copied()
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.addresses.keys().copied()
    }
}

/// Configured chain id when non-zero, otherwise the provider's.
pub async fn resolve_chain_id(provider: &dyn EvmCallProvider, configured: u64) -> Result<u64> {
    if configured != 0 {
        return Ok(configured);
    }
    let chain_id = provider.chain_id().await?;
    if chain_id == 0 {
        return Err(ClientError::configuration(
            "provider reported chain id 0",
        ));
    }
    Ok(chain_id)
}

/// Sends a whole `CallBatch` through the chain's aggregator contract in one
/// `eth_call` and decodes every slot with its own descriptor.
#[derive(Clone)]
pub struct AggregatorClient {
    provider: Arc<dyn EvmCallProvider>,
    chain_id: u64,
    registry: AggregatorRegistry,
}

impl AggregatorClient {
    pub fn new(
        provider: Arc<dyn EvmCallProvider>,
        chain_id: u64,
        registry: AggregatorRegistry,
    ) -> Self {
        Self {
            provider,
            chain_id,
            registry,
        }
    }

    /// Like `new`, but asks the provider for the chain id when `chain_id` is zero.
    pub async fn connect(
        provider: Arc<dyn EvmCallProvider>,
        chain_id: u64,
        registry: AggregatorRegistry,
    ) -> Result<Self> {
        let chain_id = resolve_chain_id(provider.as_ref(), chain_id).await?;
        Ok(Self::new(provider, chain_id, registry))
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn provider(&self) -> &Arc<dyn EvmCallProvider> {
        &self.provider
    }

    pub fn registry(&self) -> &AggregatorRegistry {
        &self.registry
    }

    pub fn set_aggregator_address(&mut self, chain_id: u64, aggregator: Address) {
        self.registry.set_address(chain_id, aggregator);
    }

    fn aggregator_address(&self) -> Result<Address> {
        if self.chain_id == 0 {
            return Err(ClientError::configuration("chain id is not configured"));
        }
        self.registry.address(self.chain_id).ok_or_else(|| {
            ClientError::configuration(format!(
                "no aggregator address registered for chain {}",
                self.chain_id
            ))
        })
    }

    pub async fn aggregate(
        &self,
        batch: &CallBatch,
        strictness: Strictness,
    ) -> Result<BatchResults> {
        if batch.is_empty() {
            return Err(ClientError::configuration(
                "batch must contain at least one call",
            ));
        }
        let aggregator = self.aggregator_address()?;

        let calls = batch
            .calls()
            .iter()
            .map(|call| {
                if call.target() == Address::ZERO {
                    return Err(ClientError::configuration(format!(
                        "call target for {} must be a non-zero address",
                        call.method()
                    )));
                }
                Ok(IMulticall::Call {
                    target: call.target(),
                    callData: Bytes::from(call.calldata()?),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let request = IMulticall::aggregateCall {
            calls,
            strict: strictness.is_strict(),
        };

        tracing::debug!(
            chain_id = self.chain_id,
            calls = batch.len(),
            strict = strictness.is_strict(),
            %aggregator,
            "multicall_dispatch"
        );
        let raw = self
            .provider
            .eth_call(aggregator, &request.abi_encode())
            .await?;
        let response = IMulticall::aggregateCall::abi_decode_returns(&raw, true)
            .map_err(|error| ClientError::decode("aggregate", error))?;
        let block_number = response.blockNumber;
        tracing::debug!(%block_number, "multicall_answered");

        let slots: Vec<CallResult> = response
            .returnData
            .into_iter()
            .map(CallResult::from)
            .collect();
        if slots.len() != batch.len() {
            return Err(ClientError::decode(
                "aggregate",
                format!("expected {} results, got {}", batch.len(), slots.len()),
            ));
        }

        let mut outcomes = Vec::with_capacity(batch.len());
        for (index, (call, slot)) in batch
            .calls()
            .iter()
            .zip(slots.iter())
            .enumerate()
        {
            if !slot.success {
                if strictness.is_strict() {
                    return Err(ClientError::StrictRevert {
                        index,
                        method: call.method().to_string(),
                    });
                }
                tracing::warn!(index, method = call.method(), "multicall_slot_reverted");
                outcomes.push(CallOutcome::Reverted);
                continue;
            }
            match call.decode_output(&slot.return_data) {
                Ok(value) => outcomes.push(CallOutcome::Value(value)),
                Err(error) if strictness.is_strict() => return Err(error),
                Err(error) => {
                    tracing::warn!(
                        index,
                        method = call.method(),
                        %error,
                        "multicall_slot_undecodable"
                    );
                    outcomes.push(CallOutcome::Undecodable(error.to_string()));
                }
            }
        }

        let methods = batch
            .calls()
            .iter()
            .map(|call| call.method().to_string())
            .collect();
        Ok(BatchResults::new(block_number, methods, outcomes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::CallDescriptor;
    use crate::test_support::{address as addr, block_on_current_thread, uint, Reply, ScriptedLedger};
    use alloy_dyn_abi::DynSolValue;
    use alloy_primitives::U256;

    const AGGREGATOR: Address = Address::repeat_byte(0xa9);
    const TOKEN: Address = Address::repeat_byte(0x10);
    const VAULT: Address = Address::repeat_byte(0x20);

    fn client(ledger: ScriptedLedger) -> (Arc<ScriptedLedger>, AggregatorClient) {
        let ledger = Arc::new(ledger);
        let mut registry = AggregatorRegistry::empty();
        registry.set_address(31_337, AGGREGATOR);
        let client = AggregatorClient::new(ledger.clone(), 31_337, registry);
        (ledger, client)
    }

    fn call(target: Address, signature: &str, params: Vec<DynSolValue>) -> CallDescriptor {
        CallDescriptor::from_signature(target, signature, params).expect("descriptor should build")
    }

    fn ledger() -> ScriptedLedger {
        ScriptedLedger::new(AGGREGATOR)
            .returning(
                TOKEN,
                "function totalSupply() view returns (uint256)",
                vec![uint(U256::from(1_000u64))],
            )
            .returning(
                TOKEN,
                "function symbol() view returns (string)",
                vec![DynSolValue::String("THUSD".to_string())],
            )
            .on(
                VAULT,
                "function balanceOf(address) view returns (uint256)",
                |inputs| match inputs.first().and_then(DynSolValue::as_address) {
                    Some(owner) => Reply::Values(vec![uint(U256::from(owner.as_slice()[0]))]),
                    None => Reply::Revert,
                },
            )
            .reverting(VAULT, "function paused() view returns (bool)")
    }

    #[test]
    fn results_follow_descriptor_order() {
        let (ledger, client) = client(ledger());
        let batch = CallBatch::new()
            .with(call(
                VAULT,
                "function balanceOf(address) view returns (uint256)",
                vec![addr(Address::repeat_byte(7))],
            ))
            .with(call(TOKEN, "function symbol() view returns (string)", vec![]))
            .with(call(TOKEN, "function totalSupply() view returns (uint256)", vec![]))
            .with(call(
                VAULT,
                "function balanceOf(address) view returns (uint256)",
                vec![addr(Address::repeat_byte(3))],
            ));

        let results = block_on_current_thread(client.aggregate(&batch, Strictness::Strict))
            .expect("batch should succeed");
        assert_eq!(results.len(), 4);
        assert_eq!(results.uint(0), Ok(U256::from(7u8)));
        assert_eq!(
            results.value(1).expect("symbol decodes").as_str(),
            Some("THUSD")
        );
        assert_eq!(results.uint(2), Ok(U256::from(1_000u64)));
        assert_eq!(results.uint(3), Ok(U256::from(3u8)));
        assert_eq!(results.block_number(), U256::from(19_000_000u64));
        assert_eq!(ledger.round_trips(), 1);
    }

    #[test]
    fn strict_batch_with_a_revert_returns_no_partial_results() {
        let batch = CallBatch::new()
            .with(call(TOKEN, "function totalSupply() view returns (uint256)", vec![]))
            .with(call(VAULT, "function paused() view returns (bool)", vec![]));

        let (_, node_enforced) = client(ledger());
        let err = block_on_current_thread(node_enforced.aggregate(&batch, Strictness::Strict))
            .expect_err("strict revert must fail");
        assert_eq!(err, ClientError::execution_reverted("call 1 failed"));
        assert!(!err.is_transient());

        let (_, client_enforced) = client(ledger().ignoring_strict_flag());
        let err = block_on_current_thread(client_enforced.aggregate(&batch, Strictness::Strict))
            .expect_err("strict revert must fail");
        assert_eq!(
            err,
            ClientError::StrictRevert {
                index: 1,
                method: "paused".to_string()
            }
        );
    }

    #[test]
    fn lenient_batch_marks_failed_slots_absent() {
        let (_, client) = client(ledger().on(
            TOKEN,
            "function decimals() view returns (uint8)",
            |_| Reply::Raw(vec![0x01]),
        ));
        let batch = CallBatch::new()
            .with(call(VAULT, "function paused() view returns (bool)", vec![]))
            .with(call(TOKEN, "function decimals() view returns (uint8)", vec![]))
            .with(call(TOKEN, "function totalSupply() view returns (uint256)", vec![]));

        let results = block_on_current_thread(client.aggregate(&batch, Strictness::Lenient))
            .expect("lenient batch should succeed");
        assert_eq!(results.outcome(0), Some(&CallOutcome::Reverted));
        assert!(matches!(results.outcome(1), Some(CallOutcome::Undecodable(_))));
        assert_eq!(results.uint(2), Ok(U256::from(1_000u64)));
        assert!(matches!(
            results.uint(0),
            Err(ClientError::MissingResult { index: 0, .. })
        ));
    }

    #[test]
    fn configuration_errors_are_raised_before_any_round_trip() {
        let (ledger, client) = client(ledger());
        let err = block_on_current_thread(client.aggregate(&CallBatch::new(), Strictness::Lenient))
            .expect_err("empty batch is rejected");
        assert!(matches!(err, ClientError::Configuration(_)));

        let unknown_chain =
            AggregatorClient::new(ledger.clone(), 8_453, AggregatorRegistry::with_defaults());
        let batch = CallBatch::new()
            .with(call(TOKEN, "function totalSupply() view returns (uint256)", vec![]));
        let err = block_on_current_thread(unknown_chain.aggregate(&batch, Strictness::Lenient))
            .expect_err("missing aggregator is rejected");
        assert!(err.to_string().contains("chain 8453"));
        assert_eq!(ledger.round_trips(), 0);
    }

    #[test]
    fn registry_defaults_can_be_overridden() {
        let mut registry = AggregatorRegistry::with_defaults();
        assert_eq!(
            registry.address(1),
            Some(address!("5eb3fa2dfecdde21c950813c665e9364fa609bd2"))
        );
        assert_eq!(registry.address(1), registry.address(31_337));
        assert_eq!(registry.chain_ids().count(), 11);

        let previous = registry.set_address(1, AGGREGATOR);
        assert!(previous.is_some());
        assert_eq!(registry.address(1), Some(AGGREGATOR));
    }

    #[test]
    fn chain_id_falls_back_to_the_provider() {
        let ledger = ScriptedLedger::new(AGGREGATOR).with_chain_id(137);
        assert_eq!(block_on_current_thread(resolve_chain_id(&ledger, 0)), Ok(137));
        assert_eq!(block_on_current_thread(resolve_chain_id(&ledger, 1)), Ok(1));

        let client = block_on_current_thread(AggregatorClient::connect(
            Arc::new(ledger),
            0,
            AggregatorRegistry::with_defaults(),
        ))
        .expect("connect should resolve chain id");
        assert_eq!(client.chain_id(), 137);
    }
}
