use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, Bytes, I256, U256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use std::sync::Arc;
use trove_hints::domain::fee_decay::MINUTE_DECAY_FACTOR;
use trove_hints::{
    decayed_rate, normalize, normalize_unsigned, AggregatorClient, AggregatorRegistry, CallBatch,
    CallDescriptor, ClientConfig, ClientError, EvmCallProvider, HintResolver, HttpEvmRpcClient,
    Strictness,
};

sol! {
    interface IAggregator {
        struct Call {
            address target;
            bytes callData;
        }

        struct Response {
            bool success;
            bytes returnData;
        }

        function aggregate(Call[] calls, bool strict)
            external
            view
            returns (uint256 blockNumber, Response[] returnData);
    }
}

const AGGREGATOR: Address = Address::repeat_byte(0xaa);

/// Answers every inner call with its target's first byte as a uint256; calls
/// to `Address::repeat_byte(0xdd)` fail.
struct EchoLedger;

#[async_trait]
impl EvmCallProvider for EchoLedger {
    async fn eth_call(&self, to: Address, calldata: &[u8]) -> trove_hints::Result<Bytes> {
        assert_eq!(to, AGGREGATOR);
        let request = IAggregator::aggregateCall::abi_decode(calldata, true)
            .map_err(|error| ClientError::transport(error.to_string()))?;
        let responses = request
            .calls
            .iter()
            .map(|call| {
                let failing = call.target == Address::repeat_byte(0xdd);
                IAggregator::Response {
                    success: !failing,
                    returnData: if failing {
                        Bytes::new()
                    } else {
                        Bytes::from(
                            DynSolValue::Uint(U256::from(call.target.as_slice()[0]), 256)
                                .abi_encode(),
                        )
                    },
                }
            })
            .collect::<Vec<_>>();
        Ok(Bytes::from(IAggregator::aggregateCall::abi_encode_returns(&(
            U256::from(42u8),
            responses,
        ))))
    }

    async fn latest_block_timestamp(&self) -> trove_hints::Result<u64> {
        Ok(1_700_000_000)
    }

    async fn chain_id(&self) -> trove_hints::Result<u64> {
        Ok(10)
    }
}

fn total_supply(target: Address) -> CallDescriptor {
    CallDescriptor::from_signature(
        target,
        "function totalSupply() view returns (uint256)",
        vec![],
    )
    .expect("descriptor should build")
}

async fn client() -> AggregatorClient {
    let mut registry = AggregatorRegistry::empty();
    registry.set_address(10, AGGREGATOR);
    AggregatorClient::connect(Arc::new(EchoLedger), 0, registry)
        .await
        .expect("chain id resolves from the provider")
}

#[tokio::test]
async fn aggregate_preserves_order_across_targets() {
    let client = client().await;
    let batch: CallBatch = [0x03, 0x01, 0x02]
        .into_iter()
        .map(|byte| total_supply(Address::repeat_byte(byte)))
        .collect();

    let results = client
        .aggregate(&batch, Strictness::Strict)
        .await
        .expect("batch should succeed");
    let values: Vec<U256> = (0..results.len())
        .map(|index| results.uint(index).expect("slot present"))
        .collect();
    assert_eq!(
        values,
        vec![U256::from(3u8), U256::from(1u8), U256::from(2u8)]
    );
    assert_eq!(results.block_number(), U256::from(42u8));
}

#[tokio::test]
async fn lenient_and_strict_modes_differ_only_on_failure() {
    let client = client().await;
    let batch = CallBatch::new()
        .with(total_supply(Address::repeat_byte(0x05)))
        .with(total_supply(Address::repeat_byte(0xdd)));

    let lenient = client
        .aggregate(&batch, Strictness::Lenient)
        .await
        .expect("lenient batch succeeds");
    assert_eq!(lenient.uint(0), Ok(U256::from(5u8)));
    assert!(lenient.uint(1).is_err());

    let strict = client.aggregate(&batch, Strictness::Strict).await;
    assert!(matches!(
        strict,
        Err(ClientError::StrictRevert { index: 1, .. })
    ));
}

#[tokio::test]
async fn resolver_without_an_rpc_url_is_a_configuration_error() {
    let config = ClientConfig::from_json_str(r#"{"chain_id": 1}"#).expect("config parses");
    assert!(matches!(
        HttpEvmRpcClient::from_config(&config),
        Err(ClientError::Configuration(_))
    ));
    assert!(matches!(
        HintResolver::from_config(&config).await,
        Err(ClientError::Configuration(_))
    ));
}

#[test]
fn display_helpers_truncate() {
    assert_eq!(
        normalize_unsigned(U256::from(1_999_999_999_999_999_999u128), 2),
        1.99
    );
    assert_eq!(
        normalize(I256::try_from(-2_500_000_000_000_000_000i128).expect("fits"), 1),
        -2.5
    );
}

#[test]
fn decayed_rate_is_public_and_pure() {
    let one_percent = U256::from(10_000_000_000_000_000u64);
    let rate = decayed_rate(
        1_000,
        0,
        1_000,
        MINUTE_DECAY_FACTOR,
        one_percent,
        one_percent,
        U256::from(50_000_000_000_000_000u64),
        false,
    );
    assert_eq!(rate, one_percent * U256::from(2u8));
    let later = decayed_rate(
        1_000,
        3_600,
        1_000,
        MINUTE_DECAY_FACTOR,
        one_percent,
        one_percent,
        U256::from(50_000_000_000_000_000u64),
        false,
    );
    assert!(later < rate && later > one_percent);
}
