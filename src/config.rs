use crate::domain::error::{ClientError, Result};
use crate::features::multicall::AggregatorRegistry;
use alloy_primitives::Address;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::str::FromStr;

pub const CHAIN_ID_ENV: &str = "TROVE_HINTS_CHAIN_ID";
pub const RPC_URL_ENV: &str = "TROVE_HINTS_RPC_URL";
pub const RPC_FALLBACK_URL_ENV: &str = "TROVE_HINTS_RPC_FALLBACK_URL";
pub const HINT_HELPERS_ENV: &str = "TROVE_HINTS_HINT_HELPERS";
pub const BORROWER_OPERATIONS_ENV: &str = "TROVE_HINTS_BORROWER_OPERATIONS";

pub const DEFAULT_RPC_MAX_RESPONSE_BYTES: u64 = 256 * 1024;

/// Contracts the hint engine talks to besides the per-collateral trove manager
/// and sorted list.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProtocolAddresses {
    pub hint_helpers: Address,
    pub borrower_operations: Address,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    /// Zero means "ask the provider".
    pub chain_id: u64,
    pub rpc_url: String,
    pub rpc_fallback_url: Option<String>,
    pub rpc_max_response_bytes: u64,
    pub aggregator_overrides: BTreeMap<u64, Address>,
    pub protocol: ProtocolAddresses,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            chain_id: 0,
            rpc_url: String::new(),
            rpc_fallback_url: None,
            rpc_max_response_bytes: DEFAULT_RPC_MAX_RESPONSE_BYTES,
            aggregator_overrides: BTreeMap::new(),
            protocol: ProtocolAddresses::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|error| ClientError::configuration(format!("invalid config json: {error}")))
    }

    /// Reads the `TROVE_HINTS_*` variables; unset ones keep their defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = env_value(CHAIN_ID_ENV) {
            config.chain_id = raw.parse::<u64>().map_err(|error| {
                ClientError::configuration(format!("{CHAIN_ID_ENV} must be a u64: {error}"))
            })?;
        }
        if let Some(url) = env_value(RPC_URL_ENV) {
            config.rpc_url = url;
        }
        config.rpc_fallback_url = env_value(RPC_FALLBACK_URL_ENV);
        if let Some(raw) = env_value(HINT_HELPERS_ENV) {
            config.protocol.hint_helpers = parse_address(HINT_HELPERS_ENV, &raw)?;
        }
        if let Some(raw) = env_value(BORROWER_OPERATIONS_ENV) {
            config.protocol.borrower_operations = parse_address(BORROWER_OPERATIONS_ENV, &raw)?;
        }
        Ok(config)
    }

    /// Built-in aggregator deployments with this config's overrides applied.
    pub fn aggregator_registry(&self) -> AggregatorRegistry {
        let mut registry = AggregatorRegistry::with_defaults();
        for (chain_id, aggregator) in &self.aggregator_overrides {
            registry.set_address(*chain_id, *aggregator);
        }
        registry
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_address(field: &str, raw: &str) -> Result<Address> {
    Address::from_str(raw)
        .map_err(|error| ClientError::configuration(format!("{field} is not an address: {error}")))
}
