use crate::config::ClientConfig;
use crate::domain::error::{ClientError, Result};
use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::io::Read;

pub const MAX_EVM_RPC_RESPONSE_BYTES: u64 = 2 * 1024 * 1024;
pub const MIN_EVM_RPC_RESPONSE_BYTES: u64 = 256;
const CONTROL_PLANE_MAX_RESPONSE_BYTES: u64 = 4 * 1024;

/// The ledger as seen through JSON-RPC reads.
#[async_trait]
pub trait EvmCallProvider: Send + Sync {
    async fn eth_call(&self, to: Address, calldata: &[u8]) -> Result<Bytes>;
    async fn latest_block_timestamp(&self) -> Result<u64>;
    async fn chain_id(&self) -> Result<u64>;
}

/// JSON-RPC over blocking HTTP. Each request runs on tokio's blocking pool,
/// so the client must be driven from inside a tokio runtime.
#[derive(Clone, Debug)]
pub struct HttpEvmRpcClient {
    rpc_url: String,
    fallback_rpc_url: Option<String>,
    max_response_bytes: u64,
}

impl HttpEvmRpcClient {
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let rpc_url = config.rpc_url.trim();
        if rpc_url.is_empty() {
            return Err(ClientError::configuration("evm rpc url is not configured"));
        }
        Ok(Self {
            rpc_url: rpc_url.to_string(),
            fallback_rpc_url: config
                .rpc_fallback_url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string),
            max_response_bytes: clamp_response_bytes(config.rpc_max_response_bytes),
        })
    }

    fn control_plane_max_response_bytes(&self) -> u64 {
        CONTROL_PLANE_MAX_RESPONSE_BYTES
    }

    async fn rpc_call(
        &self,
        method: &str,
        params: Value,
        max_response_bytes: u64,
    ) -> Result<Value> {
        let body = serde_json::to_vec(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .map_err(|error| {
            ClientError::configuration(format!("failed to serialize {method} request: {error}"))
        })?;

        let raw = self
            .http_post(body, max_response_bytes)
            .await
            .map_err(|error| ClientError::transport(format!("{method} failed: {error}")))?;
        let value: Value = serde_json::from_slice(&raw).map_err(|error| {
            ClientError::transport(format!("failed to parse {method} response JSON: {error}"))
        })?;
        if let Some(error) = value.get("error") {
            return Err(rpc_error(method, error));
        }
        value
            .get("result")
            .cloned()
            .ok_or_else(|| ClientError::transport(format!("{method} result was missing")))
    }

    async fn http_post(
        &self,
        body: Vec<u8>,
        max_response_bytes: u64,
    ) -> std::result::Result<Vec<u8>, String> {
        let client = self.clone();
        tokio::task::spawn_blocking(move || client.post_blocking(&body, max_response_bytes))
            .await
            .map_err(|error| format!("rpc worker failed: {error}"))?
    }

    fn post_blocking(
        &self,
        body: &[u8],
        max_response_bytes: u64,
    ) -> std::result::Result<Vec<u8>, String> {
        let normalized_max = clamp_response_bytes(max_response_bytes);
        match self.try_http_post(&self.rpc_url, body, normalized_max) {
            Ok(body) => Ok(body),
            Err(primary_error) => {
                if let Some(fallback_url) = self.fallback_rpc_url.as_deref() {
                    tracing::warn!(error = %primary_error, "primary rpc failed, trying fallback");
                    self.try_http_post(fallback_url, body, normalized_max)
                        .map_err(|fallback_error| {
                            format!(
                                "primary rpc failed: {primary_error}; fallback rpc failed: {fallback_error}"
                            )
                        })
                } else {
                    Err(primary_error)
                }
            }
        }
    }

    fn try_http_post(
        &self,
        url: &str,
        body: &[u8],
        max_response_bytes: u64,
    ) -> std::result::Result<Vec<u8>, String> {
        let response = ureq::post(url)
            .set("content-type", "application/json")
            .send_bytes(body)
            .map_err(|error| match error {
                ureq::Error::Status(status, _) => format!("evm rpc returned status {status}"),
                ureq::Error::Transport(transport) => {
                    format!("evm rpc transport failed: {transport}")
                }
            })?;

        let mut raw = Vec::new();
        response
            .into_reader()
            .take(max_response_bytes.saturating_add(1))
            .read_to_end(&mut raw)
            .map_err(|error| format!("failed to read rpc response body: {error}"))?;
        if u64::try_from(raw.len()).unwrap_or(u64::MAX) > max_response_bytes {
            return Err(format!(
                "rpc response exceeded max_response_bytes={max_response_bytes}"
            ));
        }
        Ok(raw)
    }
}

#[async_trait]
impl EvmCallProvider for HttpEvmRpcClient {
    async fn eth_call(&self, to: Address, calldata: &[u8]) -> Result<Bytes> {
        let result = self
            .rpc_call(
                "eth_call",
                json!([
                    {"to": to.to_string(), "data": format!("0x{}", hex::encode(calldata))},
                    "latest"
                ]),
                self.max_response_bytes,
            )
            .await?;
        let raw = result
            .as_str()
            .ok_or_else(|| ClientError::transport("eth_call result was not a string"))?;
        decode_hex_blob(raw, "eth_call result").map_err(ClientError::transport)
    }

    async fn latest_block_timestamp(&self) -> Result<u64> {
        let block = self
            .rpc_call(
                "eth_getBlockByNumber",
                json!(["latest", false]),
                self.max_response_bytes,
            )
            .await?;
        let raw = block
            .get("timestamp")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::transport("latest block timestamp was missing"))?;
        parse_hex_u64(raw, "timestamp").map_err(ClientError::transport)
    }

    async fn chain_id(&self) -> Result<u64> {
        let result = self
            .rpc_call(
                "eth_chainId",
                json!([]),
                self.control_plane_max_response_bytes(),
            )
            .await?;
        let raw = result
            .as_str()
            .ok_or_else(|| ClientError::transport("eth_chainId result was not a string"))?;
        parse_hex_u64(raw, "eth_chainId").map_err(ClientError::transport)
    }
}

/// Code 3 is the node's "execution reverted" answer to `eth_call`; older nodes
/// only say so in the message.
fn rpc_error(method: &str, error: &Value) -> ClientError {
    let code = error.get("code").and_then(Value::as_i64);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if code == Some(3) || message.to_ascii_lowercase().contains("revert") {
        return ClientError::execution_reverted(format!("{method}: {message}"));
    }
    ClientError::transport(format!("rpc returned error for {method}: {error}"))
}

pub(crate) fn clamp_response_bytes(max_response_bytes: u64) -> u64 {
    max_response_bytes.clamp(MIN_EVM_RPC_RESPONSE_BYTES, MAX_EVM_RPC_RESPONSE_BYTES)
}

fn parse_hex_u64(raw: &str, field: &str) -> std::result::Result<u64, String> {
    let value = raw.trim();
    let without_prefix = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| format!("{field} must be 0x-prefixed hex"))?;
    u64::from_str_radix(without_prefix, 16)
        .map_err(|error| format!("failed to parse {field} as hex u64: {error}"))
}

fn decode_hex_blob(raw: &str, field: &str) -> std::result::Result<Bytes, String> {
    let trimmed = raw.trim();
    let without_prefix = trimmed
        .strip_prefix("0x")
        .ok_or_else(|| format!("{field} must be 0x-prefixed hex"))?;
    if without_prefix.len() % 2 != 0 {
        return Err(format!("{field} hex length must be even"));
    }
    hex::decode(without_prefix)
        .map(Bytes::from)
        .map_err(|error| format!("{field} must be valid hex: {error}"))
}
