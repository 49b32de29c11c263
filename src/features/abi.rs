use crate::domain::error::{ClientError, Result};
use crate::domain::types::{CallDescriptor, DecodedValue};
use alloy_dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy_json_abi::{Function, JsonAbi};
use alloy_primitives::Address;
use serde_json::Value;

impl CallDescriptor {
    /// Builds a descriptor from a human-readable fragment such as
    /// `function getPrev(address) view returns (address)`.
    pub fn from_signature(
        target: Address,
        signature: &str,
        params: Vec<DynSolValue>,
    ) -> Result<Self> {
        let function = parse_fragment(signature)?;
        Self::new(target, function, params)
    }

    /// Builds a descriptor from a JSON ABI document, picking the first
    /// function named `method`.
    pub fn from_abi_json(
        target: Address,
        abi_json: &str,
        method: &str,
        params: Vec<DynSolValue>,
    ) -> Result<Self> {
        let function = find_function(abi_json, method)?;
        Self::new(target, function, params)
    }

    /// `selector ‖ abi.encode(params)`, type-checked against the fragment.
    pub fn calldata(&self) -> Result<Vec<u8>> {
        self.function()
            .abi_encode_input(self.params())
            .map_err(|error| {
                ClientError::configuration(format!(
                    "failed to encode {} parameters: {error}",
                    self.function().signature()
                ))
            })
    }

    /// Decodes raw return bytes with this descriptor's output schema.
    pub fn decode_output(&self, data: &[u8]) -> Result<DecodedValue> {
        let outputs = self
            .function()
            .abi_decode_output(data, true)
            .map_err(|error| ClientError::decode(self.method(), error))?;
        Ok(DecodedValue::from_outputs(
            outputs,
            self.output_schema().len(),
        ))
    }
}

pub fn parse_fragment(signature: &str) -> Result<Function> {
    let trimmed = signature.trim();
    if trimmed.is_empty() {
        return Err(ClientError::configuration(
            "function fragment must be non-empty",
        ));
    }
    Function::parse(trimmed).map_err(|error| {
        ClientError::configuration(format!("invalid function fragment `{trimmed}`: {error}"))
    })
}

pub fn find_function(abi_json: &str, method: &str) -> Result<Function> {
    let method = method.trim();
    if method.is_empty() {
        return Err(ClientError::configuration("method name must be non-empty"));
    }
    let abi = decode_abi_document(abi_json)?;
    abi.function(method)
        .and_then(|overloads| overloads.first())
        .cloned()
        .ok_or_else(|| ClientError::configuration(format!("abi does not declare function {method}")))
}

/// Accepts a bare ABI array or a build artifact carrying an `abi` array.
fn decode_abi_document(abi_json: &str) -> Result<JsonAbi> {
    let value: Value = serde_json::from_str(abi_json)
        .map_err(|error| ClientError::configuration(format!("invalid abi json: {error}")))?;
    let entries = if value.is_array() {
        value
    } else if let Some(array) = value.get("abi") {
        array.clone()
    } else {
        return Err(ClientError::configuration(
            "abi json must be an array or object containing an `abi` array",
        ));
    };
    serde_json::from_value(entries)
        .map_err(|error| ClientError::configuration(format!("invalid abi format: {error}")))
}
