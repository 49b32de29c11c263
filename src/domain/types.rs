use crate::domain::error::{ClientError, Result};
use alloy_dyn_abi::DynSolValue;
use alloy_json_abi::{Function, Param};
use alloy_primitives::{Address, Bytes, U256};

/// One read against one contract. The function fragment doubles as the
/// output schema used to decode the aggregator's raw bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct CallDescriptor {
    target: Address,
    function: Function,
    params: Vec<DynSolValue>,
}

impl CallDescriptor {
    pub fn new(target: Address, function: Function, params: Vec<DynSolValue>) -> Result<Self> {
        if target == Address::ZERO {
            return Err(ClientError::configuration(format!(
                "call target for {} must be a non-zero address",
                function.name
            )));
        }
        if params.len() != function.inputs.len() {
            return Err(ClientError::configuration(format!(
                "{} expects {} parameters, got {}",
                function.name,
                function.inputs.len(),
                params.len()
            )));
        }
        Ok(Self {
            target,
            function,
            params,
        })
    }

    pub fn target(&self) -> Address {
        self.target
    }

    pub fn method(&self) -> &str {
        &self.function.name
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    pub fn params(&self) -> &[DynSolValue] {
        &self.params
    }

    pub fn output_schema(&self) -> &[Param] {
        &self.function.outputs
    }
}

/// Ordered calls for one round trip. Response N belongs to descriptor N.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallBatch {
    calls: Vec<CallDescriptor>,
}

impl CallBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, call: CallDescriptor) -> usize {
        self.calls.push(call);
        self.calls.len() - 1
    }

    pub fn with(mut self, call: CallDescriptor) -> Self {
        self.calls.push(call);
        self
    }

    pub fn calls(&self) -> &[CallDescriptor] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

impl FromIterator<CallDescriptor> for CallBatch {
    fn from_iter<I: IntoIterator<Item = CallDescriptor>>(iter: I) -> Self {
        Self {
            calls: iter.into_iter().collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strictness {
    /// Any reverting call fails the whole batch.
    Strict,
    /// Reverting calls leave their slot empty.
    Lenient,
}

impl Strictness {
    pub fn is_strict(self) -> bool {
        matches!(self, Self::Strict)
    }
}

/// Raw `(success, data)` element of the aggregator's return array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallResult {
    pub success: bool,
    pub return_data: Bytes,
}

/// A single declared output unwraps to `Scalar`; more become a positional `Tuple`.
#[derive(Clone, Debug, PartialEq)]
pub enum DecodedValue {
    Scalar(DynSolValue),
    Tuple(Vec<DynSolValue>),
}

impl DecodedValue {
    pub fn from_outputs(mut outputs: Vec<DynSolValue>, declared_arity: usize) -> Self {
        if declared_arity == 1 && outputs.len() == 1 {
            return Self::Scalar(outputs.remove(0));
        }
        Self::Tuple(outputs)
    }

    pub fn as_scalar(&self) -> Option<&DynSolValue> {
        match self {
            Self::Scalar(value) => Some(value),
            Self::Tuple(_) => None,
        }
    }

    pub fn as_uint(&self) -> Option<U256> {
        self.as_scalar()
            .and_then(DynSolValue::as_uint)
            .map(|(value, _)| value)
    }

    pub fn as_address(&self) -> Option<Address> {
        self.as_scalar().and_then(DynSolValue::as_address)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_scalar().and_then(DynSolValue::as_bool)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(DynSolValue::as_str)
    }

    /// Positional field of a multi-output result or of a single returned struct.
    pub fn field(&self, index: usize) -> Option<&DynSolValue> {
        match self {
            Self::Tuple(values) => values.get(index),
            Self::Scalar(value) => value.as_tuple().and_then(|values| values.get(index)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CallOutcome {
    Value(DecodedValue),
    Reverted,
    /// The call succeeded but its bytes did not match the declared schema.
    Undecodable(String),
}

/// Decoded slots of one batch, in descriptor order.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchResults {
    block_number: U256,
    methods: Vec<String>,
    outcomes: Vec<CallOutcome>,
}

impl BatchResults {
    pub fn new(block_number: U256, methods: Vec<String>, outcomes: Vec<CallOutcome>) -> Self {
        Self {
            block_number,
            methods,
            outcomes,
        }
    }

    pub fn block_number(&self) -> U256 {
        self.block_number
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn outcomes(&self) -> &[CallOutcome] {
        &self.outcomes
    }

    pub fn outcome(&self, index: usize) -> Option<&CallOutcome> {
        self.outcomes.get(index)
    }

    fn method(&self, index: usize) -> String {
        self.methods
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("call#{index}"))
    }

    /// The decoded slot, or `MissingResult` when it reverted or did not decode.
    pub fn value(&self, index: usize) -> Result<&DecodedValue> {
        match self.outcomes.get(index) {
            Some(CallOutcome::Value(value)) => Ok(value),
            _ => Err(ClientError::MissingResult {
                index,
                method: self.method(index),
            }),
        }
    }

    pub fn uint(&self, index: usize) -> Result<U256> {
        self.value(index)?
            .as_uint()
            .ok_or_else(|| ClientError::decode(self.method(index), "expected a uint output"))
    }

    pub fn address(&self, index: usize) -> Result<Address> {
        self.value(index)?
            .as_address()
            .ok_or_else(|| ClientError::decode(self.method(index), "expected an address output"))
    }

    pub fn uint_field(&self, index: usize, field: usize) -> Result<U256> {
        self.value(index)?
            .field(field)
            .and_then(DynSolValue::as_uint)
            .map(|(value, _)| value)
            .ok_or_else(|| {
                ClientError::decode(self.method(index), format!("field {field} is not a uint"))
            })
    }

    pub fn address_field(&self, index: usize, field: usize) -> Result<Address> {
        self.value(index)?
            .field(field)
            .and_then(DynSolValue::as_address)
            .ok_or_else(|| {
                ClientError::decode(
                    self.method(index),
                    format!("field {field} is not an address"),
                )
            })
    }

    pub fn uint_array_field(&self, index: usize, field: usize) -> Result<Vec<U256>> {
        let method = self.method(index);
        let items = self
            .value(index)?
            .field(field)
            .and_then(DynSolValue::as_array)
            .ok_or_else(|| ClientError::decode(&method, format!("field {field} is not an array")))?;
        items
            .iter()
            .map(|item| {
                item.as_uint()
                    .map(|(value, _)| value)
                    .ok_or_else(|| ClientError::decode(&method, "array item is not a uint"))
            })
            .collect()
    }

    /// Slots as options, dropping the failure detail.
    pub fn into_values(self) -> Vec<Option<DecodedValue>> {
        self.outcomes
            .into_iter()
            .map(|outcome| match outcome {
                CallOutcome::Value(value) => Some(value),
                CallOutcome::Reverted | CallOutcome::Undecodable(_) => None,
            })
            .collect()
    }
}
