use alloy_primitives::U256;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Rejected before any network traffic; retrying cannot help.
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("transport error: {0}")]
    Transport(String),
    /// The node rejected the whole `eth_call` because it reverted. Repeating
    /// the same call against the same state reverts again.
    #[error("execution reverted: {0}")]
    ExecutionReverted(String),
    #[error("call {index} ({method}) reverted in a strict batch")]
    StrictRevert { index: usize, method: String },
    #[error("failed to decode result of {method}: {reason}")]
    Decode { method: String, reason: String },
    #[error("result {index} ({method}) is unavailable")]
    MissingResult { index: usize, method: String },
    #[error(
        "trove's debt might fall below {minimum} within {tolerance_minutes} minutes (projected {projected})"
    )]
    DebtBelowMinimum {
        minimum: U256,
        projected: U256,
        tolerance_minutes: u64,
    },
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl ClientError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn decode(method: impl Into<String>, reason: impl ToString) -> Self {
        Self::Decode {
            method: method.into(),
            reason: reason.to_string(),
        }
    }

    pub fn execution_reverted(message: impl Into<String>) -> Self {
        Self::ExecutionReverted(message.into())
    }

    /// Polling readers retry the whole batch on these. Reverts of a strict
    /// batch are final; a lenient slot that reverted is retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::MissingResult { .. })
    }
}
