//! Batched EVM reads through an aggregator contract, and insert-position hints
//! for the sorted trove list of a CDP ledger.
//!
//! [`AggregatorClient`] turns a [`CallBatch`] into one `eth_call` and decodes
//! every slot with its own ABI fragment. [`HintResolver`] builds on it to
//! predict a trove's nominal ratio after an operation and find its neighbours
//! in the list.

pub mod config;
pub mod domain;
pub mod features;
pub mod timing;

#[cfg(test)]
mod test_support;

pub use crate::config::{ClientConfig, ProtocolAddresses};
pub use crate::domain::error::{ClientError, Result};
pub use crate::domain::fee_decay::{decayed_rate, FeeSchedule, SystemBalances};
pub use crate::domain::normalize::{normalize, normalize_unsigned};
pub use crate::domain::position::{
    Hints, OperationDeltas, PositionSnapshot, ProjectedState, RedemptionHints,
};
pub use crate::domain::types::{
    BatchResults, CallBatch, CallDescriptor, CallOutcome, CallResult, DecodedValue, Strictness,
};
pub use crate::features::{
    poll_until_ok, poll_with_limit, resolve_chain_id, AggregatorClient, AggregatorRegistry,
    EvmCallProvider, HintResolver, HttpEvmRpcClient, TroveRefs,
};
