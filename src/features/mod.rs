pub mod abi;
pub mod hints;
pub mod multicall;
pub mod polling;
pub mod rpc;

pub use hints::{HintResolver, TroveRefs};
pub use multicall::{resolve_chain_id, AggregatorClient, AggregatorRegistry};
pub use polling::{poll_until_ok, poll_with_limit};
pub use rpc::{EvmCallProvider, HttpEvmRpcClient};
