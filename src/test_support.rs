use crate::domain::error::{ClientError, Result};
use crate::features::multicall::IMulticall;
use crate::features::rpc::EvmCallProvider;
use alloy_dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy_json_abi::Function;
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Drives a ledger future to completion on a fresh single-threaded runtime.
pub(crate) fn block_on_current_thread<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("test runtime should build")
        .block_on(future)
}

static HOST_ENV_LOCK: Mutex<()> = Mutex::new(());

/// Holds the process environment for one test. The listed variables are set
/// (or removed for `None`) until the guard drops, which puts back whatever
/// was there before, even when the test panics.
pub(crate) struct HostEnvGuard {
    previous: Vec<(String, Option<String>)>,
    _lock: MutexGuard<'static, ()>,
}

pub(crate) fn lock_host_env(vars: &[(&str, Option<&str>)]) -> HostEnvGuard {
    let lock = HOST_ENV_LOCK
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    let previous = vars
        .iter()
        .map(|(name, _)| ((*name).to_string(), std::env::var(name).ok()))
        .collect();
    for (name, value) in vars {
        apply_env(name, *value);
    }
    HostEnvGuard {
        previous,
        _lock: lock,
    }
}

impl Drop for HostEnvGuard {
    fn drop(&mut self) {
        for (name, value) in &self.previous {
            apply_env(name, value.as_deref());
        }
    }
}

#[allow(unused_unsafe)]
fn apply_env(name: &str, value: Option<&str>) {
    // edition 2024 marks these unsafe; the lock serialises every caller
    match value {
        Some(value) => unsafe { std::env::set_var(name, value) },
        None => unsafe { std::env::remove_var(name) },
    }
}

pub(crate) enum Reply {
    Values(Vec<DynSolValue>),
    /// Bytes returned verbatim, for malformed-output cases.
    Raw(Vec<u8>),
    Revert,
}

type Responder = Box<dyn Fn(&[DynSolValue]) -> Reply + Send + Sync>;

struct Handler {
    target: Address,
    function: Function,
    respond: Responder,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct RecordedCall {
    pub target: Address,
    pub method: String,
    pub inputs: Vec<DynSolValue>,
}

/// In-memory ledger behind a single aggregator. Each inner call is answered by
/// the handler registered for its target and selector; unknown calls revert.
pub(crate) struct ScriptedLedger {
    aggregator: Address,
    chain_id: u64,
    block_number: u64,
    block_timestamp: u64,
    honours_strict_flag: bool,
    handlers: Vec<Handler>,
    recorded: Mutex<Vec<RecordedCall>>,
    round_trips: AtomicUsize,
}

impl ScriptedLedger {
    pub fn new(aggregator: Address) -> Self {
        Self {
            aggregator,
            chain_id: 31_337,
            block_number: 19_000_000,
            block_timestamp: 1_700_000_000,
            honours_strict_flag: true,
            handlers: Vec::new(),
            recorded: Mutex::new(Vec::new()),
            round_trips: AtomicUsize::new(0),
        }
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn with_block_timestamp(mut self, block_timestamp: u64) -> Self {
        self.block_timestamp = block_timestamp;
        self
    }

    /// Answers strict batches slot by slot instead of reverting the whole call.
    pub fn ignoring_strict_flag(mut self) -> Self {
        self.honours_strict_flag = false;
        self
    }

    pub fn on(
        mut self,
        target: Address,
        signature: &str,
        respond: impl Fn(&[DynSolValue]) -> Reply + Send + Sync + 'static,
    ) -> Self {
        let function = Function::parse(signature).expect("test fragment should parse");
        self.handlers.push(Handler {
            target,
            function,
            respond: Box::new(respond),
        });
        self
    }

    pub fn returning(self, target: Address, signature: &str, values: Vec<DynSolValue>) -> Self {
        self.on(target, signature, move |_| Reply::Values(values.clone()))
    }

    pub fn reverting(self, target: Address, signature: &str) -> Self {
        self.on(target, signature, |_| Reply::Revert)
    }

    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.recorded.lock().expect("recorded calls lock").clone()
    }

    pub fn inputs_of(&self, method: &str) -> Vec<Vec<DynSolValue>> {
        self.recorded_calls()
            .into_iter()
            .filter(|call| call.method == method)
            .map(|call| call.inputs)
            .collect()
    }

    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::SeqCst)
    }

    fn answer(&self, call: &IMulticall::Call) -> (bool, Vec<u8>) {
        let data = call.callData.as_ref();
        if data.len() < 4 {
            return (false, Vec::new());
        }
        let Some(handler) = self.handlers.iter().find(|handler| {
            handler.target == call.target && handler.function.selector().as_slice() == &data[..4]
        }) else {
            return (false, Vec::new());
        };
        let inputs = handler
            .function
            .abi_decode_input(&data[4..], true)
            .expect("scripted call inputs should decode");
        self.recorded
            .lock()
            .expect("recorded calls lock")
            .push(RecordedCall {
                target: call.target,
                method: handler.function.name.clone(),
                inputs: inputs.clone(),
            });
        match (handler.respond)(&inputs) {
            Reply::Values(values) => (
                true,
                handler
                    .function
                    .abi_encode_output(&values)
                    .expect("scripted outputs should match the fragment"),
            ),
            Reply::Raw(bytes) => (true, bytes),
            Reply::Revert => (false, Vec::new()),
        }
    }
}

#[async_trait]
impl EvmCallProvider for ScriptedLedger {
    async fn eth_call(&self, to: Address, calldata: &[u8]) -> Result<Bytes> {
        self.round_trips.fetch_add(1, Ordering::SeqCst);
        if to != self.aggregator {
            return Err(ClientError::transport(format!(
                "no contract deployed at {to}"
            )));
        }
        let request = IMulticall::aggregateCall::abi_decode(calldata, true)
            .map_err(|error| ClientError::transport(format!("bad aggregate calldata: {error}")))?;

        let mut responses = Vec::with_capacity(request.calls.len());
        for (index, call) in request.calls.iter().enumerate() {
            let (success, data) = self.answer(call);
            if !success && request.strict && self.honours_strict_flag {
                return Err(ClientError::execution_reverted(format!(
                    "call {index} failed"
                )));
            }
            responses.push(IMulticall::CallResponse {
                success,
                returnData: Bytes::from(data),
            });
        }
        Ok(Bytes::from(IMulticall::aggregateCall::abi_encode_returns(&(
            U256::from(self.block_number),
            responses,
        ))))
    }

    async fn latest_block_timestamp(&self) -> Result<u64> {
        Ok(self.block_timestamp)
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(self.chain_id)
    }
}

pub(crate) fn uint(value: U256) -> DynSolValue {
    DynSolValue::Uint(value, 256)
}

pub(crate) fn address(value: Address) -> DynSolValue {
    DynSolValue::Address(value)
}
