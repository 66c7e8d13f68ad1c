use crate::call_type::CallType;
use ethereum_types::{Address, H256, U256};
use parity_bytes::Bytes;
use std::sync::Arc;

/// Where a call's endowment comes from: a normal transfer, or (for
/// `CALLCODE`/`DELEGATECALL`) apparent only — no balance actually moves.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ActionValue {
    Transfer(U256),
    Apparent(U256),
}

impl ActionValue {
    pub fn value(&self) -> U256 {
        match *self {
            ActionValue::Transfer(v) | ActionValue::Apparent(v) => v,
        }
    }

    pub fn transfer(value: U256) -> Self {
        ActionValue::Transfer(value)
    }

    pub fn apparent(value: U256) -> Self {
        ActionValue::Apparent(value)
    }
}

/// Whether the code being run is the callee's own code (`Separate`,
/// looked up by `code_address`) or code injected by the caller
/// (`Embedded` — the initcode of a pending `CREATE`).
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ParamsType {
    Separate,
    Embedded,
}

/// Everything one execution frame (a call or creation) needs in order to
/// run: the addresses involved, the code and its hash, the endowment, the
/// call data, and how it was invoked.
#[derive(Debug, Clone)]
pub struct ActionParams {
    pub code_address: Address,
    pub address: Address,
    pub sender: Address,
    pub origin: Address,
    pub gas: U256,
    pub gas_price: U256,
    pub value: ActionValue,
    pub code: Option<Arc<Bytes>>,
    pub code_hash: Option<H256>,
    pub data: Option<Bytes>,
    pub call_type: CallType,
    pub params_type: ParamsType,
}

impl Default for ActionParams {
    fn default() -> Self {
        ActionParams {
            code_address: Address::zero(),
            address: Address::zero(),
            sender: Address::zero(),
            origin: Address::zero(),
            gas: U256::zero(),
            gas_price: U256::zero(),
            value: ActionValue::Transfer(U256::zero()),
            code: None,
            code_hash: None,
            data: None,
            call_type: CallType::None,
            params_type: ParamsType::Separate,
        }
    }
}
