//! Drives the account repository and the interpreter through one call or
//! creation frame (§4.10, §4.11), and the top-level per-transaction entry
//! point (§2 item 13, "transact").

use std::collections::HashMap;
use std::sync::Arc;

use ethereum_types::{Address, H256, U256};
use ethcore_builtin::Builtin;
use evm::{Interpreter, Outcome};
use keccak_hasher::KECCAK_EMPTY;
use log::trace;
use parity_bytes::BytesRef;
use vm::{
    ActionParams, ActionValue, CallResult, CallType, CreateContractAddress, CreateResult, EnvInfo,
    ParamsType, Schedule, STACK_DEPTH_LIMIT,
};

use crate::error::{ExecutionError, Result};
use crate::externalities::Externalities;
use crate::state::{Backend, LogEntry, State, Substate};

/// The block context and active hardfork schedule, threaded unchanged
/// through every nested call/creation of a transaction.
#[derive(Clone, Copy)]
pub struct ExecutionConfig<'a> {
    pub info: &'a EnvInfo,
    pub schedule: &'a Schedule,
}

/// `CREATE`/`CREATE2` (§4.10). Fails closed: any trie-level error while
/// reading the account repository is treated as creation failure rather
/// than propagated, since a fatal storage problem is `commit`'s concern
/// once the frame above finishes unwinding.
#[allow(clippy::too_many_arguments)]
pub fn create_contract<B: Backend>(
    state: &mut State<B>,
    substate: &mut Substate,
    builtins: &HashMap<Address, Builtin>,
    config: ExecutionConfig,
    depth: usize,
    origin: Address,
    sender: Address,
    gas: U256,
    gas_price: U256,
    endowment: U256,
    init_code: Vec<u8>,
    address_scheme: CreateContractAddress,
    is_static: bool,
) -> CreateResult {
    if is_static || depth >= STACK_DEPTH_LIMIT {
        return CreateResult::Failed;
    }

    let sender_balance = match state.balance(&sender) {
        Ok(b) => b,
        Err(_) => return CreateResult::Failed,
    };
    if sender_balance < endowment {
        return CreateResult::Failed;
    }

    let nonce_before = match state.nonce(&sender) {
        Ok(n) => n,
        Err(_) => return CreateResult::Failed,
    };
    let address = vm::contract_address(address_scheme, &sender, nonce_before.low_u64(), &init_code);

    let collision = match (state.nonce(&address), state.code_hash(&address)) {
        (Ok(n), Ok(c)) => n > U256::zero() || c != KECCAK_EMPTY,
        _ => return CreateResult::Failed,
    };
    if collision {
        trace!(target: "executive", "creation collision at {:?}", address);
        return CreateResult::Failed;
    }

    state.checkpoint();
    if config.schedule.increment_nonce_on_create && state.inc_nonce(&sender).is_err() {
        state.revert_to_checkpoint();
        return CreateResult::Failed;
    }
    let existing_balance = match state.balance(&address) {
        Ok(b) => b,
        Err(_) => {
            state.revert_to_checkpoint();
            return CreateResult::Failed;
        }
    };
    if state.new_contract(&address, existing_balance).is_err() {
        state.revert_to_checkpoint();
        return CreateResult::Failed;
    }
    if state.transfer_balance(&sender, &address, endowment).is_err() {
        state.revert_to_checkpoint();
        return CreateResult::Failed;
    }
    substate.touched.insert(sender);
    substate.touched.insert(address);
    substate.contracts_created.push(address);

    let params = ActionParams {
        code_address: address,
        address,
        sender,
        origin,
        gas,
        gas_price,
        value: ActionValue::Transfer(endowment),
        code: Some(Arc::new(init_code)),
        code_hash: None,
        data: None,
        call_type: CallType::None,
        params_type: ParamsType::Separate,
    };

    let mut frame_substate = Substate::new();
    let outcome = {
        let mut ext =
            Externalities::new(state, &mut frame_substate, builtins, config, depth + 1, origin, gas_price, false, address);
        let mut interpreter = Interpreter::new(&mut ext, params);
        interpreter.run(gas)
    };

    match outcome {
        Ok(Outcome::Normal { gas_left, data }) => {
            let deposit_cost = U256::from(200) * U256::from(data.len());
            let size_ok = match config.schedule.limit_contract_code_size {
                Some(limit) => data.len() <= limit,
                None => true,
            };
            if gas_left >= deposit_cost && size_ok {
                let remaining = gas_left - deposit_cost;
                if state.init_code(&address, data.to_vec()).is_err() {
                    state.revert_to_checkpoint();
                    return CreateResult::Failed;
                }
                state.discard_checkpoint();
                substate.accrue(frame_substate);
                CreateResult::Created { address, gas_left: remaining }
            } else if config.schedule.fail_on_create_gas_shortfall || !size_ok {
                state.revert_to_checkpoint();
                CreateResult::Failed
            } else {
                // pre-Homestead: a deposit-gas shortfall just leaves the
                // contract with empty code rather than failing the call.
                state.discard_checkpoint();
                substate.accrue(frame_substate);
                CreateResult::Created { address, gas_left }
            }
        }
        Ok(Outcome::Reverted { gas_left, data }) => {
            state.revert_to_checkpoint();
            CreateResult::Reverted { gas_left, data }
        }
        Err(_) => {
            state.revert_to_checkpoint();
            CreateResult::Failed
        }
    }
}

/// `CALL`/`CALLCODE`/`DELEGATECALL`/`STATICCALL` (§4.11). `contract` is the
/// address whose code actually runs (`code_address` in `ActionParams`
/// vocabulary); `recipient` is the address whose storage/balance the frame
/// observes as its own (the same as `contract` for a plain `CALL`).
#[allow(clippy::too_many_arguments)]
pub fn message_call<B: Backend>(
    state: &mut State<B>,
    substate: &mut Substate,
    config: ExecutionConfig,
    builtins: &HashMap<Address, Builtin>,
    depth: usize,
    origin: Address,
    sender: Address,
    recipient: Address,
    contract: Address,
    gas: U256,
    gas_price: U256,
    value: U256,
    apparent_value: U256,
    data: Vec<u8>,
    call_type: CallType,
    is_static: bool,
) -> CallResult {
    if depth >= STACK_DEPTH_LIMIT {
        return CallResult::Failed;
    }
    if call_type == CallType::Call {
        let sender_balance = match state.balance(&sender) {
            Ok(b) => b,
            Err(_) => return CallResult::Failed,
        };
        if sender_balance < value {
            return CallResult::Failed;
        }
    }
    state.checkpoint();
    substate.touched.insert(sender);
    substate.touched.insert(recipient);

    if call_type == CallType::Call && state.transfer_balance(&sender, &recipient, value).is_err() {
        state.revert_to_checkpoint();
        return CallResult::Failed;
    }

    if let Some(builtin) = builtins.get(&contract) {
        let cost = builtin.cost(&data);
        if cost > gas {
            state.revert_to_checkpoint();
            return CallResult::Failed;
        }
        let mut buf = Vec::new();
        let result = {
            let mut out = BytesRef::Flexible(&mut buf);
            builtin.execute(&data, &mut out)
        };
        return match result {
            Ok(()) => {
                state.discard_checkpoint();
                CallResult::Success { gas_left: gas - cost, data: buf.into() }
            }
            Err(_) => {
                state.revert_to_checkpoint();
                CallResult::Failed
            }
        };
    }

    let code = match state.code(&contract) {
        Ok(c) => c,
        Err(_) => {
            state.revert_to_checkpoint();
            return CallResult::Failed;
        }
    };
    if code.is_empty() {
        state.discard_checkpoint();
        return CallResult::Success { gas_left: gas, data: Default::default() };
    }
    let code_hash = state.code_hash(&contract).ok();

    let params = ActionParams {
        code_address: contract,
        address: recipient,
        sender,
        origin,
        gas,
        gas_price,
        value: if call_type == CallType::Call {
            ActionValue::Transfer(value)
        } else {
            ActionValue::Apparent(apparent_value)
        },
        code: Some(code),
        code_hash,
        data: Some(data),
        call_type,
        params_type: ParamsType::Separate,
    };

    let mut frame_substate = Substate::new();
    let frame_is_static = is_static || call_type == CallType::StaticCall;
    let outcome = {
        let mut ext = Externalities::new(
            state,
            &mut frame_substate,
            builtins,
            config,
            depth + 1,
            origin,
            gas_price,
            frame_is_static,
            recipient,
        );
        let mut interpreter = Interpreter::new(&mut ext, params);
        interpreter.run(gas)
    };

    match outcome {
        Ok(Outcome::Normal { gas_left, data }) => {
            state.discard_checkpoint();
            substate.accrue(frame_substate);
            CallResult::Success { gas_left, data }
        }
        Ok(Outcome::Reverted { gas_left, data }) => {
            state.revert_to_checkpoint();
            CallResult::Reverted { gas_left, data }
        }
        Err(_) => {
            state.revert_to_checkpoint();
            CallResult::Failed
        }
    }
}

/// A transaction in its simplest form: no signature (out of this crate's
/// scope — see the design ledger), just the fields `transact` needs.
pub struct Transaction {
    pub sender: Address,
    pub nonce: U256,
    pub gas_price: U256,
    pub gas: U256,
    pub action: Action,
    pub value: U256,
    pub data: Vec<u8>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Action {
    Call(Address),
    Create,
}

/// Result of running a transaction to completion (§2 item 13).
pub struct Executed {
    pub state_root: H256,
    pub gas_used: U256,
    pub refunded_gas: U256,
    pub logs: Vec<LogEntry>,
    pub output: Vec<u8>,
    /// Whether the top-level call/creation itself succeeded (a revert or
    /// exception still consumes gas and commits, per §7 — it just produces
    /// no contract/no side effects from that frame).
    pub success: bool,
}

fn intrinsic_gas(schedule: &Schedule, is_create: bool, data: &[u8]) -> U256 {
    let mut gas = U256::from(if is_create { schedule.tx_create_gas } else { schedule.tx_gas });
    for byte in data {
        gas += U256::from(if *byte == 0 { schedule.tx_data_zero_gas } else { schedule.tx_data_non_zero_gas });
    }
    gas
}

/// The seam a block-level transaction processor (out of scope here) calls
/// once per transaction: computes intrinsic gas, dispatches to
/// `create_contract`/`message_call`, applies the capped refund, sweeps
/// self-destructed accounts, and commits (§8 "Gas conservation").
pub struct Executive;

impl Executive {
    pub fn transact<B: Backend>(
        state: &mut State<B>,
        info: &EnvInfo,
        schedule: &Schedule,
        tx: &Transaction,
        check_nonce: bool,
    ) -> Result<Executed> {
        let sender = tx.sender;
        trace!(target: "executive", "transact sender={:?} action={:?} gas={}", sender, tx.action, tx.gas);
        let account_nonce = state.nonce(&sender)?;
        if check_nonce && account_nonce != tx.nonce {
            return Err(ExecutionError::InvalidNonce { expected: account_nonce, got: tx.nonce }.into());
        }

        let is_create = tx.action == Action::Create;
        let required_gas = intrinsic_gas(schedule, is_create, &tx.data);
        if tx.gas < required_gas {
            return Err(ExecutionError::NotEnoughBaseGas { required: required_gas, got: tx.gas }.into());
        }

        let balance = state.balance(&sender)?;
        let upfront_cost = tx.gas * tx.gas_price;
        let total_cost = upfront_cost + tx.value;
        if balance < total_cost {
            return Err(ExecutionError::NotEnoughCash { required: total_cost, got: balance }.into());
        }

        state.sub_balance(&sender, upfront_cost)?;
        state.inc_nonce(&sender)?;

        let init_gas = tx.gas - required_gas;
        let builtins = ethcore_builtin::builtins(schedule);
        let mut substate = Substate::new();
        let config = ExecutionConfig { info, schedule };

        let (gas_left, output, success) = match tx.action {
            Action::Create => match create_contract(
                state,
                &mut substate,
                &builtins,
                config,
                0,
                sender,
                sender,
                init_gas,
                tx.gas_price,
                tx.value,
                tx.data.clone(),
                CreateContractAddress::FromSenderAndNonce,
                false,
            ) {
                CreateResult::Created { gas_left, .. } => (gas_left, Vec::new(), true),
                CreateResult::Reverted { gas_left, data } => (gas_left, data.to_vec(), false),
                CreateResult::Failed => (U256::zero(), Vec::new(), false),
            },
            Action::Call(address) => match message_call(
                state,
                &mut substate,
                config,
                &builtins,
                0,
                sender,
                sender,
                address,
                address,
                init_gas,
                tx.gas_price,
                tx.value,
                tx.value,
                tx.data.clone(),
                CallType::Call,
                false,
            ) {
                CallResult::Success { gas_left, data } => (gas_left, data.to_vec(), true),
                CallResult::Reverted { gas_left, data } => (gas_left, data.to_vec(), false),
                CallResult::Failed => (U256::zero(), Vec::new(), false),
            },
        };

        let gas_used = tx.gas - gas_left;
        let max_refund = gas_used / U256::from(2);
        let accumulated_refund = U256::from(substate.sstore_clears_refund.max(0) as u64);
        let refund = max_refund.min(accumulated_refund);
        let final_gas_left = gas_left + refund;

        state.add_balance(&sender, final_gas_left * tx.gas_price)?;

        let suicides: Vec<Address> = substate.suicides.iter().copied().collect();
        for address in suicides {
            state.kill_account(&address)?;
        }

        let state_root = state.commit()?;

        trace!(target: "executive", "transact done gas_used={} refunded_gas={} success={}", tx.gas - final_gas_left, refund, success);

        Ok(Executed {
            state_root,
            gas_used: tx.gas - final_gas_left,
            refunded_gas: refund,
            logs: substate.logs,
            output,
            success,
        })
    }
}
