//! Bridges one call/creation frame's [`State`]/[`Substate`] into the shape
//! the interpreter expects (§4.7's "`Ext`"). Most of `vm::Ext`'s read
//! methods take `&self` (the interpreter only ever holds `&mut dyn Ext`,
//! but reads through a shared reference at the call site), while `State`'s
//! own lookups need `&mut self` to cache what they read — hence the
//! `RefCell` here, rather than threading `&mut` through a trait that isn't
//! ours to redefine.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use ethereum_types::{Address, H256, U256};
use ethcore_builtin::Builtin;
use parity_bytes::Bytes;
use vm::{
    ActionValue, CallResult, CallType, CreateContractAddress, CreateResult, EnvInfo, Error as VmError, Ext,
    Result as VmResult, Schedule,
};

use crate::executive::{create_contract, message_call, ExecutionConfig};
use crate::state::{Backend, LogEntry, State, Substate};

fn store_failure<T>() -> VmResult<T> {
    Err(VmError::Internal("account repository read failed".into()))
}

/// One frame's view onto the shared `State`/`Substate`, plus the
/// frame-local facts (`address`, `origin`, `is_static`, call depth) the
/// `Ext` trait exposes.
pub struct Externalities<'frame, B: Backend> {
    state: RefCell<&'frame mut State<B>>,
    substate: RefCell<&'frame mut Substate>,
    builtins: &'frame HashMap<Address, Builtin>,
    info: &'frame EnvInfo,
    schedule: Schedule,
    depth: usize,
    origin: Address,
    gas_price: U256,
    is_static: bool,
    address: Address,
}

impl<'frame, B: Backend> Externalities<'frame, B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: &'frame mut State<B>,
        substate: &'frame mut Substate,
        builtins: &'frame HashMap<Address, Builtin>,
        config: ExecutionConfig<'frame>,
        depth: usize,
        origin: Address,
        gas_price: U256,
        is_static: bool,
        address: Address,
    ) -> Self {
        Externalities {
            state: RefCell::new(state),
            substate: RefCell::new(substate),
            builtins,
            info: config.info,
            schedule: *config.schedule,
            depth,
            origin,
            gas_price,
            is_static,
            address,
        }
    }
}

impl<'frame, B: Backend> Ext for Externalities<'frame, B> {
    fn storage_at(&self, key: &H256) -> VmResult<H256> {
        self.state.borrow_mut().storage_at(&self.address, key).or_else(|_| store_failure())
    }

    fn initial_storage_at(&self, key: &H256) -> VmResult<H256> {
        self.state.borrow_mut().initial_storage_at(&self.address, key).or_else(|_| store_failure())
    }

    fn set_storage(&mut self, key: H256, value: H256) -> VmResult<()> {
        self.state.borrow_mut().set_storage(&self.address, key, value).or_else(|_| store_failure())
    }

    fn is_static(&self) -> bool {
        self.is_static
    }

    fn exists(&self, address: &Address) -> VmResult<bool> {
        self.state.borrow_mut().exists(address).or_else(|_| store_failure())
    }

    fn exists_and_not_null(&self, address: &Address) -> VmResult<bool> {
        self.state.borrow_mut().exists_and_not_null(address).or_else(|_| store_failure())
    }

    fn balance(&self, address: &Address) -> VmResult<U256> {
        self.state.borrow_mut().balance(address).or_else(|_| store_failure())
    }

    fn blockhash(&mut self, number: &U256) -> H256 {
        if *number >= U256::from(self.info.number) {
            return H256::zero();
        }
        let depth = self.info.number - number.as_u64();
        self.info.block_hash(depth)
    }

    fn create(
        &mut self,
        gas: &U256,
        value: &U256,
        code: &[u8],
        address_scheme: CreateContractAddress,
    ) -> CreateResult {
        let config = ExecutionConfig { info: self.info, schedule: &self.schedule };
        let mut state = self.state.borrow_mut();
        let mut substate = self.substate.borrow_mut();
        create_contract(
            &mut state,
            &mut substate,
            self.builtins,
            config,
            self.depth,
            self.origin,
            self.address,
            *gas,
            self.gas_price,
            *value,
            code.to_vec(),
            address_scheme,
            self.is_static,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn call(
        &mut self,
        gas: &U256,
        sender_address: &Address,
        receive_address: &Address,
        value: Option<U256>,
        data: &[u8],
        code_address: &Address,
        call_type: CallType,
    ) -> CallResult {
        let config = ExecutionConfig { info: self.info, schedule: &self.schedule };
        let mut state = self.state.borrow_mut();
        let mut substate = self.substate.borrow_mut();
        let apparent_value = match value {
            Some(v) => v,
            None => {
                // DELEGATECALL/STATICCALL: apparent value passes through
                // from this very frame's own action value.
                self.own_apparent_value()
            }
        };
        message_call(
            &mut state,
            &mut substate,
            config,
            self.builtins,
            self.depth,
            self.origin,
            *sender_address,
            *receive_address,
            *code_address,
            *gas,
            self.gas_price,
            value.unwrap_or_else(U256::zero),
            apparent_value,
            data.to_vec(),
            call_type,
            self.is_static || call_type == CallType::StaticCall,
        )
    }

    fn extcode(&self, address: &Address) -> VmResult<Option<Arc<Bytes>>> {
        if !self.state.borrow_mut().exists(address).or_else(|_| store_failure())? {
            return Ok(None);
        }
        self.state.borrow_mut().code(address).map(Some).or_else(|_| store_failure())
    }

    fn extcodehash(&self, address: &Address) -> VmResult<Option<H256>> {
        if !self.state.borrow_mut().exists(address).or_else(|_| store_failure())? {
            return Ok(None);
        }
        self.state.borrow_mut().code_hash(address).map(Some).or_else(|_| store_failure())
    }

    fn extcodesize(&self, address: &Address) -> VmResult<Option<usize>> {
        self.state.borrow_mut().code_size(address).or_else(|_| store_failure())
    }

    fn log(&mut self, topics: Vec<H256>, data: &[u8]) -> VmResult<()> {
        self.substate.borrow_mut().logs.push(LogEntry { address: self.address, topics, data: data.to_vec() });
        Ok(())
    }

    fn suicide(&mut self, refund_address: &Address) -> VmResult<()> {
        let balance = self.state.borrow_mut().balance(&self.address).or_else(|_| store_failure())?;
        if &self.address != refund_address {
            self.state
                .borrow_mut()
                .transfer_balance(&self.address, refund_address, balance)
                .or_else(|_| store_failure())?;
        }
        let mut substate = self.substate.borrow_mut();
        substate.suicides.insert(self.address);
        substate.touched.insert(*refund_address);
        Ok(())
    }

    fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    fn env_info(&self) -> &EnvInfo {
        self.info
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn add_sstore_refund(&mut self, value: usize) {
        self.substate.borrow_mut().sstore_clears_refund += value as i64;
    }

    fn sub_sstore_refund(&mut self, value: usize) {
        self.substate.borrow_mut().sstore_clears_refund -= value as i64;
    }
}

impl<'frame, B: Backend> Externalities<'frame, B> {
    /// `CALLVALUE` as seen by the currently executing frame — what a
    /// `DELEGATECALL`/`STATICCALL` callee reports, since neither actually
    /// moves value of its own. `ActionValue` itself lives on `ActionParams`,
    /// not on `Ext`, so the interpreter never asks for this directly; it's
    /// only needed here to answer `call`'s `value: None` case.
    fn own_apparent_value(&self) -> U256 {
        // A DELEGATECALL/STATICCALL forwards no value of its own; the
        // interpreter's own CALLVALUE opcode reads `ActionParams`, not
        // this path, so zero is the only value that is ever observable.
        ActionValue::apparent(U256::zero()).value()
    }
}
