use crate::call_type::CallType;
use crate::error::Result;
use crate::return_data::ReturnData;
use crate::schedule::Schedule;
use crate::env_info::EnvInfo;
use ethereum_types::{Address, H256, U256};
use parity_bytes::Bytes;
use std::sync::Arc;

/// How the address of a newly created contract is derived.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CreateContractAddress {
    /// `CREATE`: `kec(rlp([sender, nonce]))[12..]`.
    FromSenderAndNonce,
    /// `CREATE2` (Constantinople): `kec(0xff ++ sender ++ salt ++ kec(init_code))[12..]`.
    FromSenderSaltAndCodeHash(H256),
}

/// Outcome of `Ext::create`.
#[derive(Debug, Clone)]
pub enum CreateResult {
    Created { address: Address, gas_left: U256 },
    Reverted { gas_left: U256, data: ReturnData },
    Failed,
}

/// Outcome of `Ext::call`.
#[derive(Debug, Clone)]
pub enum CallResult {
    Success { gas_left: U256, data: ReturnData },
    Reverted { gas_left: U256, data: ReturnData },
    Failed,
}

/// The interpreter's view of everything outside its own machine state:
/// account storage/balance/code, sub-calls, logs, and the active
/// `Schedule`/`EnvInfo`. One frame of execution (§4.7/§4.10/§4.11) holds
/// exactly one `Ext` implementation bound to that frame's address.
pub trait Ext {
    /// Current value of a storage slot.
    fn storage_at(&self, key: &H256) -> Result<H256>;

    /// Value of a storage slot as of the start of the enclosing
    /// transaction — EIP-1283 `SSTORE` metering needs this in addition to
    /// the current value.
    fn initial_storage_at(&self, key: &H256) -> Result<H256>;

    /// Set a storage slot. `Err` only on a backing-store failure; setting
    /// a slot never fails for semantic reasons on its own (caller-side gas
    /// checks happen before this is invoked).
    fn set_storage(&mut self, key: H256, value: H256) -> Result<()>;

    /// True if the call is inside a `STATICCALL` and therefore forbidden
    /// from mutating state (§4.7 step 3).
    fn is_static(&self) -> bool;

    /// Whether an account exists at all (used by `BALANCE` pre-Spurious-Dragon
    /// semantics and by the `CALL`/`CREATE` new-account gas surcharge).
    fn exists(&self, address: &Address) -> Result<bool>;

    /// Whether an account exists and is not "null" (zero balance, zero
    /// nonce, no code) — the EIP-161 state-clearing predicate used to
    /// decide the `CALL` new-account surcharge post-Spurious-Dragon.
    fn exists_and_not_null(&self, address: &Address) -> Result<bool>;

    fn balance(&self, address: &Address) -> Result<U256>;

    /// Hash of a recent block, or zero outside the 256-block window.
    fn blockhash(&mut self, number: &U256) -> H256;

    /// `CREATE`/`CREATE2`.
    fn create(
        &mut self,
        gas: &U256,
        value: &U256,
        code: &[u8],
        address_scheme: CreateContractAddress,
    ) -> CreateResult;

    /// `CALL`/`CALLCODE`/`DELEGATECALL`/`STATICCALL`.
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
    ) -> CallResult;

    fn extcode(&self, address: &Address) -> Result<Option<Arc<Bytes>>>;
    fn extcodehash(&self, address: &Address) -> Result<Option<H256>>;
    fn extcodesize(&self, address: &Address) -> Result<Option<usize>>;

    /// `LOGn`.
    fn log(&mut self, topics: Vec<H256>, data: &[u8]) -> Result<()>;

    /// `SELFDESTRUCT`.
    fn suicide(&mut self, refund_address: &Address) -> Result<()>;

    fn schedule(&self) -> &Schedule;
    fn env_info(&self) -> &EnvInfo;

    /// Current call-stack depth, checked against the 1024 limit before a
    /// `CALL`/`CREATE` is allowed to recurse further.
    fn depth(&self) -> usize;

    fn add_sstore_refund(&mut self, value: usize);
    fn sub_sstore_refund(&mut self, value: usize);
}
