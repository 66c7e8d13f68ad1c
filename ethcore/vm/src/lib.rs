//! Shared vocabulary between the EVM interpreter and whatever drives it:
//! action parameters, the block environment, the hardfork schedule, the
//! `Ext` callback interface, and the error type an execution frame can
//! halt with.

mod action_params;
mod address;
mod call_type;
mod env_info;
mod error;
mod ext;
mod return_data;
mod schedule;

pub use action_params::{ActionParams, ActionValue, ParamsType};
pub use address::contract_address;
pub use call_type::CallType;
pub use env_info::EnvInfo;
pub use error::{Error, Result};
pub use ext::{CreateContractAddress, CreateResult, CallResult, Ext};
pub use return_data::ReturnData;
pub use schedule::Schedule;

/// Number of call-stack frames (`CALL`/`CREATE` nesting) allowed before a
/// sub-call is rejected outright (§4.7 machine state, §4.10/§4.11 step 1).
pub const STACK_DEPTH_LIMIT: usize = 1024;
