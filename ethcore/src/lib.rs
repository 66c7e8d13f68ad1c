//! The execution core: a Merkle-Patricia account repository (`state`)
//! driving a gas-metered EVM interpreter (`evm`) through one call or
//! creation frame at a time (`executive`).

pub mod error;
pub mod executive;
pub mod externalities;
pub mod state;

pub use error::{Error, ExecutionError, Result};
pub use executive::{Action, Executed, Executive, Transaction};
pub use state::{Backend, State, Substate};
