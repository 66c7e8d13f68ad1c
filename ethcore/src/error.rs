//! Errors a transaction can fail with before execution even starts, plus
//! the wrapper around a trie failure (§7 "Trie node missing... fatal").

use std::fmt;

use ethereum_types::U256;
use patricia_trie_ethereum::TrieError;

/// Pre-execution transaction validation failures (distinct from the
/// in-execution, non-exceptional failures `create_contract`/`message_call`
/// already model as ordinary return values).
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ExecutionError {
    /// Sender's nonce didn't match what the caller expected.
    InvalidNonce { expected: U256, got: U256 },
    /// Sender's balance can't cover `gas * gas_price + value`.
    NotEnoughCash { required: U256, got: U256 },
    /// `gas` is below the intrinsic cost of the transaction.
    NotEnoughBaseGas { required: U256, got: U256 },
    /// `gas` would push the block over its gas limit.
    BlockGasLimitReached { limit: U256, used: U256, gas: U256 },
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::InvalidNonce { expected, got } => {
                write!(f, "Invalid transaction nonce: expected {}, got {}", expected, got)
            }
            ExecutionError::NotEnoughCash { required, got } => {
                write!(f, "Sender doesn't have enough funds: required {}, got {}", required, got)
            }
            ExecutionError::NotEnoughBaseGas { required, got } => {
                write!(f, "Transaction gas {} is below the intrinsic cost {}", got, required)
            }
            ExecutionError::BlockGasLimitReached { limit, used, gas } => write!(
                f,
                "Transaction gas {} would push block gas usage {} past its limit {}",
                gas, used, limit
            ),
        }
    }
}

impl std::error::Error for ExecutionError {}

/// Everything that can go wrong driving a transaction through the account
/// repository and the interpreter.
#[derive(Debug)]
pub enum Error {
    Execution(ExecutionError),
    /// The state trie or a storage sub-trie came back corrupted or
    /// incomplete — not a validation failure, a fatal store problem.
    Trie(TrieError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Execution(e) => write!(f, "{}", e),
            Error::Trie(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<ExecutionError> for Error {
    fn from(e: ExecutionError) -> Self {
        Error::Execution(e)
    }
}

impl From<TrieError> for Error {
    fn from(e: TrieError) -> Self {
        Error::Trie(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
