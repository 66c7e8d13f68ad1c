//! The per-call-frame accumulator threaded through `Executive`: logs,
//! self-destructs and the accounts touched this transaction (§4.5, §4.9
//! LOGn/SELFDESTRUCT). Nested calls get their own `Substate` and merge it
//! into the parent's on return.

use std::collections::HashSet;

use ethereum_types::{Address, H256};

/// A single `LOGn` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct Substate {
    /// Addresses that executed `SELFDESTRUCT` this transaction; removed
    /// from state once the transaction (not just the frame) completes.
    pub suicides: HashSet<Address>,
    /// Accounts touched by any operation — used post-EIP-161 to decide
    /// which newly-empty accounts get swept away by `commit`.
    pub touched: HashSet<Address>,
    pub logs: Vec<LogEntry>,
    /// Running total of the `SSTORE`/`SELFDESTRUCT` refund, in gas units
    /// (capped against `gas_used / 2` by the caller at the end of the
    /// transaction, per §8 "Gas conservation").
    pub sstore_clears_refund: i64,
    pub contracts_created: Vec<Address>,
}

impl Substate {
    pub fn new() -> Self {
        Substate::default()
    }

    /// Fold a completed sub-call's substate into this one — the
    /// bookkeeping a `CALL`/`CREATE` does with its callee's substate on
    /// normal return (§4.10/§4.11). Never called on revert: a reverted
    /// frame's substate is simply dropped.
    pub fn accrue(&mut self, other: Substate) {
        self.suicides.extend(other.suicides);
        self.touched.extend(other.touched);
        self.logs.extend(other.logs);
        self.sstore_clears_refund += other.sstore_clears_refund;
        self.contracts_created.extend(other.contracts_created);
    }
}
