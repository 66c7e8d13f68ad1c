//! The EVM opcode interpreter: a pure function of `(code, call data, Ext)`
//! to an `Outcome`, with no knowledge of accounts, transactions or the
//! trie — all of that lives behind `vm::Ext`.

pub mod instructions;
mod interpreter;

pub use interpreter::{Interpreter, Outcome};
