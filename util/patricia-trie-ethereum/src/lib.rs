//! A from-scratch Merkle-Patricia trie, Ethereum's canonical key/value
//! authentication structure (Yellow Paper appendix D).
//!
//! `TrieDBMut` is the only entry point: it owns a root hash and borrows a
//! [`NodeStore`] to read and write nodes, encoding/decoding them with the
//! hex-prefix scheme in [`nibble`] and the RLP node shapes in [`node`].

mod error;
mod nibble;
mod node;
mod trie;

pub use error::TrieError;
pub use nibble::Nibbles;
pub use node::{Node, NodeRef};
pub use trie::{MemoryNodeStore, NodeStore, TrieDBMut};
