//! The storage `State` reads through to and commits into (§4.4's `base`).
//! Anything that can answer `NodeStore` queries qualifies — in production
//! that's a disk-backed key/value store; tests use the in-memory one.

pub use patricia_trie_ethereum::{MemoryNodeStore, NodeStore};

/// Marker trait so `State<B>` can be written generically over "whatever
/// backs the trie" without every call site spelling out `NodeStore`'s
/// bound directly.
pub trait Backend: NodeStore {}

impl<T: NodeStore> Backend for T {}
