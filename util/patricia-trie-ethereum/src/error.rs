use ethereum_types::H256;
use rlp::DecoderError;
use std::fmt;

/// Failures that can occur while reading the trie's backing node store.
///
/// `put`/`remove` never construct this error (§4.2): a well-formed key and
/// value always produce a well-formed rewritten trie. It can only surface
/// while descending to read a node — either because the store is missing a
/// hash it should have (a corrupted store), or because the bytes it
/// returned are not valid RLP for any node shape.
#[derive(Debug, PartialEq, Eq)]
pub enum TrieError {
    /// A node hash referenced from the trie is absent from the backing
    /// store.
    IncompleteDatabase(H256),
    /// The bytes found at a node hash do not decode as an RLP trie node.
    DecoderError(H256, DecoderError),
    /// The caller supplied a root hash absent from the store.
    InvalidStateRoot(H256),
}

impl fmt::Display for TrieError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrieError::IncompleteDatabase(h) => {
                write!(f, "Trie node {:?} not found in the backing store", h)
            }
            TrieError::DecoderError(h, e) => {
                write!(f, "Trie node {:?} failed to decode: {}", h, e)
            }
            TrieError::InvalidStateRoot(h) => write!(f, "Invalid state root {:?}", h),
        }
    }
}

impl std::error::Error for TrieError {}
