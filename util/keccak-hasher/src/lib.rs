//! Keccak-256 `Hasher` used by every node store in the core: the trie's
//! node store, the caching trie's overlay, and `triehash-ethereum`'s
//! scratch trie all share this single implementation so that a hash
//! computed by one matches the others bit-for-bit.

use ethereum_types::H256;
use hash_db::Hasher;
use plain_hasher::PlainHasher;

/// `rlp("")`, i.e. the RLP encoding of the empty byte string.
pub const NULL_RLP: [u8; 1] = [0x80];

/// `kec(rlp(""))`, the canonical empty-trie root hash.
pub const KECCAK_NULL_RLP: H256 = H256([
    0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6, 0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0, 0xf8, 0x6e,
    0x5b, 0x48, 0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0, 0x01, 0x62, 0x2f, 0xb5, 0xe3, 0x63, 0xb4, 0x21,
]);

/// `kec("")`, the hash of empty code / empty account code_hash.
pub const KECCAK_EMPTY: H256 = H256([
    0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03, 0xc0,
    0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b, 0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85, 0xa4, 0x70,
]);

/// Keccak-256 digest of an arbitrary byte slice.
pub fn keccak(data: impl AsRef<[u8]>) -> H256 {
    keccak_hash::keccak(data.as_ref())
}

/// Implementation of `hash_db::Hasher` using Keccak-256, usable with
/// `memory-db`'s `MemoryDB` as a generic node store.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct KeccakHasher;

impl Hasher for KeccakHasher {
    type Out = H256;
    type StdHasher = PlainHasher;
    const LENGTH: usize = 32;

    fn hash(x: &[u8]) -> Self::Out {
        keccak(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hex::FromHex;

    #[test]
    fn empty_rlp_hash_matches_canonical_constant() {
        assert_eq!(keccak(&NULL_RLP[..]), KECCAK_NULL_RLP);
    }

    #[test]
    fn empty_code_hash_matches_canonical_constant() {
        assert_eq!(keccak(&[][..]), KECCAK_EMPTY);
    }

    #[test]
    fn matches_known_vector() {
        // kec("") is the well known value below.
        let expected: Vec<u8> = "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
            .from_hex()
            .unwrap();
        assert_eq!(keccak(&[][..]).as_bytes(), &expected[..]);
    }
}
