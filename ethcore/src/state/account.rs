//! A single account's balance/nonce/code/storage, as stored at
//! `kec(address)` in the state trie (§4.5, §3).

use std::collections::HashMap;
use std::sync::Arc;

use ethereum_types::{H256, U256};
use keccak_hasher::{keccak, KECCAK_EMPTY, KECCAK_NULL_RLP};
use rlp::{DecoderError, Rlp, RlpStream};

/// Per-slot value plus whether it has been written since the account was
/// loaded, used to decide what `commit` needs to push into the storage
/// trie and to answer EIP-1283's "initial value" query.
#[derive(Debug, Clone, Default)]
pub struct Account {
    pub balance: U256,
    pub nonce: U256,
    pub storage_root: H256,
    pub code_hash: H256,
    /// Cache of the value at the start of the current transaction, keyed by
    /// slot. Populated lazily on first read of a slot (`initial_storage_at`);
    /// never cleared by a write.
    original_storage_cache: HashMap<H256, H256>,
    /// Writes made since the account was loaded, not yet folded into
    /// `storage_root`.
    storage_changes: HashMap<H256, H256>,
    /// Cache of values read from the storage trie (or from `storage_changes`)
    /// so repeated reads of the same slot don't re-walk the trie.
    storage_cache: HashMap<H256, H256>,
    code_cache: Option<Arc<Vec<u8>>>,
    code_size: Option<usize>,
}

impl Account {
    pub fn new(balance: U256, nonce: U256) -> Self {
        Account {
            balance,
            nonce,
            storage_root: KECCAK_NULL_RLP,
            code_hash: KECCAK_EMPTY,
            original_storage_cache: HashMap::new(),
            storage_changes: HashMap::new(),
            storage_cache: HashMap::new(),
            code_cache: None,
            code_size: None,
        }
    }

    /// The nonce an account created by `CREATE`/`CREATE2` starts with —
    /// `1` post-EIP-161, `0` before it (§4.10 step 4).
    pub fn new_contract(balance: U256, start_nonce: U256) -> Self {
        Account::new(balance, start_nonce)
    }

    /// True once balance, nonce and code are all "empty" — the EIP-161
    /// predicate behind `exists_and_not_null`.
    pub fn is_null(&self) -> bool {
        self.balance.is_zero() && self.nonce.is_zero() && self.code_hash == KECCAK_EMPTY
    }

    pub fn is_contract(&self) -> bool {
        self.code_hash != KECCAK_EMPTY
    }

    pub fn add_balance(&mut self, value: U256) {
        self.balance = self.balance + value;
    }

    pub fn sub_balance(&mut self, value: U256) {
        debug_assert!(self.balance >= value);
        self.balance = self.balance - value;
    }

    pub fn inc_nonce(&mut self) {
        self.nonce = self.nonce + U256::one();
    }

    /// A slot's value if it's already known from a pending write or a
    /// prior read this call — never touches the trie. Callers that need
    /// the trie consulted on a miss call `record_storage_read` with the
    /// result afterwards (split in two so the trie lookup, which needs
    /// the enclosing `State`, doesn't have to happen inside a closure
    /// that would otherwise have to borrow `self` twice).
    pub fn cached_storage(&self, key: &H256) -> Option<H256> {
        self.storage_changes.get(key).or_else(|| self.storage_cache.get(key)).copied()
    }

    /// Record the result of a trie lookup for `key`, priming both the
    /// current-value cache and (if this is the slot's first read this
    /// transaction) the EIP-1283 original-value cache.
    pub fn record_storage_read(&mut self, key: H256, value: H256) {
        self.storage_cache.insert(key, value);
        self.original_storage_cache.entry(key).or_insert(value);
    }

    /// Cache and return a storage slot's current value: a pending write
    /// shadows the trie, otherwise fetched via `load` and cached.
    pub fn storage_at<F>(&mut self, key: &H256, load: F) -> H256
    where
        F: FnOnce(&H256) -> H256,
    {
        if let Some(v) = self.cached_storage(key) {
            return v;
        }
        let v = load(key);
        self.record_storage_read(*key, v);
        v
    }

    /// The value a slot held before this transaction touched it — EIP-1283
    /// (§4.8 SSTORE). Falls back to `storage_at`'s loader if the slot was
    /// never read or written this transaction.
    pub fn initial_storage_at<F>(&mut self, key: &H256, load: F) -> H256
    where
        F: FnOnce(&H256) -> H256,
    {
        if let Some(v) = self.original_storage_cache.get(key) {
            return *v;
        }
        self.storage_at(key, load)
    }

    pub fn set_storage(&mut self, key: H256, value: H256) {
        self.storage_changes.insert(key, value);
    }

    pub fn storage_changes(&self) -> &HashMap<H256, H256> {
        &self.storage_changes
    }

    pub fn set_empty_storage_root(&mut self) {
        self.storage_root = KECCAK_NULL_RLP;
        self.storage_changes.clear();
        self.storage_cache.clear();
        self.original_storage_cache.clear();
    }

    /// Called once per commit, after `storage_changes` has been folded into
    /// the storage trie and a new root computed.
    pub fn commit_storage(&mut self, new_root: H256) {
        self.storage_root = new_root;
        for (k, v) in self.storage_changes.drain() {
            self.storage_cache.insert(k, v);
        }
    }

    pub fn code(&self) -> Option<Arc<Vec<u8>>> {
        self.code_cache.clone()
    }

    pub fn code_size(&self) -> Option<usize> {
        self.code_size
    }

    pub fn cache_code(&mut self, code: Arc<Vec<u8>>) {
        self.code_size = Some(code.len());
        self.code_cache = Some(code);
    }

    /// `put_code`: hash the code, cache it, and point `code_hash` at it.
    /// Returns `(hash, code)` so the caller can queue the raw write for
    /// the next commit.
    pub fn init_code(&mut self, code: Vec<u8>) -> (H256, Arc<Vec<u8>>) {
        let hash = keccak(&code);
        let code = Arc::new(code);
        self.code_hash = hash;
        self.cache_code(code.clone());
        (hash, code)
    }
}

impl rlp::Encodable for Account {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(4);
        s.append(&self.nonce);
        s.append(&self.balance);
        s.append(&self.storage_root);
        s.append(&self.code_hash);
    }
}

impl rlp::Decodable for Account {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 4 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Account {
            nonce: rlp.val_at(0)?,
            balance: rlp.val_at(1)?,
            storage_root: rlp.val_at(2)?,
            code_hash: rlp.val_at(3)?,
            original_storage_cache: HashMap::new(),
            storage_changes: HashMap::new(),
            storage_cache: HashMap::new(),
            code_cache: None,
            code_size: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_has_empty_code_and_storage() {
        let a = Account::new(U256::from(5), U256::zero());
        assert!(a.is_null() == false); // balance 5 => not null
        assert_eq!(a.storage_root, KECCAK_NULL_RLP);
        assert_eq!(a.code_hash, KECCAK_EMPTY);
    }

    #[test]
    fn zero_account_is_null() {
        let a = Account::new(U256::zero(), U256::zero());
        assert!(a.is_null());
    }

    #[test]
    fn rlp_round_trips() {
        let mut a = Account::new(U256::from(42), U256::from(7));
        a.set_storage(H256::zero(), H256::from_low_u64_be(1));
        let encoded = rlp::encode(&a);
        let decoded: Account = rlp::decode(&encoded).unwrap();
        assert_eq!(decoded.balance, U256::from(42));
        assert_eq!(decoded.nonce, U256::from(7));
        // storage_changes is transient, not part of the encoding.
        assert!(decoded.storage_changes().is_empty());
    }

    #[test]
    fn storage_at_caches_the_loader_result() {
        let mut a = Account::new(U256::zero(), U256::zero());
        let key = H256::from_low_u64_be(9);
        let mut loads = 0;
        let v1 = a.storage_at(&key, |_| {
            loads += 1;
            H256::from_low_u64_be(100)
        });
        assert_eq!(v1, H256::from_low_u64_be(100));
        // second read must not call the loader again: storage_cache already has it.
        let v2 = a.storage_at(&key, |_| {
            loads += 1;
            H256::from_low_u64_be(999)
        });
        assert_eq!(v2, H256::from_low_u64_be(100));
        assert_eq!(loads, 1);
    }

    #[test]
    fn initial_storage_survives_a_later_write() {
        let mut a = Account::new(U256::zero(), U256::zero());
        let key = H256::from_low_u64_be(1);
        let original = a.initial_storage_at(&key, |_| H256::from_low_u64_be(7));
        assert_eq!(original, H256::from_low_u64_be(7));
        a.set_storage(key, H256::from_low_u64_be(8));
        assert_eq!(a.storage_at(&key, |_| unreachable!()), H256::from_low_u64_be(8));
        assert_eq!(a.initial_storage_at(&key, |_| unreachable!()), H256::from_low_u64_be(7));
    }
}
