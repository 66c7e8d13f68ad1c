//! The account repository (§4.5): a dirty/clean cache of accounts layered
//! over a [`CachingTrie`], with a checkpoint stack so a reverted call frame
//! can undo exactly the account edits it made.

pub mod account;
pub mod backend;
pub mod substate;

use std::collections::HashMap;
use std::sync::Arc;

use cache_trie::CachingTrie;
use ethereum_types::{Address, H256, U256};
use keccak_hasher::{keccak, KECCAK_EMPTY};
use log::trace;
use patricia_trie_ethereum::TrieError;

pub use account::Account;
pub use backend::Backend;
pub use substate::{LogEntry, Substate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccountState {
    /// Loaded from the trie (or known absent) and not yet modified.
    Clean,
    /// Modified since load and not yet folded into the trie by `commit`.
    Dirty,
}

#[derive(Debug, Clone)]
struct AccountEntry {
    account: Option<Account>,
    state: AccountState,
}

impl AccountEntry {
    fn clean(account: Option<Account>) -> Self {
        AccountEntry { account, state: AccountState::Clean }
    }

    fn dirty(account: Option<Account>) -> Self {
        AccountEntry { account, state: AccountState::Dirty }
    }
}

fn account_key(address: &Address) -> H256 {
    keccak(address.as_bytes())
}

fn storage_key(slot: &H256) -> H256 {
    keccak(slot.as_bytes())
}

fn u256_to_h256(value: U256) -> H256 {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    H256(buf)
}

/// An account repository rooted at a particular state trie root, with an
/// in-memory cache of accounts touched so far and a checkpoint stack for
/// call-frame-scoped revert (§4.10/§4.11 "on revert, drop state changes").
///
/// Every method that may need to read through to the trie takes `&mut
/// self`, matching [`CachingTrie`]'s own mutable API (it caches nodes it
/// reads, so even a lookup needs `&mut`). `State` owns `base` outright
/// rather than borrowing it, so `commit` can reclaim an exclusive
/// reference to fold the overlay's writes back in (§4.5 `commit`/§8
/// caching-trie coherence); `into_backend` hands it back for reopening at
/// the new root.
pub struct State<B: Backend> {
    base: B,
    trie: CachingTrie,
    cache: HashMap<Address, AccountEntry>,
    checkpoints: Vec<HashMap<Address, Option<AccountEntry>>>,
    account_start_nonce: U256,
}

impl<B: Backend> State<B> {
    pub fn from_existing(base: B, root: H256, account_start_nonce: U256) -> Self {
        State {
            base,
            trie: CachingTrie::new(root),
            cache: HashMap::new(),
            checkpoints: Vec::new(),
            account_start_nonce,
        }
    }

    pub fn root(&self) -> H256 {
        self.trie.root()
    }

    /// Reclaim the backing store, e.g. to reopen a fresh `State` at the
    /// root `commit` just returned.
    pub fn into_backend(self) -> B {
        self.base
    }

    // -- checkpoints --------------------------------------------------

    pub fn checkpoint(&mut self) {
        self.checkpoints.push(HashMap::new());
    }

    pub fn discard_checkpoint(&mut self) {
        if let Some(last) = self.checkpoints.pop() {
            if let Some(prev) = self.checkpoints.last_mut() {
                for (k, v) in last {
                    prev.entry(k).or_insert(v);
                }
            }
        }
    }

    pub fn revert_to_checkpoint(&mut self) {
        if let Some(last) = self.checkpoints.pop() {
            for (address, entry) in last {
                match entry {
                    Some(entry) => {
                        self.cache.insert(address, entry);
                    }
                    None => {
                        self.cache.remove(&address);
                    }
                }
            }
        }
    }

    /// Record the cache's current entry for `address` in the active
    /// checkpoint the first time this call frame touches it, so a later
    /// `revert_to_checkpoint` can restore it.
    fn note_checkpoint(&mut self, address: &Address) {
        let existing = self.cache.get(address).cloned();
        if let Some(checkpoint) = self.checkpoints.last_mut() {
            checkpoint.entry(*address).or_insert(existing);
        }
    }

    // -- account lookup -------------------------------------------------

    fn ensure_cached(&mut self, address: &Address) -> Result<(), TrieError> {
        if self.cache.contains_key(address) {
            return Ok(());
        }
        let key = account_key(address);
        let bytes = self.trie.get(&self.base, key.as_bytes())?;
        let account = match bytes {
            Some(bytes) => Some(rlp::decode(&bytes).map_err(|e| TrieError::DecoderError(key, e))?),
            None => None,
        };
        self.cache.insert(*address, AccountEntry::clean(account));
        Ok(())
    }

    pub fn exists(&mut self, address: &Address) -> Result<bool, TrieError> {
        self.ensure_cached(address)?;
        Ok(self.cache.get(address).unwrap().account.is_some())
    }

    pub fn exists_and_not_null(&mut self, address: &Address) -> Result<bool, TrieError> {
        self.ensure_cached(address)?;
        Ok(match &self.cache.get(address).unwrap().account {
            Some(a) => !a.is_null(),
            None => false,
        })
    }

    pub fn balance(&mut self, address: &Address) -> Result<U256, TrieError> {
        self.ensure_cached(address)?;
        Ok(self.cache.get(address).unwrap().account.as_ref().map_or(U256::zero(), |a| a.balance))
    }

    pub fn nonce(&mut self, address: &Address) -> Result<U256, TrieError> {
        self.ensure_cached(address)?;
        Ok(self.cache.get(address).unwrap().account.as_ref().map_or(U256::zero(), |a| a.nonce))
    }

    pub fn code_hash(&mut self, address: &Address) -> Result<H256, TrieError> {
        self.ensure_cached(address)?;
        Ok(self.cache.get(address).unwrap().account.as_ref().map_or(KECCAK_EMPTY, |a| a.code_hash))
    }

    fn load_code(&mut self, hash: &H256) -> Vec<u8> {
        if *hash == KECCAK_EMPTY {
            return Vec::new();
        }
        self.trie.raw_get(&self.base, hash).unwrap_or_default()
    }

    pub fn code_size(&mut self, address: &Address) -> Result<Option<usize>, TrieError> {
        self.ensure_cached(address)?;
        let hash_and_size = match &self.cache.get(address).unwrap().account {
            None => return Ok(None),
            Some(a) if a.code_hash == KECCAK_EMPTY => return Ok(Some(0)),
            Some(a) => (a.code_hash, a.code_size()),
        };
        if let (_, Some(size)) = hash_and_size {
            return Ok(Some(size));
        }
        let code = self.load_code(&hash_and_size.0);
        let size = code.len();
        self.cache.get_mut(address).unwrap().account.as_mut().unwrap().cache_code(Arc::new(code));
        Ok(Some(size))
    }

    /// `get_code` (§4.5): absent account or the empty-code hash both read
    /// as an empty vector rather than a missing entry.
    pub fn code(&mut self, address: &Address) -> Result<Arc<Vec<u8>>, TrieError> {
        self.ensure_cached(address)?;
        let code_hash = match &self.cache.get(address).unwrap().account {
            None => return Ok(Arc::new(Vec::new())),
            Some(a) if a.code_hash == KECCAK_EMPTY => return Ok(Arc::new(Vec::new())),
            Some(a) => {
                if let Some(code) = a.code() {
                    return Ok(code);
                }
                a.code_hash
            }
        };
        let code = Arc::new(self.load_code(&code_hash));
        self.cache.get_mut(address).unwrap().account.as_mut().unwrap().cache_code(code.clone());
        Ok(code)
    }

    fn load_storage_slot(&mut self, root: H256, key: &H256) -> H256 {
        let trie_key = storage_key(key);
        match self.trie.subtrie_get(&self.base, root, trie_key.as_bytes()) {
            Ok(Some(bytes)) => match rlp::decode::<U256>(&bytes) {
                Ok(v) => u256_to_h256(v),
                Err(_) => H256::zero(),
            },
            _ => H256::zero(),
        }
    }

    pub fn storage_at(&mut self, address: &Address, key: &H256) -> Result<H256, TrieError> {
        self.ensure_cached(address)?;
        if self.cache.get(address).unwrap().account.is_none() {
            return Ok(H256::zero());
        }
        if let Some(cached) = self.cache.get(address).unwrap().account.as_ref().unwrap().cached_storage(key) {
            return Ok(cached);
        }
        let root = self.cache[address].account.as_ref().unwrap().storage_root;
        let value = self.load_storage_slot(root, key);
        self.cache.get_mut(address).unwrap().account.as_mut().unwrap().record_storage_read(*key, value);
        Ok(value)
    }

    pub fn initial_storage_at(&mut self, address: &Address, key: &H256) -> Result<H256, TrieError> {
        // touching `storage_at` first guarantees the account's
        // `original_storage_cache` is primed from the same trie read.
        let value = self.storage_at(address, key)?;
        match &self.cache.get(address).unwrap().account {
            None => Ok(H256::zero()),
            Some(_) => {
                let account = self.cache.get_mut(address).unwrap().account.as_mut().unwrap();
                Ok(account.initial_storage_at(key, |_| value))
            }
        }
    }

    // -- mutation ---------------------------------------------------------

    fn require(&mut self, address: &Address) -> Result<(), TrieError> {
        self.ensure_cached(address)?;
        self.note_checkpoint(address);
        let entry = self.cache.entry(*address).or_insert_with(|| AccountEntry::clean(None));
        if entry.account.is_none() {
            entry.account = Some(Account::new(U256::zero(), self.account_start_nonce));
        }
        entry.state = AccountState::Dirty;
        Ok(())
    }

    fn with_account_mut<F: FnOnce(&mut Account)>(&mut self, address: &Address, f: F) -> Result<(), TrieError> {
        self.require(address)?;
        f(self.cache.get_mut(address).unwrap().account.as_mut().unwrap());
        Ok(())
    }

    pub fn add_balance(&mut self, address: &Address, value: U256) -> Result<(), TrieError> {
        if value.is_zero() {
            // still touches the account for EIP-161 purposes, but never
            // materializes an account solely from a zero-value transfer.
            return self.ensure_cached(address);
        }
        self.with_account_mut(address, |a| a.add_balance(value))
    }

    pub fn sub_balance(&mut self, address: &Address, value: U256) -> Result<(), TrieError> {
        self.with_account_mut(address, |a| a.sub_balance(value))
    }

    /// `transfer` (§4.5): a no-op if `from == to`; never constructs `to`
    /// out of a zero-value transfer (handled by `add_balance`).
    pub fn transfer_balance(&mut self, from: &Address, to: &Address, value: U256) -> Result<(), TrieError> {
        if from == to || value.is_zero() {
            self.ensure_cached(from)?;
            self.ensure_cached(to)?;
            return Ok(());
        }
        self.sub_balance(from, value)?;
        self.add_balance(to, value)?;
        Ok(())
    }

    pub fn inc_nonce(&mut self, address: &Address) -> Result<(), TrieError> {
        self.with_account_mut(address, |a| a.inc_nonce())
    }

    pub fn set_storage(&mut self, address: &Address, key: H256, value: H256) -> Result<(), TrieError> {
        self.with_account_mut(address, |a| a.set_storage(key, value))
    }

    /// `new_contract` (§4.10 step 4): overwrites any existing account at
    /// `address` (the collision check in §4.10 step 3 has already run by
    /// the time this is called), preserving only its balance.
    pub fn new_contract(&mut self, address: &Address, balance: U256) -> Result<(), TrieError> {
        self.note_checkpoint(address);
        let account = Account::new_contract(balance, self.account_start_nonce);
        self.cache.insert(*address, AccountEntry::dirty(Some(account)));
        Ok(())
    }

    pub fn init_code(&mut self, address: &Address, code: Vec<u8>) -> Result<(), TrieError> {
        self.require(address)?;
        let (hash, code) =
            self.cache.get_mut(address).unwrap().account.as_mut().unwrap().init_code(code);
        self.trie.raw_put(hash, (*code).clone());
        Ok(())
    }

    pub fn kill_account(&mut self, address: &Address) -> Result<(), TrieError> {
        self.note_checkpoint(address);
        self.cache.insert(*address, AccountEntry::dirty(None));
        Ok(())
    }

    pub fn set_empty_storage_root(&mut self, address: &Address) -> Result<(), TrieError> {
        self.with_account_mut(address, |a| a.set_empty_storage_root())
    }

    // -- commit -------------------------------------------------------

    /// Fold every dirty cache entry into the trie (§4.5 `commit`): storage
    /// writes first (so the account's `storage_root` is current), then the
    /// account record itself.
    pub fn commit(&mut self) -> Result<H256, TrieError> {
        let addresses: Vec<Address> = self
            .cache
            .iter()
            .filter(|(_, e)| e.state == AccountState::Dirty)
            .map(|(a, _)| *a)
            .collect();

        for address in addresses {
            let account_present = self.cache.get(&address).unwrap().account.is_some();
            if !account_present {
                let key = account_key(&address);
                self.trie.remove(&self.base, key.as_bytes())?;
                self.cache.get_mut(&address).unwrap().state = AccountState::Clean;
                continue;
            }

            let (mut root, changes) = {
                let account = self.cache.get(&address).unwrap().account.as_ref().unwrap();
                (account.storage_root, account.storage_changes().clone())
            };
            for (slot, value) in changes {
                let trie_key = storage_key(&slot);
                root = if value.is_zero() {
                    self.trie.subtrie_remove(&self.base, address.as_bytes(), root, trie_key.as_bytes())?
                } else {
                    let encoded = rlp::encode(&U256::from_big_endian(value.as_bytes()));
                    self.trie.subtrie_update(&self.base, address.as_bytes(), root, trie_key.as_bytes(), &encoded)?
                };
            }
            let account = self.cache.get_mut(&address).unwrap().account.as_mut().unwrap();
            account.commit_storage(root);

            let key = account_key(&address);
            let encoded = rlp::encode(account);
            self.trie.put(&self.base, key.as_bytes(), &encoded)?;
            self.cache.get_mut(&address).unwrap().state = AccountState::Clean;
        }

        // Fold the overlay into `base` (§4.5/§8): take the trie by value so
        // its accumulated writes become a `Commit`, apply that to the one
        // store `base` and `trie` were both reading through to, then start
        // a fresh overlay at the new root so `self` stays usable afterward.
        let finished = std::mem::replace(&mut self.trie, CachingTrie::new(H256::zero()));
        let commit = finished.commit();
        commit.apply_to(&mut self.base);
        let root = commit.root;
        self.trie = CachingTrie::new(root);
        trace!(target: "state", "committed, root={:?}", root);
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patricia_trie_ethereum::MemoryNodeStore;

    fn empty_root() -> H256 {
        keccak_hasher::KECCAK_NULL_RLP
    }

    #[test]
    fn balance_of_unknown_account_is_zero() {
        let base = MemoryNodeStore::new();
        let mut state = State::from_existing(base, empty_root(), U256::zero());
        assert_eq!(state.balance(&Address::zero()).unwrap(), U256::zero());
        assert!(!state.exists(&Address::zero()).unwrap());
    }

    #[test]
    fn add_balance_then_commit_is_observable_after_reopen() {
        let base = MemoryNodeStore::new();
        let addr = Address::from_low_u64_be(1);
        let mut state = State::from_existing(base, empty_root(), U256::zero());
        state.add_balance(&addr, U256::from(5)).unwrap();
        let root = state.commit().unwrap();
        let mut reopened = State::from_existing(state.into_backend(), root, U256::zero());
        assert_eq!(reopened.balance(&addr).unwrap(), U256::from(5));
        assert_eq!(reopened.balance(&Address::from_low_u64_be(2)).unwrap(), U256::zero());
    }

    #[test]
    fn checkpoint_revert_undoes_balance_change() {
        let base = MemoryNodeStore::new();
        let addr = Address::from_low_u64_be(3);
        let mut state = State::from_existing(base, empty_root(), U256::zero());
        state.add_balance(&addr, U256::from(10)).unwrap();
        state.checkpoint();
        state.add_balance(&addr, U256::from(90)).unwrap();
        assert_eq!(state.balance(&addr).unwrap(), U256::from(100));
        state.revert_to_checkpoint();
        assert_eq!(state.balance(&addr).unwrap(), U256::from(10));
    }

    #[test]
    fn checkpoint_discard_keeps_changes_and_merges_into_parent() {
        let base = MemoryNodeStore::new();
        let addr = Address::from_low_u64_be(4);
        let mut state = State::from_existing(base, empty_root(), U256::zero());
        state.checkpoint();
        state.checkpoint();
        state.add_balance(&addr, U256::from(7)).unwrap();
        state.discard_checkpoint();
        assert_eq!(state.balance(&addr).unwrap(), U256::from(7));
        state.revert_to_checkpoint();
        assert_eq!(state.balance(&addr).unwrap(), U256::zero());
    }

    #[test]
    fn transfer_between_distinct_accounts() {
        let base = MemoryNodeStore::new();
        let from = Address::from_low_u64_be(10);
        let to = Address::from_low_u64_be(20);
        let mut state = State::from_existing(base, empty_root(), U256::zero());
        state.add_balance(&from, U256::from(50)).unwrap();
        state.transfer_balance(&from, &to, U256::from(20)).unwrap();
        assert_eq!(state.balance(&from).unwrap(), U256::from(30));
        assert_eq!(state.balance(&to).unwrap(), U256::from(20));
    }

    #[test]
    fn storage_round_trips_through_commit() {
        let base = MemoryNodeStore::new();
        let addr = Address::from_low_u64_be(30);
        let key = H256::from_low_u64_be(1);
        let value = H256::from_low_u64_be(42);
        let mut state = State::from_existing(base, empty_root(), U256::zero());
        state.add_balance(&addr, U256::from(1)).unwrap();
        state.set_storage(&addr, key, value).unwrap();
        let root = state.commit().unwrap();
        let mut reopened = State::from_existing(state.into_backend(), root, U256::zero());
        assert_eq!(reopened.storage_at(&addr, &key).unwrap(), value);
    }

    #[test]
    fn killed_account_is_absent_after_commit() {
        let base = MemoryNodeStore::new();
        let addr = Address::from_low_u64_be(40);
        let mut state = State::from_existing(base, empty_root(), U256::zero());
        state.add_balance(&addr, U256::from(1)).unwrap();
        let root = state.commit().unwrap();
        let mut state = State::from_existing(state.into_backend(), root, U256::zero());
        state.kill_account(&addr).unwrap();
        let root = state.commit().unwrap();
        let mut reopened = State::from_existing(state.into_backend(), root, U256::zero());
        assert!(!reopened.exists(&addr).unwrap());
    }
}
