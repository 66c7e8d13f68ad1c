//! A caching trie: an immutable base plus a mutable overlay, so that a
//! block's worth of state changes can be built up and thrown away (on
//! revert) or folded into the permanent store (on commit) as a unit. See
//! §4.4.

use ethereum_types::H256;
use patricia_trie_ethereum::{MemoryNodeStore, NodeStore, TrieDBMut, TrieError};
use std::collections::HashMap;

/// Reads check the overlay first, falling back to `base`; writes land only
/// in the overlay. `base` is never mutated by a `CachingTrie` — only
/// `commit` hands its accumulated writes back to the caller to fold in.
struct LayeredStore<'a, S: NodeStore> {
    base: &'a S,
    overlay: &'a mut MemoryNodeStore,
}

impl<'a, S: NodeStore> NodeStore for LayeredStore<'a, S> {
    fn get(&self, hash: &H256) -> Option<Vec<u8>> {
        self.overlay.get(hash).or_else(|| self.base.get(hash))
    }

    fn insert(&mut self, hash: H256, rlp: Vec<u8>) {
        self.overlay.insert(hash, rlp);
    }

    fn contains(&self, hash: &H256) -> bool {
        self.overlay.contains(hash) || self.base.contains(hash)
    }
}

/// The accumulated overlay of a `CachingTrie`, ready to fold into a
/// permanent store. Folding the same `Commit` into `base` twice is a
/// no-op the second time, since every write here is content-addressed.
pub struct Commit {
    pub root: H256,
    pub nodes: Vec<(H256, Vec<u8>)>,
    pub code: Vec<(H256, Vec<u8>)>,
    pub subtries: Vec<(Vec<u8>, H256)>,
}

impl Commit {
    /// Apply this commit's node and code writes to `base`.
    pub fn apply_to<S: NodeStore>(&self, base: &mut S) {
        for (h, rlp) in &self.nodes {
            base.insert(*h, rlp.clone());
        }
        for (h, code) in &self.code {
            base.insert(*h, code.clone());
        }
    }
}

/// A trie rooted at `root`, reading through to a `base` supplied per call
/// and buffering writes in `overlay` until `commit`. Unlike the teacher's
/// single-backend `JournalDB`, this trie never stores `base` itself — the
/// caller (`State`) owns the backing store and only lends it for the
/// duration of one read/write, which is what lets `State::commit` later
/// reclaim an exclusive `&mut` on that same store to fold the overlay in.
pub struct CachingTrie {
    overlay: MemoryNodeStore,
    root: H256,
    raw: HashMap<H256, Vec<u8>>,
    subtries: HashMap<Vec<u8>, H256>,
}

impl CachingTrie {
    pub fn new(root: H256) -> Self {
        CachingTrie { overlay: MemoryNodeStore::new(), root, raw: HashMap::new(), subtries: HashMap::new() }
    }

    pub fn root(&self) -> H256 {
        self.root
    }

    fn layered<S: NodeStore>(&mut self, base: &S) -> LayeredStore<'_, S> {
        LayeredStore { base, overlay: &mut self.overlay }
    }

    pub fn get<S: NodeStore>(&mut self, base: &S, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        let root = self.root;
        let mut store = self.layered(base);
        let trie = TrieDBMut::from_existing(&mut store, root)?;
        trie.get(key)
    }

    pub fn put<S: NodeStore>(&mut self, base: &S, key: &[u8], value: &[u8]) -> Result<(), TrieError> {
        let root = self.root;
        let mut store = self.layered(base);
        let mut trie = TrieDBMut::from_existing(&mut store, root)?;
        trie.insert(key, value)?;
        self.root = trie.root();
        Ok(())
    }

    pub fn remove<S: NodeStore>(&mut self, base: &S, key: &[u8]) -> Result<(), TrieError> {
        let root = self.root;
        let mut store = self.layered(base);
        let mut trie = TrieDBMut::from_existing(&mut store, root)?;
        trie.remove(key)?;
        self.root = trie.root();
        Ok(())
    }

    /// Update a named sub-root sharing this caching trie's overlay — the
    /// per-account storage trie case. Returns the sub-trie's new root; the
    /// caller writes that root into the parent structure (the account's
    /// `storage_root`) itself, since this trie has no notion of accounts.
    pub fn subtrie_update<S: NodeStore>(
        &mut self,
        base: &S,
        name: &[u8],
        root: H256,
        key: &[u8],
        value: &[u8],
    ) -> Result<H256, TrieError> {
        let mut store = self.layered(base);
        let mut trie = TrieDBMut::from_existing(&mut store, root)?;
        trie.insert(key, value)?;
        let new_root = trie.root();
        self.subtries.insert(name.to_vec(), new_root);
        Ok(new_root)
    }

    pub fn subtrie_get<S: NodeStore>(&mut self, base: &S, root: H256, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        let mut store = self.layered(base);
        let trie = TrieDBMut::from_existing(&mut store, root)?;
        trie.get(key)
    }

    /// Remove a key from a named sub-root, e.g. an account storage slot
    /// being reset to zero (§3 "a zero value means the entry is deleted").
    pub fn subtrie_remove<S: NodeStore>(
        &mut self,
        base: &S,
        name: &[u8],
        root: H256,
        key: &[u8],
    ) -> Result<H256, TrieError> {
        let mut store = self.layered(base);
        let mut trie = TrieDBMut::from_existing(&mut store, root)?;
        trie.remove(key)?;
        let new_root = trie.root();
        self.subtries.insert(name.to_vec(), new_root);
        Ok(new_root)
    }

    /// Store content-addressed bytes (contract code) outside the trie
    /// structure, keyed by caller-supplied hash.
    pub fn raw_put(&mut self, hash: H256, value: Vec<u8>) {
        self.raw.insert(hash, value);
    }

    pub fn raw_get<S: NodeStore>(&self, base: &S, hash: &H256) -> Option<Vec<u8>> {
        self.raw.get(hash).cloned().or_else(|| base.get(hash))
    }

    /// Fold the overlay's writes into a `Commit` the caller applies to the
    /// permanent store, producing the root and per-write log (`trie_changes`
    /// in the overlay's own vocabulary).
    pub fn commit(self) -> Commit {
        Commit {
            root: self.root,
            nodes: self.overlay.iter().map(|(h, v)| (*h, v.clone())).collect(),
            code: self.raw.into_iter().collect(),
            subtries: self.subtries.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patricia_trie_ethereum::MemoryNodeStore as Base;

    #[test]
    fn put_does_not_touch_base_until_commit() {
        let base = Base::new();
        let empty_root = keccak_hasher::KECCAK_NULL_RLP;
        let mut ct = CachingTrie::new(empty_root);
        ct.put(&base, b"key", b"value").unwrap();
        assert!(base.is_empty());
        assert_eq!(ct.get(&base, b"key").unwrap(), Some(b"value".to_vec()));
    }

    #[test]
    fn commit_folds_overlay_into_base_and_survives_recreation() {
        let mut base = Base::new();
        let empty_root = {
            let t = TrieDBMut::new(&mut base);
            t.root()
        };
        let mut ct = CachingTrie::new(empty_root);
        ct.put(&base, b"key", b"value").unwrap();
        let commit = ct.commit();
        commit.apply_to(&mut base);

        let mut reopened = CachingTrie::new(commit.root);
        assert_eq!(reopened.get(&base, b"key").unwrap(), Some(b"value".to_vec()));
    }

    #[test]
    fn get_falls_back_to_base_on_overlay_miss() {
        let mut base = Base::new();
        let root = {
            let mut t = TrieDBMut::new(&mut base);
            t.insert(b"already-committed", b"old-value").unwrap();
            t.root()
        };
        let mut ct = CachingTrie::new(root);
        assert_eq!(ct.get(&base, b"already-committed").unwrap(), Some(b"old-value".to_vec()));
        // an overlay-only write shadows nothing in base but is visible too.
        ct.put(&base, b"new", b"fresh").unwrap();
        assert_eq!(ct.get(&base, b"new").unwrap(), Some(b"fresh".to_vec()));
        assert_eq!(ct.get(&base, b"already-committed").unwrap(), Some(b"old-value".to_vec()));
    }

    #[test]
    fn raw_put_and_get_bypass_trie_structure() {
        let base = Base::new();
        let root = ethereum_types::H256::zero();
        let mut ct = CachingTrie::new(root);
        let hash = ethereum_types::H256::repeat_byte(9);
        ct.raw_put(hash, b"contract bytecode".to_vec());
        assert_eq!(ct.raw_get(&base, &hash), Some(b"contract bytecode".to_vec()));
        assert_eq!(ct.get(&base, b"anything").unwrap_or(None), None);
    }

    #[test]
    fn raw_get_falls_back_to_base_after_commit() {
        let mut base = Base::new();
        let hash = ethereum_types::H256::repeat_byte(3);
        {
            let root = ethereum_types::H256::zero();
            let mut ct = CachingTrie::new(root);
            ct.raw_put(hash, b"code".to_vec());
            let commit = ct.commit();
            commit.apply_to(&mut base);
        }
        let ct2 = CachingTrie::new(ethereum_types::H256::zero());
        assert_eq!(ct2.raw_get(&base, &hash), Some(b"code".to_vec()));
    }

    #[test]
    fn subtrie_update_is_independent_of_the_main_root() {
        let base = Base::new();
        let mut ct = CachingTrie::new(ethereum_types::H256::zero());
        let storage_root_before = keccak_hasher::KECCAK_NULL_RLP;
        let storage_root_after = ct
            .subtrie_update(&base, b"account-storage", storage_root_before, &[0u8; 32], b"1")
            .unwrap();
        assert_ne!(storage_root_after, storage_root_before);
        assert_eq!(
            ct.subtrie_get(&base, storage_root_after, &[0u8; 32]).unwrap(),
            Some(b"1".to_vec())
        );
    }
}
