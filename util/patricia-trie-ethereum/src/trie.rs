//! The trie engine: canonical node storage plus `get`/`insert`/`remove`
//! maintaining the shape invariants of §3 and the six structural insertion
//! cases of §4.2.

use crate::error::TrieError;
use crate::nibble::Nibbles;
use crate::node::{Node, NodeRef};
use ethereum_types::H256;
use keccak_hasher::{keccak, KECCAK_NULL_RLP};
use std::collections::HashMap;

/// Backing key/value store for trie nodes, keyed by `kec(rlp(node))`. See
/// §4.3: a node is only ever looked up by the hash produced when it was
/// stored, so `insert` is idempotent and a missing hash is always a
/// programming or corruption error, never "not found" in the `get` sense.
pub trait NodeStore {
    fn get(&self, hash: &H256) -> Option<Vec<u8>>;
    fn insert(&mut self, hash: H256, rlp: Vec<u8>);
    fn contains(&self, hash: &H256) -> bool {
        self.get(hash).is_some()
    }
}

/// Plain in-memory `NodeStore`, used directly by tests and as the
/// overlay/base building block of the caching trie.
#[derive(Default, Clone, Debug)]
pub struct MemoryNodeStore(HashMap<H256, Vec<u8>>);

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&H256, &Vec<u8>)> {
        self.0.iter()
    }
}

impl NodeStore for MemoryNodeStore {
    fn get(&self, hash: &H256) -> Option<Vec<u8>> {
        self.0.get(hash).cloned()
    }

    fn insert(&mut self, hash: H256, rlp: Vec<u8>) {
        // Writing the same hash twice is a no-op (content-addressed store).
        self.0.entry(hash).or_insert(rlp);
    }

    fn contains(&self, hash: &H256) -> bool {
        self.0.contains_key(hash)
    }
}

/// A Merkle-Patricia trie rooted at `root`, backed by a mutable
/// `NodeStore`. `TrieDBMut` owns no persistent state of its own beyond the
/// root hash: every write goes straight through to `db`.
pub struct TrieDBMut<'db, S: NodeStore> {
    db: &'db mut S,
    root: H256,
}

impl<'db, S: NodeStore> TrieDBMut<'db, S> {
    /// A fresh, empty trie over `db`.
    pub fn new(db: &'db mut S) -> Self {
        TrieDBMut { db, root: KECCAK_NULL_RLP }
    }

    /// Reopen a trie at a previously computed root. Fails if `root` is
    /// non-canonical-empty and absent from `db`.
    pub fn from_existing(db: &'db mut S, root: H256) -> Result<Self, TrieError> {
        if root != KECCAK_NULL_RLP && !db.contains(&root) {
            return Err(TrieError::InvalidStateRoot(root));
        }
        Ok(TrieDBMut { db, root })
    }

    pub fn root(&self) -> H256 {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root == KECCAK_NULL_RLP
    }

    fn root_node(&self) -> Result<Node, TrieError> {
        if self.root == KECCAK_NULL_RLP {
            return Ok(Node::Empty);
        }
        let rlp = self
            .db
            .get(&self.root)
            .ok_or(TrieError::IncompleteDatabase(self.root))?;
        Node::decode(&rlp).map_err(|e| TrieError::DecoderError(self.root, e))
    }

    fn resolve(&self, r: &NodeRef) -> Result<Node, TrieError> {
        match r {
            NodeRef::Empty => Ok(Node::Empty),
            NodeRef::Inline(raw) => {
                Node::decode(raw).map_err(|e| TrieError::DecoderError(H256::zero(), e))
            }
            NodeRef::Hash(h) => {
                let rlp = self.db.get(h).ok_or(TrieError::IncompleteDatabase(*h))?;
                Node::decode(&rlp).map_err(|e| TrieError::DecoderError(*h, e))
            }
        }
    }

    /// §4.3 `store`: the child-reference form, inlining short RLP.
    fn store_ref(&mut self, node: &Node) -> NodeRef {
        if let Node::Empty = node {
            return NodeRef::Empty;
        }
        let rlp = node.rlp_bytes();
        if rlp.len() < 32 {
            NodeRef::Inline(rlp)
        } else {
            let h = keccak(&rlp);
            self.db.insert(h, rlp);
            NodeRef::Hash(h)
        }
    }

    /// The root is always hashed and stored, never inlined, even when its
    /// RLP would otherwise qualify — the root hash is the trie's identity.
    fn commit_root(&mut self, node: &Node) -> H256 {
        if let Node::Empty = node {
            return KECCAK_NULL_RLP;
        }
        let rlp = node.rlp_bytes();
        let h = keccak(&rlp);
        self.db.insert(h, rlp);
        h
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        let nibbles = Nibbles::from_bytes(key);
        self.get_at(self.root_node()?, &nibbles)
    }

    fn get_at(&self, node: Node, key: &Nibbles) -> Result<Option<Vec<u8>>, TrieError> {
        match node {
            Node::Empty => Ok(None),
            Node::Leaf(path, value) => Ok(if &path == key { Some(value) } else { None }),
            Node::Extension(path, child) => {
                if key.len() >= path.len() && key.prefix(path.len()) == path {
                    let child_node = self.resolve(&child)?;
                    self.get_at(child_node, &key.mid(path.len()))
                } else {
                    Ok(None)
                }
            }
            Node::Branch(children, value) => {
                if key.is_empty() {
                    Ok(value)
                } else {
                    let idx = key.at(0) as usize;
                    let child_node = self.resolve(&children[idx])?;
                    self.get_at(child_node, &key.mid(1))
                }
            }
        }
    }

    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<(), TrieError> {
        let nibbles = Nibbles::from_bytes(key);
        let root_node = self.root_node()?;
        let new_root = self.insert_at(root_node, &nibbles, value.to_vec())?;
        self.root = self.commit_root(&new_root);
        Ok(())
    }

    /// Case 1..6 of §4.2.
    fn insert_at(&mut self, node: Node, key: &Nibbles, value: Vec<u8>) -> Result<Node, TrieError> {
        match node {
            // Case 1.
            Node::Empty => Ok(Node::Leaf(key.clone(), value)),
            Node::Leaf(path, old_value) => {
                if &path == key {
                    // Case 2.
                    Ok(Node::Leaf(path, value))
                } else {
                    // Case 3.
                    let cp = path.common_prefix(key);
                    self.branch_from_two_leaves(&path, old_value, key, value, cp)
                }
            }
            Node::Extension(path, child_ref) => {
                let cp = path.common_prefix(key);
                if cp == path.len() {
                    // Case 4.
                    let child_node = self.resolve(&child_ref)?;
                    let new_child = self.insert_at(child_node, &key.mid(cp), value)?;
                    Ok(self.rebuild_extension(&path, new_child))
                } else {
                    // Case 5.
                    self.split_extension(&path, &child_ref, key, value, cp)
                }
            }
            Node::Branch(mut children, branch_value) => {
                // Case 6.
                if key.is_empty() {
                    Ok(Node::Branch(children, Some(value)))
                } else {
                    let idx = key.at(0) as usize;
                    let child_node = self.resolve(&children[idx])?;
                    let new_child = self.insert_at(child_node, &key.mid(1), value)?;
                    children[idx] = self.store_ref(&new_child);
                    Ok(Node::Branch(children, branch_value))
                }
            }
        }
    }

    fn branch_from_two_leaves(
        &mut self,
        path_a: &Nibbles,
        value_a: Vec<u8>,
        path_b: &Nibbles,
        value_b: Vec<u8>,
        cp: usize,
    ) -> Result<Node, TrieError> {
        let rem_a = path_a.mid(cp);
        let rem_b = path_b.mid(cp);
        let mut children: [NodeRef; 16] = Default::default();
        let mut branch_value = None;

        if rem_a.is_empty() {
            branch_value = Some(value_a);
        } else {
            let idx = rem_a.at(0) as usize;
            let leaf = Node::Leaf(rem_a.mid(1), value_a);
            children[idx] = self.store_ref(&leaf);
        }
        if rem_b.is_empty() {
            branch_value = Some(value_b);
        } else {
            let idx = rem_b.at(0) as usize;
            let leaf = Node::Leaf(rem_b.mid(1), value_b);
            children[idx] = self.store_ref(&leaf);
        }

        let branch = Node::Branch(children, branch_value);
        if cp == 0 {
            Ok(branch)
        } else {
            let branch_ref = self.store_ref(&branch);
            Ok(Node::Extension(path_a.prefix(cp), branch_ref))
        }
    }

    fn split_extension(
        &mut self,
        path: &Nibbles,
        child_ref: &NodeRef,
        key: &Nibbles,
        value: Vec<u8>,
        cp: usize,
    ) -> Result<Node, TrieError> {
        let existing_rem = path.mid(cp);
        let new_rem = key.mid(cp);
        let mut children: [NodeRef; 16] = Default::default();
        let mut branch_value = None;

        let idx_a = existing_rem.at(0) as usize;
        children[idx_a] = if existing_rem.len() > 1 {
            let ext = Node::Extension(existing_rem.mid(1), child_ref.clone());
            self.store_ref(&ext)
        } else {
            child_ref.clone()
        };

        if new_rem.is_empty() {
            branch_value = Some(value);
        } else {
            let idx_b = new_rem.at(0) as usize;
            let leaf = Node::Leaf(new_rem.mid(1), value);
            children[idx_b] = self.store_ref(&leaf);
        }

        let branch = Node::Branch(children, branch_value);
        if cp == 0 {
            Ok(branch)
        } else {
            let branch_ref = self.store_ref(&branch);
            Ok(Node::Extension(path.prefix(cp), branch_ref))
        }
    }

    /// Wrap `child` behind `path`, coalescing with an immediately
    /// following extension/leaf rather than chaining extensions (§3
    /// invariant), and collapsing to `Empty` if `child` is `Empty`.
    fn rebuild_extension(&mut self, path: &Nibbles, child: Node) -> Node {
        match child {
            Node::Empty => Node::Empty,
            Node::Extension(sub_path, sub_ref) => Node::Extension(path.joined(&sub_path), sub_ref),
            Node::Leaf(sub_path, value) => Node::Leaf(path.joined(&sub_path), value),
            branch @ Node::Branch(..) => {
                let r = self.store_ref(&branch);
                Node::Extension(path.clone(), r)
            }
        }
    }

    pub fn remove(&mut self, key: &[u8]) -> Result<(), TrieError> {
        let nibbles = Nibbles::from_bytes(key);
        let root_node = self.root_node()?;
        if let Some(new_root) = self.remove_at(root_node, &nibbles)? {
            self.root = self.commit_root(&new_root);
        }
        Ok(())
    }

    /// `None` means the key was absent and nothing changed.
    fn remove_at(&mut self, node: Node, key: &Nibbles) -> Result<Option<Node>, TrieError> {
        match node {
            Node::Empty => Ok(None),
            Node::Leaf(path, _) => Ok(if &path == key { Some(Node::Empty) } else { None }),
            Node::Extension(path, child_ref) => {
                if key.len() >= path.len() && key.prefix(path.len()) == path {
                    let child_node = self.resolve(&child_ref)?;
                    match self.remove_at(child_node, &key.mid(path.len()))? {
                        None => Ok(None),
                        Some(new_child) => Ok(Some(self.rebuild_extension(&path, new_child))),
                    }
                } else {
                    Ok(None)
                }
            }
            Node::Branch(children, value) => {
                if key.is_empty() {
                    match value {
                        None => Ok(None),
                        Some(_) => Ok(Some(self.fixup_branch(children, None)?)),
                    }
                } else {
                    let idx = key.at(0) as usize;
                    let child_node = self.resolve(&children[idx])?;
                    match self.remove_at(child_node, &key.mid(1))? {
                        None => Ok(None),
                        Some(new_child) => {
                            let mut children = children;
                            children[idx] = self.store_ref(&new_child);
                            Ok(Some(self.fixup_branch(children, value)?))
                        }
                    }
                }
            }
        }
    }

    /// Restore the branch collapse invariant: a branch with one remaining
    /// child and no value becomes an extension/leaf of that child; a
    /// branch with no children left but a value becomes a bare leaf.
    fn fixup_branch(
        &mut self,
        children: [NodeRef; 16],
        value: Option<Vec<u8>>,
    ) -> Result<Node, TrieError> {
        let nonempty: Vec<usize> = (0..16).filter(|&i| !children[i].is_empty()).collect();
        match (nonempty.len(), value) {
            (0, Some(v)) => Ok(Node::Leaf(Nibbles::from_vec(Vec::new()), v)),
            (0, None) => Ok(Node::Empty),
            (1, None) => {
                let idx = nonempty[0];
                let child_node = self.resolve(&children[idx])?;
                Ok(self.rebuild_extension(&Nibbles::from_vec(vec![idx as u8]), child_node))
            }
            (_, value) => Ok(Node::Branch(children, value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hex::FromHex;

    fn hex(s: &str) -> Vec<u8> {
        s.from_hex().unwrap()
    }

    #[test]
    fn empty_trie_has_canonical_root() {
        let mut db = MemoryNodeStore::new();
        let t = TrieDBMut::new(&mut db);
        assert_eq!(t.root(), KECCAK_NULL_RLP);
        assert!(t.is_empty());
    }

    #[test]
    fn get_put_law() {
        let mut db = MemoryNodeStore::new();
        let mut t = TrieDBMut::new(&mut db);
        t.insert(&hex("0123"), &hex("0123")).unwrap();
        assert_eq!(t.get(&hex("0123")).unwrap(), Some(hex("0123")));
        assert_eq!(t.get(&hex("0124")).unwrap(), None);
    }

    #[test]
    fn insert_replace_root() {
        let mut db = MemoryNodeStore::new();
        let mut t = TrieDBMut::new(&mut db);
        t.insert(&hex("0123"), &hex("0123")).unwrap();
        t.insert(&hex("0123"), &hex("2345")).unwrap();
        assert_eq!(t.get(&hex("0123")).unwrap(), Some(hex("2345")));
    }

    #[test]
    fn insert_make_branch_root() {
        let mut db = MemoryNodeStore::new();
        let mut t = TrieDBMut::new(&mut db);
        t.insert(&hex("0123"), &hex("0123")).unwrap();
        t.insert(&hex("1123"), &hex("1123")).unwrap();
        assert_eq!(t.get(&hex("0123")).unwrap(), Some(hex("0123")));
        assert_eq!(t.get(&hex("1123")).unwrap(), Some(hex("1123")));
    }

    #[test]
    fn insert_into_branch_root() {
        let mut db = MemoryNodeStore::new();
        let mut t = TrieDBMut::new(&mut db);
        t.insert(&hex("0123"), &hex("0123")).unwrap();
        t.insert(&hex("f123"), &hex("f123")).unwrap();
        t.insert(&hex("8123"), &hex("8123")).unwrap();
        assert_eq!(t.get(&hex("0123")).unwrap(), Some(hex("0123")));
        assert_eq!(t.get(&hex("f123")).unwrap(), Some(hex("f123")));
        assert_eq!(t.get(&hex("8123")).unwrap(), Some(hex("8123")));
        assert_eq!(t.get(&hex("8223")).unwrap(), None);
    }

    #[test]
    fn insert_value_into_branch_root() {
        let mut db = MemoryNodeStore::new();
        let mut t = TrieDBMut::new(&mut db);
        t.insert(&hex("0123"), &hex("0123")).unwrap();
        t.insert(&[], &hex("00")).unwrap();
        assert_eq!(t.get(&[]).unwrap(), Some(hex("00")));
        assert_eq!(t.get(&hex("0123")).unwrap(), Some(hex("0123")));
    }

    #[test]
    fn insert_split_leaf_and_extension() {
        let mut db = MemoryNodeStore::new();
        let mut t = TrieDBMut::new(&mut db);
        t.insert(&hex("012345"), &hex("01")).unwrap();
        t.insert(&hex("01f345"), &hex("02")).unwrap();
        t.insert(&hex("01f3f5"), &hex("03")).unwrap();
        assert_eq!(t.get(&hex("012345")).unwrap(), Some(hex("01")));
        assert_eq!(t.get(&hex("01f345")).unwrap(), Some(hex("02")));
        assert_eq!(t.get(&hex("01f3f5")).unwrap(), Some(hex("03")));
    }

    #[test]
    fn remove_to_empty() {
        let mut db = MemoryNodeStore::new();
        let mut t = TrieDBMut::new(&mut db);
        t.insert(&hex("0123"), &hex("0123")).unwrap();
        t.remove(&hex("0123")).unwrap();
        assert_eq!(t.root(), KECCAK_NULL_RLP);
        assert_eq!(t.get(&hex("0123")).unwrap(), None);
    }

    #[test]
    fn remove_collapses_branch() {
        let mut db = MemoryNodeStore::new();
        let mut t = TrieDBMut::new(&mut db);
        t.insert(&hex("0123"), &hex("00000000000000000000000000000000"))
            .unwrap();
        t.insert(&hex("1123"), &hex("11111111111111111111111111111111"))
            .unwrap();
        t.remove(&hex("1123")).unwrap();
        assert_eq!(t.get(&hex("0123")).unwrap(), Some(hex("00000000000000000000000000000000")));
        assert_eq!(t.get(&hex("1123")).unwrap(), None);

        // a from-scratch trie with only the surviving entry has the same root.
        let mut db2 = MemoryNodeStore::new();
        let mut t2 = TrieDBMut::new(&mut db2);
        t2.insert(&hex("0123"), &hex("00000000000000000000000000000000"))
            .unwrap();
        assert_eq!(t.root(), t2.root());
    }

    #[test]
    fn remove_nonexistent_key_is_noop() {
        let mut db = MemoryNodeStore::new();
        let mut t = TrieDBMut::new(&mut db);
        t.insert(&hex("0123"), &hex("0123")).unwrap();
        let root_before = t.root();
        t.remove(&hex("ffff")).unwrap();
        assert_eq!(t.root(), root_before);
    }

    #[test]
    fn insert_and_remove_everything_yields_canonical_empty_root() {
        let mut db = MemoryNodeStore::new();
        let mut t = TrieDBMut::new(&mut db);
        let entries: Vec<(Vec<u8>, Vec<u8>)> = vec![
            (hex("0123"), hex("01")),
            (hex("f123"), hex("02")),
            (hex("8123"), hex("03")),
            (hex("012345"), hex("04")),
            (hex("01f345"), hex("05")),
        ];
        for (k, v) in &entries {
            t.insert(k, v).unwrap();
        }
        for (k, _) in &entries {
            t.remove(k).unwrap();
        }
        assert_eq!(t.root(), KECCAK_NULL_RLP);
    }

    #[test]
    fn root_is_independent_of_insertion_order() {
        let entries: Vec<(Vec<u8>, Vec<u8>)> = vec![
            (hex("0123"), hex("01")),
            (hex("f123"), hex("02")),
            (hex("8123"), hex("03")),
            (hex("012345"), hex("04")),
            (hex("01f345"), hex("05")),
            (b"cat".to_vec(), b"dog".to_vec()),
        ];

        let mut db1 = MemoryNodeStore::new();
        let mut t1 = TrieDBMut::new(&mut db1);
        for (k, v) in &entries {
            t1.insert(k, v).unwrap();
        }

        let mut reversed = entries.clone();
        reversed.reverse();
        let mut db2 = MemoryNodeStore::new();
        let mut t2 = TrieDBMut::new(&mut db2);
        for (k, v) in &reversed {
            t2.insert(k, v).unwrap();
        }

        assert_eq!(t1.root(), t2.root());
    }

    #[test]
    fn from_existing_rejects_unknown_root() {
        let mut db = MemoryNodeStore::new();
        let bogus = H256::repeat_byte(0x42);
        assert_eq!(
            TrieDBMut::from_existing(&mut db, bogus).unwrap_err(),
            TrieError::InvalidStateRoot(bogus)
        );
    }
}
