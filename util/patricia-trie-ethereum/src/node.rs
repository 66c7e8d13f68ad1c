//! The four node shapes of the trie and their canonical RLP encoding.

use crate::nibble::Nibbles;
use ethereum_types::H256;
use rlp::{DecoderError, Rlp, RlpStream};

/// A reference to a child node: either the node's RLP inlined (when it is
/// shorter than 32 bytes) or the Keccak-256 hash of its RLP.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeRef {
    Empty,
    Hash(H256),
    Inline(Vec<u8>),
}

impl NodeRef {
    pub fn is_empty(&self) -> bool {
        matches!(self, NodeRef::Empty)
    }

    fn rlp_append(&self, stream: &mut RlpStream) {
        match self {
            NodeRef::Empty => {
                stream.append_empty_data();
            }
            NodeRef::Hash(h) => {
                stream.append(h);
            }
            NodeRef::Inline(raw) => {
                stream.append_raw(raw, 1);
            }
        }
    }

    fn decode(rlp: &Rlp) -> Result<NodeRef, DecoderError> {
        if rlp.is_empty() {
            return Ok(NodeRef::Empty);
        }
        if rlp.is_data() && rlp.size() == 32 {
            return Ok(NodeRef::Hash(rlp.as_val()?));
        }
        Ok(NodeRef::Inline(rlp.as_raw().to_vec()))
    }
}

/// A decoded trie node. See §3 "Trie node variants".
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Empty,
    Leaf(Nibbles, Vec<u8>),
    Extension(Nibbles, NodeRef),
    Branch([NodeRef; 16], Option<Vec<u8>>),
}

impl Node {
    pub fn rlp_bytes(&self) -> Vec<u8> {
        match self {
            Node::Empty => {
                let mut s = RlpStream::new();
                s.append_empty_data();
                s.out()
            }
            Node::Leaf(path, value) => {
                let mut s = RlpStream::new_list(2);
                s.append(&path.hex_prefix_encode(true));
                s.append(value);
                s.out()
            }
            Node::Extension(path, child) => {
                let mut s = RlpStream::new_list(2);
                s.append(&path.hex_prefix_encode(false));
                child.rlp_append(&mut s);
                s.out()
            }
            Node::Branch(children, value) => {
                let mut s = RlpStream::new_list(17);
                for child in children {
                    child.rlp_append(&mut s);
                }
                match value {
                    Some(v) => {
                        s.append(v);
                    }
                    None => {
                        s.append_empty_data();
                    }
                }
                s.out()
            }
        }
    }

    pub fn decode(data: &[u8]) -> Result<Node, DecoderError> {
        let rlp = Rlp::new(data);
        if rlp.is_empty() {
            return Ok(Node::Empty);
        }
        match rlp.item_count()? {
            2 => {
                let path_rlp: Vec<u8> = rlp.val_at(0)?;
                let (nibbles, terminator) = Nibbles::hex_prefix_decode(&path_rlp);
                if terminator {
                    let value: Vec<u8> = rlp.val_at(1)?;
                    Ok(Node::Leaf(nibbles, value))
                } else {
                    let child = NodeRef::decode(&rlp.at(1)?)?;
                    Ok(Node::Extension(nibbles, child))
                }
            }
            17 => {
                let mut children: [NodeRef; 16] = Default::default();
                for (i, c) in children.iter_mut().enumerate() {
                    *c = NodeRef::decode(&rlp.at(i)?)?;
                }
                let value_rlp = rlp.at(16)?;
                let value = if value_rlp.is_empty() {
                    None
                } else {
                    Some(value_rlp.data()?.to_vec())
                };
                Ok(Node::Branch(children, value))
            }
            _ => Err(DecoderError::RlpInvalidLength),
        }
    }
}

impl Default for NodeRef {
    fn default() -> Self {
        NodeRef::Empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nibble::Nibbles;

    #[test]
    fn leaf_round_trips() {
        let n = Node::Leaf(Nibbles::from_bytes(&[0xab, 0xcd]), b"value".to_vec());
        let rlp = n.rlp_bytes();
        assert_eq!(Node::decode(&rlp).unwrap(), n);
    }

    #[test]
    fn extension_round_trips_with_hash_child() {
        let n = Node::Extension(Nibbles::from_bytes(&[0x12]), NodeRef::Hash(H256::repeat_byte(7)));
        let rlp = n.rlp_bytes();
        assert_eq!(Node::decode(&rlp).unwrap(), n);
    }

    #[test]
    fn branch_round_trips() {
        let mut children: [NodeRef; 16] = Default::default();
        children[3] = NodeRef::Hash(H256::repeat_byte(1));
        let n = Node::Branch(children, Some(b"leaf-at-branch".to_vec()));
        let rlp = n.rlp_bytes();
        assert_eq!(Node::decode(&rlp).unwrap(), n);
    }

    #[test]
    fn empty_round_trips() {
        assert_eq!(Node::decode(&Node::Empty.rlp_bytes()).unwrap(), Node::Empty);
    }
}
