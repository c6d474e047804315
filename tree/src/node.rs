//! Tree nodes, their hashes and their storage encoding

use std::io::{Read, Write};

use ed::{Decode, Encode, Terminated};
use integer_encoding::{VarInt, VarIntReader, VarIntWriter};

use crate::{Error, Result};

/// Length of node and value hashes
pub const HASH_LENGTH: usize = 32;

/// A blake3 digest identifying a node or a value.
pub type Hash = [u8; HASH_LENGTH];

const LEAF_INLINE: u8 = 0;
const LEAF_DETACHED: u8 = 1;
const INNER: u8 = 2;

const LEAF_HASH_PREFIX: u8 = 0;
const INNER_HASH_PREFIX: u8 = 1;

/// Where a leaf keeps its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafValue {
    /// The value is stored in the node record itself.
    Inline(Vec<u8>),
    /// Only the value hash is stored; the value lives in a secondary value
    /// store under the leaf key.
    Detached(Hash),
}

impl LeafValue {
    fn hash(&self) -> Hash {
        match self {
            LeafValue::Inline(value) => value_hash(value),
            LeafValue::Detached(hash) => *hash,
        }
    }
}

/// Leaf or inner payload of a [`Node`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Holds one key/value pair.
    Leaf(LeafValue),
    /// Routes lookups; keys `< node.key` live on the left.
    Inner {
        height: u8,
        size: u64,
        left: Hash,
        right: Hash,
    },
}

/// A node as persisted in a node store.
///
/// Inner nodes carry the smallest key of their right subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub key: Vec<u8>,
    pub version: u64,
    pub kind: NodeKind,
}

/// Hashes a value.
pub fn value_hash(value: &[u8]) -> Hash {
    *blake3::hash(value).as_bytes()
}

impl Node {
    /// New leaf with an inline value
    pub fn leaf(key: Vec<u8>, value: Vec<u8>, version: u64) -> Self {
        Node {
            key,
            version,
            kind: NodeKind::Leaf(LeafValue::Inline(value)),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    /// Height of the subtree rooted here, 0 for leaves
    pub fn height(&self) -> u8 {
        match self.kind {
            NodeKind::Leaf(_) => 0,
            NodeKind::Inner { height, .. } => height,
        }
    }

    /// Number of leaves below (and including) this node
    pub fn size(&self) -> u64 {
        match self.kind {
            NodeKind::Leaf(_) => 1,
            NodeKind::Inner { size, .. } => size,
        }
    }

    /// Node hash. A leaf commits to the hash of its value, so the inline and
    /// detached forms of the same leaf hash identically.
    pub fn hash(&self) -> Hash {
        let mut hasher = blake3::Hasher::new();
        match &self.kind {
            NodeKind::Leaf(value) => {
                hasher.update(&[LEAF_HASH_PREFIX]);
                hasher.update(&self.version.encode_var_vec());
                hasher.update(&self.key.len().encode_var_vec());
                hasher.update(&self.key);
                hasher.update(&value.hash());
            }
            NodeKind::Inner {
                height,
                size,
                left,
                right,
            } => {
                hasher.update(&[INNER_HASH_PREFIX, *height]);
                hasher.update(&size.encode_var_vec());
                hasher.update(&self.version.encode_var_vec());
                hasher.update(left);
                hasher.update(right);
            }
        }
        *hasher.finalize().as_bytes()
    }

    /// Decode a whole node record; bytes left over after the node are an
    /// error.
    pub fn decode_record(bytes: &[u8]) -> Result<Self> {
        let mut input = bytes;
        let node = Node::decode(&mut input).map_err(Error::CorruptedNode)?;
        match input.first() {
            None => Ok(node),
            Some(&byte) => Err(Error::CorruptedNode(ed::Error::UnexpectedByte(byte))),
        }
    }
}

impl Encode for LeafValue {
    fn encode_into<W: Write>(&self, dest: &mut W) -> ed::Result<()> {
        match self {
            LeafValue::Inline(value) => {
                dest.write_all(&[LEAF_INLINE])?;
                dest.write_varint(value.len())?;
                dest.write_all(value)?;
            }
            LeafValue::Detached(hash) => {
                dest.write_all(&[LEAF_DETACHED])?;
                dest.write_all(hash)?;
            }
        }
        Ok(())
    }

    fn encoding_length(&self) -> ed::Result<usize> {
        Ok(match self {
            LeafValue::Inline(value) => 1 + value.len().required_space() + value.len(),
            LeafValue::Detached(_) => 1 + HASH_LENGTH,
        })
    }
}

impl Decode for LeafValue {
    fn decode<R: Read>(mut input: R) -> ed::Result<Self> {
        let mut tag = [0; 1];
        input.read_exact(&mut tag)?;
        match tag[0] {
            LEAF_INLINE => {
                let len: usize = input.read_varint()?;
                let mut value = vec![0; len];
                input.read_exact(&mut value)?;
                Ok(LeafValue::Inline(value))
            }
            LEAF_DETACHED => {
                let mut hash = [0; HASH_LENGTH];
                input.read_exact(&mut hash)?;
                Ok(LeafValue::Detached(hash))
            }
            byte => Err(ed::Error::UnexpectedByte(byte)),
        }
    }
}

impl Terminated for LeafValue {}

impl Encode for NodeKind {
    fn encode_into<W: Write>(&self, dest: &mut W) -> ed::Result<()> {
        match self {
            NodeKind::Leaf(value) => value.encode_into(dest),
            NodeKind::Inner {
                height,
                size,
                left,
                right,
            } => {
                dest.write_all(&[INNER, *height])?;
                dest.write_varint(*size)?;
                dest.write_all(left)?;
                dest.write_all(right)?;
                Ok(())
            }
        }
    }

    fn encoding_length(&self) -> ed::Result<usize> {
        match self {
            NodeKind::Leaf(value) => value.encoding_length(),
            NodeKind::Inner { size, .. } => Ok(2 + size.required_space() + 2 * HASH_LENGTH),
        }
    }
}

impl Decode for NodeKind {
    fn decode<R: Read>(mut input: R) -> ed::Result<Self> {
        let mut tag = [0; 1];
        input.read_exact(&mut tag)?;
        if tag[0] != INNER {
            // leaf tags belong to the value encoding
            return LeafValue::decode((&tag[..]).chain(input)).map(NodeKind::Leaf);
        }
        let mut height = [0; 1];
        input.read_exact(&mut height)?;
        let size: u64 = input.read_varint()?;
        let mut left = [0; HASH_LENGTH];
        input.read_exact(&mut left)?;
        let mut right = [0; HASH_LENGTH];
        input.read_exact(&mut right)?;
        Ok(NodeKind::Inner {
            height: height[0],
            size,
            left,
            right,
        })
    }
}

impl Terminated for NodeKind {}

impl Encode for Node {
    fn encode_into<W: Write>(&self, dest: &mut W) -> ed::Result<()> {
        dest.write_varint(self.version)?;
        dest.write_varint(self.key.len())?;
        dest.write_all(&self.key)?;
        self.kind.encode_into(dest)
    }

    fn encoding_length(&self) -> ed::Result<usize> {
        Ok(self.version.required_space()
            + self.key.len().required_space()
            + self.key.len()
            + self.kind.encoding_length()?)
    }
}

impl Decode for Node {
    fn decode<R: Read>(mut input: R) -> ed::Result<Self> {
        let version: u64 = input.read_varint()?;
        let key_len: usize = input.read_varint()?;
        let mut key = vec![0; key_len];
        input.read_exact(&mut key)?;
        let kind = NodeKind::decode(&mut input)?;
        Ok(Node { key, version, kind })
    }
}

impl Terminated for Node {}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn inline_and_detached_leaves_hash_alike() {
        let inline = Node::leaf(b"key".to_vec(), b"value".to_vec(), 3);
        let detached = Node {
            kind: NodeKind::Leaf(LeafValue::Detached(value_hash(b"value"))),
            ..inline.clone()
        };
        assert_eq!(inline.hash(), detached.hash());
        assert_ne!(inline.encode().unwrap(), detached.encode().unwrap());
    }

    #[test]
    fn encoding_roundtrips_every_kind() {
        let leaf = Node::leaf(b"k".to_vec(), vec![7; 300], 1);
        let detached = Node {
            key: b"k".to_vec(),
            version: 2,
            kind: NodeKind::Leaf(LeafValue::Detached([9; HASH_LENGTH])),
        };
        let inner = Node {
            key: b"m".to_vec(),
            version: 5,
            kind: NodeKind::Inner {
                height: 3,
                size: 6,
                left: [1; HASH_LENGTH],
                right: [2; HASH_LENGTH],
            },
        };
        for node in [leaf, detached, inner] {
            let bytes = node.encode().unwrap();
            assert_eq!(bytes.len(), node.encoding_length().unwrap());
            assert_eq!(Node::decode_record(&bytes).unwrap(), node);
        }
    }

    #[test]
    fn version_changes_hash() {
        let a = Node::leaf(b"k".to_vec(), b"v".to_vec(), 1);
        let b = Node::leaf(b"k".to_vec(), b"v".to_vec(), 2);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn truncated_record_is_rejected() {
        let bytes = Node::leaf(b"key".to_vec(), b"value".to_vec(), 1)
            .encode()
            .unwrap();
        assert_matches!(
            Node::decode_record(&bytes[..bytes.len() - 1]),
            Err(Error::CorruptedNode(_))
        );
    }

    #[test]
    fn unknown_kind_tag_is_rejected() {
        assert_matches!(
            Node::decode_record(&[1, 0, 7]),
            Err(Error::CorruptedNode(ed::Error::UnexpectedByte(7)))
        );
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = Node::leaf(b"key".to_vec(), b"value".to_vec(), 1)
            .encode()
            .unwrap();
        bytes.push(0xaa);
        assert_matches!(
            Node::decode_record(&bytes),
            Err(Error::CorruptedNode(ed::Error::UnexpectedByte(0xaa)))
        );
    }
}
