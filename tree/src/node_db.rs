//! Node store: node records and version roots on top of a [`Storage`]

use clusterkit_storage::{Batch, RawIterator, Storage};
use ed::Encode;

use crate::{
    node::{value_hash, LeafValue, NodeKind},
    Error, Hash, Node, Result, HASH_LENGTH,
};

const NODE_PREFIX: u8 = b'n';
const ROOT_PREFIX: u8 = b'r';

/// Resolves a detached leaf value by key.
pub type ValueGetter<'db> =
    Box<dyn Fn(&[u8]) -> std::result::Result<Option<Vec<u8>>, clusterkit_storage::Error> + 'db>;

/// Reads and stages tree records in a backing store.
///
/// A node store built with a value source keeps leaf values out of the node
/// records: leaves are written detached and read back through the getter.
pub struct NodeDb<'db, S: Storage> {
    storage: &'db S,
    values: Option<ValueGetter<'db>>,
}

fn node_key(hash: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + HASH_LENGTH);
    key.push(NODE_PREFIX);
    key.extend_from_slice(hash);
    key
}

fn root_key(version: u64) -> [u8; 9] {
    let mut key = [ROOT_PREFIX; 9];
    key[1..].copy_from_slice(&version.to_be_bytes());
    key
}

impl<'db, S: Storage> NodeDb<'db, S> {
    /// Node store keeping values inline
    pub fn new(storage: &'db S) -> Self {
        NodeDb {
            storage,
            values: None,
        }
    }

    /// Node store whose leaf values live in a secondary store
    pub fn with_value_source(storage: &'db S, values: ValueGetter<'db>) -> Self {
        NodeDb {
            storage,
            values: Some(values),
        }
    }

    /// Node store whose leaf values live in `values` under the leaf key
    pub fn with_value_store<V: Storage>(storage: &'db S, values: &'db V) -> Self {
        Self::with_value_source(storage, Box::new(move |key| values.get(key)))
    }

    pub fn storage(&self) -> &'db S {
        self.storage
    }

    pub fn detaches_values(&self) -> bool {
        self.values.is_some()
    }

    pub fn get_node(&self, hash: &Hash) -> Result<Node> {
        let bytes = self
            .storage
            .get(node_key(hash))?
            .ok_or_else(|| Error::MissingNode(hex::encode(hash)))?;
        Node::decode_record(&bytes)
    }

    /// Value of a leaf, fetched from the value source when detached.
    pub fn leaf_value(&self, node: &Node) -> Result<Vec<u8>> {
        match &node.kind {
            NodeKind::Leaf(LeafValue::Inline(value)) => Ok(value.clone()),
            NodeKind::Leaf(LeafValue::Detached(_)) => {
                let getter = self
                    .values
                    .as_ref()
                    .ok_or_else(|| Error::MissingValue(hex::encode(&node.key)))?;
                getter(&node.key)?.ok_or_else(|| Error::MissingValue(hex::encode(&node.key)))
            }
            NodeKind::Inner { .. } => Err(Error::CorruptionError("inner nodes carry no value")),
        }
    }

    /// Root record of `version`: `None` when the version was never saved,
    /// `Some(None)` when it was saved empty.
    pub fn root(&self, version: u64) -> Result<Option<Option<Hash>>> {
        let Some(bytes) = self.storage.get(root_key(version))? else {
            return Ok(None);
        };
        match bytes.len() {
            0 => Ok(Some(None)),
            HASH_LENGTH => {
                let mut hash = [0; HASH_LENGTH];
                hash.copy_from_slice(&bytes);
                Ok(Some(Some(hash)))
            }
            _ => Err(Error::CorruptionError("root record has a bad length")),
        }
    }

    /// Every saved version, ascending
    pub fn versions(&self) -> Result<Vec<u64>> {
        let mut iter = self.storage.raw_iter(Some(&[ROOT_PREFIX + 1][..]));
        iter.seek([ROOT_PREFIX]);
        let mut versions = Vec::new();
        while iter.valid() {
            if let Some(key) = iter.key() {
                let suffix: [u8; 8] = key[1..]
                    .try_into()
                    .map_err(|_| Error::CorruptionError("root key has a bad length"))?;
                versions.push(u64::from_be_bytes(suffix));
            }
            iter.next();
        }
        Ok(versions)
    }

    /// Stage `node` under `hash`, in the form this store keeps leaves.
    pub fn stage_node(&self, batch: &mut S::Batch, hash: &Hash, node: &Node) -> Result<()> {
        let detached;
        let node = match &node.kind {
            NodeKind::Leaf(LeafValue::Inline(value)) if self.detaches_values() => {
                detached = Node {
                    kind: NodeKind::Leaf(LeafValue::Detached(value_hash(value))),
                    ..node.clone()
                };
                &detached
            }
            _ => node,
        };
        let bytes = node.encode().map_err(Error::NodeEncodingError)?;
        batch.put(node_key(hash), &bytes);
        Ok(())
    }

    pub fn stage_root(&self, batch: &mut S::Batch, version: u64, root: Option<&Hash>) {
        batch.put(root_key(version), root.map_or(&[][..], |hash| &hash[..]));
    }
}
