//! Working tree: AVL insertion over stored nodes and version saving

use std::cmp::Ordering;

use clusterkit_storage::{Storage, WriteMode};

use crate::{node::NodeKind, Error, Hash, ImmutableTree, Node, NodeDb, Result};

/// Reference to a child subtree.
enum Link {
    /// Unchanged since it was loaded; only its hash is known.
    Stored(Hash),
    /// Loaded into memory, possibly changed.
    Modified(Box<WorkingNode>),
}

struct WorkingNode {
    key: Vec<u8>,
    /// `Some` for leaves created by this working set
    value: Option<Vec<u8>>,
    version: u64,
    height: u8,
    size: u64,
    left: Option<Link>,
    right: Option<Link>,
    /// Hash of the stored node this was loaded from, while untouched
    origin: Option<Hash>,
}

impl WorkingNode {
    fn leaf(key: Vec<u8>, value: Vec<u8>, version: u64) -> Box<Self> {
        Box::new(WorkingNode {
            key,
            value: Some(value),
            version,
            height: 0,
            size: 1,
            left: None,
            right: None,
            origin: None,
        })
    }

    fn stored(node: Node, hash: Hash) -> Box<Self> {
        let (height, size, left, right) = match node.kind {
            NodeKind::Leaf(_) => (0, 1, None, None),
            NodeKind::Inner {
                height,
                size,
                left,
                right,
            } => (height, size, Some(Link::Stored(left)), Some(Link::Stored(right))),
        };
        Box::new(WorkingNode {
            key: node.key,
            value: None,
            version: node.version,
            height,
            size,
            left,
            right,
            origin: Some(hash),
        })
    }

    fn is_leaf(&self) -> bool {
        self.height == 0
    }

    fn into_link(self: Box<Self>) -> Link {
        match self.origin {
            Some(hash) => Link::Stored(hash),
            None => Link::Modified(self),
        }
    }

    /// Mark as changed at `version` and recompute height and size.
    fn touch<S: Storage>(&mut self, ndb: &NodeDb<'_, S>, version: u64) -> Result<()> {
        let (left_height, left_size) = dims(ndb, self.left.as_ref())?;
        let (right_height, right_size) = dims(ndb, self.right.as_ref())?;
        self.version = version;
        self.origin = None;
        self.height = 1 + left_height.max(right_height);
        self.size = left_size + right_size;
        Ok(())
    }

    fn balance<S: Storage>(&self, ndb: &NodeDb<'_, S>) -> Result<i16> {
        let (left, _) = dims(ndb, self.left.as_ref())?;
        let (right, _) = dims(ndb, self.right.as_ref())?;
        Ok(i16::from(left) - i16::from(right))
    }
}

fn dims<S: Storage>(ndb: &NodeDb<'_, S>, link: Option<&Link>) -> Result<(u8, u64)> {
    match link {
        Some(Link::Stored(hash)) => {
            let node = ndb.get_node(hash)?;
            Ok((node.height(), node.size()))
        }
        Some(Link::Modified(node)) => Ok((node.height, node.size)),
        None => Err(Error::CorruptionError("inner node is missing a child")),
    }
}

fn load<S: Storage>(ndb: &NodeDb<'_, S>, link: Link) -> Result<Box<WorkingNode>> {
    match link {
        Link::Modified(node) => Ok(node),
        Link::Stored(hash) => Ok(WorkingNode::stored(ndb.get_node(&hash)?, hash)),
    }
}

fn load_inner<S: Storage>(ndb: &NodeDb<'_, S>, link: Option<Link>) -> Result<Box<WorkingNode>> {
    let link = link.ok_or(Error::CorruptionError("inner node is missing a child"))?;
    let node = load(ndb, link)?;
    if node.is_leaf() {
        return Err(Error::CorruptionError("rotation reached a leaf"));
    }
    Ok(node)
}

fn rotate_right<S: Storage>(
    ndb: &NodeDb<'_, S>,
    mut node: Box<WorkingNode>,
    version: u64,
) -> Result<Box<WorkingNode>> {
    let mut pivot = load_inner(ndb, node.left.take())?;
    node.left = pivot.right.take();
    node.touch(ndb, version)?;
    pivot.right = Some(Link::Modified(node));
    pivot.touch(ndb, version)?;
    Ok(pivot)
}

fn rotate_left<S: Storage>(
    ndb: &NodeDb<'_, S>,
    mut node: Box<WorkingNode>,
    version: u64,
) -> Result<Box<WorkingNode>> {
    let mut pivot = load_inner(ndb, node.right.take())?;
    node.right = pivot.left.take();
    node.touch(ndb, version)?;
    pivot.left = Some(Link::Modified(node));
    pivot.touch(ndb, version)?;
    Ok(pivot)
}

fn rebalance<S: Storage>(
    ndb: &NodeDb<'_, S>,
    mut node: Box<WorkingNode>,
    version: u64,
) -> Result<Box<WorkingNode>> {
    let balance = node.balance(ndb)?;
    if balance > 1 {
        let left = load_inner(ndb, node.left.take())?;
        let left = if left.balance(ndb)? < 0 {
            rotate_left(ndb, left, version)?
        } else {
            left
        };
        node.left = Some(Link::Modified(left));
        rotate_right(ndb, node, version)
    } else if balance < -1 {
        let right = load_inner(ndb, node.right.take())?;
        let right = if right.balance(ndb)? > 0 {
            rotate_right(ndb, right, version)?
        } else {
            right
        };
        node.right = Some(Link::Modified(right));
        rotate_left(ndb, node, version)
    } else {
        Ok(node)
    }
}

/// Insert below `link`; returns the new subtree root and whether an existing
/// key was overwritten.
fn insert<S: Storage>(
    ndb: &NodeDb<'_, S>,
    link: Link,
    key: Vec<u8>,
    value: Vec<u8>,
    version: u64,
) -> Result<(Box<WorkingNode>, bool)> {
    let mut node = load(ndb, link)?;

    if node.is_leaf() {
        let (left, right, split) = match key.cmp(&node.key) {
            Ordering::Equal => return Ok((WorkingNode::leaf(key, value, version), true)),
            Ordering::Less => {
                let split = node.key.clone();
                (WorkingNode::leaf(key, value, version).into_link(), node.into_link(), split)
            }
            Ordering::Greater => {
                let split = key.clone();
                (node.into_link(), WorkingNode::leaf(key, value, version).into_link(), split)
            }
        };
        let mut inner = Box::new(WorkingNode {
            key: split,
            value: None,
            version,
            height: 1,
            size: 2,
            left: Some(left),
            right: Some(right),
            origin: None,
        });
        inner.touch(ndb, version)?;
        return Ok((inner, false));
    }

    let updated = if key < node.key {
        let child = node
            .left
            .take()
            .ok_or(Error::CorruptionError("inner node is missing a child"))?;
        let (child, updated) = insert(ndb, child, key, value, version)?;
        node.left = Some(Link::Modified(child));
        updated
    } else {
        let child = node
            .right
            .take()
            .ok_or(Error::CorruptionError("inner node is missing a child"))?;
        let (child, updated) = insert(ndb, child, key, value, version)?;
        node.right = Some(Link::Modified(child));
        updated
    };
    node.touch(ndb, version)?;
    if updated {
        return Ok((node, true));
    }
    Ok((rebalance(ndb, node, version)?, false))
}

/// Stage every modified node below `link`, children first.
fn persist<S: Storage>(ndb: &NodeDb<'_, S>, link: Link, batch: &mut S::Batch) -> Result<Hash> {
    let node = match link {
        Link::Stored(hash) => return Ok(hash),
        Link::Modified(node) => node,
    };
    if let Some(hash) = node.origin {
        return Ok(hash);
    }
    let WorkingNode {
        key,
        value,
        version,
        height,
        size,
        left,
        right,
        ..
    } = *node;
    let node = if height == 0 {
        let value = value.ok_or(Error::CorruptionError("modified leaf without a value"))?;
        Node::leaf(key, value, version)
    } else {
        let missing = || Error::CorruptionError("inner node is missing a child");
        let left = persist(ndb, left.ok_or_else(missing)?, batch)?;
        let right = persist(ndb, right.ok_or_else(missing)?, batch)?;
        Node {
            key,
            version,
            kind: NodeKind::Inner {
                height,
                size,
                left,
                right,
            },
        }
    };
    let hash = node.hash();
    ndb.stage_node(batch, &hash, &node)?;
    Ok(hash)
}

/// A tree being built on top of its last saved version.
///
/// Changes stay in memory until [`MutableTree::save_version`]; snapshots only
/// see saved versions.
pub struct MutableTree<'db, S: Storage> {
    ndb: NodeDb<'db, S>,
    root: Option<Link>,
    saved_root: Option<Hash>,
    version: u64,
}

impl<'db, S: Storage> MutableTree<'db, S> {
    /// Empty tree at version 0; call [`MutableTree::load`] to pick up what
    /// the store already holds.
    pub fn new(ndb: NodeDb<'db, S>) -> Self {
        MutableTree {
            ndb,
            root: None,
            saved_root: None,
            version: 0,
        }
    }

    /// Last saved or loaded version
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Every saved version, ascending
    pub fn versions(&self) -> Result<Vec<u64>> {
        self.ndb.versions()
    }

    /// Load the latest saved version.
    pub fn load(&mut self) -> Result<u64> {
        self.load_version(0)
    }

    /// Load `target`, or the nearest saved version below it. `0` means the
    /// latest one; an empty store loads as version 0.
    ///
    /// Unsaved changes are dropped.
    pub fn load_version(&mut self, target: u64) -> Result<u64> {
        let versions = self.ndb.versions()?;
        let found = if target == 0 {
            versions.last().copied()
        } else {
            versions.iter().rev().find(|v| **v <= target).copied()
        };
        let Some(version) = found else {
            if target == 0 {
                self.reset(None, 0);
                return Ok(0);
            }
            return Err(Error::VersionNotFound(target));
        };
        let root = self
            .ndb
            .root(version)?
            .ok_or(Error::VersionNotFound(version))?;
        self.reset(root, version);
        Ok(version)
    }

    fn reset(&mut self, root: Option<Hash>, version: u64) {
        self.root = root.map(Link::Stored);
        self.saved_root = root;
        self.version = version;
    }

    /// Insert or overwrite `key`. Returns `true` on overwrite.
    ///
    /// On error the unsaved changes are dropped and the tree is back at its
    /// last saved version.
    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<bool> {
        let version = self.version + 1;
        let Some(root) = self.root.take() else {
            self.root = Some(Link::Modified(WorkingNode::leaf(key, value, version)));
            return Ok(false);
        };
        match insert(&self.ndb, root, key, value, version) {
            Ok((root, updated)) => {
                self.root = Some(Link::Modified(root));
                Ok(updated)
            }
            Err(e) => {
                self.root = self.saved_root.map(Link::Stored);
                Err(e)
            }
        }
    }

    /// Persist the working set as the next version.
    pub fn save_version(&mut self) -> Result<(Option<Hash>, u64)> {
        let version = self.version + 1;
        let mut batch = self.ndb.storage().new_batch();
        let root = match self.root.take() {
            Some(link) => match persist(&self.ndb, link, &mut batch) {
                Ok(hash) => Some(hash),
                Err(e) => {
                    self.root = self.saved_root.map(Link::Stored);
                    return Err(e);
                }
            },
            None => None,
        };
        self.ndb.stage_root(&mut batch, version, root.as_ref());
        self.ndb.storage().commit_batch(batch, WriteMode::Durable)?;
        self.reset(root, version);
        Ok((root, version))
    }

    /// Snapshot of a saved version.
    pub fn get_immutable(&self, version: u64) -> Result<ImmutableTree<'_, 'db, S>> {
        let root = self
            .ndb
            .root(version)?
            .ok_or(Error::VersionNotFound(version))?;
        ImmutableTree::new(&self.ndb, root, version)
    }

    /// Snapshot of the last saved or loaded version.
    pub fn last_saved(&self) -> Result<ImmutableTree<'_, 'db, S>> {
        ImmutableTree::new(&self.ndb, self.saved_root, self.version)
    }
}
