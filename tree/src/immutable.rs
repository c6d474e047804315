//! Read-only view of one saved tree version

use std::ops::ControlFlow;

use clusterkit_storage::{Storage, WriteMode};

use crate::{
    node::{LeafValue, NodeKind},
    Hash, Node, NodeDb, NodeObserver, Result, Visit,
};

/// Counters of a [`ImmutableTree::save_to`] run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SaveReport {
    pub nodes: u64,
    pub leaves: u64,
    pub commits: u64,
}

/// A saved version, addressed by its root hash.
pub struct ImmutableTree<'a, 'db, S: Storage> {
    ndb: &'a NodeDb<'db, S>,
    root: Option<Hash>,
    root_node: Option<Node>,
    version: u64,
}

struct SaveState<'d, 'ddb, D: Storage> {
    dest: &'d NodeDb<'ddb, D>,
    batch: D::Batch,
    saves_per_commit: u64,
    report: SaveReport,
}

impl<'a, 'db, S: Storage> ImmutableTree<'a, 'db, S> {
    pub(crate) fn new(ndb: &'a NodeDb<'db, S>, root: Option<Hash>, version: u64) -> Result<Self> {
        let root_node = root.as_ref().map(|hash| ndb.get_node(hash)).transpose()?;
        Ok(ImmutableTree {
            ndb,
            root,
            root_node,
            version,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn root_hash(&self) -> Option<Hash> {
        self.root
    }

    /// Number of leaves
    pub fn size(&self) -> u64 {
        self.root_node.as_ref().map_or(0, Node::size)
    }

    /// Height of the root, 0 for an empty or single-leaf tree
    pub fn height(&self) -> u8 {
        self.root_node.as_ref().map_or(0, Node::height)
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let Some(mut hash) = self.root else {
            return Ok(None);
        };
        loop {
            let node = self.ndb.get_node(&hash)?;
            match node.kind {
                NodeKind::Leaf(_) if node.key == key => return self.ndb.leaf_value(&node).map(Some),
                NodeKind::Leaf(_) => return Ok(None),
                NodeKind::Inner { left, right, .. } => {
                    hash = if key < node.key.as_slice() { left } else { right };
                }
            }
        }
    }

    /// Visit every leaf in ascending key order.
    pub fn iterate<B>(&self, f: impl FnMut(&[u8], &[u8]) -> ControlFlow<B>) -> Result<Option<B>> {
        self.iterate_range(None, None, true, f)
    }

    /// Visit the leaves with keys in `[start, end)`; `None` bounds are open.
    ///
    /// Returns `Some` with the break value when the visitor stops the walk.
    pub fn iterate_range<B>(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        ascending: bool,
        mut f: impl FnMut(&[u8], &[u8]) -> ControlFlow<B>,
    ) -> Result<Option<B>> {
        let Some(root) = self.root else {
            return Ok(None);
        };
        match self.walk_range(&root, start, end, ascending, &mut f)? {
            ControlFlow::Break(b) => Ok(Some(b)),
            ControlFlow::Continue(()) => Ok(None),
        }
    }

    fn walk_range<B, F>(
        &self,
        hash: &Hash,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        ascending: bool,
        f: &mut F,
    ) -> Result<ControlFlow<B>>
    where
        F: FnMut(&[u8], &[u8]) -> ControlFlow<B>,
    {
        let node = self.ndb.get_node(hash)?;
        let key = node.key.as_slice();
        match node.kind {
            NodeKind::Leaf(_) => {
                let in_range = start.map_or(true, |s| key >= s) && end.map_or(true, |e| key < e);
                if !in_range {
                    return Ok(ControlFlow::Continue(()));
                }
                let value = self.ndb.leaf_value(&node)?;
                Ok(f(key, &value))
            }
            NodeKind::Inner { left, right, .. } => {
                let left = (start.map_or(true, |s| s < key), left);
                let right = (end.map_or(true, |e| key < e), right);
                let order = if ascending { [left, right] } else { [right, left] };
                for (wanted, child) in order {
                    if !wanted {
                        continue;
                    }
                    if let ControlFlow::Break(b) = self.walk_range(&child, start, end, ascending, f)? {
                        return Ok(ControlFlow::Break(b));
                    }
                }
                Ok(ControlFlow::Continue(()))
            }
        }
    }

    /// Write every node of this version into `dest`, values inlined, and
    /// record the version root there.
    ///
    /// With `saves_per_commit > 0` the staged nodes are committed (buffered)
    /// every that many node saves; the root record always goes out with the
    /// final durable commit, so an interrupted copy never exposes the
    /// version.
    pub fn save_to<D: Storage>(
        &self,
        dest: &NodeDb<'_, D>,
        saves_per_commit: u64,
        mut observer: Option<&mut dyn NodeObserver>,
    ) -> Result<SaveReport> {
        let mut state = SaveState {
            dest,
            batch: dest.storage().new_batch(),
            saves_per_commit,
            report: SaveReport::default(),
        };
        if let Some(root) = &self.root {
            self.save_subtree(root, &mut state, &mut observer)?;
        }
        let SaveState {
            mut batch,
            mut report,
            ..
        } = state;
        dest.stage_root(&mut batch, self.version, self.root.as_ref());
        dest.storage().commit_batch(batch, WriteMode::Durable)?;
        report.commits += 1;
        Ok(report)
    }

    fn save_subtree<D: Storage>(
        &self,
        hash: &Hash,
        state: &mut SaveState<'_, '_, D>,
        observer: &mut Option<&mut dyn NodeObserver>,
    ) -> Result<()> {
        let mut node = self.ndb.get_node(hash)?;
        match node.kind {
            NodeKind::Inner {
                height,
                size,
                left,
                right,
            } => {
                self.save_subtree(&left, state, observer)?;
                self.save_subtree(&right, state, observer)?;
                if let Some(observer) = observer {
                    observer.visited(Visit::Inner {
                        key: &node.key,
                        height,
                        size,
                    });
                }
            }
            NodeKind::Leaf(_) => {
                if matches!(node.kind, NodeKind::Leaf(LeafValue::Detached(_))) {
                    node.kind = NodeKind::Leaf(LeafValue::Inline(self.ndb.leaf_value(&node)?));
                }
                state.report.leaves += 1;
                if let Some(observer) = observer {
                    observer.visited(Visit::Leaf {
                        key: &node.key,
                        version: node.version,
                    });
                }
            }
        }

        state.dest.stage_node(&mut state.batch, hash, &node)?;
        state.report.nodes += 1;
        if state.saves_per_commit > 0 && state.report.nodes % state.saves_per_commit == 0 {
            let batch = std::mem::replace(&mut state.batch, state.dest.storage().new_batch());
            state.dest.storage().commit_batch(batch, WriteMode::Buffered)?;
            state.report.commits += 1;
        }
        Ok(())
    }
}

impl<S: Storage> std::fmt::Debug for ImmutableTree<'_, '_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImmutableTree")
            .field("version", &self.version)
            .field("root", &self.root.map(hex::encode))
            .field("size", &self.size())
            .finish()
    }
}
