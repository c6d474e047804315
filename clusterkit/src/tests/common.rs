//! Fixtures for the scenario tests

use std::{cell::Cell, path::Path};

use clusterkit_storage::{
    rocksdb_storage::{test_utils::TempStorage, DBRawIterator, OpenMode, RocksDbBatch, RocksDbStorage},
    Error as StorageError, RawIterator, Storage, WriteMode,
};
use clusterkit_tree::{MutableTree, NodeDb};

use crate::{
    blockstore::{Block, BlockStore, Commit, TxIndexStore, TxResult},
    config::ChainConfig,
};

pub(crate) type Entries = Vec<(Vec<u8>, Vec<u8>)>;

pub(crate) fn kv(key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> (Vec<u8>, Vec<u8>) {
    (key.as_ref().to_vec(), value.as_ref().to_vec())
}

/// Save every change set as one version of a new tree at `path`, returning
/// the latest version.
pub(crate) fn make_tree(path: &Path, versions: &[Entries]) -> u64 {
    let storage = RocksDbStorage::open(path, OpenMode::ReadWrite).expect("cannot open app store");
    let mut tree = MutableTree::new(NodeDb::new(&storage));
    let mut latest = 0;
    for changes in versions {
        for (key, value) in changes {
            tree.set(key.clone(), value.clone()).expect("cannot set key");
        }
        latest = tree.save_version().expect("cannot save version").1;
    }
    latest
}

/// Every entry of the store at `path`, in key order
pub(crate) fn read_store(path: &Path) -> Entries {
    let storage = RocksDbStorage::open(path, OpenMode::ReadOnly).expect("cannot open store");
    read_all(&storage)
}

pub(crate) fn read_all<S: Storage>(storage: &S) -> Entries {
    let mut iter = storage.raw_iter(None);
    iter.seek_to_first();
    let mut entries = Vec::new();
    while iter.valid() {
        if let (Some(key), Some(value)) = (iter.key(), iter.value()) {
            entries.push((key.to_vec(), value.to_vec()));
        }
        iter.next();
    }
    entries
}

/// Chain data root with the default layout and its data directory created
pub(crate) fn chain_config(root: &Path) -> ChainConfig {
    let config = ChainConfig {
        root: root.to_path_buf(),
        ..Default::default()
    };
    std::fs::create_dir_all(config.db_path()).expect("cannot create data dir");
    config
}

pub(crate) fn block_txs(height: u64, count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| format!("tx-{height}-{i}").into_bytes())
        .collect()
}

/// Save one block per height, each carrying `txs_per_block` transactions and
/// the commit of the block before it.
pub(crate) fn fill_archive(
    store: &BlockStore,
    heights: impl IntoIterator<Item = u64>,
    txs_per_block: usize,
) {
    for height in heights {
        let mut block = Block::new("clusterkit-test", height, block_txs(height, txs_per_block));
        if height > 1 {
            block.last_commit = Some(Commit {
                height: height - 1,
                ..Default::default()
            });
        }
        let seen = Commit {
            height,
            ..Default::default()
        };
        store.save_block(&block, &seen).expect("cannot save block");
    }
}

/// Index the transactions of the block at `height`.
pub(crate) fn index_block_txs(store: &BlockStore, tx_index: &TxIndexStore, height: u64) {
    let block = store
        .load_block(height)
        .expect("cannot load block")
        .expect("block missing");
    for (index, tx) in block.data.txs.into_iter().enumerate() {
        tx_index
            .index(&TxResult {
                height,
                index: index as u32,
                tx,
                result: b"ok".to_vec(),
            })
            .expect("cannot index tx");
    }
}

/// Store that starts refusing writes after a number of successful commits
pub(crate) struct FlakyStorage {
    inner: TempStorage,
    commits_left: Cell<u64>,
}

impl FlakyStorage {
    pub(crate) fn new(commits: u64) -> Self {
        FlakyStorage {
            inner: TempStorage::new(),
            commits_left: Cell::new(commits),
        }
    }
}

impl Storage for FlakyStorage {
    type Batch = RocksDbBatch;
    type RawIterator<'a> = DBRawIterator<'a>;

    fn get<K: AsRef<[u8]>>(&self, key: K) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.get(key)
    }

    fn new_batch(&self) -> Self::Batch {
        self.inner.new_batch()
    }

    fn commit_batch(&self, batch: Self::Batch, mode: WriteMode) -> Result<(), StorageError> {
        let left = self.commits_left.get();
        if left == 0 {
            return Err(StorageError::ReadOnly(self.inner.dir().to_path_buf()));
        }
        self.commits_left.set(left - 1);
        self.inner.commit_batch(batch, mode)
    }

    fn raw_iter(&self, upper_bound: Option<&[u8]>) -> Self::RawIterator<'_> {
        self.inner.raw_iter(upper_bound)
    }

    fn compact_range(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Result<(), StorageError> {
        self.inner.compact_range(start, end)
    }
}
