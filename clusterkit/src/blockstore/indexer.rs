use std::path::Path;

use clusterkit_storage::{rocksdb_storage::OpenMode, Storage};
use tracing::{info, warn};

use super::store::BlockStore;
use crate::{
    batch::BatchedWriter,
    config::{ChainConfig, IndexOptions},
    key_codec::encode_height_be,
    progress::ProgressEstimator,
    util::open_store,
    Result,
};

/// Prefix of the block hash index
pub const HASH_INDEX_PREFIX: &[u8] = b"BH:";

/// `BH:` ++ block hash
pub fn hash_key(hash: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(HASH_INDEX_PREFIX.len() + hash.len());
    key.extend_from_slice(HASH_INDEX_PREFIX);
    key.extend_from_slice(hash);
    key
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IndexReport {
    pub indexed: u64,
    /// Heights below the cursor without metadata
    pub missing: u64,
}

/// Map the hash of every block below the archive's height to that height
/// (big-endian) in `dest`.
pub fn index_blocks<D: Storage>(
    store: &BlockStore,
    dest: &D,
    options: &IndexOptions,
) -> Result<IndexReport> {
    let current = store.height()?;
    info!(height = current, "indexing blocks by hash");
    let mut writer = BatchedWriter::new(dest, options.batch_size);
    let mut progress = ProgressEstimator::new(current, options.log_level);
    let mut report = IndexReport::default();
    for height in 1..current {
        match store.load_block_meta(height)? {
            Some(meta) => {
                writer.put(hash_key(&meta.block_id.hash), &encode_height_be(height));
                report.indexed += 1;
                writer.maybe_flush()?;
            }
            None => {
                warn!(height, "block meta missing, not indexed");
                report.missing += 1;
            }
        }
        if let Some(sample) = progress.tick(height) {
            sample.log("blocks indexed");
        }
    }
    writer.finish()?;
    info!(indexed = report.indexed, missing = report.missing, "indexed blocks");
    Ok(report)
}

/// Build the hash index of the chain data at `root` into a new store at
/// `dest`.
pub fn index_by_hash(root: &Path, dest: &Path, options: &IndexOptions) -> Result<IndexReport> {
    let config = ChainConfig::load(root)?;
    let store = BlockStore::open_chain(&config, OpenMode::ReadOnly)?;
    let destination = open_store(dest, OpenMode::ReadWrite)?;
    index_blocks(&store, &destination, options)
}
