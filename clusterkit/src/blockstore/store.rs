use std::path::Path;

use clusterkit_storage::{
    rocksdb_storage::{OpenMode, RocksDbStorage},
    Batch, RawIterator, Storage, WriteMode,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    decode, encode,
    types::{Block, BlockId, BlockMeta, Commit, Part, PartSetHeader},
};
use crate::{
    batch::BatchedWriter, config::ChainConfig, key_codec::range_end, util::open_store, Error,
    Result,
};

/// Blocks are split into parts of at most this many bytes
pub const PART_SIZE: usize = 65536;

const STATE_KEY: &[u8] = b"blockStore";
const META_PREFIX: &[u8] = b"H:";

/// `H:{height}`
pub fn meta_key(height: u64) -> Vec<u8> {
    format!("H:{height}").into_bytes()
}

/// `P:{height}:{index}`
pub fn part_key(height: u64, index: u32) -> Vec<u8> {
    format!("P:{height}:{index}").into_bytes()
}

/// `C:{height}`, the commit for `height` carried by the next block
pub fn commit_key(height: u64) -> Vec<u8> {
    format!("C:{height}").into_bytes()
}

/// `SC:{height}`
pub fn seen_commit_key(height: u64) -> Vec<u8> {
    format!("SC:{height}").into_bytes()
}

/// JSON record under `blockStore`; the height is kept as a string.
#[derive(Debug, Serialize, Deserialize)]
struct BlockStoreState {
    #[serde(with = "height_string")]
    height: u64,
}

mod height_string {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(height: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(height)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

/// The block archive: per-height metadata, parts and commits, plus the
/// height cursor.
pub struct BlockStore {
    db: RocksDbStorage,
}

impl BlockStore {
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        Ok(BlockStore {
            db: open_store(path, mode)?,
        })
    }

    /// Open the archive of the node rooted at `config`.
    pub fn open_chain(config: &ChainConfig, mode: OpenMode) -> Result<Self> {
        Self::open(&config.block_store_path(), mode)
    }

    pub fn storage(&self) -> &RocksDbStorage {
        &self.db
    }

    pub fn path(&self) -> &Path {
        self.db.path()
    }

    /// The height cursor; an archive without one is at height 0.
    pub fn height(&self) -> Result<u64> {
        let Some(raw) = self.db.get(STATE_KEY)? else {
            return Ok(0);
        };
        let state: BlockStoreState = serde_json::from_slice(&raw)
            .map_err(|e| Error::CorruptedData(format!("unable to parse block store state: {e}")))?;
        Ok(state.height)
    }

    pub fn set_height(&self, height: u64) -> Result<()> {
        let mut batch = self.db.new_batch();
        batch.put(STATE_KEY, &Self::state_record(height)?);
        self.db.commit_batch(batch, WriteMode::Durable)?;
        debug!(height, "saved block store height");
        Ok(())
    }

    fn state_record(height: u64) -> Result<Vec<u8>> {
        serde_json::to_vec(&BlockStoreState { height })
            .map_err(|e| Error::CorruptedData(format!("unable to serialize block store state: {e}")))
    }

    pub fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.db.has(key)?)
    }

    pub fn has_block(&self, height: u64) -> Result<bool> {
        self.has(&meta_key(height))
    }

    pub fn load_block_meta(&self, height: u64) -> Result<Option<BlockMeta>> {
        self.db
            .get(meta_key(height))?
            .map(|raw| decode(&raw))
            .transpose()
    }

    /// Reassemble the block at `height` from its parts.
    pub fn load_block(&self, height: u64) -> Result<Option<Block>> {
        let Some(meta) = self.load_block_meta(height)? else {
            return Ok(None);
        };
        let mut bytes = Vec::new();
        for index in 0..meta.block_id.parts_header.total {
            let raw = self
                .db
                .get(part_key(height, index))?
                .ok_or(Error::MissingRecord {
                    record: "block part",
                    height,
                })?;
            let part: Part = decode(&raw)?;
            bytes.extend_from_slice(&part.bytes);
        }
        decode(&bytes).map(Some)
    }

    /// The commit for `height`, stored with block `height + 1`.
    pub fn load_commit(&self, height: u64) -> Result<Option<Commit>> {
        self.db
            .get(commit_key(height))?
            .map(|raw| decode(&raw))
            .transpose()
    }

    pub fn load_seen_commit(&self, height: u64) -> Result<Option<Commit>> {
        self.db
            .get(seen_commit_key(height))?
            .map(|raw| decode(&raw))
            .transpose()
    }

    pub fn save_seen_commit(&self, height: u64, commit: &Commit) -> Result<()> {
        let mut batch = self.db.new_batch();
        batch.put(seen_commit_key(height), &encode(commit)?);
        self.db.commit_batch(batch, WriteMode::Durable)?;
        Ok(())
    }

    /// Store a block with its parts, the previous block's commit and the
    /// commit seen for it, advancing the height cursor when it moves forward.
    pub fn save_block(&self, block: &Block, seen_commit: &Commit) -> Result<BlockMeta> {
        let height = block.height();
        let bytes = encode(block)?;
        let parts: Vec<Part> = bytes
            .chunks(PART_SIZE)
            .enumerate()
            .map(|(index, chunk)| Part {
                index: index as u32,
                bytes: chunk.to_vec(),
            })
            .collect();
        let mut parts_hasher = blake3::Hasher::new();
        for part in &parts {
            parts_hasher.update(blake3::hash(&part.bytes).as_bytes());
        }
        let meta = BlockMeta {
            block_id: BlockId {
                hash: blake3::hash(&bytes).as_bytes().to_vec(),
                parts_header: PartSetHeader {
                    total: parts.len() as u32,
                    hash: parts_hasher.finalize().as_bytes().to_vec(),
                },
            },
            header: block.header.clone(),
        };

        let mut batch = self.db.new_batch();
        batch.put(meta_key(height), &encode(&meta)?);
        for part in &parts {
            batch.put(part_key(height, part.index), &encode(part)?);
        }
        if let Some(last_commit) = &block.last_commit {
            batch.put(commit_key(height.saturating_sub(1)), &encode(last_commit)?);
        }
        batch.put(seen_commit_key(height), &encode(seen_commit)?);
        if height > self.height()? {
            batch.put(STATE_KEY, &Self::state_record(height)?);
        }
        self.db.commit_batch(batch, WriteMode::Durable)?;
        Ok(meta)
    }

    /// Lowest height with a metadata record.
    ///
    /// Heights are decimal text, so the first `H:` key in byte order is not
    /// necessarily the lowest height; every metadata key is inspected.
    pub fn oldest_height(&self) -> Result<Option<u64>> {
        let upper = range_end(META_PREFIX);
        let mut iter = self.db.raw_iter(upper.as_deref());
        iter.seek(META_PREFIX);
        let mut oldest: Option<u64> = None;
        while iter.valid() {
            if let Some(key) = iter.key() {
                match std::str::from_utf8(&key[META_PREFIX.len()..])
                    .ok()
                    .and_then(|h| h.parse::<u64>().ok())
                {
                    Some(height) => {
                        oldest = Some(oldest.map_or(height, |o| o.min(height)));
                    }
                    None => warn!(key = %String::from_utf8_lossy(key), "ignoring malformed block meta key"),
                }
            }
            iter.next();
        }
        Ok(oldest)
    }

    /// Stage deletion of every record belonging to block `height`.
    pub(crate) fn stage_removal<S: Storage>(
        writer: &mut BatchedWriter<'_, S>,
        height: u64,
        meta: &BlockMeta,
    ) {
        writer.delete(meta_key(height));
        for index in 0..meta.block_id.parts_header.total {
            writer.delete(part_key(height, index));
        }
        writer.delete(commit_key(height.saturating_sub(1)));
        writer.delete(seen_commit_key(height));
    }

    /// Compact the whole keyspace.
    pub fn compact(&self) -> Result<()> {
        self.db.compact_range(None, None)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_store() -> (tempfile::TempDir, BlockStore) {
        let dir = tempfile::tempdir().expect("cannot create tempdir");
        let store = BlockStore::open(dir.path(), OpenMode::ReadWrite).expect("cannot open store");
        (dir, store)
    }

    #[test]
    fn key_formats() {
        assert_eq!(meta_key(12), b"H:12");
        assert_eq!(part_key(12, 3), b"P:12:3");
        assert_eq!(commit_key(11), b"C:11");
        assert_eq!(seen_commit_key(12), b"SC:12");
    }

    #[test]
    fn height_cursor_is_json_string() {
        let (_dir, store) = block_store();
        assert_eq!(store.height().expect("height"), 0);
        store.set_height(42).expect("set height");
        let raw = store.storage().get(STATE_KEY).expect("get").expect("state");
        assert_eq!(raw, br#"{"height":"42"}"#);
        assert_eq!(store.height().expect("height"), 42);
    }

    #[test]
    fn malformed_cursor_is_corruption() {
        let (_dir, store) = block_store();
        let mut batch = store.storage().new_batch();
        batch.put(STATE_KEY, br#"{"height":"x"}"#);
        store
            .storage()
            .commit_batch(batch, WriteMode::Durable)
            .expect("commit");
        assert!(matches!(store.height(), Err(Error::CorruptedData(_))));
    }

    #[test]
    fn saved_block_round_trips_through_parts() {
        let (_dir, store) = block_store();
        let big_tx = vec![7u8; PART_SIZE * 2 + 10];
        let mut block = Block::new("chain", 5, vec![big_tx, b"small".to_vec()]);
        block.last_commit = Some(Commit {
            height: 4,
            ..Default::default()
        });
        let meta = store
            .save_block(&block, &Commit::default())
            .expect("save block");

        assert_eq!(meta.block_id.parts_header.total, 3);
        assert_eq!(store.height().expect("height"), 5);
        assert_eq!(store.load_block(5).expect("load"), Some(block));
        assert_eq!(store.load_commit(4).expect("commit").map(|c| c.height), Some(4));
        assert!(store.load_seen_commit(5).expect("seen").is_some());
        assert_eq!(store.load_block(6).expect("load"), None);
    }

    #[test]
    fn saving_an_older_block_keeps_the_cursor() {
        let (_dir, store) = block_store();
        store
            .save_block(&Block::new("chain", 9, vec![]), &Commit::default())
            .expect("save");
        store
            .save_block(&Block::new("chain", 3, vec![]), &Commit::default())
            .expect("save");
        assert_eq!(store.height().expect("height"), 9);
    }

    #[test]
    fn oldest_height_compares_numerically() {
        let (_dir, store) = block_store();
        for height in [10, 9, 100] {
            store
                .save_block(&Block::new("chain", height, vec![]), &Commit::default())
                .expect("save");
        }
        assert_eq!(store.oldest_height().expect("oldest"), Some(9));
    }

    #[test]
    fn empty_archive_has_no_oldest_height() {
        let (_dir, store) = block_store();
        assert_eq!(store.oldest_height().expect("oldest"), None);
    }
}
