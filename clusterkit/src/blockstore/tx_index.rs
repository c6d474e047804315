use std::{collections::HashSet, path::Path};

use bincode::{Decode, Encode};
use clusterkit_storage::{
    rocksdb_storage::{OpenMode, RocksDbStorage},
    Batch, Storage, WriteMode,
};
use tracing::debug;

use super::{decode, encode};
use crate::{config::ChainConfig, util::open_store, Result};

const TX_HEIGHT_TAG: &str = "tx.height";

/// Indexed outcome of one transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct TxResult {
    pub height: u64,
    pub index: u32,
    pub tx: Vec<u8>,
    pub result: Vec<u8>,
}

pub fn tx_hash(tx: &[u8]) -> [u8; 32] {
    *blake3::hash(tx).as_bytes()
}

/// `tx.height/{height}/{height}/{index}`, pointing back at the tx hash
pub fn height_key(result: &TxResult) -> Vec<u8> {
    format!(
        "{TX_HEIGHT_TAG}/{}/{}/{}",
        result.height, result.height, result.index
    )
    .into_bytes()
}

/// Transaction results keyed by hash, with a secondary height tag.
pub struct TxIndexStore {
    db: RocksDbStorage,
}

impl TxIndexStore {
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        Ok(TxIndexStore {
            db: open_store(path, mode)?,
        })
    }

    pub fn open_chain(config: &ChainConfig, mode: OpenMode) -> Result<Self> {
        Self::open(&config.tx_index_path(), mode)
    }

    pub fn storage(&self) -> &RocksDbStorage {
        &self.db
    }

    pub fn index(&self, result: &TxResult) -> Result<[u8; 32]> {
        let hash = tx_hash(&result.tx);
        let mut batch = self.db.new_batch();
        batch.put(hash, &encode(result)?);
        batch.put(height_key(result), &hash);
        self.db.commit_batch(batch, WriteMode::Durable)?;
        Ok(hash)
    }

    pub fn get(&self, hash: &[u8]) -> Result<Option<TxResult>> {
        match self.db.get(hash)? {
            Some(raw) if !raw.is_empty() => decode(&raw).map(Some),
            _ => Ok(None),
        }
    }

    /// Remove the entries of `txs` in one buffered batch. Transactions that
    /// were never indexed are skipped. Returns how many entries were removed.
    pub fn delete(&self, txs: &[Vec<u8>]) -> Result<u64> {
        let mut batch = self.db.new_batch();
        let mut seen = HashSet::new();
        let mut removed = 0;
        for tx in txs {
            let hash = tx_hash(tx);
            if !seen.insert(hash) {
                continue;
            }
            let Some(result) = self.get(&hash)? else {
                continue;
            };
            batch.delete(hash);
            batch.delete(height_key(&result));
            removed += 1;
        }
        if removed > 0 {
            self.db.commit_batch(batch, WriteMode::Buffered)?;
        }
        debug!(removed, requested = txs.len(), "removed txs from index");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx_result(height: u64, index: u32, tx: &[u8]) -> TxResult {
        TxResult {
            height,
            index,
            tx: tx.to_vec(),
            result: b"ok".to_vec(),
        }
    }

    #[test]
    fn height_key_layout() {
        assert_eq!(height_key(&tx_result(7, 2, b"t")), b"tx.height/7/7/2");
    }

    #[test]
    fn delete_removes_both_entries_and_skips_unknown() {
        let dir = tempfile::tempdir().expect("cannot create tempdir");
        let index = TxIndexStore::open(dir.path(), OpenMode::ReadWrite).expect("open");
        let indexed = tx_result(3, 0, b"first");
        let hash = index.index(&indexed).expect("index");
        assert_eq!(index.get(&hash).expect("get"), Some(indexed.clone()));

        let removed = index
            .delete(&[b"first".to_vec(), b"first".to_vec(), b"unknown".to_vec()])
            .expect("delete");
        assert_eq!(removed, 1);
        assert_eq!(index.get(&hash).expect("get"), None);
        assert_eq!(
            index.storage().get(height_key(&indexed)).expect("get"),
            None
        );
    }
}
