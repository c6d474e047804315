//! RocksDB write batch wrapper.

use crate::Batch;

/// Wrapper to RocksDB batch
#[derive(Default)]
pub struct RocksDbBatch {
    pub(crate) batch: rocksdb::WriteBatch,
}

impl Batch for RocksDbBatch {
    fn put<K: AsRef<[u8]>>(&mut self, key: K, value: &[u8]) {
        self.batch.put(key, value)
    }

    fn delete<K: AsRef<[u8]>>(&mut self, key: K) {
        self.batch.delete(key)
    }

    fn len(&self) -> usize {
        self.batch.len()
    }
}
