//! Size-bounded batches against a destination store

use clusterkit_storage::{Batch, Storage, WriteMode};
use tracing::debug;

use crate::{Error, Result};

/// Accumulates puts and deletes and flushes them in bounded batches.
///
/// Intermediate flushes are buffered; [`BatchedWriter::sync`] and
/// [`BatchedWriter::finish`] are durable. Writes are not transactional across
/// flushes: a failure leaves every earlier flush on disk, and the error
/// reports how many entries made it.
pub struct BatchedWriter<'s, S: Storage> {
    storage: &'s S,
    pending: S::Batch,
    threshold: usize,
    staged: u64,
    written: u64,
}

impl<'s, S: Storage> BatchedWriter<'s, S> {
    /// Writer flushing once more than `threshold` entries are pending
    pub fn new(storage: &'s S, threshold: usize) -> Self {
        BatchedWriter {
            storage,
            pending: storage.new_batch(),
            threshold,
            staged: 0,
            written: 0,
        }
    }

    pub fn put<K: AsRef<[u8]>>(&mut self, key: K, value: &[u8]) {
        self.pending.put(key, value);
        self.staged += 1;
    }

    pub fn delete<K: AsRef<[u8]>>(&mut self, key: K) {
        self.pending.delete(key);
        self.staged += 1;
    }

    /// Entries flushed so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Entries waiting for the next flush
    pub fn pending(&self) -> u64 {
        self.staged
    }

    /// Buffered flush when the pending batch is over the threshold.
    pub fn maybe_flush(&mut self) -> Result<bool> {
        if self.pending.len() <= self.threshold {
            return Ok(false);
        }
        self.flush(WriteMode::Buffered)?;
        Ok(true)
    }

    /// Durable flush of whatever is pending, even an empty batch.
    pub fn sync(&mut self) -> Result<()> {
        self.flush(WriteMode::Durable)
    }

    /// Durable final flush; returns the number of entries written.
    pub fn finish(mut self) -> Result<u64> {
        self.sync()?;
        Ok(self.written)
    }

    fn flush(&mut self, mode: WriteMode) -> Result<()> {
        let batch = std::mem::replace(&mut self.pending, self.storage.new_batch());
        let entries = self.staged;
        self.staged = 0;
        self.storage
            .commit_batch(batch, mode)
            .map_err(|source| Error::WriteFailure {
                written: self.written,
                source,
            })?;
        self.written += entries;
        debug!(entries, written = self.written, ?mode, "flushed batch");
        Ok(())
    }
}
