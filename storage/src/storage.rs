//! Storage for clusterkit

use crate::Error;

/// How a committed batch is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// The write is synced to disk before the commit returns.
    Durable,
    /// The write may sit in OS buffers and be lost on a crash.
    Buffered,
}

/// Top-level storage abstraction.
/// Holds the engine handle; reads go straight to the engine, writes are
/// grouped into [Batch]es and applied atomically by [Storage::commit_batch].
pub trait Storage {
    /// Storage batch type
    type Batch: Batch;

    /// Storage raw iterator type (to iterate over storage without
    /// supplying a key)
    type RawIterator<'a>: RawIterator
    where
        Self: 'a;

    /// Get entry by `key`
    fn get<K: AsRef<[u8]>>(&self, key: K) -> Result<Option<Vec<u8>>, Error>;

    /// Check whether an entry exists under `key`
    fn has<K: AsRef<[u8]>>(&self, key: K) -> Result<bool, Error> {
        self.get(key).map(|value| value.is_some())
    }

    /// Initialize a new batch
    fn new_batch(&self) -> Self::Batch;

    /// Commits changes from batch into storage
    fn commit_batch(&self, batch: Self::Batch, mode: WriteMode) -> Result<(), Error>;

    /// Get raw iterator over storage. When `upper_bound` is set the iterator
    /// becomes invalid at the first key `>= upper_bound`.
    fn raw_iter(&self, upper_bound: Option<&[u8]>) -> Self::RawIterator<'_>;

    /// Compact the key range `[start, end]`, `None` meaning unbounded.
    fn compact_range(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Result<(), Error>;
}

/// Database batch: an ordered set of pending mutations.
pub trait Batch {
    /// Appends a put operation to the batch.
    fn put<K: AsRef<[u8]>>(&mut self, key: K, value: &[u8]);

    /// Appends a delete operation to the batch.
    fn delete<K: AsRef<[u8]>>(&mut self, key: K);

    /// Number of operations in the batch
    fn len(&self) -> usize;

    /// Batch emptiness predicate
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Allows to iterate over database records in key order.
pub trait RawIterator {
    /// Move iterator to first valid record.
    fn seek_to_first(&mut self);

    /// Move iterator forward until `key` is hit.
    fn seek<K: AsRef<[u8]>>(&mut self, key: K);

    /// Move iterator to next record.
    fn next(&mut self);

    /// Return value of key-value pair where raw iterator points at.
    fn value(&self) -> Option<&[u8]>;

    /// Return key of key-value pair where raw iterator points at.
    fn key(&self) -> Option<&[u8]>;

    /// Check if raw iterator points into a valid record
    fn valid(&self) -> bool;
}
