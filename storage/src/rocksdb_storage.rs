//! Clusterkit storage layer implemented over RocksDB backend.
mod batch;
mod raw_iterator;
mod storage;
pub mod test_utils;
#[cfg(test)]
mod tests;

pub use batch::RocksDbBatch;
pub use rocksdb::DBRawIterator;

pub use self::storage::{OpenMode, RocksDbStorage};
