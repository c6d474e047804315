//! Storage errors

use std::path::PathBuf;

/// Storage and underlying errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Rocks DB error
    #[cfg(feature = "rocksdb_storage")]
    #[error("rocksDB error: {0}")]
    RocksDBError(#[from] rocksdb::Error),
    /// A write was attempted through a handle opened for reading only
    #[error("storage at {0} is opened read-only")]
    ReadOnly(PathBuf),
}
