//! Useful utilities for testing.

use std::{ops::Deref, path::Path};

use tempfile::TempDir;

use super::*;

/// RocksDb storage with self-cleanup
pub struct TempStorage {
    storage: RocksDbStorage,
    dir: TempDir,
}

impl TempStorage {
    /// Create new `TempStorage`
    pub fn new() -> Self {
        let dir = TempDir::new().expect("cannot create tempdir");
        let storage = RocksDbStorage::default_rocksdb_with_path(dir.path())
            .expect("cannot open RocksDB storage");
        TempStorage { storage, dir }
    }

    /// Directory holding the store
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Close the handle and open the same files again in `mode`.
    pub fn reopen(self, mode: OpenMode) -> Self {
        let TempStorage { storage, dir } = self;
        drop(storage);
        let storage = RocksDbStorage::open(dir.path(), mode).expect("cannot reopen RocksDB storage");
        TempStorage { storage, dir }
    }
}

impl Default for TempStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for TempStorage {
    type Target = RocksDbStorage;

    fn deref(&self) -> &Self::Target {
        &self.storage
    }
}
