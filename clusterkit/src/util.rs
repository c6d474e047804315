use std::path::Path;

use clusterkit_storage::rocksdb_storage::{OpenMode, RocksDbStorage};

use crate::{Error, Result};

/// Open a store, reporting the path on failure.
pub(crate) fn open_store(path: &Path, mode: OpenMode) -> Result<RocksDbStorage> {
    RocksDbStorage::open(path, mode).map_err(|source| Error::StoreOpenFailure {
        path: path.to_path_buf(),
        source,
    })
}

/// Total size in bytes of the files below `path`.
pub fn dir_size(path: &Path) -> std::io::Result<u64> {
    let mut size = 0;
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        size += if meta.is_dir() {
            dir_size(&entry.path())?
        } else {
            meta.len()
        };
    }
    Ok(size)
}
