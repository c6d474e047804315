//! Implementation for a storage abstraction over RocksDB.

use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use rocksdb::{DBRawIterator, ReadOptions, WriteOptions, DB};

use super::RocksDbBatch;
use crate::{Error, Storage, WriteMode};

lazy_static! {
    static ref DEFAULT_OPTS: rocksdb::Options = {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);
        opts.increase_parallelism(num_cpus::get() as i32);
        opts.set_allow_mmap_writes(true);
        opts.set_allow_mmap_reads(true);
        opts
    };
}

/// Access mode a store is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Reads and writes; the store is created when missing.
    ReadWrite,
    /// Reads only; opening fails when the store does not exist.
    ReadOnly,
}

/// Storage which uses RocksDB as its backend.
pub struct RocksDbStorage {
    db: DB,
    path: PathBuf,
    mode: OpenMode,
}

impl RocksDbStorage {
    /// Open the store at `path` in the given mode.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self, Error> {
        let path = path.as_ref();
        let db = match mode {
            OpenMode::ReadWrite => DB::open(&DEFAULT_OPTS, path)?,
            OpenMode::ReadOnly => DB::open_for_read_only(&DEFAULT_OPTS, path, false)?,
        };

        Ok(RocksDbStorage {
            db,
            path: path.to_path_buf(),
            mode,
        })
    }

    /// Open a read-write store at `path`, creating it when missing.
    pub fn default_rocksdb_with_path<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::open(path, OpenMode::ReadWrite)
    }

    /// Filesystem location of the store
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for RocksDbStorage {
    type Batch = RocksDbBatch;
    type RawIterator<'a> = DBRawIterator<'a>;

    fn get<K: AsRef<[u8]>>(&self, key: K) -> Result<Option<Vec<u8>>, Error> {
        self.db.get(key).map_err(Error::RocksDBError)
    }

    fn new_batch(&self) -> Self::Batch {
        RocksDbBatch::default()
    }

    fn commit_batch(&self, batch: Self::Batch, mode: WriteMode) -> Result<(), Error> {
        if self.mode == OpenMode::ReadOnly {
            return Err(Error::ReadOnly(self.path.clone()));
        }
        let mut opts = WriteOptions::default();
        opts.set_sync(mode == WriteMode::Durable);
        self.db
            .write_opt(batch.batch, &opts)
            .map_err(Error::RocksDBError)
    }

    fn raw_iter(&self, upper_bound: Option<&[u8]>) -> Self::RawIterator<'_> {
        let mut opts = ReadOptions::default();
        if let Some(bound) = upper_bound {
            opts.set_iterate_upper_bound(bound.to_vec());
        }
        self.db.raw_iterator_opt(opts)
    }

    fn compact_range(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Result<(), Error> {
        if self.mode == OpenMode::ReadOnly {
            return Err(Error::ReadOnly(self.path.clone()));
        }
        self.db.compact_range(start, end);
        Ok(())
    }
}
