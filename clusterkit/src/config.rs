//! Operation options and chain data configuration

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{Error, Result};

/// Default number of entries per write batch
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Environment variable overriding `db_dir`
pub const DB_DIR_ENV: &str = "TM_DB_DIR";

const BLOCK_STORE_DB: &str = "blockstore.db";
const TX_INDEX_DB: &str = "tx_index.db";

/// Options of [`clone_tree`](crate::appstore::clone_tree)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneOptions {
    /// Version to clone, 0 for the latest
    pub height: u64,
    pub log_level: u32,
    /// Node saves between intermediate commits, 0 for a single commit
    pub saves_per_commit: u64,
}

/// Options shared by the extraction operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Version to read, 0 for the latest
    pub version: u64,
    pub batch_size: usize,
    pub log_level: u32,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            version: 0,
            batch_size: DEFAULT_BATCH_SIZE,
            log_level: 0,
        }
    }
}

/// Families copied by [`extract_evm_aux`](crate::appstore::extract_evm_aux)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvmAuxOptions {
    pub bloom_filter: bool,
    pub tx_hash: bool,
}

impl Default for EvmAuxOptions {
    fn default() -> Self {
        EvmAuxOptions {
            bloom_filter: true,
            tx_hash: true,
        }
    }
}

/// Options of [`Pruner::purge`](crate::blockstore::Pruner::purge)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeOptions {
    pub batch_size: usize,
    pub log_level: u32,
    /// Keep purging past heights without metadata instead of stopping there
    pub skip_missing: bool,
    pub skip_compaction: bool,
}

impl Default for PurgeOptions {
    fn default() -> Self {
        PurgeOptions {
            batch_size: DEFAULT_BATCH_SIZE,
            log_level: 0,
            skip_missing: false,
            skip_compaction: false,
        }
    }
}

/// Options of [`index_by_hash`](crate::blockstore::index_by_hash)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOptions {
    pub batch_size: usize,
    pub log_level: u32,
}

impl Default for IndexOptions {
    fn default() -> Self {
        IndexOptions {
            batch_size: DEFAULT_BATCH_SIZE,
            log_level: 0,
        }
    }
}

/// Where a node keeps its chain data, read from `<root>/config/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    #[serde(skip)]
    pub root: PathBuf,
    /// Database directory, relative to the root unless absolute
    pub db_dir: PathBuf,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            root: PathBuf::new(),
            db_dir: PathBuf::from("data"),
        }
    }
}

impl ChainConfig {
    /// Load the configuration of the chain data at `root`. A missing config
    /// file gives the defaults; `TM_DB_DIR` overrides `db_dir`.
    pub fn load<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::load_with_override(root, std::env::var_os(DB_DIR_ENV))
    }

    fn load_with_override<P: AsRef<Path>>(root: P, db_dir: Option<OsString>) -> Result<Self> {
        let root = root.as_ref();
        let path = root.join("config").join("config.toml");
        let mut config = if path.is_file() {
            let text = std::fs::read_to_string(&path)?;
            toml::from_str::<ChainConfig>(&text)
                .map_err(|e| Error::ConfigError(format!("{}: {e}", path.display())))?
        } else {
            ChainConfig::default()
        };
        if let Some(db_dir) = db_dir.filter(|dir| !dir.is_empty()) {
            config.db_dir = PathBuf::from(db_dir);
        }
        config.root = root.to_path_buf();
        Ok(config)
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join(&self.db_dir)
    }

    pub fn block_store_path(&self) -> PathBuf {
        self.db_path().join(BLOCK_STORE_DB)
    }

    pub fn tx_index_path(&self) -> PathBuf {
        self.db_path().join(TX_INDEX_DB)
    }
}
