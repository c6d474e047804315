use std::path::PathBuf;

/// Errors raised by the maintenance operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Store and version loading
    #[error("failed to open store at {}: {source}", path.display())]
    StoreOpenFailure {
        path: PathBuf,
        #[source]
        source: clusterkit_storage::Error,
    },
    #[error("failed to load tree version {version}: {source}")]
    VersionLoadFailure {
        version: u64,
        #[source]
        source: clusterkit_tree::Error,
    },
    // The value store only holds values of the latest version
    #[error("height {requested} doesn't match latest tree version {loaded}")]
    VersionMismatch { requested: u64, loaded: u64 },

    // Preconditions of rollback and purge
    #[error("can't {operation} the block store to height {target}, current height is {current}")]
    InvalidRange {
        operation: &'static str,
        target: u64,
        current: u64,
    },
    #[error("no block below height {0}")]
    NothingToPurge(u64),

    #[error("malformed key {key}: {reason}")]
    MalformedKey { key: String, reason: &'static str },
    #[error("write failed after {written} entries: {source}")]
    WriteFailure {
        written: u64,
        #[source]
        source: clusterkit_storage::Error,
    },
    #[error("missing {record} at height {height}")]
    MissingRecord { record: &'static str, height: u64 },

    #[error("storage error: {0}")]
    StorageError(#[from] clusterkit_storage::Error),
    #[error("tree error: {0}")]
    TreeError(#[from] clusterkit_tree::Error),
    #[error("data corruption error: {0}")]
    CorruptedData(String),
    #[error("config error: {0}")]
    ConfigError(String),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn malformed_key(key: &[u8], reason: &'static str) -> Self {
        Error::MalformedKey {
            key: hex::encode(key),
            reason,
        }
    }
}
