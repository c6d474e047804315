/// Errors raised while reading or writing a versioned tree
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("storage error: {0}")]
    StorageError(#[from] clusterkit_storage::Error),

    #[error("version {0} not found")]
    VersionNotFound(u64),

    #[error("node {0} missing from node store")]
    MissingNode(String),

    #[error("value for key {0} missing from value store")]
    MissingValue(String),

    #[error("corrupted node encoding: {0}")]
    CorruptedNode(ed::Error),

    #[error("unable to encode node: {0}")]
    NodeEncodingError(ed::Error),

    #[error("corruption error {0}")]
    CorruptionError(&'static str),
}
