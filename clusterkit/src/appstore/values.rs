use std::path::Path;

use clusterkit_storage::rocksdb_storage::OpenMode;
use tracing::info;

use super::load_tree;
use crate::{
    batch::BatchedWriter,
    config::ExtractOptions,
    extract::{ExtractStats, RangeExtractor, Transformed},
    key_codec::encode_height_be,
    progress::ProgressEstimator,
    util::open_store,
    Error, Result,
};

/// `dbh\0v`: the version the extracted values belong to, big-endian
pub const VALUE_DB_VERSION_KEY: &[u8] = b"dbh\0v";

/// Copy the key/value pairs of every leaf of one tree version into a plain
/// store, then record the version under [`VALUE_DB_VERSION_KEY`].
pub fn extract_values(src: &Path, dest: &Path, options: &ExtractOptions) -> Result<ExtractStats> {
    let source = open_store(src, OpenMode::ReadOnly)?;
    let tree = load_tree(&source, 0)?;
    let version = match options.version {
        0 => tree.version(),
        version => version,
    };
    let snapshot = tree
        .get_immutable(version)
        .map_err(|source| Error::VersionLoadFailure { version, source })?;
    info!(version, height = snapshot.height(), keys = snapshot.size(), "extracting values");

    let destination = open_store(dest, OpenMode::ReadWrite)?;
    let mut writer = BatchedWriter::new(&destination, options.batch_size);
    let mut progress = ProgressEstimator::new(snapshot.size(), options.log_level);
    let stats = RangeExtractor::whole().run(&snapshot, &mut writer, &mut progress, |k, v| {
        Ok(Transformed::pass(k, v))
    })?;

    writer.put(VALUE_DB_VERSION_KEY, &encode_height_be(version));
    writer.finish()?;
    info!(keys = stats.matched, elapsed_secs = stats.elapsed.as_secs(), "extracted values");
    Ok(stats)
}
