use std::{
    ops::ControlFlow,
    path::Path,
    time::{Duration, Instant},
};

use clusterkit_storage::rocksdb_storage::OpenMode;
use tracing::info;

use super::load_tree;
use crate::{key_codec::range_end, progress::ProgressEstimator, util::open_store, Result};

/// Aggregates over the keys of one tree version
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
    pub num_keys: u64,
    pub total_key_bytes: u64,
    pub total_value_bytes: u64,
    pub elapsed: Duration,
}

impl TreeStats {
    pub fn total_bytes(&self) -> u64 {
        self.total_key_bytes + self.total_value_bytes
    }
}

/// Count the keys starting with `prefix` (all keys when empty) in the tree
/// version nearest below `height` (0 for the latest) and total their sizes.
pub fn total_data(path: &Path, prefix: &[u8], height: u64, log_level: u32) -> Result<TreeStats> {
    let source = open_store(path, OpenMode::ReadOnly)?;
    let tree = load_tree(&source, height)?;
    let snapshot = tree.last_saved()?;
    info!(
        version = tree.version(),
        height = snapshot.height(),
        keys = snapshot.size(),
        "totalling tree data"
    );

    let start = (!prefix.is_empty()).then_some(prefix);
    let end = range_end(prefix);
    let mut progress = ProgressEstimator::new(snapshot.size(), log_level);
    let mut stats = TreeStats::default();
    let started = Instant::now();
    snapshot.iterate_range::<()>(start, end.as_deref(), true, |key, value| {
        stats.num_keys += 1;
        stats.total_key_bytes += key.len() as u64;
        stats.total_value_bytes += value.len() as u64;
        if let Some(sample) = progress.tick(stats.num_keys) {
            sample.log("keys totalled");
        }
        ControlFlow::Continue(())
    })?;
    stats.elapsed = started.elapsed();
    Ok(stats)
}
