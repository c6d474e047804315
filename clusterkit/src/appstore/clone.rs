use std::{
    path::Path,
    time::{Duration, Instant},
};

use clusterkit_storage::rocksdb_storage::OpenMode;
use clusterkit_tree::{MutableTree, NodeDb, NodeObserver, SaveReport, Visit};
use tracing::{info, warn};

use crate::{config::CloneOptions, progress::ProgressEstimator, util::open_store, Error, Result};

/// Outcome of [`clone_tree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloneReport {
    /// Version that was cloned
    pub version: u64,
    pub keys: u64,
    pub save: SaveReport,
    pub elapsed: Duration,
}

/// Reports progress of a node walk, counting leaves only.
#[derive(Debug)]
pub struct LeafProgress {
    estimator: ProgressEstimator,
    leaves: u64,
}

impl LeafProgress {
    pub fn new(total_leaves: u64, log_level: u32) -> Self {
        LeafProgress {
            estimator: ProgressEstimator::new(total_leaves, log_level),
            leaves: 0,
        }
    }

    pub fn leaves(&self) -> u64 {
        self.leaves
    }
}

impl NodeObserver for LeafProgress {
    fn visited(&mut self, visit: Visit<'_>) {
        if let Visit::Leaf { .. } = visit {
            self.leaves += 1;
            if let Some(sample) = self.estimator.tick(self.leaves) {
                sample.log("leaf nodes saved");
            }
        }
    }
}

/// Copy one version of the tree at `src` into a new node store at `dest`.
///
/// With `src_values` the leaf values are read from that store, which only
/// holds the values of the latest version: any other requested height fails
/// with [`Error::VersionMismatch`]. Without it a missing height falls back to
/// the nearest older version.
pub fn clone_tree(
    src: &Path,
    src_values: Option<&Path>,
    dest: &Path,
    options: &CloneOptions,
) -> Result<CloneReport> {
    let source = open_store(src, OpenMode::ReadOnly)?;
    let values = src_values
        .map(|path| open_store(path, OpenMode::ReadOnly))
        .transpose()?;
    let destination = open_store(dest, OpenMode::ReadWrite)?;

    let ndb = match &values {
        Some(values) => NodeDb::with_value_store(&source, values),
        None => NodeDb::new(&source),
    };
    let mut tree = MutableTree::new(ndb);
    let requested = options.height;
    // the value store only holds the latest values
    let target = if values.is_some() { 0 } else { requested };
    let version = tree
        .load_version(target)
        .map_err(|source| Error::VersionLoadFailure {
            version: requested,
            source,
        })?;
    if requested > 0 && version != requested {
        if values.is_some() {
            return Err(Error::VersionMismatch {
                requested,
                loaded: version,
            });
        }
        warn!(requested, loaded = version, "version not saved, cloning the nearest older one");
    }

    let snapshot = tree.last_saved()?;
    info!(
        version,
        height = snapshot.height(),
        keys = snapshot.size(),
        "cloning tree"
    );

    let started = Instant::now();
    let dest_ndb = NodeDb::new(&destination);
    let save = if options.log_level > 0 {
        let mut progress = LeafProgress::new(snapshot.size(), options.log_level);
        snapshot.save_to(&dest_ndb, options.saves_per_commit, Some(&mut progress))?
    } else {
        snapshot.save_to(&dest_ndb, options.saves_per_commit, None)?
    };
    let elapsed = started.elapsed();
    info!(
        nodes = save.nodes,
        commits = save.commits,
        elapsed_secs = elapsed.as_secs(),
        "finished cloning tree"
    );

    Ok(CloneReport {
        version,
        keys: snapshot.size(),
        save,
        elapsed,
    })
}
