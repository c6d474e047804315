//! Operations on the app store, the versioned tree holding application state

mod clone;
mod evm;
mod stats;
mod values;

use clusterkit_storage::rocksdb_storage::RocksDbStorage;
use clusterkit_tree::{MutableTree, NodeDb};

pub use clone::{clone_tree, CloneReport, LeafProgress};
pub use evm::{evm_root_key, extract_evm_aux, extract_evm_state, DEFAULT_EVM_ROOT};
pub use stats::{total_data, TreeStats};
pub use values::{extract_values, VALUE_DB_VERSION_KEY};

use crate::{Error, Result};

/// Load `version` (0 for the latest, otherwise the nearest saved version
/// below it).
pub(crate) fn load_tree<'db>(
    storage: &'db RocksDbStorage,
    version: u64,
) -> Result<MutableTree<'db, RocksDbStorage>> {
    let mut tree = MutableTree::new(NodeDb::new(storage));
    tree.load_version(version)
        .map_err(|source| Error::VersionLoadFailure { version, source })?;
    Ok(tree)
}
