//! Versioned Merkle AVL tree over a clusterkit [`Storage`].
//!
//! Every saved version is an immutable snapshot addressed by its root hash.
//! Nodes are content addressed, so versions share every subtree they have
//! in common and a single version can be copied node by node into another
//! store.
//!
//! [`Storage`]: clusterkit_storage::Storage

mod error;
mod immutable;
mod mutable;
mod node;
mod node_db;
mod visit;

pub use error::Error;
pub use immutable::{ImmutableTree, SaveReport};
pub use mutable::MutableTree;
pub use node::{Hash, LeafValue, Node, NodeKind, HASH_LENGTH};
pub use node_db::{NodeDb, ValueGetter};
pub use visit::{NodeObserver, Visit};

/// Alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
