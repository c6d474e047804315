#![deny(missing_docs)]

//! Storage abstraction for clusterkit.
//!
//! Every store the maintenance tools touch (app store node records, plain
//! destination stores, the block archive and the tx index) is reached
//! through the [`Storage`] trait, so batching and iteration code never talks
//! to the engine directly.

mod error;
#[cfg(feature = "rocksdb_storage")]
pub mod rocksdb_storage;
mod storage;

pub use crate::{
    error::Error,
    storage::{Batch, RawIterator, Storage, WriteMode},
};
