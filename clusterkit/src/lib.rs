//! Offline maintenance of a node's chain data.
//!
//! Two families of operations are provided:
//!
//! * [`appstore`]: cloning a version of the versioned Merkle tree holding
//!   application state, extracting its leaves (or the EVM part of them)
//!   into plain stores and totalling key and value sizes.
//! * [`blockstore`]: rolling back or purging the block archive, with an
//!   optional cascade to the tx index, and building a block hash index.
//!
//! Every operation opens its stores, drives a scan to completion and
//! closes them. Writes go through a [`batch::BatchedWriter`], progress is
//! reported through a [`progress::ProgressEstimator`].

pub mod appstore;
pub mod batch;
pub mod blockstore;
pub mod config;
mod error;
pub mod extract;
pub mod key_codec;
pub mod progress;
#[cfg(test)]
mod tests;
pub mod util;

pub use error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Package version followed by the commit it was built from, if known.
pub fn full_version() -> String {
    format!(
        "{}@{}",
        env!("CARGO_PKG_VERSION"),
        option_env!("GIT_SHA").unwrap_or("dev")
    )
}
