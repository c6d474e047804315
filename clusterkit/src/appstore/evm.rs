//! EVM state and auxiliary index extraction

use std::path::Path;

use clusterkit_storage::rocksdb_storage::OpenMode;
use tracing::info;

use super::load_tree;
use crate::{
    batch::BatchedWriter,
    config::{EvmAuxOptions, ExtractOptions},
    extract::{ExtractStats, RangeExtractor, Transformed},
    key_codec::{compose, encode_height_be, rewrite_prefix},
    progress::ProgressEstimator,
    util::open_store,
    Result,
};

const VM_PREFIX: &[u8] = b"vm";
const VM_ROOT: &[u8] = b"vmroot";
const EVM_ROOT: &[u8] = b"evmroot";

/// Root recorded for a version whose EVM state is empty
pub const DEFAULT_EVM_ROOT: &[u8] = &[1];

const BLOOM_FILTER_PREFIX: &[u8] = b"bloomFilter";
const TX_HASH_PREFIX: &[u8] = b"txHash";
const NEW_BLOOM_FILTER_PREFIX: &[u8] = b"bf";
const NEW_TX_HASH_PREFIX: &[u8] = b"th";

/// `vm\0evmroot\0<version BE>`
pub fn evm_root_key(version: u64) -> Vec<u8> {
    compose(&[VM_PREFIX, EVM_ROOT, &encode_height_be(version)])
}

/// Copy the `vm` entries of a tree version into a plain store.
///
/// The Patricia root stored under `vm\0vmroot` is also written as the
/// version's `evmroot` record; when the version has no such root the
/// [`DEFAULT_EVM_ROOT`] is recorded instead.
pub fn extract_evm_state(
    src: &Path,
    dest: &Path,
    options: &ExtractOptions,
) -> Result<ExtractStats> {
    let source = open_store(src, OpenMode::ReadOnly)?;
    let tree = load_tree(&source, options.version)?;
    let version = tree.version();
    let snapshot = tree.last_saved()?;
    info!(version, keys = snapshot.size(), "extracting EVM state");

    let destination = open_store(dest, OpenMode::ReadWrite)?;
    let mut writer = BatchedWriter::new(&destination, options.batch_size);
    let mut progress = ProgressEstimator::new(snapshot.size(), options.log_level);
    let vm_root_key = compose(&[VM_PREFIX, VM_ROOT]);
    let mut root_written = false;

    let stats = RangeExtractor::prefixed(VM_PREFIX).run(
        &snapshot,
        &mut writer,
        &mut progress,
        |key, value| {
            if key != vm_root_key.as_slice() {
                return Ok(Transformed::pass(key, value));
            }
            info!(version, "copying vmroot to evmroot");
            root_written = true;
            let root = if value.is_empty() {
                DEFAULT_EVM_ROOT
            } else {
                value
            };
            Ok(Transformed::Put(vec![
                (evm_root_key(version), root.to_vec()),
                (key.to_vec(), value.to_vec()),
            ]))
        },
    )?;

    if !root_written {
        info!(version, "no EVM root in state, writing the default evmroot");
        writer.put(evm_root_key(version), DEFAULT_EVM_ROOT);
    }
    writer.finish()?;
    info!(
        keys = stats.matched,
        elapsed_secs = stats.elapsed.as_secs(),
        "extracted EVM state"
    );
    Ok(stats)
}

/// Copy the bloom filter and tx hash families of the latest tree version,
/// moving them to their new prefixes with big-endian heights.
pub fn extract_evm_aux(
    src: &Path,
    dest: &Path,
    options: &ExtractOptions,
    families: EvmAuxOptions,
) -> Result<ExtractStats> {
    let source = open_store(src, OpenMode::ReadOnly)?;
    let tree = load_tree(&source, 0)?;
    let snapshot = tree.last_saved()?;
    info!(version = tree.version(), keys = snapshot.size(), "extracting EVM auxiliary data");

    let destination = open_store(dest, OpenMode::ReadWrite)?;
    let mut writer = BatchedWriter::new(&destination, options.batch_size);
    let selected = [
        (families.bloom_filter, BLOOM_FILTER_PREFIX, NEW_BLOOM_FILTER_PREFIX),
        (families.tx_hash, TX_HASH_PREFIX, NEW_TX_HASH_PREFIX),
    ];

    let mut total = ExtractStats::default();
    for (_, old_prefix, new_prefix) in selected.into_iter().filter(|(on, ..)| *on) {
        let mut progress = ProgressEstimator::new(snapshot.size(), options.log_level);
        let stats = RangeExtractor::prefixed(old_prefix).run(
            &snapshot,
            &mut writer,
            &mut progress,
            |key, value| {
                Ok(Transformed::put(
                    rewrite_prefix(key, old_prefix, new_prefix)?,
                    value.to_vec(),
                ))
            },
        )?;
        info!(
            family = %String::from_utf8_lossy(old_prefix),
            keys = stats.matched,
            "finished extracting"
        );
        total.absorb(stats);
    }
    writer.finish()?;
    info!(
        keys = total.matched,
        elapsed_secs = total.elapsed.as_secs(),
        "extracted EVM auxiliary data"
    );
    Ok(total)
}
