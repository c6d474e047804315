//! Rollback and purge of block record groups

use tracing::{info, warn};

use super::{store::BlockStore, tx_index::TxIndexStore};
use crate::{
    batch::BatchedWriter, config::PurgeOptions, progress::ProgressEstimator, Error, Result,
};

/// Outcome of a rollback or purge
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PruneReport {
    /// Block record groups deleted
    pub removed: u64,
    /// Heights in range without metadata
    pub missing: u64,
    /// First gap a purge stopped at
    pub stopped_at: Option<u64>,
    pub txs_removed: u64,
    pub compacted: bool,
}

/// Removes block record groups from an archive opened read-write,
/// optionally cascading to the tx index.
pub struct Pruner<'a> {
    store: &'a BlockStore,
    tx_index: Option<&'a TxIndexStore>,
}

impl<'a> Pruner<'a> {
    pub fn new(store: &'a BlockStore) -> Self {
        Pruner {
            store,
            tx_index: None,
        }
    }

    /// Also delete the tx index entries of every removed block.
    pub fn with_tx_index(mut self, tx_index: &'a TxIndexStore) -> Self {
        self.tx_index = Some(tx_index);
        self
    }

    /// Remove every height above `target`, highest first, in a single
    /// durable batch, then move the cursor down to `target`.
    ///
    /// All metadata is loaded before anything is written, so a missing
    /// record fails the rollback with the archive untouched.
    pub fn rollback(&self, target: u64) -> Result<PruneReport> {
        let current = self.store.height()?;
        if target >= current {
            return Err(Error::InvalidRange {
                operation: "roll back",
                target,
                current,
            });
        }
        info!(from = current, to = target, "rolling back block store");

        let mut groups = Vec::new();
        let mut txs = Vec::new();
        for height in (target + 1..=current).rev() {
            let meta = self
                .store
                .load_block_meta(height)?
                .ok_or(Error::MissingRecord {
                    record: "block meta",
                    height,
                })?;
            self.collect_txs(height, &mut txs)?;
            groups.push((height, meta));
        }

        let mut writer = BatchedWriter::new(self.store.storage(), usize::MAX);
        for (height, meta) in &groups {
            BlockStore::stage_removal(&mut writer, *height, meta);
        }
        writer.finish()?;
        self.store.set_height(target)?;

        let report = PruneReport {
            removed: groups.len() as u64,
            txs_removed: self.remove_txs(&txs)?,
            ..Default::default()
        };
        info!(
            height = target,
            removed = report.removed,
            txs_removed = report.txs_removed,
            "rolled back block store"
        );
        Ok(report)
    }

    /// Remove every height from the oldest one up to, not including,
    /// `target`, lowest first. The cursor is left alone.
    pub fn purge(&self, target: u64, options: &PurgeOptions) -> Result<PruneReport> {
        let current = self.store.height()?;
        if target > current {
            return Err(Error::InvalidRange {
                operation: "purge",
                target,
                current,
            });
        }
        let oldest = match self.store.oldest_height()? {
            Some(oldest) if oldest < target => oldest,
            _ => return Err(Error::NothingToPurge(target)),
        };
        info!(from = oldest, to = target, "purging block store");

        let mut writer = BatchedWriter::new(self.store.storage(), options.batch_size);
        let mut progress = ProgressEstimator::new(target - oldest, options.log_level);
        let mut report = PruneReport::default();
        let mut txs = Vec::new();
        for height in oldest..target {
            let Some(meta) = self.store.load_block_meta(height)? else {
                report.missing += 1;
                if options.skip_missing {
                    warn!(height, "block meta missing, skipping height");
                    continue;
                }
                warn!(height, "block meta missing, stopping purge");
                report.stopped_at = Some(height);
                break;
            };
            self.collect_txs(height, &mut txs)?;
            BlockStore::stage_removal(&mut writer, height, &meta);
            report.removed += 1;
            // groups are never split across flushes
            if writer.maybe_flush()? {
                report.txs_removed += self.remove_txs(&txs)?;
                txs.clear();
            }
            if let Some(sample) = progress.tick(height - oldest + 1) {
                sample.log("blocks purged");
            }
        }
        writer.finish()?;
        report.txs_removed += self.remove_txs(&txs)?;

        if !options.skip_compaction {
            info!(path = %self.store.path().display(), "compacting block store");
            self.store.compact()?;
            report.compacted = true;
        }
        info!(
            removed = report.removed,
            missing = report.missing,
            txs_removed = report.txs_removed,
            "purged block store"
        );
        Ok(report)
    }

    fn collect_txs(&self, height: u64, txs: &mut Vec<Vec<u8>>) -> Result<()> {
        if self.tx_index.is_none() {
            return Ok(());
        }
        let block = self.store.load_block(height)?.ok_or(Error::MissingRecord {
            record: "block",
            height,
        })?;
        txs.extend(block.data.txs);
        Ok(())
    }

    fn remove_txs(&self, txs: &[Vec<u8>]) -> Result<u64> {
        match self.tx_index {
            Some(tx_index) if !txs.is_empty() => tx_index.delete(txs),
            _ => Ok(0),
        }
    }
}

impl BlockStore {
    /// Shorthand for [`Pruner::rollback`] without a tx index.
    pub fn rollback(&self, target: u64) -> Result<PruneReport> {
        Pruner::new(self).rollback(target)
    }

    /// Shorthand for [`Pruner::purge`] without a tx index.
    pub fn purge(&self, target: u64, options: &PurgeOptions) -> Result<PruneReport> {
        Pruner::new(self).purge(target, options)
    }
}
