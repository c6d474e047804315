//! Streaming a key range of a tree snapshot into a destination store

use std::{ops::ControlFlow, time::Duration};

use clusterkit_storage::Storage;
use clusterkit_tree::ImmutableTree;
use tracing::warn;

use crate::{
    batch::BatchedWriter,
    key_codec::{has_prefix, range_end},
    progress::ProgressEstimator,
    Error, Result,
};

/// What a transform makes of one source entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transformed {
    /// Drop the entry.
    Skip,
    /// Write these entries instead.
    Put(Vec<(Vec<u8>, Vec<u8>)>),
}

impl Transformed {
    /// Write the entry unchanged.
    pub fn pass(key: &[u8], value: &[u8]) -> Self {
        Transformed::Put(vec![(key.to_vec(), value.to_vec())])
    }

    pub fn put(key: Vec<u8>, value: Vec<u8>) -> Self {
        Transformed::Put(vec![(key, value)])
    }
}

/// Counters of one extraction
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractStats {
    /// Entries seen in the range
    pub scanned: u64,
    /// Entries that passed the prefix check and the transform
    pub matched: u64,
    /// Entries written to the destination, transforms may write several per
    /// match
    pub written: u64,
    pub skipped: u64,
    pub elapsed: Duration,
}

impl ExtractStats {
    pub(crate) fn absorb(&mut self, other: ExtractStats) {
        self.scanned += other.scanned;
        self.matched += other.matched;
        self.written += other.written;
        self.skipped += other.skipped;
        self.elapsed += other.elapsed;
    }
}

/// Scans `[start, end)` of a snapshot in key order and feeds the transformed
/// entries to a [`BatchedWriter`].
#[derive(Debug, Clone)]
pub struct RangeExtractor {
    start: Option<Vec<u8>>,
    end: Option<Vec<u8>>,
    required_prefix: Option<Vec<u8>>,
}

impl RangeExtractor {
    /// Every entry of the snapshot
    pub fn whole() -> Self {
        RangeExtractor {
            start: None,
            end: None,
            required_prefix: None,
        }
    }

    /// `[start, end)`, `None` being unbounded
    pub fn range(start: Option<Vec<u8>>, end: Option<Vec<u8>>) -> Self {
        RangeExtractor {
            start,
            end,
            required_prefix: None,
        }
    }

    /// The composite keys under `prefix`: the prefix range, narrowed to keys
    /// carrying the separator after the prefix.
    pub fn prefixed(prefix: &[u8]) -> Self {
        RangeExtractor {
            start: Some(prefix.to_vec()),
            end: range_end(prefix),
            required_prefix: Some(prefix.to_vec()),
        }
    }

    /// Drive the scan. Entries failing the prefix check and transforms
    /// failing with [`Error::MalformedKey`] are skipped with a warning; any
    /// other error stops the scan.
    ///
    /// The writer is synced durably once the scan ends, also when it ends
    /// with an error, so whatever was written before the failure stays.
    pub fn run<S, D, F>(
        &self,
        tree: &ImmutableTree<'_, '_, S>,
        writer: &mut BatchedWriter<'_, D>,
        progress: &mut ProgressEstimator,
        mut transform: F,
    ) -> Result<ExtractStats>
    where
        S: Storage,
        D: Storage,
        F: FnMut(&[u8], &[u8]) -> Result<Transformed>,
    {
        let mut stats = ExtractStats::default();
        let started = std::time::Instant::now();

        let scanned = tree.iterate_range(
            self.start.as_deref(),
            self.end.as_deref(),
            true,
            |key, value| {
                stats.scanned += 1;
                if let Some(prefix) = &self.required_prefix {
                    if !has_prefix(key, prefix) {
                        warn!(key = %String::from_utf8_lossy(key), "key does not have prefix, skipped");
                        stats.skipped += 1;
                        return ControlFlow::Continue(());
                    }
                }

                match transform(key, value) {
                    Ok(Transformed::Put(entries)) => {
                        stats.matched += 1;
                        for (key, value) in entries {
                            writer.put(key, &value);
                            stats.written += 1;
                        }
                    }
                    Ok(Transformed::Skip) => stats.skipped += 1,
                    Err(e @ Error::MalformedKey { .. }) => {
                        warn!(error = %e, "skipped entry");
                        stats.skipped += 1;
                    }
                    Err(e) => return ControlFlow::Break(e),
                }

                if let Err(e) = writer.maybe_flush() {
                    return ControlFlow::Break(e);
                }
                if let Some(sample) = progress.tick(stats.matched) {
                    sample.log("keys processed");
                }
                ControlFlow::Continue(())
            },
        );

        let synced = writer.sync();
        stats.elapsed = started.elapsed();
        match scanned {
            Err(e) => Err(Error::from(e)),
            Ok(Some(e)) => Err(e),
            Ok(None) => synced.map(|_| stats),
        }
    }
}
