//! Progress and ETA over long scans

use std::time::{Duration, Instant};

use tracing::info;

/// Period used when `total / 10^level` rounds down to zero
pub const FALLBACK_PERIOD: u64 = 10;

/// Decides when a scan reports progress.
///
/// Log level 0 is silent; level N reports every `total / 10^N` items, so 1
/// means every 10%, 2 every 1% and 3 every 0.1%.
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    total: u64,
    period: u64,
    started: Instant,
    last: Instant,
    last_count: u64,
}

/// A progress report produced by [`ProgressEstimator::tick`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    pub count: u64,
    pub total: u64,
    /// `count / total`, `None` when the total is unknown
    pub fraction: Option<f64>,
    pub elapsed: Duration,
    pub since_last: Duration,
    pub eta: Option<Duration>,
}

impl ProgressSample {
    pub fn percent(&self) -> u64 {
        self.fraction.map_or(0, |f| (f * 100.0) as u64)
    }

    /// Log the sample at info level.
    pub fn log(&self, what: &str) {
        info!(
            count = self.count,
            total = self.total,
            percent = self.percent(),
            elapsed_secs = self.elapsed.as_secs(),
            since_last_secs = self.since_last.as_secs(),
            eta_secs = self.eta.map(|eta| eta.as_secs()),
            "{what}"
        );
    }
}

impl ProgressEstimator {
    pub fn new(total: u64, log_level: u32) -> Self {
        let period = if log_level == 0 {
            0
        } else {
            match 10u64.checked_pow(log_level) {
                Some(divisor) if total / divisor > 0 => total / divisor,
                _ => FALLBACK_PERIOD,
            }
        };
        let now = Instant::now();
        ProgressEstimator {
            total,
            period,
            started: now,
            last: now,
            last_count: 0,
        }
    }

    /// Estimator that never reports
    pub fn silent() -> Self {
        Self::new(0, 0)
    }

    /// Items between two reports, 0 when silent
    pub fn period(&self) -> u64 {
        self.period
    }

    /// Returns a sample when `count` items done is a reporting point not
    /// reported before.
    pub fn tick(&mut self, count: u64) -> Option<ProgressSample> {
        if self.period == 0 || count <= self.last_count || count % self.period != 0 {
            return None;
        }
        self.last_count = count;
        let now = Instant::now();
        let elapsed = now.duration_since(self.started);
        let since_last = now.duration_since(self.last);
        self.last = now;

        let fraction = (self.total > 0).then(|| count as f64 / self.total as f64);
        let eta = fraction.filter(|f| *f > 0.0).map(|f| {
            let secs = elapsed.as_secs_f64();
            Duration::from_secs_f64((secs / f - secs).max(0.0))
        });
        Some(ProgressSample {
            count,
            total: self.total,
            fraction,
            elapsed,
            since_last,
            eta,
        })
    }
}
