//! Descriptive statistics over a sample window.
//!
//! Percentiles use nearest-rank on the sorted window:
//! `p50 = s[n/2]`, `p99 = s[floor(0.99 n)]`, `iqr = s[3n/4] - s[n/4]`.
//! `stddev` is the population standard deviation.

use std::fmt;

use crate::slot::SlotRef;

/// Point-in-time statistics for one checkpoint.
///
/// An empty window yields `SampleStats::default()` (`count == 0`,
/// everything zero).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleStats {
    pub count: usize,
    pub min: u64,
    pub max: u64,
    pub avg: f64,
    pub p50: u64,
    pub p99: u64,
    pub stddev: f64,
    pub iqr: u64,
}

impl SampleStats {
    /// Compute over `samples`, sorting them in place.
    pub fn compute(samples: &mut [u64]) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self::default();
        }
        samples.sort_unstable();

        let sum: f64 = samples.iter().map(|&v| v as f64).sum();
        let avg = sum / n as f64;
        let var = samples
            .iter()
            .map(|&v| {
                let d = v as f64 - avg;
                d * d
            })
            .sum::<f64>()
            / n as f64;

        let rank = |num: usize, den: usize| samples[(n * num / den).min(n - 1)];

        Self {
            count: n,
            min: samples[0],
            max: samples[n - 1],
            avg,
            p50: samples[n / 2],
            p99: rank(99, 100),
            stddev: var.sqrt(),
            iqr: rank(3, 4) - rank(1, 4),
        }
    }

    /// Snapshot `slot` into `scratch` and compute over it.
    pub fn from_slot(slot: &SlotRef<'_>, scratch: &mut Vec<u64>) -> Self {
        slot.window_into(scratch);
        Self::compute(scratch)
    }
}

impl fmt::Display for SampleStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "min {} max {} avg {:.1} p50 {} p99 {} std {:.1} iqr {}",
            self.min, self.max, self.avg, self.p50, self.p99, self.stddev, self.iqr
        )
    }
}
