//! Fixed-memory log-linear latency histogram.
//!
//! One `Histogram` lives per worker during a run; workers never lock it.
//! The runner merges per-worker histograms once all workers quiesce.

mod schedule;

use serde::Serialize;

use crate::error::{CoreError, CoreResult};
use schedule::{bucket_index, bucket_lower, bucket_upper, NUM_BUCKETS, OVERFLOW_BUCKET};

#[derive(Debug, Clone)]
pub struct Histogram {
    offset: f64,
    resolution: f64,
    counts: [u64; NUM_BUCKETS],
    count: u64,
    sum: f64,
    sum_sq: f64,
    min: f64,
    max: f64,
}

/// One bucket's contribution to a `DistributionReport`.
#[derive(Debug, Clone, Serialize)]
pub struct BucketReport {
    pub start: f64,
    pub end: f64,
    pub percent: f64,
    pub count: u64,
}

/// One `(percentile, value)` pair.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PercentileValue {
    pub percentile: f64,
    pub value: f64,
}

/// The full export produced by `Histogram::export`.
#[derive(Debug, Clone, Serialize)]
pub struct DistributionReport {
    pub count: u64,
    pub sum: f64,
    pub avg: f64,
    #[serde(rename = "StdDev")]
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub data: Vec<BucketReport>,
    pub percentiles: Vec<PercentileValue>,
}

impl Histogram {
    /// `resolution` must be finite and > 0; `offset` may be any finite value.
    pub fn new(offset: f64, resolution: f64) -> CoreResult<Self> {
        if !resolution.is_finite() || resolution <= 0.0 {
            return Err(CoreError::Config(format!(
                "histogram resolution must be > 0, got {resolution}"
            )));
        }
        if !offset.is_finite() {
            return Err(CoreError::Config("histogram offset must be finite".into()));
        }
        Ok(Self {
            offset,
            resolution,
            counts: [0u64; NUM_BUCKETS],
            count: 0,
            sum: 0.0,
            sum_sq: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        })
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Record one sample. O(1). NaN is rejected; every other finite or
    /// infinite value lands in a bucket (negative values fall into bucket 0,
    /// values past the last finite bound overflow into bucket 99).
    pub fn record(&mut self, value: f64) -> CoreResult<()> {
        if value.is_nan() {
            return Err(CoreError::InvalidSample);
        }

        let idx = bucket_index(value, self.offset, self.resolution);
        self.counts[idx] += 1;
        self.count += 1;
        self.sum += value;
        self.sum_sq += value * value;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
        Ok(())
    }

    /// Merge `other` into `self`. Both histograms must share the same
    /// `(offset, resolution)` schedule. Merging an empty histogram is a
    /// no-op (identity).
    pub fn merge(&mut self, other: &Histogram) -> CoreResult<()> {
        if other.count == 0 {
            return Ok(());
        }
        if self.offset != other.offset || self.resolution != other.resolution {
            return Err(CoreError::ScheduleMismatch);
        }

        for i in 0..NUM_BUCKETS {
            self.counts[i] += other.counts[i];
        }
        self.count += other.count;
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        Ok(())
    }

    /// Produce a `DistributionReport` for the given percentile list. The
    /// percentile list is an input, not histogram state.
    pub fn export(&self, percentiles: &[f64]) -> DistributionReport {
        if self.count == 0 {
            return DistributionReport {
                count: 0,
                sum: 0.0,
                avg: 0.0,
                std_dev: 0.0,
                min: 0.0,
                max: 0.0,
                data: Vec::new(),
                percentiles: percentiles
                    .iter()
                    .map(|&p| PercentileValue { percentile: p, value: 0.0 })
                    .collect(),
            };
        }

        let n = self.count as f64;
        let avg = self.sum / n;
        let variance = (self.sum_sq / n - avg * avg).max(0.0);
        let std_dev = variance.sqrt();

        let mut data = Vec::new();
        for i in 0..NUM_BUCKETS {
            if self.counts[i] == 0 {
                continue;
            }
            let start = if i == 0 { self.min.min(bucket_lower(i, self.offset, self.resolution)) } else { bucket_lower(i, self.offset, self.resolution) };
            let end = if i == OVERFLOW_BUCKET { self.max } else { bucket_upper(i, self.offset, self.resolution) };
            data.push(BucketReport {
                start,
                end,
                percent: 100.0 * self.counts[i] as f64 / n,
                count: self.counts[i],
            });
        }

        let percentile_values = percentiles
            .iter()
            .map(|&p| PercentileValue { percentile: p, value: self.value_at_percentile(p) })
            .collect();

        DistributionReport {
            count: self.count,
            sum: self.sum,
            avg,
            std_dev,
            min: self.min,
            max: self.max,
            data,
            percentiles: percentile_values,
        }
    }

    /// Linear-interpolated value at percentile `p` (0, 100]. `p == 100`
    /// always returns `max` exactly.
    pub fn value_at_percentile(&self, p: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        if p >= 100.0 {
            return self.max;
        }

        let rank = (p / 100.0 * self.count as f64).ceil().max(1.0);

        let mut cumulative = 0u64;
        let mut last_occupied = 0usize;
        for i in 0..NUM_BUCKETS {
            if self.counts[i] == 0 {
                continue;
            }
            last_occupied = i;
            cumulative += self.counts[i];
            if cumulative as f64 >= rank {
                let lower = if i == 0 {
                    self.min
                } else {
                    bucket_lower(i, self.offset, self.resolution)
                };
                let upper = if i == OVERFLOW_BUCKET || cumulative == self.count {
                    self.max
                } else {
                    bucket_upper(i, self.offset, self.resolution)
                };

                if upper <= lower {
                    return lower;
                }

                // Fraction of the way through this bucket's share of `rank`.
                let bucket_lo_rank = (cumulative - self.counts[i]) as f64;
                let within = (rank - bucket_lo_rank) / self.counts[i] as f64;
                return lower + within * (upper - lower);
            }
        }

        // Only reachable if count > 0 but somehow no bucket matched; fall
        // back to the last occupied bucket's upper bound.
        let _ = last_occupied;
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hist_with(values: &[f64], offset: f64, resolution: f64) -> Histogram {
        let mut h = Histogram::new(offset, resolution).unwrap();
        for &v in values {
            h.record(v).unwrap();
        }
        h
    }

    #[test]
    fn record_rejects_nan() {
        let mut h = Histogram::new(0.0, 1.0).unwrap();
        assert!(matches!(h.record(f64::NAN), Err(CoreError::InvalidSample)));
    }

    #[test]
    fn single_bucket_sample_stats() {
        let h = hist_with(&[0.001, 0.002, 0.003, 0.004, 1.0], 0.0, 0.001);
        assert_eq!(h.count(), 5);
        assert_eq!(h.min, 0.001);
        assert_eq!(h.max, 1.0);
    }

    #[test]
    fn export_p100_is_max() {
        let h = hist_with(&[1.0, 2.0, 3.0, 4.0, 5.0], 0.0, 1.0);
        let report = h.export(&[100.0]);
        assert_eq!(report.percentiles[0].value, 5.0);
    }

    #[test]
    fn percentiles_are_monotonic() {
        let h = hist_with(&[0.1, 0.5, 1.3, 2.7, 9.9, 42.0, 100.0, 0.003], 0.0, 0.001);
        let ps = [1.0, 5.0, 25.0, 50.0, 75.0, 90.0, 99.0, 99.9, 100.0];
        let report = h.export(&ps);
        let mut prev = f64::NEG_INFINITY;
        for pv in &report.percentiles {
            assert!(pv.value >= prev, "percentiles must be non-decreasing: {:?}", report.percentiles);
            prev = pv.value;
        }
    }

    #[test]
    fn merge_is_commutative() {
        let mut a = hist_with(&[1.0, 2.0, 3.0], 0.0, 1.0);
        let b = hist_with(&[4.0, 5.0, 6.0], 0.0, 1.0);

        let mut ab = a.clone();
        ab.merge(&b).unwrap();

        let mut ba = b.clone();
        ba.merge(&a).unwrap();

        let ps = [50.0, 100.0];
        assert_eq!(ab.count(), ba.count());
        let ra = ab.export(&ps);
        let rb = ba.export(&ps);
        assert_eq!(ra.count, rb.count);
        assert_eq!(ra.sum, rb.sum);
        assert_eq!(ra.min, rb.min);
        assert_eq!(ra.max, rb.max);
        for (pa, pb) in ra.percentiles.iter().zip(rb.percentiles.iter()) {
            assert_eq!(pa.value, pb.value);
        }

        // Drop the unused mutable warning: `a` isn't mutated further.
        let _ = &mut a;
    }

    #[test]
    fn merge_with_empty_is_identity() {
        let mut a = hist_with(&[1.0, 2.0, 3.0], 0.0, 1.0);
        let empty = Histogram::new(0.0, 1.0).unwrap();
        let before = a.export(&[50.0, 100.0]);
        a.merge(&empty).unwrap();
        let after = a.export(&[50.0, 100.0]);
        assert_eq!(before.count, after.count);
        assert_eq!(before.sum, after.sum);
    }

    #[test]
    fn merge_rejects_mismatched_schedule() {
        let mut a = Histogram::new(0.0, 1.0).unwrap();
        a.record(1.0).unwrap();
        let mut b = Histogram::new(0.0, 2.0).unwrap();
        b.record(1.0).unwrap();
        assert!(matches!(a.merge(&b), Err(CoreError::ScheduleMismatch)));
    }

    #[test]
    fn literal_merge_scenario() {
        // Histogram scenario 5 from the testable-properties list.
        let mut h1 = Histogram::new(0.0, 1.0).unwrap();
        for v in [1.0, 2.0, 3.0] {
            h1.record(v).unwrap();
        }
        let mut h2 = Histogram::new(0.0, 1.0).unwrap();
        for v in [4.0, 5.0, 6.0] {
            h2.record(v).unwrap();
        }
        h1.merge(&h2).unwrap();
        assert_eq!(h1.count(), 6);
        let report = h1.export(&[100.0]);
        assert_eq!(report.percentiles[0].value, 6.0);
        assert_eq!(report.avg, 3.5);
    }
}
