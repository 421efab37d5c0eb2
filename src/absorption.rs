//! Absorption-time histograms
//!
//! Bins are equal-width over `[lo, hi]`. Every bin is half-open
//! `[lo_i, hi_i)` except the last, which is closed so that a sample lying
//! exactly on `hi` is counted. Samples outside the range (and NaN) are left
//! out without error; the count of excluded samples is reported alongside.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::storage::{AbsorptionStore, ParamKey};
use crate::tolerances::{HISTOGRAM_BINS, HISTOGRAM_HI, HISTOGRAM_LO};
use crate::{Error, Result};

/// Bin layout of an absorption-time histogram.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramSpec {
    /// Number of equal-width bins
    pub bins: usize,
    /// Lower edge (inclusive)
    pub lo: f64,
    /// Upper edge (inclusive)
    pub hi: f64,
}

impl Default for HistogramSpec {
    fn default() -> Self {
        Self {
            bins: HISTOGRAM_BINS,
            lo: HISTOGRAM_LO,
            hi: HISTOGRAM_HI,
        }
    }
}

impl HistogramSpec {
    /// Create a layout.
    #[must_use]
    pub const fn new(bins: usize, lo: f64, hi: f64) -> Self {
        Self { bins, lo, hi }
    }

    /// Check that the layout describes at least one finite, non-empty bin.
    ///
    /// # Errors
    /// Returns `Error::InvalidParameter` otherwise
    pub fn validate(&self) -> Result<()> {
        if self.bins == 0 {
            return Err(Error::InvalidParameter(
                "histogram needs at least one bin".to_string(),
            ));
        }
        if !(self.lo.is_finite() && self.hi.is_finite() && self.lo < self.hi) {
            return Err(Error::InvalidParameter(format!(
                "histogram range [{}, {}] must be finite with lo < hi",
                self.lo, self.hi
            )));
        }
        Ok(())
    }

    /// Bin width.
    #[must_use]
    pub fn width(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let bins = self.bins as f64;
        (self.hi - self.lo) / bins
    }

    /// Index of the bin holding `x`, or `None` if `x` is out of range.
    ///
    /// The floor estimate is corrected against [`edge`](Self::edge), so a
    /// sample equal to a reported lower edge always lands in that bin.
    #[must_use]
    pub fn bin_of(&self, x: f64) -> Option<usize> {
        if !(x >= self.lo && x <= self.hi) {
            return None;
        }
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let mut idx = (((x - self.lo) / self.width()).floor() as usize).min(self.bins - 1);
        if idx > 0 && x < self.edge(idx) {
            idx -= 1;
        } else if idx + 1 < self.bins && x >= self.edge(idx + 1) {
            idx += 1;
        }
        Some(idx)
    }

    /// Edge `i` of `bins + 1`, evenly spaced from `lo` to `hi` inclusive.
    #[must_use]
    pub fn edge(&self, i: usize) -> f64 {
        if i >= self.bins {
            return self.hi;
        }
        #[allow(clippy::cast_precision_loss)]
        let offset = (self.hi - self.lo) * i as f64 / self.bins as f64;
        self.lo + offset
    }
}

/// One histogram bin of one (N, r) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    /// The (N, r) pair
    pub key: ParamKey,
    /// Lower edge
    pub bin_lo: f64,
    /// Upper edge
    pub bin_hi: f64,
    /// Samples in the bin
    pub count: u64,
}

/// Bin `samples` according to `layout`.
///
/// Returns `layout.bins` bins in ascending order; their counts sum to the
/// number of samples inside `[lo, hi]`.
///
/// # Example
///
/// ```rust
/// use moran_validate::absorption::{histogram, HistogramSpec};
/// use moran_validate::storage::ParamKey;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bins = histogram(ParamKey::new(50, 1.1), &[10.0, 200.0, 250.0], &HistogramSpec::default())?;
/// assert_eq!(bins.len(), 90);
/// assert_eq!(bins.iter().map(|b| b.count).sum::<u64>(), 2);
/// assert_eq!(bins[89].count, 1);
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// Returns `Error::InvalidParameter` if `layout` is invalid
pub fn histogram(key: ParamKey, samples: &[f64], layout: &HistogramSpec) -> Result<Vec<HistogramBin>> {
    layout.validate()?;

    let mut counts = vec![0u64; layout.bins];
    for idx in samples.iter().filter_map(|&x| layout.bin_of(x)) {
        counts[idx] += 1;
    }

    Ok(counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            key,
            bin_lo: layout.edge(i),
            bin_hi: layout.edge(i + 1),
            count,
        })
        .collect())
}

/// Histogram of one (N, r) pair with sample bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbsorptionHistogram {
    /// The (N, r) pair
    pub key: ParamKey,
    /// Bins in ascending order
    pub bins: Vec<HistogramBin>,
    /// Number of absorption times recorded for the pair
    pub samples: usize,
    /// Samples outside the histogram range (including NaN)
    pub excluded: usize,
    /// Mean of all finite samples, in or out of range
    pub mean: Option<f64>,
}

impl AbsorptionHistogram {
    /// Build the histogram of one pair's samples.
    ///
    /// # Errors
    /// Returns `Error::InvalidParameter` if `layout` is invalid
    pub fn build(key: ParamKey, samples: &[f64], layout: &HistogramSpec) -> Result<Self> {
        let bins = histogram(key, samples, layout)?;
        let binned: u64 = bins.iter().map(|b| b.count).sum();
        let finite: Vec<f64> = samples.iter().copied().filter(|x| x.is_finite()).collect();
        #[allow(clippy::cast_precision_loss)]
        let mean = (!finite.is_empty()).then(|| finite.iter().sum::<f64>() / finite.len() as f64);

        #[allow(clippy::cast_possible_truncation)]
        let excluded = samples.len() - binned as usize;
        Ok(Self {
            key,
            bins,
            samples: samples.len(),
            excluded,
            mean,
        })
    }

    /// Samples that landed in a bin.
    #[must_use]
    pub fn binned(&self) -> u64 {
        self.bins.iter().map(|b| b.count).sum()
    }
}

/// Histograms for every requested N against every r in the data.
///
/// r values are visited in ascending order. Pairs with no recorded
/// absorption time are skipped.
///
/// # Errors
/// Returns `Error::InvalidParameter` if `layout` is invalid
pub fn histogram_grid(
    store: &AbsorptionStore,
    ns: &[u32],
    layout: &HistogramSpec,
) -> Result<Vec<AbsorptionHistogram>> {
    layout.validate()?;
    let r_values = store.r_values();

    let mut out = Vec::with_capacity(ns.len() * r_values.len());
    for &n in ns {
        for &r in &r_values {
            let key = ParamKey::new(n, r);
            let samples = store.times(key);
            if samples.is_empty() {
                debug!(%key, "no absorption times; skipping histogram");
                continue;
            }
            out.push(AbsorptionHistogram::build(key, &samples, layout)?);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::AbsorptionRecord;

    fn key() -> ParamKey {
        ParamKey::new(100, 1.1)
    }

    #[test]
    fn test_default_layout() {
        let layout = HistogramSpec::default();
        assert_eq!(layout.bins, 90);
        assert!((layout.width() - 200.0 / 90.0).abs() < 1e-12);
    }

    #[test]
    fn test_sample_at_upper_edge_in_last_bin() {
        let bins = histogram(key(), &[200.0], &HistogramSpec::default()).unwrap();
        assert_eq!(bins.len(), 90);
        assert_eq!(bins[89].count, 1);
        assert!((bins[89].bin_hi - 200.0).abs() < 1e-12);
    }

    #[test]
    fn test_inner_edge_is_half_open() {
        let layout = HistogramSpec::new(4, 0.0, 4.0);
        let bins = histogram(key(), &[0.0, 1.0, 2.0, 3.999], &layout).unwrap();
        let counts: Vec<u64> = bins.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![1, 1, 1, 1]);
        assert!((bins[1].bin_lo - 1.0).abs() < 1e-15);
    }

    #[test]
    fn test_sample_on_interior_edge_counts_in_upper_bin() {
        let layout = HistogramSpec::default();
        for i in 1..layout.bins {
            let bins = histogram(key(), &[layout.edge(i)], &layout).unwrap();
            assert_eq!(bins[i].count, 1, "edge {i} = {}", layout.edge(i));
            assert_eq!(bins[i].bin_lo, layout.edge(i));
        }
    }

    #[test]
    fn test_decimal_edges_match_linspace() {
        let layout = HistogramSpec::new(10, 0.0, 1.0);
        let bins = histogram(key(), &[0.3, 0.6, 0.7], &layout).unwrap();
        let filled: Vec<usize> = bins
            .iter()
            .enumerate()
            .filter(|(_, b)| b.count > 0)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(filled, vec![3, 6, 7]);
        assert_eq!(bins[3].bin_lo, 0.3);
    }

    #[test]
    fn test_out_of_range_and_nan_excluded() {
        let layout = HistogramSpec::new(10, 0.0, 10.0);
        let samples = [-1.0, 5.0, 10.5, f64::NAN, f64::INFINITY];
        let bins = histogram(key(), &samples, &layout).unwrap();
        assert_eq!(bins.iter().map(|b| b.count).sum::<u64>(), 1);
    }

    #[test]
    fn test_empty_samples_zero_bins() {
        let bins = histogram(key(), &[], &HistogramSpec::default()).unwrap();
        assert_eq!(bins.len(), 90);
        assert!(bins.iter().all(|b| b.count == 0));
    }

    #[test]
    fn test_invalid_spec() {
        assert!(histogram(key(), &[1.0], &HistogramSpec::new(0, 0.0, 1.0)).is_err());
        assert!(histogram(key(), &[1.0], &HistogramSpec::new(5, 1.0, 1.0)).is_err());
        assert!(histogram(key(), &[1.0], &HistogramSpec::new(5, 0.0, f64::NAN)).is_err());
    }

    #[test]
    fn test_absorption_histogram_bookkeeping() {
        let layout = HistogramSpec::new(5, 0.0, 10.0);
        let h = AbsorptionHistogram::build(key(), &[1.0, 2.0, 30.0, f64::NAN], &layout).unwrap();
        assert_eq!(h.samples, 4);
        assert_eq!(h.excluded, 2);
        assert_eq!(h.binned(), 2);
        assert!((h.mean.unwrap() - 11.0).abs() < 1e-12);
    }

    #[test]
    fn test_grid_skips_absent_pairs() {
        let store = AbsorptionStore::from_records(vec![
            AbsorptionRecord::new(50, 1.2, 10.0),
            AbsorptionRecord::new(50, 1.1, 12.0),
            AbsorptionRecord::new(100, 1.1, 40.0),
            AbsorptionRecord::new(100, 1.1, 41.0),
        ]);
        let grid = histogram_grid(&store, &[50, 100, 300], &HistogramSpec::default()).unwrap();
        let keys: Vec<ParamKey> = grid.iter().map(|h| h.key).collect();
        assert_eq!(
            keys,
            vec![
                ParamKey::new(50, 1.1),
                ParamKey::new(50, 1.2),
                ParamKey::new(100, 1.1),
            ]
        );
        assert_eq!(grid[2].binned(), 2);
    }
}
