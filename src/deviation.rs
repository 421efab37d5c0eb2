//! Deviation statistics
//!
//! The supremum deviation of one run is `max_t |x_moran(t) − x_ode(t)|` over
//! the ODE grid. Across repeated runs of one (N, r) pair the simulator
//! reports its mean (the `Value` of a `Deviation` row) and standard
//! deviation (`std_sup_dev`). The 95% confidence interval of the mean uses
//! the standard error:
//!
//! ```text
//! CI95 = std_sup_dev / sqrt(n_sim) × 1.96
//! ```
//!
//! `n_sim` is a configuration parameter. The aggregate rows do not retain
//! per-run counts, so it is never inferred from the data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::storage::{ParamKey, RecordType, SimulationStore};
use crate::tolerances::{R_LABEL_DECIMALS, Z_95};
use crate::trajectory::{TimePoint, Trajectory};
use crate::{Error, Result};

/// 95% confidence half-width of a mean estimated from `n_sim` runs.
///
/// The result is 0 exactly when `std_sup_dev` is 0, except for subnormal
/// `std_sup_dev` (below ~1e-308), where the division can underflow to 0.
///
/// # Example
///
/// ```rust
/// use moran_validate::deviation::ci95;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let ci = ci95(0.05, 100)?;
/// assert!((ci - 0.05 / 10.0 * 1.96).abs() < 1e-15);
/// assert_eq!(ci95(0.0, 100)?, 0.0);
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// Returns `Error::InvalidParameter` if `n_sim` is 0 or `std_sup_dev` is
/// negative or not finite
pub fn ci95(std_sup_dev: f64, n_sim: usize) -> Result<f64> {
    if n_sim == 0 {
        return Err(Error::InvalidParameter(
            "n_sim must be positive to compute a confidence interval".to_string(),
        ));
    }
    if !(std_sup_dev.is_finite() && std_sup_dev >= 0.0) {
        return Err(Error::InvalidParameter(format!(
            "std_sup_dev must be finite and non-negative, got {std_sup_dev}"
        )));
    }
    #[allow(clippy::cast_precision_loss)]
    let sqrt_n = (n_sim as f64).sqrt();
    Ok(std_sup_dev / sqrt_n * Z_95)
}

/// Mean supremum deviation of one (N, r) pair with its 95% CI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviationStat {
    /// The (N, r) pair
    pub key: ParamKey,
    /// Mean supremum deviation over runs
    pub mean_sup_dev: f64,
    /// Standard deviation of the supremum deviation over runs
    pub std_sup_dev: f64,
    /// 95% confidence half-width of `mean_sup_dev`
    pub ci95: f64,
    /// Number of runs the estimate is based on
    pub n_sim: usize,
}

impl DeviationStat {
    /// Build from an already aggregated (mean, std) pair.
    ///
    /// # Errors
    /// Returns `Error::InvalidParameter` for `n_sim == 0`, or a negative or
    /// non-finite mean or std
    pub fn from_summary(key: ParamKey, mean_sup_dev: f64, std_sup_dev: f64, n_sim: usize) -> Result<Self> {
        if !(mean_sup_dev.is_finite() && mean_sup_dev >= 0.0) {
            return Err(Error::InvalidParameter(format!(
                "mean_sup_dev for {key} must be finite and non-negative, got {mean_sup_dev}"
            )));
        }
        Ok(Self {
            key,
            mean_sup_dev,
            std_sup_dev,
            ci95: ci95(std_sup_dev, n_sim)?,
            n_sim,
        })
    }

    /// Build from raw per-run supremum deviations.
    ///
    /// Uses the population standard deviation, as the simulator does.
    ///
    /// # Errors
    /// Returns `Error::InvalidParameter` if `samples` is empty or holds a
    /// negative or non-finite value
    pub fn from_samples(key: ParamKey, samples: &[f64]) -> Result<Self> {
        if samples.is_empty() {
            return Err(Error::InvalidParameter(format!(
                "no supremum-deviation samples for {key}"
            )));
        }
        if let Some(bad) = samples.iter().find(|s| !(s.is_finite() && **s >= 0.0)) {
            return Err(Error::InvalidParameter(format!(
                "supremum deviation {bad} for {key} must be finite and non-negative"
            )));
        }

        #[allow(clippy::cast_precision_loss)]
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        Self::from_summary(key, mean, variance.max(0.0).sqrt(), samples.len())
    }
}

/// Supremum deviation of one trajectory from a reference curve.
///
/// The trajectory is evaluated at every reference time by linear
/// interpolation (constant before its first and after its last point).
///
/// # Errors
/// Returns `Error::InvalidParameter` if either input is empty
pub fn sup_deviation(trajectory: &Trajectory, reference: &[TimePoint]) -> Result<f64> {
    if trajectory.is_empty() || reference.is_empty() {
        return Err(Error::InvalidParameter(
            "supremum deviation needs a non-empty trajectory and reference".to_string(),
        ));
    }
    Ok(reference
        .iter()
        .map(|p| (trajectory.value_at(p.time) - p.value).abs())
        .fold(0.0, f64::max))
}

/// One `DeviationStat` per `Deviation` row of the store, in native order.
///
/// Rows are independent: a row without `std_sup_dev` yields an
/// `Error::Schema` for that row only.
#[must_use]
pub fn stats_from_records(store: &SimulationStore, n_sim: usize) -> Vec<Result<DeviationStat>> {
    store
        .of_type(RecordType::Deviation)
        .map(|record| {
            let key = ParamKey::new(record.n(), record.r());
            let std = record.std_sup_dev().ok_or_else(|| Error::Schema {
                column: crate::storage::schema::COL_STD_SUP_DEV.to_string(),
                context: format!("Deviation record for {key}"),
            })?;
            DeviationStat::from_summary(key, record.value(), std, n_sim)
        })
        .collect()
}

/// Label of an r value for grouping, with a fixed number of decimals.
///
/// Keys like 1.1 and 1.100000000001 share the label `"1.10"`.
#[must_use]
pub fn r_label(r: f64) -> String {
    format!("{r:.prec$}", prec = R_LABEL_DECIMALS)
}

/// Deviation statistics of one r label, ordered by N.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviationSeries {
    /// r formatted by [`r_label`]
    pub r_label: String,
    /// Statistics sorted by ascending N
    pub points: Vec<DeviationStat>,
}

/// Group statistics by [`r_label`]; series sorted by r, points by N.
#[must_use]
pub fn group_by_r(stats: &[DeviationStat]) -> Vec<DeviationSeries> {
    let mut groups: BTreeMap<String, (f64, Vec<DeviationStat>)> = BTreeMap::new();
    for stat in stats {
        groups
            .entry(r_label(stat.key.r))
            .or_insert_with(|| (stat.key.r, Vec::new()))
            .1
            .push(*stat);
    }

    let mut series: Vec<(f64, DeviationSeries)> = groups
        .into_iter()
        .map(|(r_label, (r, mut points))| {
            points.sort_by_key(|p| p.key.n);
            (r, DeviationSeries { r_label, points })
        })
        .collect();
    series.sort_by(|a, b| a.0.total_cmp(&b.0));
    series.into_iter().map(|(_, s)| s).collect()
}
