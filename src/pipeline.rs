//! Batch analysis pipeline
//!
//! **Flow**:
//! 1. Load both datasets (fatal on any load error)
//! 2. Per target (N, r): trajectory summary, ODE comparison and deviation
//!    recomputation. Targets run in parallel with the `rayon` feature.
//! 3. Deviation statistics of every `Deviation` row, grouped by r
//! 4. Absorption-time histograms
//!
//! **Isolation**: each step of step 2 and each row of step 3 fails on its
//! own. A failure is recorded in the report as [`Outcome::Failed`] and never
//! stops sibling steps or targets.

use chrono::{DateTime, Utc};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::absorption::{histogram_grid, AbsorptionHistogram};
use crate::config::AnalysisConfig;
use crate::deviation::{group_by_r, stats_from_records, sup_deviation, DeviationSeries, DeviationStat};
use crate::ode::{self, cross_check, OdeCrossCheck};
use crate::storage::{AbsorptionStore, ParamKey, RecordType, SimulationStore};
use crate::tolerances::ABSORBED;
use crate::trajectory::{segment_records, Segmentation, TimePoint};
use crate::{Error, Result};

/// Step name of the trajectory summary.
pub const STEP_TRAJECTORIES: &str = "trajectories";
/// Step name of the ODE comparison.
pub const STEP_ODE: &str = "ode_comparison";
/// Step name of the supremum-deviation recomputation.
pub const STEP_DEVIATION: &str = "deviation";
/// Step name of the deviation statistics over all pairs.
pub const STEP_DEVIATION_STATS: &str = "deviation_stats";
/// Step name of the absorption histograms.
pub const STEP_HISTOGRAMS: &str = "absorption_histograms";

/// Result of one analysis step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome<T> {
    /// The step produced a result
    Ok(T),
    /// The step failed; siblings were unaffected
    Failed {
        /// Step name
        step: String,
        /// `Error::kind` of the failure
        kind: String,
        /// Rendered error
        message: String,
    },
}

impl<T> Outcome<T> {
    fn capture(step: &str, key: Option<ParamKey>, result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(e) => Self::failed(step, key, &e),
        }
    }

    fn failed(step: &str, key: Option<ParamKey>, error: &Error) -> Self {
        match key {
            Some(key) => warn!(%key, step, kind = error.kind(), "{error}"),
            None => warn!(step, kind = error.kind(), "{error}"),
        }
        Self::Failed {
            step: step.to_string(),
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }

    /// Whether the step succeeded.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// The result, if the step succeeded.
    #[must_use]
    pub const fn ok(&self) -> Option<&T> {
        match self {
            Self::Ok(value) => Some(value),
            Self::Failed { .. } => None,
        }
    }

    fn failure(&self, key: Option<ParamKey>) -> Option<StepFailure> {
        match self {
            Self::Ok(_) => None,
            Self::Failed {
                step,
                kind,
                message,
            } => Some(StepFailure {
                key,
                step: step.clone(),
                kind: kind.clone(),
                message: message.clone(),
            }),
        }
    }
}

/// A failed step, flattened for listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailure {
    /// Target pair, when the step belongs to one
    pub key: Option<ParamKey>,
    /// Step name
    pub step: String,
    /// `Error::kind` of the failure
    pub kind: String,
    /// Rendered error
    pub message: String,
}

/// Segmented Moran runs of one target inside the time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySummary {
    /// Runs found in the window
    pub found: usize,
    /// Runs kept after truncation to `max_trajectories`
    pub kept: usize,
    /// Points across kept runs
    pub points: usize,
    /// Kept runs whose last state is 1
    pub fixed: usize,
    /// Kept runs whose last state is 0
    pub extinct: usize,
    /// Mean last state of kept runs
    pub mean_final_value: f64,
}

impl TrajectorySummary {
    fn new(found: usize, kept: &Segmentation) -> Self {
        let finals: Vec<f64> = kept.iter().filter_map(|t| t.last()).map(|p| p.value).collect();
        #[allow(clippy::cast_precision_loss)]
        let mean_final_value = if finals.is_empty() {
            f64::NAN
        } else {
            finals.iter().sum::<f64>() / finals.len() as f64
        };
        Self {
            found,
            kept: kept.len(),
            points: kept.total_points(),
            fixed: finals.iter().filter(|&&x| x >= 1.0 - ABSORBED).count(),
            extinct: finals.iter().filter(|&&x| x <= ABSORBED).count(),
            mean_final_value,
        }
    }
}

/// Simulator ODE curve against the RK45 reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OdeComparison {
    /// Integration horizon ln N
    pub horizon: f64,
    /// Points of the reference grid
    pub grid_points: usize,
    /// Reference value at the horizon
    pub final_value: f64,
    /// Pointwise agreement
    pub cross_check: OdeCrossCheck,
}

/// Supremum deviation recomputed from the Moran runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviationCheck {
    /// Statistic over every segmented run of the pair
    pub recomputed: DeviationStat,
    /// Statistic reported by the simulator, if present
    pub reported: Option<DeviationStat>,
    /// |recomputed mean − reported mean|
    pub mean_abs_diff: Option<f64>,
}

/// Every per-target step of one (N, r) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetAnalysis {
    /// The (N, r) pair
    pub key: ParamKey,
    /// Trajectory summary
    pub trajectories: Outcome<TrajectorySummary>,
    /// ODE comparison
    pub ode: Outcome<OdeComparison>,
    /// Deviation recomputation
    pub deviation: Outcome<DeviationCheck>,
}

/// Structured result of one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// When the batch finished
    pub generated_at: DateTime<Utc>,
    /// Runs per pair assumed for confidence intervals
    pub n_sim: usize,
    /// Per-target analyses, in configuration order
    pub targets: Vec<TargetAnalysis>,
    /// Reported deviation statistics grouped by r
    pub deviation_series: Vec<DeviationSeries>,
    /// Deviation rows that could not be turned into statistics
    pub deviation_failures: Vec<StepFailure>,
    /// Absorption-time histograms
    pub histograms: Outcome<Vec<AbsorptionHistogram>>,
}

impl AnalysisReport {
    /// Every failed step in the report.
    #[must_use]
    pub fn failures(&self) -> Vec<StepFailure> {
        let mut out = Vec::new();
        for target in &self.targets {
            let key = Some(target.key);
            out.extend(target.trajectories.failure(key));
            out.extend(target.ode.failure(key));
            out.extend(target.deviation.failure(key));
        }
        out.extend(self.deviation_failures.iter().cloned());
        out.extend(self.histograms.failure(None));
        out
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    /// Returns `Error::Json` if serialization fails
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Batch analysis over a validated configuration.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: AnalysisConfig,
}

impl Pipeline {
    /// Create a pipeline.
    ///
    /// # Errors
    /// Returns `Error::InvalidParameter` if `config` does not validate
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Load both datasets named in the configuration.
    ///
    /// # Errors
    /// Any load error of either dataset
    pub fn load(&self) -> Result<(SimulationStore, AbsorptionStore)> {
        let series = SimulationStore::load(&self.config.time_series_path)?;
        let absorption = AbsorptionStore::load(&self.config.absorption_path)?;
        Ok((series, absorption))
    }

    /// Load and run.
    ///
    /// # Errors
    /// Any load error; analysis failures are recorded in the report instead
    pub fn execute(&self) -> Result<AnalysisReport> {
        let (series, absorption) = self.load()?;
        Ok(self.run(&series, &absorption))
    }

    /// Run every analysis over loaded datasets.
    #[must_use]
    pub fn run(&self, series: &SimulationStore, absorption: &AbsorptionStore) -> AnalysisReport {
        info!(
            targets = self.config.targets.len(),
            records = series.len(),
            absorption_records = absorption.len(),
            "running analysis"
        );

        #[cfg(feature = "rayon")]
        let targets: Vec<TargetAnalysis> = self
            .config
            .targets
            .par_iter()
            .map(|&key| self.analyze_target(series, key))
            .collect();
        #[cfg(not(feature = "rayon"))]
        let targets: Vec<TargetAnalysis> = self
            .config
            .targets
            .iter()
            .map(|&key| self.analyze_target(series, key))
            .collect();

        let mut stats = Vec::new();
        let mut deviation_failures = Vec::new();
        for result in stats_from_records(series, self.config.n_sim) {
            match result {
                Ok(stat) => stats.push(stat),
                Err(e) => deviation_failures.extend(
                    Outcome::<()>::failed(STEP_DEVIATION_STATS, None, &e).failure(None),
                ),
            }
        }
        let deviation_series = group_by_r(&stats);
        debug!(pairs = stats.len(), series = deviation_series.len(), "deviation statistics");

        let histograms = Outcome::capture(
            STEP_HISTOGRAMS,
            None,
            histogram_grid(absorption, &self.config.histogram_n, &self.config.histogram),
        );

        let report = AnalysisReport {
            generated_at: Utc::now(),
            n_sim: self.config.n_sim,
            targets,
            deviation_series,
            deviation_failures,
            histograms,
        };
        info!(failures = report.failures().len(), "analysis complete");
        report
    }

    /// Segmented Moran runs of `key` inside the time window, truncated to
    /// `max_trajectories`.
    ///
    /// # Errors
    /// Returns `Error::EmptyResult` if the pair has no Moran record in the
    /// window
    pub fn trajectories(&self, series: &SimulationStore, key: ParamKey) -> Result<Segmentation> {
        Ok(self.windowed_runs(series, key)?.truncated(self.config.max_trajectories))
    }

    /// Reference ODE solution of `key` over [0, ln N].
    ///
    /// # Errors
    /// Returns `Error::InvalidParameter` or `Error::Integration` from the
    /// solver
    pub fn reference(&self, key: ParamKey) -> Result<Vec<TimePoint>> {
        ode::solve_with(key.r, ode::horizon(key.n), self.config.x0, &self.config.ode)
    }

    /// All per-target steps of one pair.
    #[must_use]
    pub fn analyze_target(&self, series: &SimulationStore, key: ParamKey) -> TargetAnalysis {
        debug!(%key, "analyzing target");
        let trajectories = Outcome::capture(
            STEP_TRAJECTORIES,
            Some(key),
            self.trajectory_summary(series, key),
        );

        let (ode, deviation) = match self.reference(key) {
            Ok(reference) => (
                Outcome::capture(STEP_ODE, Some(key), self.ode_comparison(series, key, &reference)),
                Outcome::capture(
                    STEP_DEVIATION,
                    Some(key),
                    self.deviation_check(series, key, &reference),
                ),
            ),
            Err(e) => (
                Outcome::failed(STEP_ODE, Some(key), &e),
                Outcome::failed(STEP_DEVIATION, Some(key), &e),
            ),
        };

        TargetAnalysis {
            key,
            trajectories,
            ode,
            deviation,
        }
    }

    fn windowed_runs(&self, series: &SimulationStore, key: ParamKey) -> Result<Segmentation> {
        let records = series.select_window(
            key,
            RecordType::Moran,
            self.config.time_window,
            STEP_TRAJECTORIES,
        )?;
        Ok(segment_records(&records))
    }

    fn trajectory_summary(&self, series: &SimulationStore, key: ParamKey) -> Result<TrajectorySummary> {
        let runs = self.windowed_runs(series, key)?;
        let found = runs.len();
        let kept = runs.truncated(self.config.max_trajectories);
        debug!(%key, found, kept = kept.len(), "segmented trajectories");
        Ok(TrajectorySummary::new(found, &kept))
    }

    fn ode_comparison(
        &self,
        series: &SimulationStore,
        key: ParamKey,
        reference: &[TimePoint],
    ) -> Result<OdeComparison> {
        let reported: Vec<TimePoint> = series
            .select(key, RecordType::Ode, STEP_ODE)?
            .into_iter()
            .map(TimePoint::from)
            .collect();
        let cross_check = cross_check(&reported, reference)?;
        debug!(%key, max_abs_diff = cross_check.max_abs_diff, "ode comparison");
        Ok(OdeComparison {
            horizon: ode::horizon(key.n),
            grid_points: reference.len(),
            final_value: reference.last().map_or(self.config.x0, |p| p.value),
            cross_check,
        })
    }

    fn deviation_check(
        &self,
        series: &SimulationStore,
        key: ParamKey,
        reference: &[TimePoint],
    ) -> Result<DeviationCheck> {
        // Full runs: the sup is taken over the reference grid, not the window
        let records = series.select(key, RecordType::Moran, STEP_DEVIATION)?;
        let runs = segment_records(&records);
        let samples = runs
            .iter()
            .map(|run| sup_deviation(run, reference))
            .collect::<Result<Vec<f64>>>()?;
        let recomputed = DeviationStat::from_samples(key, &samples)?;

        let reported = series
            .of_type(RecordType::Deviation)
            .find(|record| key.matches(record.n(), record.r()))
            .and_then(|record| {
                let std = record.std_sup_dev()?;
                DeviationStat::from_summary(key, record.value(), std, self.config.n_sim).ok()
            });
        let mean_abs_diff = reported.map(|r| (r.mean_sup_dev - recomputed.mean_sup_dev).abs());

        debug!(%key, runs = samples.len(), mean = recomputed.mean_sup_dev, "recomputed deviation");
        Ok(DeviationCheck {
            recomputed,
            reported,
            mean_abs_diff,
        })
    }
}
