//! Batch configuration
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! yields the standard analysis: trajectories and ODE comparison for
//! N = 1000 at r = 1.05 and r = 1.3, absorption histograms for
//! N ∈ {50, 100, 300, 1000}.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::absorption::HistogramSpec;
use crate::ode::OdeSettings;
use crate::storage::{ParamKey, TimeWindow};
use crate::{Error, Result};

/// Runs the simulator produces per (N, r) pair.
pub const DEFAULT_N_SIM: usize = 1000;

/// Trajectories kept per target for display and recomputation.
pub const DEFAULT_MAX_TRAJECTORIES: usize = 200;

/// Configuration of one analysis batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Time-series dataset (CSV or Parquet)
    pub time_series_path: PathBuf,
    /// Absorption-time dataset (CSV or Parquet)
    pub absorption_path: PathBuf,
    /// (N, r) pairs to run trajectory and ODE analyses for
    pub targets: Vec<ParamKey>,
    /// Time window for trajectory selection
    pub time_window: TimeWindow,
    /// Maximum number of trajectories kept per target
    pub max_trajectories: usize,
    /// Runs per (N, r) pair, for confidence intervals
    pub n_sim: usize,
    /// Initial condition of the reference ODE
    pub x0: f64,
    /// Reference solver settings
    pub ode: OdeSettings,
    /// Absorption histogram layout
    pub histogram: HistogramSpec,
    /// Population sizes to build absorption histograms for
    pub histogram_n: Vec<u32>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            time_series_path: PathBuf::from("data/moran_simulation_results.csv"),
            absorption_path: PathBuf::from("data/absorption_times.csv"),
            targets: vec![ParamKey::new(1000, 1.05), ParamKey::new(1000, 1.3)],
            time_window: TimeWindow::default(),
            max_trajectories: DEFAULT_MAX_TRAJECTORIES,
            n_sim: DEFAULT_N_SIM,
            x0: 0.5,
            ode: OdeSettings::default(),
            histogram: HistogramSpec::default(),
            histogram_n: vec![50, 100, 300, 1000],
        }
    }
}

impl AnalysisConfig {
    /// Read a configuration from a JSON file; absent fields take defaults.
    ///
    /// # Errors
    /// - `Error::MissingFile` if `path` does not exist
    /// - `Error::Json` if the file is not a valid configuration
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::MissingFile {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse a configuration from a JSON string.
    ///
    /// # Errors
    /// Returns `Error::Json` if `text` is not a valid configuration
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Replace the target pairs.
    #[must_use]
    pub fn with_targets(mut self, targets: Vec<ParamKey>) -> Self {
        self.targets = targets;
        self
    }

    /// Replace both input paths.
    #[must_use]
    pub fn with_paths(mut self, time_series: impl Into<PathBuf>, absorption: impl Into<PathBuf>) -> Self {
        self.time_series_path = time_series.into();
        self.absorption_path = absorption.into();
        self
    }

    /// Replace the run count used for confidence intervals.
    #[must_use]
    pub const fn with_n_sim(mut self, n_sim: usize) -> Self {
        self.n_sim = n_sim;
        self
    }

    /// Replace the reference solver settings.
    #[must_use]
    pub const fn with_ode(mut self, ode: OdeSettings) -> Self {
        self.ode = ode;
        self
    }

    /// Check every parameter before any analysis runs.
    ///
    /// # Errors
    /// Returns `Error::InvalidParameter` naming the first offending field
    pub fn validate(&self) -> Result<()> {
        if self.n_sim == 0 {
            return Err(Error::InvalidParameter("n_sim must be positive".to_string()));
        }
        if self.max_trajectories == 0 {
            return Err(Error::InvalidParameter(
                "max_trajectories must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.x0) {
            return Err(Error::InvalidParameter(format!(
                "x0 must lie in [0, 1], got {}",
                self.x0
            )));
        }
        let window = self.time_window;
        if !(window.start.is_finite() && window.end.is_finite() && window.start <= window.end) {
            return Err(Error::InvalidParameter(format!(
                "time_window [{}, {}] must be finite with start <= end",
                window.start, window.end
            )));
        }
        if let Some(bad) = self
            .targets
            .iter()
            .find(|k| k.n == 0 || !(k.r.is_finite() && k.r > 0.0))
        {
            return Err(Error::InvalidParameter(format!(
                "target {bad} needs N > 0 and a finite r > 0"
            )));
        }
        if self.histogram_n.contains(&0) {
            return Err(Error::InvalidParameter(
                "histogram_n must not contain 0".to_string(),
            ));
        }
        self.ode.validate()?;
        self.histogram.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::default();
        assert_eq!(config.targets.len(), 2);
        assert_eq!(config.n_sim, 1000);
        assert_eq!(config.max_trajectories, 200);
        assert_eq!(config.histogram_n, vec![50, 100, 300, 1000]);
        assert!((config.time_window.end - 200.0).abs() < f64::EPSILON);
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(AnalysisConfig::from_json("{}").unwrap(), AnalysisConfig::default());
    }

    #[test]
    fn test_partial_json() {
        let config = AnalysisConfig::from_json(
            r#"{"n_sim": 50, "targets": [{"n": 100, "r": 1.1}], "ode": {"rtol": 1e-8}}"#,
        )
        .unwrap();
        assert_eq!(config.n_sim, 50);
        assert_eq!(config.targets, vec![ParamKey::new(100, 1.1)]);
        assert!((config.ode.rtol - 1e-8).abs() < 1e-20);
        assert!((config.ode.grid_step - 0.001).abs() < 1e-15);
        assert_eq!(config.histogram.bins, 90);
    }

    #[test]
    fn test_json_round_trip() {
        let config = AnalysisConfig::default().with_n_sim(42);
        let text = serde_json::to_string(&config).unwrap();
        assert_eq!(AnalysisConfig::from_json(&text).unwrap(), config);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            AnalysisConfig::from_json("{\"n_sim\": \"many\"}"),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_validate_rejects() {
        let bad = [
            AnalysisConfig::default().with_n_sim(0),
            AnalysisConfig::default().with_targets(vec![ParamKey::new(0, 1.1)]),
            AnalysisConfig::default().with_targets(vec![ParamKey::new(10, -1.0)]),
            AnalysisConfig {
                x0: 1.5,
                ..AnalysisConfig::default()
            },
            AnalysisConfig {
                time_window: TimeWindow::new(10.0, 5.0),
                ..AnalysisConfig::default()
            },
            AnalysisConfig {
                histogram: HistogramSpec::new(0, 0.0, 200.0),
                ..AnalysisConfig::default()
            },
        ];
        for config in &bad {
            assert!(
                matches!(config.validate(), Err(Error::InvalidParameter(_))),
                "{config:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_missing_config_file() {
        let err = AnalysisConfig::from_json_file("/nonexistent/config.json").unwrap_err();
        assert!(matches!(err, Error::MissingFile { .. }));
    }
}
