//! # moran-validate: Moran Process vs Logistic ODE Cross-Validation
//!
//! Checks the output of a stochastic Moran-process simulator against its
//! deterministic limit, the logistic ODE
//! `dx/dt = (r − 1)·x·(1 − x) / (r·x + 1 − x)`.
//!
//! ## Components
//!
//! - [`storage`]: typed, read-only record stores loaded through Arrow
//!   (CSV or Parquet)
//! - [`trajectory`]: splits the concatenated Moran time series into runs
//! - [`ode`]: adaptive RK45 reference solution on a fixed output grid
//! - [`deviation`]: supremum-deviation statistics with 95% confidence
//!   intervals
//! - [`absorption`]: absorption-time histograms
//! - [`pipeline`]: per-target batch analysis with isolated failures
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use moran_validate::config::AnalysisConfig;
//! use moran_validate::pipeline::Pipeline;
//!
//! let pipeline = Pipeline::new(AnalysisConfig::default())?;
//! let report = pipeline.execute()?;
//! for failure in report.failures() {
//!     println!("{}: {}", failure.step, failure.message);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod absorption;
pub mod config;
pub mod deviation;
pub mod error;
pub mod ode;
pub mod pipeline;
pub mod storage;
pub mod tolerances;
pub mod trajectory;

pub use error::{Error, Result};
