//! Numerical constants and tolerances
//!
//! Every threshold used by the analysis components lives here with its
//! origin, so no module carries ad-hoc magic numbers.

// ============================================================================
// Key matching
// ============================================================================

/// Maximum |r_a − r_b| for two selection ratios to denote the same pair.
///
/// The simulator prints r with `%f` (6 decimals), so nominal values parse
/// back exactly; 1e-9 only absorbs representation noise.
pub const R_MATCH: f64 = 1e-9;

/// Decimal digits of the r label used to group deviation series.
pub const R_LABEL_DECIMALS: usize = 2;

// ============================================================================
// ODE reference solver
// ============================================================================

/// Output grid spacing, matching the simulator's sampling step.
pub const ODE_GRID_STEP: f64 = 0.001;

/// Default relative tolerance for the RK45 error controller.
pub const RK45_RTOL: f64 = 1e-6;

/// Default absolute tolerance for the RK45 error controller.
pub const RK45_ATOL: f64 = 1e-9;

/// Step budget before the solver reports a stalled integration.
pub const RK45_MAX_STEPS: usize = 1_000_000;

/// Allowed excursion of x outside [0, 1] before it counts as a domain error.
pub const ODE_DOMAIN: f64 = 1e-9;

/// Two grid times closer than this are treated as the same point.
pub const GRID_SNAP: f64 = 1e-12;

// ============================================================================
// Deviation statistics
// ============================================================================

/// Two-sided 95% standard normal quantile.
pub const Z_95: f64 = 1.96;

// ============================================================================
// Absorption histograms
// ============================================================================

/// Number of histogram bins.
pub const HISTOGRAM_BINS: usize = 90;

/// Lower edge of the absorption-time display range.
pub const HISTOGRAM_LO: f64 = 0.0;

/// Upper edge of the absorption-time display range (inclusive).
pub const HISTOGRAM_HI: f64 = 200.0;

// ============================================================================
// Trajectory summaries
// ============================================================================

/// A final state within this of 0 or 1 counts as absorbed.
pub const ABSORBED: f64 = 1e-9;
