//! Logistic-ODE reference solver
//!
//! The deterministic limit of the Moran process with selection ratio r is
//!
//! ```text
//! dx/dt = (r − 1)·x·(1 − x) / (r·x + (1 − x)),   x(0) = x0,   x ∈ [0, 1]
//! ```
//!
//! The denominator equals `1 + (r − 1)·x`, which is at least `min(1, r) > 0`
//! on [0, 1], so it never vanishes for a valid r. For the neutral case r = 1
//! the numerator is exactly zero and the solution stays at x0 bit-for-bit.
//!
//! The equation is integrated with an adaptive RK45 ([`rk45`]) independently
//! of the simulator's own (forward Euler) curve, then resampled onto a fixed
//! grid so both curves can be compared point by point.

pub mod rk45;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tolerances::{
    GRID_SNAP, ODE_DOMAIN, ODE_GRID_STEP, RK45_ATOL, RK45_MAX_STEPS, RK45_RTOL,
};
use crate::trajectory::{interpolate, TimePoint};
use crate::{Error, Result};
use rk45::{AcceptedStep, Rk45Settings};

/// Upper bound on output grid size.
const MAX_GRID_POINTS: f64 = 1e8;

/// Solver settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OdeSettings {
    /// Spacing of the output grid
    pub grid_step: f64,
    /// Relative tolerance of the error controller
    pub rtol: f64,
    /// Absolute tolerance of the error controller
    pub atol: f64,
    /// Step-attempt budget
    pub max_steps: usize,
}

impl Default for OdeSettings {
    fn default() -> Self {
        Self {
            grid_step: ODE_GRID_STEP,
            rtol: RK45_RTOL,
            atol: RK45_ATOL,
            max_steps: RK45_MAX_STEPS,
        }
    }
}

impl OdeSettings {
    /// Check that every setting is usable.
    ///
    /// # Errors
    /// Returns `Error::InvalidParameter` for non-positive or non-finite
    /// values
    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(Error::InvalidParameter(format!(
                    "ODE {name} must be positive and finite, got {v}"
                )))
            }
        };
        positive("grid_step", self.grid_step)?;
        positive("rtol", self.rtol)?;
        positive("atol", self.atol)?;
        if self.max_steps == 0 {
            return Err(Error::InvalidParameter(
                "ODE max_steps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    const fn rk45(&self) -> Rk45Settings {
        Rk45Settings {
            rtol: self.rtol,
            atol: self.atol,
            max_steps: self.max_steps,
        }
    }
}

/// Right-hand side of the logistic ODE.
#[must_use]
pub fn logistic_rate(r: f64, x: f64) -> f64 {
    ((r - 1.0) * x * (1.0 - x)) / r.mul_add(x, 1.0 - x)
}

/// Integration horizon `T = ln N`, the diffusive timescale of the Moran
/// process.
#[must_use]
pub fn horizon(n: u32) -> f64 {
    f64::from(n).ln()
}

/// Solve the logistic ODE on `[0, t_end]` with default settings.
///
/// # Errors
/// See [`solve_with`]
pub fn solve(r: f64, t_end: f64, x0: f64) -> Result<Vec<TimePoint>> {
    solve_with(r, t_end, x0, &OdeSettings::default())
}

/// Solve the logistic ODE on `[0, t_end]`, resampled on a grid of
/// `settings.grid_step`.
///
/// The output starts at t = 0, ends exactly at `t_end` and has strictly
/// increasing times.
///
/// # Example
///
/// ```rust
/// use moran_validate::ode::{horizon, solve};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let curve = solve(1.3, horizon(1000), 0.5)?;
/// assert_eq!(curve.first().unwrap().time, 0.0);
/// assert_eq!(curve.last().unwrap().time, horizon(1000));
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// - `Error::InvalidParameter` for r ≤ 0, x0 outside [0, 1], a negative or
///   non-finite `t_end`, or invalid settings
/// - `Error::Integration` if x leaves [0, 1] by more than
///   [`ODE_DOMAIN`], or the integrator stalls
pub fn solve_with(r: f64, t_end: f64, x0: f64, settings: &OdeSettings) -> Result<Vec<TimePoint>> {
    settings.validate()?;
    if !(r.is_finite() && r > 0.0) {
        return Err(Error::InvalidParameter(format!(
            "selection ratio r must be positive and finite, got {r}"
        )));
    }
    if !(0.0..=1.0).contains(&x0) {
        return Err(Error::InvalidParameter(format!(
            "initial fraction x0 must lie in [0, 1], got {x0}"
        )));
    }
    if !(t_end.is_finite() && t_end >= 0.0) {
        return Err(Error::InvalidParameter(format!(
            "horizon must be finite and non-negative, got {t_end}"
        )));
    }
    if t_end / settings.grid_step > MAX_GRID_POINTS {
        return Err(Error::InvalidParameter(format!(
            "grid of step {} over [0, {t_end}] is too large",
            settings.grid_step
        )));
    }

    let solution = rk45::integrate(
        |_t, x| logistic_rate(r, x),
        0.0,
        x0,
        t_end,
        &settings.rk45(),
        check_domain,
    )?;
    debug!(
        r,
        t_end,
        steps = solution.steps.len(),
        rejected = solution.rejected,
        evaluations = solution.evaluations,
        x_end = ?solution.final_state(),
        "logistic ODE integrated"
    );

    resample(&solution.steps, x0, &grid(t_end, settings.grid_step))
}

fn check_domain(t: f64, x: f64) -> Result<()> {
    if !x.is_finite() {
        return Err(Error::Integration {
            t,
            x,
            message: "solution is not finite".to_string(),
        });
    }
    if x < -ODE_DOMAIN || x > 1.0 + ODE_DOMAIN {
        return Err(Error::Integration {
            t,
            x,
            message: "solution left [0, 1]".to_string(),
        });
    }
    Ok(())
}

/// Output grid: `0, step, 2·step, ...` with `t_end` as the exact last point.
fn grid(t_end: f64, step: f64) -> Vec<f64> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let n = (t_end / step).floor() as usize;
    #[allow(clippy::cast_precision_loss)]
    let mut times: Vec<f64> = (0..=n).map(|k| k as f64 * step).collect();

    match times.last_mut() {
        Some(last) if (t_end - *last).abs() <= GRID_SNAP => *last = t_end,
        _ => times.push(t_end),
    }
    // Guard against a grid point overshooting t_end through rounding
    while times.len() >= 2 && times[times.len() - 2] >= t_end {
        let end = times.len() - 2;
        times.remove(end);
    }
    times
}

fn resample(steps: &[AcceptedStep], x0: f64, times: &[f64]) -> Result<Vec<TimePoint>> {
    let mut out = Vec::with_capacity(times.len());
    let mut idx = 0;
    for &t in times {
        let x = if steps.is_empty() {
            x0
        } else {
            while idx + 1 < steps.len() && steps[idx].t1 < t {
                idx += 1;
            }
            steps[idx].interpolate(t)
        };
        check_domain(t, x)?;
        out.push(TimePoint::new(t, x));
    }
    Ok(out)
}

/// Agreement between a reported ODE curve and the reference solution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OdeCrossCheck {
    /// Number of reported points compared
    pub points: usize,
    /// Reported points outside the reference time range (not compared)
    pub skipped: usize,
    /// max |reported − reference|
    pub max_abs_diff: f64,
    /// Time of the largest difference
    pub t_at_max: f64,
    /// mean |reported − reference|
    pub mean_abs_diff: f64,
}

/// Compare a reported curve with a reference solution.
///
/// The reference is linearly interpolated at every reported time inside its
/// own time range.
///
/// # Errors
/// Returns `Error::InvalidParameter` if either curve is empty or no reported
/// point falls inside the reference range
pub fn cross_check(reported: &[TimePoint], reference: &[TimePoint]) -> Result<OdeCrossCheck> {
    let (Some(first), Some(last)) = (reference.first(), reference.last()) else {
        return Err(Error::InvalidParameter(
            "reference curve is empty".to_string(),
        ));
    };
    if reported.is_empty() {
        return Err(Error::InvalidParameter(
            "reported curve is empty".to_string(),
        ));
    }

    let mut points = 0usize;
    let mut sum = 0.0;
    let mut max_abs_diff = 0.0;
    let mut t_at_max = first.time;
    for p in reported {
        if p.time < first.time - GRID_SNAP || p.time > last.time + GRID_SNAP {
            continue;
        }
        let diff = (p.value - interpolate(reference, p.time)).abs();
        points += 1;
        sum += diff;
        if diff > max_abs_diff {
            max_abs_diff = diff;
            t_at_max = p.time;
        }
    }

    if points == 0 {
        return Err(Error::InvalidParameter(format!(
            "no reported point lies in the reference range [{}, {}]",
            first.time, last.time
        )));
    }

    #[allow(clippy::cast_precision_loss)]
    let mean_abs_diff = sum / points as f64;
    Ok(OdeCrossCheck {
        points,
        skipped: reported.len() - points,
        max_abs_diff,
        t_at_max,
        mean_abs_diff,
    })
}
