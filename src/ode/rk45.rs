//! Adaptive Dormand–Prince RK5(4) integrator for scalar ODEs
//!
//! Embedded 5th/4th-order pair with FSAL (the last stage of an accepted step
//! is the first stage of the next). The local error estimate drives a
//! step-size controller with a safety factor and bounded growth/shrink.
//! Every accepted step keeps its endpoint slopes so the solution can be
//! evaluated anywhere inside it by cubic Hermite interpolation.
//!
//! References:
//! - Dormand & Prince (1980): A family of embedded Runge-Kutta formulae
//! - Hairer, Nørsett & Wanner (1993): Solving ODEs I, §II.4 (initial step)

use crate::{Error, Result};

// Nodes
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

// Stage coefficients
const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

// 5th-order weights (also the 7th stage row)
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// 5th minus 4th-order weights
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339_200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;
const ERROR_EXPONENT: f64 = -1.0 / 5.0;

/// Error-control settings for [`integrate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rk45Settings {
    /// Relative tolerance
    pub rtol: f64,
    /// Absolute tolerance
    pub atol: f64,
    /// Maximum number of step attempts (accepted + rejected)
    pub max_steps: usize,
}

/// One accepted step with the data needed for dense output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptedStep {
    /// Start time
    pub t0: f64,
    /// End time
    pub t1: f64,
    /// State at `t0`
    pub y0: f64,
    /// State at `t1`
    pub y1: f64,
    /// Slope at `t0`
    pub f0: f64,
    /// Slope at `t1`
    pub f1: f64,
}

impl AcceptedStep {
    /// Cubic Hermite interpolation of the state at `t` (`t0 <= t <= t1`).
    ///
    /// Exact at both endpoints; a constant solution stays bit-identical.
    #[must_use]
    pub fn interpolate(&self, t: f64) -> f64 {
        if t == self.t1 {
            return self.y1;
        }
        let h = self.t1 - self.t0;
        if h <= 0.0 {
            return self.y0;
        }
        let s = (t - self.t0) / h;
        let s2 = s * s;
        let s3 = s2 * s;
        let h01 = (-2.0f64).mul_add(s3, 3.0 * s2);
        let h10 = s3 - 2.0 * s2 + s;
        let h11 = s3 - s2;
        h01.mul_add(self.y1 - self.y0, self.y0) + h * h10.mul_add(self.f0, h11 * self.f1)
    }
}

/// Result of an adaptive integration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rk45Solution {
    /// Accepted steps in time order
    pub steps: Vec<AcceptedStep>,
    /// Number of rejected step attempts
    pub rejected: usize,
    /// Number of right-hand-side evaluations
    pub evaluations: usize,
}

impl Rk45Solution {
    /// State at the end of the last accepted step.
    #[must_use]
    pub fn final_state(&self) -> Option<f64> {
        self.steps.last().map(|s| s.y1)
    }
}

fn initial_step<F>(f: &F, t0: f64, y0: f64, f0: f64, span: f64, settings: &Rk45Settings) -> f64
where
    F: Fn(f64, f64) -> f64,
{
    let scale = settings.rtol.mul_add(y0.abs(), settings.atol);
    let d0 = y0.abs() / scale;
    let d1 = f0.abs() / scale;
    let h0 = if d0 < 1e-5 || d1 < 1e-5 {
        1e-6
    } else {
        0.01 * d0 / d1
    };

    let y1 = h0.mul_add(f0, y0);
    let f1 = f(t0 + h0, y1);
    let d2 = (f1 - f0).abs() / scale / h0;

    let h1 = if d1.max(d2) <= 1e-15 {
        (h0 * 1e-3).max(1e-6)
    } else {
        (0.01 / d1.max(d2)).powf(1.0 / 5.0)
    };

    (100.0 * h0).min(h1).min(span)
}

/// Integrate `dy/dt = f(t, y)` from `(t0, y0)` to `t_end`.
///
/// `on_step` is called with every accepted `(t, y)`; returning an error
/// aborts the integration with that error.
///
/// # Errors
/// - `Error::InvalidParameter` for `t_end < t0` or non-positive tolerances
/// - `Error::Integration` if the step size underflows or the step budget
///   is exhausted
/// - Any error returned by `on_step`
pub fn integrate<F, G>(
    f: F,
    t0: f64,
    y0: f64,
    t_end: f64,
    settings: &Rk45Settings,
    mut on_step: G,
) -> Result<Rk45Solution>
where
    F: Fn(f64, f64) -> f64,
    G: FnMut(f64, f64) -> Result<()>,
{
    if !(settings.rtol > 0.0 && settings.atol > 0.0) {
        return Err(Error::InvalidParameter(format!(
            "RK45 tolerances must be positive (rtol={}, atol={})",
            settings.rtol, settings.atol
        )));
    }
    if !(t_end >= t0) || !t_end.is_finite() || !t0.is_finite() {
        return Err(Error::InvalidParameter(format!(
            "integration interval [{t0}, {t_end}] is not a finite forward interval"
        )));
    }

    let mut solution = Rk45Solution::default();
    if t_end == t0 {
        return Ok(solution);
    }

    let mut t = t0;
    let mut y = y0;
    let mut fy = f(t, y);
    solution.evaluations += 2;
    let mut h = initial_step(&f, t0, y0, fy, t_end - t0, settings);
    let mut attempts = 0usize;
    let mut rejected_last = false;

    while t < t_end {
        if attempts >= settings.max_steps {
            return Err(Error::Integration {
                t,
                x: y,
                message: format!("step budget of {} exhausted", settings.max_steps),
            });
        }
        attempts += 1;

        let min_step = 10.0 * f64::EPSILON * t.abs().max(1.0);
        if h < min_step {
            return Err(Error::Integration {
                t,
                x: y,
                message: format!("step size {h:e} underflowed"),
            });
        }

        let t_new = if t + h >= t_end { t_end } else { t + h };
        let h_step = t_new - t;

        let k1 = fy;
        let k2 = f(t + C2 * h_step, y + h_step * (A21 * k1));
        let k3 = f(t + C3 * h_step, y + h_step * A32.mul_add(k2, A31 * k1));
        let k4 = f(
            t + C4 * h_step,
            y + h_step * A43.mul_add(k3, A42.mul_add(k2, A41 * k1)),
        );
        let k5 = f(
            t + C5 * h_step,
            y + h_step * A54.mul_add(k4, A53.mul_add(k3, A52.mul_add(k2, A51 * k1))),
        );
        let k6 = f(
            t_new,
            y + h_step
                * A65.mul_add(
                    k5,
                    A64.mul_add(k4, A63.mul_add(k3, A62.mul_add(k2, A61 * k1))),
                ),
        );
        let y_new = y + h_step
            * B6.mul_add(k6, B5.mul_add(k5, B4.mul_add(k4, B3.mul_add(k3, B1 * k1))));
        let k7 = f(t_new, y_new);
        solution.evaluations += 6;

        let err = h_step
            * E7.mul_add(
                k7,
                E6.mul_add(k6, E5.mul_add(k5, E4.mul_add(k4, E3.mul_add(k3, E1 * k1)))),
            );
        let scale = settings.rtol.mul_add(y.abs().max(y_new.abs()), settings.atol);
        let norm = err.abs() / scale;

        if !(y_new.is_finite() && k7.is_finite() && norm.is_finite()) {
            solution.rejected += 1;
            rejected_last = true;
            h = h_step * MIN_FACTOR;
            continue;
        }

        if norm <= 1.0 {
            let mut factor = if norm == 0.0 {
                MAX_FACTOR
            } else {
                (SAFETY * norm.powf(ERROR_EXPONENT)).min(MAX_FACTOR)
            };
            if rejected_last {
                factor = factor.min(1.0);
            }

            solution.steps.push(AcceptedStep {
                t0: t,
                t1: t_new,
                y0: y,
                y1: y_new,
                f0: k1,
                f1: k7,
            });
            on_step(t_new, y_new)?;

            t = t_new;
            y = y_new;
            fy = k7;
            h = h_step * factor;
            rejected_last = false;
        } else {
            solution.rejected += 1;
            rejected_last = true;
            h = h_step * (SAFETY * norm.powf(ERROR_EXPONENT)).max(MIN_FACTOR);
        }
    }

    Ok(solution)
}
