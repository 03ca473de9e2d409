//! Bounds on controls and accelerations
//!
//! - Control box: `[lin_vel_min, −ang_vel_max] ≤ (v, ω) ≤ [lin_vel_max, ang_vel_max]` per step
//! - Acceleration set: `[lin_acc_min]·N ++ [−ang_acc_max]·N ≤ (a, α)` and
//!   `(a, α) ≤ [lin_acc_max]·N ++ [ang_acc_max]·N`
//!
//! Accelerations are finite differences of consecutive controls divided by
//! the sampling time, with the supplied initial control before step 0.

use navi_core::{Control, Scalar};
use serde::{Deserialize, Serialize};

use crate::config::{MotionLimits, MpcConfig};

/// Tolerance used when reporting feasibility of numeric values
pub const FEASIBILITY_TOL: f64 = 1e-9;

/// Axis-aligned box `lower ≤ x ≤ upper`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Rectangle {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Self {
        debug_assert_eq!(lower.len(), upper.len());
        Self { lower, upper }
    }

    pub fn dimension(&self) -> usize {
        self.lower.len()
    }

    /// Whether every component lies within the bounds, up to `tol`
    pub fn contains(&self, values: &[f64], tol: f64) -> bool {
        values.len() == self.dimension() && self.violation(values) <= tol
    }

    /// Largest distance of any component outside its bounds (0 if inside)
    pub fn violation(&self, values: &[f64]) -> f64 {
        values
            .iter()
            .zip(self.lower.iter().zip(&self.upper))
            .map(|(x, (lo, hi))| (lo - x).max(x - hi).max(0.0))
            .fold(0.0, f64::max)
    }
}

/// Box bound on the decision vector, `(v, ω)` per step
pub fn control_bounds(limits: &MotionLimits, n_hor: usize) -> Rectangle {
    let lower = [limits.lin_vel_min, -limits.ang_vel_max];
    let upper = [limits.lin_vel_max, limits.ang_vel_max];
    Rectangle::new(lower.repeat(n_hor), upper.repeat(n_hor))
}

/// Bound on `[a_0..a_{N-1}, α_0..α_{N-1}]`
pub fn acceleration_bounds(limits: &MotionLimits, n_hor: usize) -> Rectangle {
    let mut lower = vec![limits.lin_acc_min; n_hor];
    lower.extend(std::iter::repeat(-limits.ang_acc_max).take(n_hor));
    let mut upper = vec![limits.lin_acc_max; n_hor];
    upper.extend(std::iter::repeat(limits.ang_acc_max).take(n_hor));
    Rectangle::new(lower, upper)
}

/// Linear and angular accelerations implied by the control sequence `u`
///
/// `u` holds `(v, ω)` pairs; `initial` is the control applied before step 0.
pub fn accelerations<S: Scalar>(u: &[S], initial: &Control<S>, ts: f64) -> (Vec<S>, Vec<S>) {
    let ts = S::constant(ts);
    let mut previous = initial.clone();
    let mut linear = Vec::with_capacity(u.len() / 2);
    let mut angular = Vec::with_capacity(u.len() / 2);

    for pair in u.chunks_exact(2) {
        linear.push((pair[0].clone() - previous[0].clone()) / ts.clone());
        angular.push((pair[1].clone() - previous[1].clone()) / ts.clone());
        previous = [pair[0].clone(), pair[1].clone()];
    }
    (linear, angular)
}

/// Whether the control sequence respects the acceleration limits
pub fn acceleration_feasible(
    config: &MpcConfig,
    u: &[f64],
    initial_control: &Control<f64>,
) -> bool {
    let n_hor = config.horizon.n_hor;
    if u.len() != 2 * n_hor {
        return false;
    }
    let (mut values, angular) = accelerations(u, initial_control, config.horizon.ts);
    values.extend(angular);
    acceleration_bounds(&config.limits, n_hor).contains(&values, FEASIBILITY_TOL)
}
