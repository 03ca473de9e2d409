//! Motion models
//!
//! A [`MotionModel`] maps `(state, control, ts)` to the next state. The
//! model is generic over [`Scalar`] so that the rollout can be recorded
//! symbolically (and differentiated exactly) or evaluated numerically.

use serde::{Deserialize, Serialize};

use crate::expr::Scalar;
use crate::{Control, State};

/// Discrete-time motion model of the robot
pub trait MotionModel {
    /// Advance `state` by one sampling interval `ts` under `control`
    fn step<S: Scalar>(&self, state: &State<S>, control: &Control<S>, ts: f64) -> State<S>;
}

/// Integration scheme for continuous-time models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Integrator {
    /// Forward Euler, first order
    #[default]
    Euler,
    /// Classic Runge-Kutta, fourth order (control held constant)
    Rk4,
}

/// Differential-drive (unicycle) kinematics
///
/// ```text
/// ẋ = v cos θ
/// ẏ = v sin θ
/// θ̇ = ω
/// ```
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UnicycleModel {
    pub integrator: Integrator,
}

impl UnicycleModel {
    pub fn new(integrator: Integrator) -> Self {
        Self { integrator }
    }

    fn derivative<S: Scalar>(state: &State<S>, control: &Control<S>) -> State<S> {
        let [_, _, theta] = state.clone();
        let [v, w] = control.clone();
        [v.clone() * theta.clone().cos(), v * theta.sin(), w]
    }
}

/// `x + h·k`, element-wise
fn axpy<S: Scalar>(x: &State<S>, k: &State<S>, h: f64) -> State<S> {
    let h = S::constant(h);
    [
        x[0].clone() + h.clone() * k[0].clone(),
        x[1].clone() + h.clone() * k[1].clone(),
        x[2].clone() + h * k[2].clone(),
    ]
}

impl MotionModel for UnicycleModel {
    fn step<S: Scalar>(&self, state: &State<S>, control: &Control<S>, ts: f64) -> State<S> {
        match self.integrator {
            Integrator::Euler => axpy(state, &Self::derivative(state, control), ts),
            Integrator::Rk4 => {
                let k1 = Self::derivative(state, control);
                let k2 = Self::derivative(&axpy(state, &k1, ts / 2.0), control);
                let k3 = Self::derivative(&axpy(state, &k2, ts / 2.0), control);
                let k4 = Self::derivative(&axpy(state, &k3, ts), control);

                let slope: State<S> = std::array::from_fn(|i| {
                    k1[i].clone()
                        + S::constant(2.0) * k2[i].clone()
                        + S::constant(2.0) * k3[i].clone()
                        + k4[i].clone()
                });
                axpy(state, &slope, ts / 6.0)
            }
        }
    }
}
