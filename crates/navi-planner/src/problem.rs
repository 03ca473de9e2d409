//! Parametric nonlinear program
//!
//! A [`Problem`] is the symbolic rollout compiled into three functions of
//! `(u, p)`:
//! - `cost`: scalar objective
//! - `f1`: accelerations, bounded by the acceleration rectangle
//! - `f2`: obstacle containment, driven to zero by the penalty method
//!
//! together with the control box on `u`.

use navi_core::expr::{symbols, ExprError};
use navi_core::{Function, MotionModel, Space};
use serde::Serialize;
use thiserror::Error;

use crate::config::{ConfigError, MpcConfig};
use crate::constraints::{acceleration_bounds, control_bounds, Rectangle, FEASIBILITY_TOL};
use crate::formulation::formulate;
use crate::layout::{LayoutError, ParameterLayout};

/// Problem assembly and evaluation errors
#[derive(Debug, Error)]
pub enum ProblemError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),
    #[error("Expression error: {0}")]
    Expr(#[from] ExprError),
}

/// Compiled MPC problem
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Problem {
    layout: ParameterLayout,
    cost: Function,
    acceleration: Function,
    penalty: Function,
    control_bounds: Rectangle,
    acceleration_bounds: Rectangle,
}

/// Numeric evaluation of a [`Problem`] at one `(u, p)`
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemEvaluation {
    pub cost: f64,
    /// `f1` values
    pub accelerations: Vec<f64>,
    /// `f2` values
    pub penalties: Vec<f64>,
    pub controls_feasible: bool,
    pub accelerations_feasible: bool,
    /// Largest obstacle penalty (0 if clear of every obstacle)
    pub max_penalty: f64,
}

impl ProblemEvaluation {
    pub fn is_feasible(&self) -> bool {
        self.controls_feasible
            && self.accelerations_feasible
            && self.max_penalty <= FEASIBILITY_TOL
    }
}

impl Problem {
    /// Record the rollout symbolically and compile it
    pub fn new<M: MotionModel>(config: &MpcConfig, model: &M) -> Result<Self, ProblemError> {
        config.validate()?;
        let layout = ParameterLayout::new(config);
        let n_u = layout.decision_len();
        let n_p = layout.len();

        let u = symbols(Space::Decision, n_u);
        let p = symbols(Space::Parameter, n_p);
        let formulation = formulate(config, model, &u, &p)?;

        let n_hor = config.horizon.n_hor;
        Ok(Self {
            cost: Function::new("cost", &[formulation.cost], n_u, n_p)?,
            acceleration: Function::new(
                "f1",
                &formulation.acceleration_constraints,
                n_u,
                n_p,
            )?,
            penalty: Function::new("f2", &formulation.penalty_constraints, n_u, n_p)?,
            control_bounds: control_bounds(&config.limits, n_hor),
            acceleration_bounds: acceleration_bounds(&config.limits, n_hor),
            layout,
        })
    }

    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    pub fn n_decision(&self) -> usize {
        self.layout.decision_len()
    }

    pub fn n_parameter(&self) -> usize {
        self.layout.len()
    }

    pub fn cost(&self) -> &Function {
        &self.cost
    }

    /// Acceleration mapping `f1`
    pub fn acceleration(&self) -> &Function {
        &self.acceleration
    }

    /// Penalty mapping `f2`
    pub fn penalty(&self) -> &Function {
        &self.penalty
    }

    pub fn control_bounds(&self) -> &Rectangle {
        &self.control_bounds
    }

    pub fn acceleration_bounds(&self) -> &Rectangle {
        &self.acceleration_bounds
    }

    pub fn evaluate(&self, u: &[f64], p: &[f64]) -> Result<ProblemEvaluation, ProblemError> {
        self.layout.check(u.len(), p.len())?;
        let cost = self.cost.eval(u, p)?[0];
        let accelerations = self.acceleration.eval(u, p)?;
        let penalties = self.penalty.eval(u, p)?;

        Ok(ProblemEvaluation {
            cost,
            controls_feasible: self.control_bounds.contains(u, FEASIBILITY_TOL),
            accelerations_feasible: self
                .acceleration_bounds
                .contains(&accelerations, FEASIBILITY_TOL),
            max_penalty: penalties.iter().copied().fold(0.0, f64::max),
            accelerations,
            penalties,
        })
    }

    /// Cost value and its exact gradient with respect to `u`
    pub fn cost_gradient(&self, u: &[f64], p: &[f64]) -> Result<(f64, Vec<f64>), ProblemError> {
        self.layout.check(u.len(), p.len())?;
        Ok(self.cost.gradient(0, u, p)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ParameterPack, Weights};
    use nalgebra::{Vector2, Vector3};
    use navi_core::geometry::ConvexPolygon;
    use navi_core::UnicycleModel;

    fn config() -> MpcConfig {
        let mut config = MpcConfig::default();
        config.horizon.n_hor = 3;
        config.environment.n_other = 1;
        config.environment.n_stc_obs = 1;
        config.environment.n_stc_obs_fields = 12;
        config.environment.n_dyn_obs = 1;
        config
    }

    #[test]
    fn test_dimensions() {
        let config = config();
        let problem = Problem::new(&config, &UnicycleModel::default()).unwrap();

        assert_eq!(problem.n_decision(), 6);
        assert_eq!(problem.n_parameter(), ParameterLayout::new(&config).len());
        assert_eq!(problem.cost().n_outputs(), 1);
        assert_eq!(problem.acceleration().n_outputs(), 6);
        assert_eq!(problem.penalty().n_outputs(), 3 * 2);
        assert_eq!(problem.control_bounds().dimension(), 6);
        assert_eq!(problem.acceleration_bounds().dimension(), 6);
    }

    #[test]
    fn test_evaluate_reports_violations() {
        let config = config();
        let problem = Problem::new(&config, &UnicycleModel::default()).unwrap();

        let mut pack = ParameterPack::new(problem.layout());
        pack.set_state(&Vector3::new(0.0, 0.0, 0.0))
            .set_goal(&Vector3::new(1.0, 0.0, 0.0))
            .set_initial_control(&Vector2::zeros())
            .set_weights(&Weights::default());
        pack.set_reference(&[Vector3::new(0.0, 0.0, 0.0)], &[0.0]).unwrap();
        pack.add_static_obstacle(&ConvexPolygon::rectangle(-1.0, -1.0, 1.0, 1.0).unwrap())
            .unwrap();
        let p = pack.finish();

        // Creeping forward inside the square
        let slow = [0.1, 0.0, 0.1, 0.0, 0.1, 0.0];
        let eval = problem.evaluate(&slow, &p).unwrap();
        assert!(eval.controls_feasible);
        assert!(eval.accelerations_feasible);
        assert!(eval.max_penalty > 0.0);
        assert!(!eval.is_feasible());

        // Angular rate beyond the box, jump beyond the acceleration limit
        let wild = [0.1, 2.0, 0.1, -2.0, 0.1, 0.0];
        let eval = problem.evaluate(&wild, &p).unwrap();
        assert!(!eval.controls_feasible);
        assert!(!eval.accelerations_feasible);
    }

    #[test]
    fn test_evaluate_checks_lengths() {
        let problem = Problem::new(&config(), &UnicycleModel::default()).unwrap();
        assert!(matches!(
            problem.evaluate(&[0.0; 6], &[0.0; 3]),
            Err(ProblemError::Layout(LayoutError::ParameterLength { got: 3, .. }))
        ));
    }

    #[test]
    fn test_rejects_invalid_config_before_recording() {
        let mut config = config();
        config.environment.n_stc_obs_fields = 10;
        assert!(matches!(
            Problem::new(&config, &UnicycleModel::default()),
            Err(ProblemError::Config(ConfigError::StaticObstacleFieldWidth(10)))
        ));

        // A weight block too small to hold every weight is an error, not a panic
        let mut config = self::config();
        config.dimensions.nq = 5;
        assert!(matches!(
            Problem::new(&config, &UnicycleModel::default()),
            Err(ProblemError::Config(ConfigError::WeightBlockTooSmall { got: 5, .. }))
        ));
    }
}
