//! Horizon rollout
//!
//! [`formulate`] rolls the state forward over the horizon with the supplied
//! [`MotionModel`] and accumulates the cost, the obstacle penalty vector and
//! the acceleration vector. It is generic over [`Scalar`]: with [`Expr`]
//! inputs it records the symbolic problem, with `f64` inputs it evaluates it.
//!
//! [`Expr`]: navi_core::Expr

use navi_core::{MotionModel, Point, Scalar, State};
use tracing::debug;

use crate::config::MpcConfig;
use crate::constraints::accelerations;
use crate::cost::{
    cost_control_action, cost_fleet_collision, cost_inside_ellipses, cost_ref_path_deviation,
    cost_ref_state_deviation, cost_ref_value_deviation,
};
use crate::layout::ParameterLayout;
use crate::problem::ProblemError;

/// Named partial sums of the total cost
#[derive(Debug, Clone, PartialEq)]
pub struct CostBreakdown<S> {
    pub path: S,
    pub speed: S,
    pub control: S,
    pub fleet: S,
    pub dynamic_obstacles: S,
    pub terminal: S,
    pub acceleration: S,
}

impl<S: Scalar> CostBreakdown<S> {
    fn zero() -> Self {
        Self {
            path: S::zero(),
            speed: S::zero(),
            control: S::zero(),
            fleet: S::zero(),
            dynamic_obstacles: S::zero(),
            terminal: S::zero(),
            acceleration: S::zero(),
        }
    }

    pub fn total(&self) -> S {
        self.path.clone()
            + self.speed.clone()
            + self.control.clone()
            + self.fleet.clone()
            + self.dynamic_obstacles.clone()
            + self.terminal.clone()
            + self.acceleration.clone()
    }
}

/// Result of one rollout
#[derive(Debug, Clone)]
pub struct Formulation<S> {
    /// Total cost
    pub cost: S,
    pub cost_breakdown: CostBreakdown<S>,
    /// Obstacle containment per step: `N_stc` static then `N_dyn` dynamic entries
    pub penalty_constraints: Vec<S>,
    /// `[a_0..a_{N-1}, α_0..α_{N-1}]`
    pub acceleration_constraints: Vec<S>,
    /// Predicted state after each step
    pub states: Vec<State<S>>,
}

/// Roll out the horizon and assemble cost and constraints
///
/// `u` holds `(v, ω)` per step, `p` follows [`ParameterLayout`]. The
/// configuration is validated before any slot of `p` is read.
pub fn formulate<S: Scalar, M: MotionModel>(
    config: &MpcConfig,
    model: &M,
    u: &[S],
    p: &[S],
) -> Result<Formulation<S>, ProblemError> {
    config.validate()?;
    let layout = ParameterLayout::new(config);
    layout.check(u.len(), p.len())?;

    let n_hor = config.horizon.n_hor;
    let ts = config.horizon.ts;
    let weights = layout.weights(p);
    let goal = layout.goal(p);
    let initial_control = layout.initial_control(p);

    // Reference points, extended by the last one so every step has a segment
    let mut path: Vec<Point<S>> = (0..n_hor).map(|k| layout.path_point(p, k)).collect();
    if let Some(last) = path.last().cloned() {
        path.push(last);
    }

    let obstacles = layout.obstacles(p);
    let safe_distance = S::constant(config.vehicle.vehicle_width);
    let fleet_weight = S::constant(config.vehicle.fleet_collision_weight);
    let social_margin = S::constant(config.vehicle.social_margin);
    let control_weights = [weights.control_linear.clone(), weights.control_angular.clone()];

    let mut breakdown = CostBreakdown::zero();
    let mut penalty_constraints = Vec::with_capacity(n_hor * obstacles.len());
    let mut states = Vec::with_capacity(n_hor);
    let mut state = layout.state(p);

    for k in 0..n_hor {
        let control = [u[2 * k].clone(), u[2 * k + 1].clone()];
        state = model.step(&state, &control, ts);
        let position = Point::new(state[0].clone(), state[1].clone());

        // Tracking and effort
        breakdown.path = breakdown.path
            + cost_ref_path_deviation(&position, &path[k..], weights.path_deviation.clone());
        breakdown.speed = breakdown.speed
            + cost_ref_value_deviation(
                control[0].clone(),
                layout.speed_reference(p, k),
                weights.velocity.clone(),
            );
        breakdown.control = breakdown.control + cost_control_action(&control, &control_weights);

        // Other robots
        let others = layout.other_robots_at(p, k);
        breakdown.fleet = breakdown.fleet
            + cost_fleet_collision(
                &position,
                &others,
                safe_distance.clone(),
                fleet_weight.clone(),
            );

        // Obstacles: hard penalties on the true boundary, soft cost on the inflated ellipse
        let dynamic_weight = layout.dynamic_weight(p, k);
        for obstacle in &obstacles {
            penalty_constraints.push(obstacle.penalty_at(&position, k));
            if let Some(ellipse) = obstacle.ellipse_at(k) {
                let inflated = ellipse.inflated(social_margin.clone());
                breakdown.dynamic_obstacles = breakdown.dynamic_obstacles
                    + cost_inside_ellipses(&position, &[inflated], dynamic_weight.clone());
            }
        }

        states.push(state.clone());
    }

    // Terminal
    let terminal_weights = [
        weights.terminal_position.clone(),
        weights.terminal_position.clone(),
        weights.terminal_heading.clone(),
    ];
    breakdown.terminal = cost_ref_state_deviation(&state, &goal, &terminal_weights);

    // Accelerations
    let (linear, angular) = accelerations(u, &initial_control, ts);
    let linear_weights = vec![weights.acceleration_linear.clone(); linear.len()];
    let angular_weights = vec![weights.acceleration_angular.clone(); angular.len()];
    breakdown.acceleration = cost_control_action(&linear, &linear_weights)
        + cost_control_action(&angular, &angular_weights);

    let mut acceleration_constraints = linear;
    acceleration_constraints.extend(angular);

    debug!(
        steps = n_hor,
        penalties = penalty_constraints.len(),
        accelerations = acceleration_constraints.len(),
        "horizon rolled out"
    );

    Ok(Formulation {
        cost: breakdown.total(),
        cost_breakdown: breakdown,
        penalty_constraints,
        acceleration_constraints,
        states,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::layout::{LayoutError, ParameterPack, Weights};
    use approx::assert_relative_eq;
    use nalgebra::{Vector2, Vector3};
    use navi_core::{Ellipse, UnicycleModel};

    fn config(n_hor: usize) -> MpcConfig {
        let mut config = MpcConfig::default();
        config.horizon.n_hor = n_hor;
        config.environment.n_other = 1;
        config.environment.n_stc_obs = 1;
        config.environment.n_stc_obs_fields = 12;
        config.environment.n_dyn_obs = 1;
        config
    }

    fn parameters(config: &MpcConfig, weights: &Weights<f64>) -> Vec<f64> {
        let layout = ParameterLayout::new(config);
        let mut pack = ParameterPack::new(&layout);
        pack.set_state(&Vector3::new(0.0, 0.0, 0.0))
            .set_goal(&Vector3::new(2.0, 0.0, 0.0))
            .set_initial_control(&Vector2::new(0.0, 0.0))
            .set_weights(weights);
        let path = [Vector3::new(0.0, 0.0, 0.0), Vector3::new(2.0, 0.0, 0.0)];
        let n_points = config.horizon.n_hor.min(path.len());
        pack.set_reference(&path[..n_points], &[1.0]).unwrap();
        pack.set_static_weights(&vec![1.0; config.horizon.n_hor]).unwrap();
        pack.set_dynamic_weights(&vec![1.0; config.horizon.n_hor]).unwrap();
        pack.finish()
    }

    #[test]
    fn test_sizes() {
        let config = config(4);
        let p = parameters(&config, &Weights::default());
        let u = vec![0.5; 8];
        let f = formulate(&config, &UnicycleModel::default(), &u, &p).unwrap();

        assert_eq!(f.states.len(), 4);
        assert_eq!(f.penalty_constraints.len(), 4 * 2);
        assert_eq!(f.acceleration_constraints.len(), 8);
        assert_relative_eq!(f.cost, f.cost_breakdown.total());
    }

    #[test]
    fn test_rejects_wrong_lengths() {
        let config = config(4);
        let p = parameters(&config, &Weights::default());
        assert!(matches!(
            formulate(&config, &UnicycleModel::default(), &[0.0; 6], &p),
            Err(ProblemError::Layout(LayoutError::DecisionLength { expected: 8, got: 6 }))
        ));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = config(2);
        let p = parameters(&config, &Weights::default());
        config.environment.n_stc_obs_fields = 10;
        assert!(matches!(
            formulate(&config, &UnicycleModel::default(), &[0.0; 4], &p),
            Err(ProblemError::Config(ConfigError::StaticObstacleFieldWidth(10)))
        ));

        let mut config = self::config(2);
        config.dimensions.nq = 5;
        assert!(matches!(
            formulate(&config, &UnicycleModel::default(), &[0.0; 4], &[0.0; 8]),
            Err(ProblemError::Config(ConfigError::WeightBlockTooSmall { got: 5, .. }))
        ));
    }

    #[test]
    fn test_single_step_horizon() {
        let config = config(1);
        let p = parameters(&config, &Weights::default());
        let f = formulate(&config, &UnicycleModel::default(), &[0.5, 0.0], &p).unwrap();
        assert_eq!(f.states.len(), 1);
        assert_eq!(f.penalty_constraints.len(), 2);
    }

    #[test]
    fn test_accelerations_and_cost() {
        let config = config(2);
        let mut weights = Weights::default();
        weights.acceleration_linear = 1.0;
        weights.acceleration_angular = 2.0;
        let p = parameters(&config, &weights);
        // v: 0 → 0.2 → 0.2, ω: 0 → 0 → 0.4 with ts = 0.2
        let u = [0.2, 0.0, 0.2, 0.4];
        let f = formulate(&config, &UnicycleModel::default(), &u, &p).unwrap();

        let expected = [1.0, 0.0, 0.0, 2.0];
        for (value, want) in f.acceleration_constraints.iter().zip(expected) {
            assert_relative_eq!(*value, want, epsilon = 1e-12);
        }
        assert_relative_eq!(f.cost_breakdown.acceleration, 1.0 + 2.0 * 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_social_margin_only_affects_soft_cost() {
        let mut config = config(1);
        config.vehicle.social_margin = 0.5;
        let layout = ParameterLayout::new(&config);
        let mut p = parameters(&config, &Weights::default());

        // Ellipse of radius 1 centered 1.2 ahead of where the robot ends up
        let ellipse = Ellipse {
            cx: 0.2 + 1.2,
            cy: 0.0,
            rx: 1.0,
            ry: 1.0,
            angle: 0.0,
            alpha: 1.0,
        };
        let mut pack = ParameterPack::new(&layout);
        pack.add_dynamic_obstacle(&[ellipse]).unwrap();
        let obstacle_block = layout.block(crate::layout::Block::DynamicObstacles);
        p[obstacle_block.clone()].copy_from_slice(&pack.values()[obstacle_block]);

        let f = formulate(&config, &UnicycleModel::default(), &[1.0, 0.0], &p).unwrap();
        // Outside the true boundary: no penalty, but inside the inflated one
        assert_eq!(f.penalty_constraints[1], 0.0);
        assert!(f.cost_breakdown.dynamic_obstacles > 0.0);
    }
}
