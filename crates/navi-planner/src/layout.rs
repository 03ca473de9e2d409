//! Parameter vector layout
//!
//! [`ParameterLayout`] owns every offset of the flat parameter vector shared
//! with the runtime caller:
//!
//! ```text
//! [state(ns), goal(ns), initial_control(nu), weights(nq),
//!  reference(ns·N + N), other_robots(ns·N·N_other),
//!  static_obstacles(N_stc·n_stc), dynamic_obstacles(N_dyn·n_dyn·N),
//!  static_weights(N), dynamic_weights(N)]
//! ```
//!
//! The formulation reads parameters only through the typed accessors here,
//! and [`ParameterPack`] writes them through the same offsets.

use std::ops::Range;

use nalgebra::{Vector2, Vector3};
use navi_core::geometry::ConvexPolygon;
use navi_core::{Control, Ellipse, HalfPlane, Point, State};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::MpcConfig;
use crate::obstacle::Obstacle;

/// Number of entries in the weight block
pub const WEIGHT_COUNT: usize = 10;

/// Position used for robot and obstacle slots that are not in use
pub const INERT_POSITION: f64 = 1.0e6;

/// Layout errors
#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    #[error("Invalid parameter vector length: expected {expected}, got {got}")]
    ParameterLength { expected: usize, got: usize },
    #[error("Invalid decision vector length: expected {expected}, got {got}")]
    DecisionLength { expected: usize, got: usize },
    #[error("No free {kind} slot: capacity is {capacity}")]
    TooManyObstacles { kind: &'static str, capacity: usize },
    #[error("Polygon has {edges} edges but static obstacles hold at most {capacity}")]
    TooManyEdges { edges: usize, capacity: usize },
    #[error("{kind} index {index} out of range (capacity {capacity})")]
    IndexOutOfRange { kind: &'static str, index: usize, capacity: usize },
    #[error("{0} must not be empty")]
    EmptySequence(&'static str),
    #[error("{name} has {len} entries, horizon is {max}")]
    SequenceTooLong { name: &'static str, len: usize, max: usize },
    #[error("{name} schedule must have {expected} entries, got {got}")]
    ScheduleLength { name: &'static str, expected: usize, got: usize },
}

/// Blocks of the parameter vector, in layout order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Block {
    State,
    Goal,
    InitialControl,
    Weights,
    Reference,
    OtherRobots,
    StaticObstacles,
    DynamicObstacles,
    StaticWeights,
    DynamicWeights,
}

impl Block {
    pub const ALL: [Block; 10] = [
        Block::State,
        Block::Goal,
        Block::InitialControl,
        Block::Weights,
        Block::Reference,
        Block::OtherRobots,
        Block::StaticObstacles,
        Block::DynamicObstacles,
        Block::StaticWeights,
        Block::DynamicWeights,
    ];

    fn position(self) -> usize {
        self as usize
    }
}

/// Cost weights carried in the parameter vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weights<S> {
    /// Position tracking (reserved)
    pub position: S,
    /// Speed reference deviation
    pub velocity: S,
    /// Heading tracking (reserved)
    pub heading: S,
    /// Linear velocity effort
    pub control_linear: S,
    /// Angular velocity effort
    pub control_angular: S,
    /// Terminal position
    pub terminal_position: S,
    /// Terminal heading
    pub terminal_heading: S,
    /// Reference path deviation
    pub path_deviation: S,
    /// Linear acceleration
    pub acceleration_linear: S,
    /// Angular acceleration
    pub acceleration_angular: S,
}

impl<S: Clone> Weights<S> {
    /// Read the weight block; `values` must hold at least [`WEIGHT_COUNT`] entries
    pub fn from_slice(values: &[S]) -> Self {
        Self {
            position: values[0].clone(),
            velocity: values[1].clone(),
            heading: values[2].clone(),
            control_linear: values[3].clone(),
            control_angular: values[4].clone(),
            terminal_position: values[5].clone(),
            terminal_heading: values[6].clone(),
            path_deviation: values[7].clone(),
            acceleration_linear: values[8].clone(),
            acceleration_angular: values[9].clone(),
        }
    }

    pub fn to_array(&self) -> [S; WEIGHT_COUNT] {
        [
            self.position.clone(),
            self.velocity.clone(),
            self.heading.clone(),
            self.control_linear.clone(),
            self.control_angular.clone(),
            self.terminal_position.clone(),
            self.terminal_heading.clone(),
            self.path_deviation.clone(),
            self.acceleration_linear.clone(),
            self.acceleration_angular.clone(),
        ]
    }
}

impl Default for Weights<f64> {
    fn default() -> Self {
        Self {
            position: 0.0,
            velocity: 1.0,
            heading: 0.0,
            control_linear: 0.1,
            control_angular: 0.5,
            terminal_position: 10.0,
            terminal_heading: 1.0,
            path_deviation: 10.0,
            acceleration_linear: 0.1,
            acceleration_angular: 0.1,
        }
    }
}

/// Offsets and strides of the parameter vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterLayout {
    ns: usize,
    nu: usize,
    nq: usize,
    n_hor: usize,
    n_other: usize,
    n_stc_obs: usize,
    n_stc_obs_fields: usize,
    n_dyn_obs: usize,
    n_dyn_obs_fields: usize,
    /// Start of each block, plus the total length at the end
    offsets: [usize; 11],
}

impl ParameterLayout {
    pub fn new(config: &MpcConfig) -> Self {
        let dims = &config.dimensions;
        let env = &config.environment;
        let n = config.horizon.n_hor;

        let sizes = [
            dims.ns,
            dims.ns,
            dims.nu,
            dims.nq,
            dims.ns * n + n,
            dims.ns * n * env.n_other,
            env.n_stc_obs * env.n_stc_obs_fields,
            env.n_dyn_obs * env.n_dyn_obs_fields * n,
            n,
            n,
        ];
        let mut offsets = [0; 11];
        for (i, size) in sizes.iter().enumerate() {
            offsets[i + 1] = offsets[i] + size;
        }

        Self {
            ns: dims.ns,
            nu: dims.nu,
            nq: dims.nq,
            n_hor: n,
            n_other: env.n_other,
            n_stc_obs: env.n_stc_obs,
            n_stc_obs_fields: env.n_stc_obs_fields,
            n_dyn_obs: env.n_dyn_obs,
            n_dyn_obs_fields: env.n_dyn_obs_fields,
            offsets,
        }
    }

    /// Total parameter vector length
    pub fn len(&self) -> usize {
        self.offsets[10]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decision vector length (`nu · N`)
    pub fn decision_len(&self) -> usize {
        self.nu * self.n_hor
    }

    pub fn block(&self, block: Block) -> Range<usize> {
        let i = block.position();
        self.offsets[i]..self.offsets[i + 1]
    }

    pub fn n_hor(&self) -> usize {
        self.n_hor
    }

    pub fn n_other(&self) -> usize {
        self.n_other
    }

    pub fn n_static(&self) -> usize {
        self.n_stc_obs
    }

    pub fn n_dynamic(&self) -> usize {
        self.n_dyn_obs
    }

    /// Edge slots per static obstacle
    pub fn static_edges(&self) -> usize {
        self.n_stc_obs_fields / 3
    }

    /// Reject vectors that do not match this layout
    pub fn check(&self, u_len: usize, p_len: usize) -> Result<(), LayoutError> {
        if u_len != self.decision_len() {
            return Err(LayoutError::DecisionLength { expected: self.decision_len(), got: u_len });
        }
        if p_len != self.len() {
            return Err(LayoutError::ParameterLength { expected: self.len(), got: p_len });
        }
        Ok(())
    }

    pub fn state<S: Clone>(&self, p: &[S]) -> State<S> {
        let o = self.block(Block::State).start;
        [p[o].clone(), p[o + 1].clone(), p[o + 2].clone()]
    }

    pub fn goal<S: Clone>(&self, p: &[S]) -> State<S> {
        let o = self.block(Block::Goal).start;
        [p[o].clone(), p[o + 1].clone(), p[o + 2].clone()]
    }

    pub fn initial_control<S: Clone>(&self, p: &[S]) -> Control<S> {
        let o = self.block(Block::InitialControl).start;
        [p[o].clone(), p[o + 1].clone()]
    }

    pub fn weights<S: Clone>(&self, p: &[S]) -> Weights<S> {
        Weights::from_slice(&p[self.block(Block::Weights)])
    }

    /// Index of field `field` of the reference state at step `k`
    pub fn reference_index(&self, k: usize, field: usize) -> usize {
        self.block(Block::Reference).start + k * self.ns + field
    }

    /// Index of the speed reference at step `k`
    pub fn speed_reference_index(&self, k: usize) -> usize {
        self.block(Block::Reference).start + self.ns * self.n_hor + k
    }

    pub fn path_point<S: Clone>(&self, p: &[S], k: usize) -> Point<S> {
        Point {
            x: p[self.reference_index(k, 0)].clone(),
            y: p[self.reference_index(k, 1)].clone(),
        }
    }

    pub fn speed_reference<S: Clone>(&self, p: &[S], k: usize) -> S {
        p[self.speed_reference_index(k)].clone()
    }

    /// Index of field `field` of robot `robot` at step `k`
    pub fn other_robot_index(&self, robot: usize, k: usize, field: usize) -> usize {
        self.block(Block::OtherRobots).start + robot * self.ns * self.n_hor + k * self.ns + field
    }

    pub fn other_robot_position<S: Clone>(&self, p: &[S], robot: usize, k: usize) -> Point<S> {
        Point {
            x: p[self.other_robot_index(robot, k, 0)].clone(),
            y: p[self.other_robot_index(robot, k, 1)].clone(),
        }
    }

    /// Predicted positions of all other robots at step `k`
    pub fn other_robots_at<S: Clone>(&self, p: &[S], k: usize) -> Vec<Point<S>> {
        (0..self.n_other).map(|robot| self.other_robot_position(p, robot, k)).collect()
    }

    /// Index of edge `edge` of static obstacle `i`; `coefficient` is 0 for b, 1 for a0, 2 for a1
    pub fn static_obstacle_index(&self, i: usize, coefficient: usize, edge: usize) -> usize {
        self.block(Block::StaticObstacles).start
            + i * self.n_stc_obs_fields
            + coefficient * self.static_edges()
            + edge
    }

    pub fn static_obstacle<S: Clone>(&self, p: &[S], i: usize) -> Obstacle<S> {
        let edges = (0..self.static_edges())
            .map(|e| HalfPlane {
                b: p[self.static_obstacle_index(i, 0, e)].clone(),
                a0: p[self.static_obstacle_index(i, 1, e)].clone(),
                a1: p[self.static_obstacle_index(i, 2, e)].clone(),
            })
            .collect();
        Obstacle::Static { edges }
    }

    /// Index of field `field` of dynamic obstacle `j` at step `k`
    pub fn dynamic_obstacle_index(&self, j: usize, k: usize, field: usize) -> usize {
        self.block(Block::DynamicObstacles).start
            + j * self.n_dyn_obs_fields * self.n_hor
            + k * self.n_dyn_obs_fields
            + field
    }

    pub fn dynamic_ellipse<S: Clone>(&self, p: &[S], j: usize, k: usize) -> Ellipse<S> {
        let at = |field| p[self.dynamic_obstacle_index(j, k, field)].clone();
        Ellipse {
            cx: at(0),
            cy: at(1),
            rx: at(2),
            ry: at(3),
            angle: at(4),
            alpha: at(5),
        }
    }

    pub fn dynamic_obstacle<S: Clone>(&self, p: &[S], j: usize) -> Obstacle<S> {
        Obstacle::Dynamic {
            ellipses: (0..self.n_hor).map(|k| self.dynamic_ellipse(p, j, k)).collect(),
        }
    }

    /// All obstacles, static ones first
    pub fn obstacles<S: Clone>(&self, p: &[S]) -> Vec<Obstacle<S>> {
        (0..self.n_stc_obs)
            .map(|i| self.static_obstacle(p, i))
            .chain((0..self.n_dyn_obs).map(|j| self.dynamic_obstacle(p, j)))
            .collect()
    }

    pub fn static_weight<S: Clone>(&self, p: &[S], k: usize) -> S {
        p[self.block(Block::StaticWeights).start + k].clone()
    }

    pub fn dynamic_weight<S: Clone>(&self, p: &[S], k: usize) -> S {
        p[self.block(Block::DynamicWeights).start + k].clone()
    }
}

/// Fills a parameter vector for the runtime caller
///
/// Slots that are never set stay inert: other robots and dynamic obstacles
/// sit far away, static obstacles have every edge violated. Polygons with
/// fewer edges than the slot holds are padded with always-satisfied edges.
#[derive(Debug, Clone)]
pub struct ParameterPack<'a> {
    layout: &'a ParameterLayout,
    values: Vec<f64>,
    n_static: usize,
    n_dynamic: usize,
    robots_set: Vec<bool>,
}

impl<'a> ParameterPack<'a> {
    pub fn new(layout: &'a ParameterLayout) -> Self {
        let mut pack = Self {
            layout,
            values: vec![0.0; layout.len()],
            n_static: 0,
            n_dynamic: 0,
            robots_set: vec![false; layout.n_other],
        };

        for robot in 0..layout.n_other {
            for k in 0..layout.n_hor {
                pack.values[layout.other_robot_index(robot, k, 0)] = INERT_POSITION;
                pack.values[layout.other_robot_index(robot, k, 1)] = INERT_POSITION;
            }
        }
        for i in 0..layout.n_stc_obs {
            for e in 0..layout.static_edges() {
                pack.values[layout.static_obstacle_index(i, 0, e)] = -1.0;
            }
        }
        for j in 0..layout.n_dyn_obs {
            for k in 0..layout.n_hor {
                pack.values[layout.dynamic_obstacle_index(j, k, 0)] = INERT_POSITION;
                pack.values[layout.dynamic_obstacle_index(j, k, 1)] = INERT_POSITION;
            }
        }
        pack
    }

    pub fn set_state(&mut self, state: &Vector3<f64>) -> &mut Self {
        let range = self.layout.block(Block::State);
        self.values[range].copy_from_slice(state.as_slice());
        self
    }

    pub fn set_goal(&mut self, goal: &Vector3<f64>) -> &mut Self {
        let range = self.layout.block(Block::Goal);
        self.values[range].copy_from_slice(goal.as_slice());
        self
    }

    pub fn set_initial_control(&mut self, control: &Vector2<f64>) -> &mut Self {
        let range = self.layout.block(Block::InitialControl);
        self.values[range].copy_from_slice(control.as_slice());
        self
    }

    pub fn set_weights(&mut self, weights: &Weights<f64>) -> &mut Self {
        let start = self.layout.block(Block::Weights).start;
        self.values[start..start + WEIGHT_COUNT].copy_from_slice(&weights.to_array());
        self
    }

    /// Reference states and speeds; short sequences repeat their last entry
    pub fn set_reference(
        &mut self,
        path: &[Vector3<f64>],
        speeds: &[f64],
    ) -> Result<&mut Self, LayoutError> {
        let n = self.layout.n_hor;
        let path = stretch(path, n, "reference path")?;
        let speeds = stretch(speeds, n, "speed reference")?;

        for (k, point) in path.iter().enumerate() {
            for field in 0..3 {
                self.values[self.layout.reference_index(k, field)] = point[field];
            }
        }
        for (k, speed) in speeds.iter().enumerate() {
            self.values[self.layout.speed_reference_index(k)] = **speed;
        }
        Ok(self)
    }

    /// Predicted trajectory of another robot
    pub fn set_other_robot(
        &mut self,
        robot: usize,
        trajectory: &[Vector3<f64>],
    ) -> Result<&mut Self, LayoutError> {
        if robot >= self.layout.n_other {
            return Err(LayoutError::IndexOutOfRange {
                kind: "robot",
                index: robot,
                capacity: self.layout.n_other,
            });
        }
        let trajectory = stretch(trajectory, self.layout.n_hor, "robot trajectory")?;
        for (k, state) in trajectory.iter().enumerate() {
            for field in 0..3 {
                self.values[self.layout.other_robot_index(robot, k, field)] = state[field];
            }
        }
        self.robots_set[robot] = true;
        Ok(self)
    }

    /// Store a convex polygon in the next free static slot
    pub fn add_static_obstacle(
        &mut self,
        polygon: &ConvexPolygon,
    ) -> Result<&mut Self, LayoutError> {
        self.add_static_half_planes(polygon.edges())
    }

    /// Store raw half-plane edges in the next free static slot
    pub fn add_static_half_planes(
        &mut self,
        edges: &[HalfPlane<f64>],
    ) -> Result<&mut Self, LayoutError> {
        let capacity = self.layout.static_edges();
        if self.n_static >= self.layout.n_stc_obs {
            return Err(LayoutError::TooManyObstacles {
                kind: "static obstacle",
                capacity: self.layout.n_stc_obs,
            });
        }
        if edges.len() > capacity {
            return Err(LayoutError::TooManyEdges { edges: edges.len(), capacity });
        }

        let i = self.n_static;
        for e in 0..capacity {
            let (b, a0, a1) = match edges.get(e) {
                Some(edge) => (edge.b, edge.a0, edge.a1),
                None => (1.0, 0.0, 0.0),
            };
            self.values[self.layout.static_obstacle_index(i, 0, e)] = b;
            self.values[self.layout.static_obstacle_index(i, 1, e)] = a0;
            self.values[self.layout.static_obstacle_index(i, 2, e)] = a1;
        }
        self.n_static += 1;
        Ok(self)
    }

    /// Store per-step ellipse predictions in the next free dynamic slot
    pub fn add_dynamic_obstacle(
        &mut self,
        predictions: &[Ellipse<f64>],
    ) -> Result<&mut Self, LayoutError> {
        if self.n_dynamic >= self.layout.n_dyn_obs {
            return Err(LayoutError::TooManyObstacles {
                kind: "dynamic obstacle",
                capacity: self.layout.n_dyn_obs,
            });
        }
        let predictions = stretch(predictions, self.layout.n_hor, "obstacle prediction")?;

        let j = self.n_dynamic;
        for (k, ellipse) in predictions.iter().enumerate() {
            let fields = [
                ellipse.cx,
                ellipse.cy,
                ellipse.rx,
                ellipse.ry,
                ellipse.angle,
                ellipse.alpha,
            ];
            for (field, value) in fields.iter().enumerate() {
                self.values[self.layout.dynamic_obstacle_index(j, k, field)] = *value;
            }
        }
        self.n_dynamic += 1;
        Ok(self)
    }

    pub fn set_static_weights(&mut self, schedule: &[f64]) -> Result<&mut Self, LayoutError> {
        self.set_schedule(Block::StaticWeights, "static weight", schedule)
    }

    pub fn set_dynamic_weights(&mut self, schedule: &[f64]) -> Result<&mut Self, LayoutError> {
        self.set_schedule(Block::DynamicWeights, "dynamic weight", schedule)
    }

    fn set_schedule(
        &mut self,
        block: Block,
        name: &'static str,
        schedule: &[f64],
    ) -> Result<&mut Self, LayoutError> {
        let range = self.layout.block(block);
        if schedule.len() != range.len() {
            return Err(LayoutError::ScheduleLength {
                name,
                expected: range.len(),
                got: schedule.len(),
            });
        }
        self.values[range].copy_from_slice(schedule);
        Ok(self)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn finish(self) -> Vec<f64> {
        let idle_robots = self.robots_set.iter().filter(|set| !**set).count();
        debug!(
            static_free = self.layout.n_stc_obs - self.n_static,
            dynamic_free = self.layout.n_dyn_obs - self.n_dynamic,
            robots_free = idle_robots,
            "parameter vector packed"
        );
        self.values
    }
}

/// Extend `items` to exactly `n` entries by repeating the last one
fn stretch<'t, T>(items: &'t [T], n: usize, name: &'static str) -> Result<Vec<&'t T>, LayoutError> {
    let last = items.last().ok_or(LayoutError::EmptySequence(name))?;
    if items.len() > n {
        return Err(LayoutError::SequenceTooLong { name, len: items.len(), max: n });
    }
    Ok(items.iter().chain(std::iter::repeat(last)).take(n).collect())
}
