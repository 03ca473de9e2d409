//! # Navi Core
//!
//! Building blocks for formulating the navigation MPC problem of a
//! differential-drive robot.
//!
//! ## Modules
//!
//! - [`expr`]: Scalar algebra with a numeric (`f64`) and a symbolic ([`expr::Expr`]) target
//! - [`geometry`]: Distances, polygon/ellipse membership and segment angles
//! - [`motion`]: Motion models used to roll the robot state forward
//!
//! Every formulation routine is generic over [`expr::Scalar`], so the same
//! code either evaluates numbers or records a differentiable expression graph.

pub mod expr;
pub mod geometry;
pub mod motion;

pub use expr::{Expr, Function, Scalar, Space};
pub use geometry::{Ellipse, HalfPlane, Point, Segment};
pub use motion::{Integrator, MotionModel, UnicycleModel};

/// Planar robot state `(x, y, heading)`
pub type State<S> = [S; 3];

/// Control pair `(linear velocity, angular velocity)`
pub type Control<S> = [S; 2];
