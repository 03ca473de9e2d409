//! Navi MPC Planner
//!
//! Formulates the finite-horizon nonlinear MPC problem of a differential-drive
//! robot moving among other robots, static polygons and moving ellipses, and
//! hands it to a solver back end.
//!
//! # Problem
//!
//! ```text
//! minimize    Σ_k  q_path·d(p_k, path)² + q_vel·(v_k − v_ref,k)² + r_v·v_k² + r_w·ω_k²
//!                  + fleet(p_k) + dynamic_obstacles(p_k)
//!             + q_N·‖p_N − p_goal‖² + q_θN·(θ_N − θ_goal)²
//!             + acc·Σ a_k² + ang_acc·Σ α_k²
//! subject to  x_{k+1} = f(x_k, u_k)                          (motion model)
//!             u_min ≤ u_k ≤ u_max                            (control box)
//!             acc_min ≤ (a_k, α_k) ≤ acc_max                 (f1)
//!             inside(p_k, obstacle) = 0                      (f2, penalty)
//! ```
//!
//! # Components
//!
//! - [`config`]: Build-time configuration, loaded from TOML
//! - [`layout`]: Parameter vector layout and runtime packing
//! - [`obstacle`]: Static/dynamic obstacle descriptors
//! - [`cost`]: Cost terms
//! - [`constraints`]: Control and acceleration bounds
//! - [`formulation`]: Horizon rollout
//! - [`problem`]: Compiled problem and numeric evaluation
//! - [`builder`]: Build dispatch to an optimizer backend

pub mod builder;
pub mod config;
pub mod constraints;
pub mod cost;
pub mod formulation;
pub mod layout;
pub mod obstacle;
pub mod problem;

// Re-exports
pub use builder::{
    build_mpc, Artifact, BuildError, BuildSpec, InterfaceMode, ManifestBackend, MpcBuilder,
    OptimizerBackend,
};
pub use config::MpcConfig;
pub use formulation::{formulate, Formulation};
pub use layout::{ParameterLayout, ParameterPack, Weights};
pub use obstacle::Obstacle;
pub use problem::{Problem, ProblemEvaluation};
