//! MPC configuration
//!
//! Fixed numeric parameters of the navigation MPC problem. Everything here is
//! decided at build time and never changes between solves.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::layout::WEIGHT_COUNT;

/// Configuration errors, raised before any expression is built
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Horizon must contain at least one step")]
    EmptyHorizon,
    #[error("Sampling time must be positive, got {0}")]
    InvalidSamplingTime(f64),
    #[error("Invalid {name} dimension: expected {expected}, got {got}")]
    InvalidDimension {
        name: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("Weight block too small: need {required} entries, got {got}")]
    WeightBlockTooSmall { required: usize, got: usize },
    #[error("Static obstacle field width {0} is not a positive multiple of 3 (b, a0, a1 per edge)")]
    StaticObstacleFieldWidth(usize),
    #[error("Dynamic obstacle field width {0} is smaller than 6 (x, y, rx, ry, angle, alpha)")]
    DynamicObstacleFieldWidth(usize),
    #[error("Invalid limits for {name}: min {min} > max {max}")]
    InvertedLimits { name: &'static str, min: f64, max: f64 },
    #[error("{name} must be non-negative, got {value}")]
    Negative { name: &'static str, value: f64 },
    #[error("Optimizer name must be a non-empty identifier, got {0:?}")]
    InvalidOptimizerName(String),
    #[error("Failed to read configuration {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Main MPC configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MpcConfig {
    /// Horizon and sampling
    pub horizon: HorizonConfig,
    /// State, control and weight dimensions
    pub dimensions: DimensionConfig,
    /// Obstacle and robot counts
    pub environment: EnvironmentConfig,
    /// Velocity and acceleration limits
    pub limits: MotionLimits,
    /// Vehicle geometry and safety margins
    pub vehicle: VehicleConfig,
    /// Where and how the solver is generated
    pub build: BuildSettings,
    /// Solver tuning
    pub solver: SolverConfig,
}

impl MpcConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check every invariant the formulation relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.horizon.n_hor == 0 {
            return Err(ConfigError::EmptyHorizon);
        }
        if !(self.horizon.ts > 0.0) {
            return Err(ConfigError::InvalidSamplingTime(self.horizon.ts));
        }

        let dims = &self.dimensions;
        if dims.ns != 3 {
            return Err(ConfigError::InvalidDimension { name: "state", expected: 3, got: dims.ns });
        }
        if dims.nu != 2 {
            return Err(ConfigError::InvalidDimension {
                name: "control",
                expected: 2,
                got: dims.nu,
            });
        }
        if dims.nq < WEIGHT_COUNT {
            return Err(ConfigError::WeightBlockTooSmall { required: WEIGHT_COUNT, got: dims.nq });
        }

        let env = &self.environment;
        if env.n_stc_obs > 0 && (env.n_stc_obs_fields == 0 || env.n_stc_obs_fields % 3 != 0) {
            return Err(ConfigError::StaticObstacleFieldWidth(env.n_stc_obs_fields));
        }
        if env.n_dyn_obs > 0 && env.n_dyn_obs_fields < 6 {
            return Err(ConfigError::DynamicObstacleFieldWidth(env.n_dyn_obs_fields));
        }

        let limits = &self.limits;
        check_range("linear velocity", limits.lin_vel_min, limits.lin_vel_max)?;
        check_range("linear acceleration", limits.lin_acc_min, limits.lin_acc_max)?;
        check_non_negative("angular velocity limit", limits.ang_vel_max)?;
        check_non_negative("angular acceleration limit", limits.ang_acc_max)?;

        check_non_negative("vehicle width", self.vehicle.vehicle_width)?;
        check_non_negative("social margin", self.vehicle.social_margin)?;
        check_non_negative("fleet collision weight", self.vehicle.fleet_collision_weight)?;

        let name = &self.build.optimizer_name;
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigError::InvalidOptimizerName(name.clone()));
        }

        Ok(())
    }
}

fn check_range(name: &'static str, min: f64, max: f64) -> Result<(), ConfigError> {
    if min > max {
        return Err(ConfigError::InvertedLimits { name, min, max });
    }
    Ok(())
}

fn check_non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value < 0.0 {
        return Err(ConfigError::Negative { name, value });
    }
    Ok(())
}

/// Horizon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HorizonConfig {
    /// Sampling interval [s]
    pub ts: f64,
    /// Number of prediction steps (N_hor)
    pub n_hor: usize,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            ts: 0.2,
            n_hor: 20,
        }
    }
}

impl HorizonConfig {
    /// Total predicted time [s]
    pub fn duration(&self) -> f64 {
        self.ts * self.n_hor as f64
    }
}

/// Vector dimensions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionConfig {
    /// State dimension (x, y, heading)
    pub ns: usize,
    /// Control dimension (v, ω)
    pub nu: usize,
    /// Weight block length
    pub nq: usize,
}

impl Default for DimensionConfig {
    fn default() -> Self {
        Self {
            ns: 3,
            nu: 2,
            nq: WEIGHT_COUNT,
        }
    }
}

/// Obstacle and robot counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Number of other robots tracked
    pub n_other: usize,
    /// Number of static obstacles
    pub n_stc_obs: usize,
    /// Fields per static obstacle (3 per edge)
    pub n_stc_obs_fields: usize,
    /// Number of dynamic obstacles
    pub n_dyn_obs: usize,
    /// Fields per dynamic obstacle and step
    pub n_dyn_obs_fields: usize,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            n_other: 10,
            n_stc_obs: 5,
            n_stc_obs_fields: 27, // up to 9 edges
            n_dyn_obs: 15,
            n_dyn_obs_fields: 6,
        }
    }
}

impl EnvironmentConfig {
    /// Edge slots per static obstacle
    pub fn static_edges(&self) -> usize {
        self.n_stc_obs_fields / 3
    }
}

/// Velocity and acceleration limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionLimits {
    /// Minimum linear velocity [m/s]
    pub lin_vel_min: f64,
    /// Maximum linear velocity [m/s]
    pub lin_vel_max: f64,
    /// Maximum angular speed (symmetric) [rad/s]
    pub ang_vel_max: f64,
    /// Minimum linear acceleration [m/s²]
    pub lin_acc_min: f64,
    /// Maximum linear acceleration [m/s²]
    pub lin_acc_max: f64,
    /// Maximum angular acceleration (symmetric) [rad/s²]
    pub ang_acc_max: f64,
}

impl Default for MotionLimits {
    fn default() -> Self {
        Self {
            lin_vel_min: -0.5,
            lin_vel_max: 1.5,
            ang_vel_max: 0.5,
            lin_acc_min: -1.0,
            lin_acc_max: 1.0,
            ang_acc_max: 3.0,
        }
    }
}

/// Vehicle geometry and safety margins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// Vehicle width [m], also the safe distance to other robots
    pub vehicle_width: f64,
    /// Inflation of dynamic obstacles for the soft cost [m]
    pub social_margin: f64,
    /// Weight of the fleet collision cost
    pub fleet_collision_weight: f64,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            vehicle_width: 0.5,
            social_margin: 0.1,
            fleet_collision_weight: 1000.0,
        }
    }
}

/// Compilation profile of the generated solver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildMode {
    Debug,
    #[default]
    Release,
}

/// Output location and naming of the generated solver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    /// Directory the artifact is written into
    pub build_directory: PathBuf,
    /// Compilation profile
    pub build_mode: BuildMode,
    /// Name of the generated optimizer
    pub optimizer_name: String,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            build_directory: PathBuf::from("mpc_build"),
            build_mode: BuildMode::Release,
            optimizer_name: "navi_test".to_string(),
        }
    }
}

/// Solver tuning handed to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Initial penalty weight
    pub initial_penalty: f64,
    /// Maximum solve duration [µs]
    pub max_duration_micros: u64,
    /// Inner-problem tolerance
    pub tolerance: f64,
    /// Maximum inner iterations per penalty weight
    pub max_inner_iterations: usize,
    /// Maximum outer (penalty update) iterations
    pub max_outer_iterations: usize,
    /// Multiplicative penalty weight update
    pub penalty_weight_update_factor: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            initial_penalty: 10.0,
            max_duration_micros: 5_000_000, // 5 s
            tolerance: 1e-4,
            max_inner_iterations: 500,
            max_outer_iterations: 10,
            penalty_weight_update_factor: 5.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(MpcConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config = MpcConfig::from_toml_str(
            r#"
            [horizon]
            n_hor = 5

            [environment]
            n_stc_obs = 2
            n_stc_obs_fields = 12
            "#,
        )
        .unwrap();

        assert_eq!(config.horizon.n_hor, 5);
        assert_eq!(config.horizon.ts, 0.2);
        assert_eq!(config.environment.n_stc_obs, 2);
        assert_eq!(config.environment.static_edges(), 4);
        assert_eq!(config.environment.n_dyn_obs, 15);
        assert_eq!(config.solver.initial_penalty, 10.0);
    }

    #[test]
    fn test_toml_build_mode() {
        let config = MpcConfig::from_toml_str(
            r#"
            [build]
            build_mode = "debug"
            build_directory = "out"
            "#,
        )
        .unwrap();
        assert_eq!(config.build.build_mode, BuildMode::Debug);
        assert_eq!(config.build.build_directory, PathBuf::from("out"));
        assert_eq!(config.build.optimizer_name, "navi_test");
    }

    #[test]
    fn test_malformed_toml_is_error() {
        assert!(matches!(
            MpcConfig::from_toml_str("[horizon]\nn_hor = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_static_field_width_must_split_into_triples() {
        let mut config = MpcConfig::default();
        config.environment.n_stc_obs_fields = 10;
        assert!(matches!(config.validate(), Err(ConfigError::StaticObstacleFieldWidth(10))));

        // Irrelevant without static obstacles
        config.environment.n_stc_obs = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_dynamic_field_width() {
        let mut config = MpcConfig::default();
        config.environment.n_dyn_obs_fields = 5;
        assert!(matches!(config.validate(), Err(ConfigError::DynamicObstacleFieldWidth(5))));
    }

    #[test]
    fn test_invalid_horizon_and_sampling() {
        let mut config = MpcConfig::default();
        config.horizon.n_hor = 0;
        assert!(matches!(config.validate(), Err(ConfigError::EmptyHorizon)));

        let mut config = MpcConfig::default();
        config.horizon.ts = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSamplingTime(_))));
    }

    #[test]
    fn test_dimension_checks() {
        let mut config = MpcConfig::default();
        config.dimensions.ns = 4;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDimension { name: "state", .. })
        ));

        let mut config = MpcConfig::default();
        config.dimensions.nq = 5;
        assert!(matches!(config.validate(), Err(ConfigError::WeightBlockTooSmall { .. })));
    }

    #[test]
    fn test_inverted_limits() {
        let mut config = MpcConfig::default();
        config.limits.lin_acc_min = 2.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedLimits { name: "linear acceleration", .. })
        ));

        let mut config = MpcConfig::default();
        config.vehicle.social_margin = -0.1;
        assert!(matches!(config.validate(), Err(ConfigError::Negative { .. })));
    }

    #[test]
    fn test_optimizer_name_must_be_identifier() {
        let mut config = MpcConfig::default();
        config.build.optimizer_name = "bad name".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidOptimizerName(_))));
    }

    #[test]
    fn test_horizon_duration() {
        let horizon = HorizonConfig { ts: 0.1, n_hor: 30 };
        assert!((horizon.duration() - 3.0).abs() < 1e-12);
    }
}
