//! Build dispatch
//!
//! [`build_mpc`] turns a validated [`MpcConfig`] and a [`MotionModel`] into
//! a compiled [`Problem`] and hands it to an [`OptimizerBackend`] together
//! with an immutable [`BuildSpec`]. Code generation and compilation belong
//! to the backend; this module's contract ends at a well-formed problem.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use navi_core::MotionModel;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{BuildMode, ConfigError, MpcConfig, SolverConfig};
use crate::problem::{Problem, ProblemError};

/// File name of the problem manifest inside the artifact directory
pub const MANIFEST_FILE: &str = "problem.json";

/// Backend errors
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Backend rejected the problem: {0}")]
    Rejected(String),
}

/// Build errors
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Problem assembly failed: {0}")]
    Problem(#[from] ProblemError),
    #[error("Backend failed: {0}")]
    Backend(#[from] BackendError),
}

/// How the generated solver is exposed
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InterfaceMode {
    /// Library linked into the caller
    #[default]
    Bindings,
    /// Solver served over a TCP socket
    Tcp { host: String, port: u16 },
}

impl InterfaceMode {
    pub const DEFAULT_HOST: &'static str = "127.0.0.1";
    pub const DEFAULT_PORT: u16 = 8333;

    /// TCP server on the default local address
    pub fn tcp() -> Self {
        InterfaceMode::Tcp {
            host: Self::DEFAULT_HOST.to_string(),
            port: Self::DEFAULT_PORT,
        }
    }
}

/// Identity of the generated optimizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerMeta {
    pub optimizer_name: String,
    pub version: String,
}

/// Where and how the optimizer is built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    pub build_directory: PathBuf,
    pub build_mode: BuildMode,
    pub interface: InterfaceMode,
}

/// Everything a backend needs besides the problem itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSpec {
    pub meta: OptimizerMeta,
    pub build: BuildConfig,
    pub solver: SolverConfig,
}

impl BuildSpec {
    pub fn from_config(config: &MpcConfig, interface: InterfaceMode) -> Self {
        Self {
            meta: OptimizerMeta {
                optimizer_name: config.build.optimizer_name.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            build: BuildConfig {
                build_directory: config.build.build_directory.clone(),
                build_mode: config.build.build_mode,
                interface,
            },
            solver: config.solver.clone(),
        }
    }

    /// `<build_directory>/<optimizer_name>`
    pub fn artifact_directory(&self) -> PathBuf {
        self.build.build_directory.join(&self.meta.optimizer_name)
    }
}

/// Output of a successful build
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub optimizer_name: String,
    pub directory: PathBuf,
    /// Main file written by the backend
    pub manifest: PathBuf,
    pub n_decision: usize,
    pub n_parameter: usize,
}

/// Turns a compiled problem into a solver artifact
pub trait OptimizerBackend {
    fn build(&self, problem: &Problem, spec: &BuildSpec) -> Result<Artifact, BackendError>;
}

#[derive(Serialize)]
struct Manifest<'a> {
    meta: &'a OptimizerMeta,
    build: &'a BuildConfig,
    solver: &'a SolverConfig,
    n_decision: usize,
    n_parameter: usize,
    problem: &'a Problem,
}

/// Writes the problem description as JSON for an external code generator
///
/// Output: `<build_directory>/<optimizer_name>/problem.json`. The file is
/// written beside its final path and renamed into place, so a failed write
/// never leaves a truncated manifest behind.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestBackend;

impl OptimizerBackend for ManifestBackend {
    fn build(&self, problem: &Problem, spec: &BuildSpec) -> Result<Artifact, BackendError> {
        let directory = spec.artifact_directory();
        let manifest_path = directory.join(MANIFEST_FILE);

        fs::create_dir_all(&directory).map_err(|source| BackendError::Io {
            path: directory.clone(),
            source,
        })?;
        if manifest_path.exists() {
            warn!(path = ?manifest_path, "replacing existing solver artifact");
        }

        let manifest = Manifest {
            meta: &spec.meta,
            build: &spec.build,
            solver: &spec.solver,
            n_decision: problem.n_decision(),
            n_parameter: problem.n_parameter(),
            problem,
        };
        let json = serde_json::to_string_pretty(&manifest)?;

        let io_error = |source: io::Error| BackendError::Io {
            path: manifest_path.clone(),
            source,
        };
        let mut staged = NamedTempFile::new_in(&directory).map_err(io_error)?;
        staged.write_all(json.as_bytes()).map_err(io_error)?;
        staged
            .persist(&manifest_path)
            .map_err(|err| io_error(err.error))?;
        debug!(path = ?manifest_path, bytes = json.len(), "manifest written");

        Ok(Artifact {
            optimizer_name: spec.meta.optimizer_name.clone(),
            directory,
            manifest: manifest_path,
            n_decision: problem.n_decision(),
            n_parameter: problem.n_parameter(),
        })
    }
}

/// Build the MPC solver for `config` with `backend`
pub fn build_mpc<M, B>(
    config: &MpcConfig,
    model: &M,
    interface: InterfaceMode,
    backend: &B,
) -> Result<Artifact, BuildError>
where
    M: MotionModel,
    B: OptimizerBackend + ?Sized,
{
    config.validate()?;
    let spec = BuildSpec::from_config(config, interface);

    info!(
        optimizer = %spec.meta.optimizer_name,
        interface = ?spec.build.interface,
        "building MPC problem"
    );

    let problem = Problem::new(config, model)?;
    debug!(
        n_decision = problem.n_decision(),
        n_parameter = problem.n_parameter(),
        cost_instructions = problem.cost().tape.instructions.len(),
        f1 = problem.acceleration().n_outputs(),
        f2 = problem.penalty().n_outputs(),
        "problem compiled"
    );

    let artifact = backend.build(&problem, &spec)?;
    info!(
        optimizer = %artifact.optimizer_name,
        n_decision = artifact.n_decision,
        n_parameter = artifact.n_parameter,
        path = ?artifact.manifest,
        "MPC solver artifact ready"
    );
    Ok(artifact)
}

/// Single-use builder over a validated configuration
///
/// [`MpcBuilder::build`] consumes the builder; construct a new one per
/// problem variant.
#[derive(Debug, Clone)]
pub struct MpcBuilder {
    config: MpcConfig,
}

impl MpcBuilder {
    pub fn new(config: MpcConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &MpcConfig {
        &self.config
    }

    pub fn build<M, B>(
        self,
        model: &M,
        interface: InterfaceMode,
        backend: &B,
    ) -> Result<Artifact, BuildError>
    where
        M: MotionModel,
        B: OptimizerBackend + ?Sized,
    {
        build_mpc(&self.config, model, interface, backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navi_core::UnicycleModel;

    struct FailingBackend;

    impl OptimizerBackend for FailingBackend {
        fn build(&self, _problem: &Problem, _spec: &BuildSpec) -> Result<Artifact, BackendError> {
            Err(BackendError::Rejected("compiler missing".to_string()))
        }
    }

    fn small_config() -> MpcConfig {
        let mut config = MpcConfig::default();
        config.horizon.n_hor = 2;
        config.environment.n_other = 1;
        config.environment.n_stc_obs = 1;
        config.environment.n_dyn_obs = 1;
        config
    }

    #[test]
    fn test_interface_defaults() {
        assert_eq!(InterfaceMode::default(), InterfaceMode::Bindings);
        assert_eq!(
            InterfaceMode::tcp(),
            InterfaceMode::Tcp { host: "127.0.0.1".to_string(), port: 8333 }
        );
    }

    #[test]
    fn test_spec_from_config() {
        let config = small_config();
        let spec = BuildSpec::from_config(&config, InterfaceMode::tcp());
        assert_eq!(spec.meta.optimizer_name, "navi_test");
        assert_eq!(spec.build.build_mode, BuildMode::Release);
        assert_eq!(spec.solver, config.solver);
        assert_eq!(
            spec.artifact_directory(),
            PathBuf::from("mpc_build").join("navi_test")
        );
    }

    #[test]
    fn test_backend_failure_is_fatal() {
        let result = build_mpc(
            &small_config(),
            &UnicycleModel::default(),
            InterfaceMode::Bindings,
            &FailingBackend,
        );
        assert!(matches!(result, Err(BuildError::Backend(BackendError::Rejected(_)))));
    }

    #[test]
    fn test_invalid_config_fails_before_backend() {
        let mut config = small_config();
        config.environment.n_stc_obs_fields = 10;
        assert!(MpcBuilder::new(config.clone()).is_err());

        let result = build_mpc(
            &config,
            &UnicycleModel::default(),
            InterfaceMode::Bindings,
            &FailingBackend,
        );
        assert!(matches!(
            result,
            Err(BuildError::Config(ConfigError::StaticObstacleFieldWidth(_)))
        ));
    }
}
