//! Build dispatch and configuration loading

use std::fs;
use std::path::{Path, PathBuf};

use navi_core::UnicycleModel;
use navi_planner::builder::MANIFEST_FILE;
use navi_planner::config::MpcConfig;
use navi_planner::{
    build_mpc, BuildError, InterfaceMode, ManifestBackend, MpcBuilder, ParameterLayout,
};

fn small_config(build_directory: &Path) -> MpcConfig {
    let mut config = MpcConfig::default();
    config.horizon.n_hor = 4;
    config.environment.n_other = 1;
    config.environment.n_stc_obs = 1;
    config.environment.n_stc_obs_fields = 12;
    config.environment.n_dyn_obs = 2;
    config.build.build_directory = build_directory.to_path_buf();
    config.build.optimizer_name = "navi_manifest".to_string();
    config
}

mod manifest_tests {
    use super::*;

    #[test]
    fn test_manifest_written() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(dir.path());

        let artifact = MpcBuilder::new(config.clone())
            .unwrap()
            .build(&UnicycleModel::default(), InterfaceMode::tcp(), &ManifestBackend)
            .unwrap();

        let expected = dir.path().join("navi_manifest").join(MANIFEST_FILE);
        assert_eq!(artifact.manifest, expected);
        assert_eq!(artifact.n_decision, 8);
        assert_eq!(artifact.n_parameter, ParameterLayout::new(&config).len());

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&expected).unwrap()).unwrap();
        assert_eq!(json["meta"]["optimizer_name"], "navi_manifest");
        assert_eq!(json["build"]["build_mode"], "release");
        assert_eq!(json["build"]["interface"]["kind"], "tcp");
        assert_eq!(json["build"]["interface"]["port"], 8333);
        assert_eq!(json["solver"]["initial_penalty"], 10.0);
        assert_eq!(json["solver"]["max_duration_micros"], 5_000_000);
        assert_eq!(json["n_decision"], 8);
        let penalties = json["problem"]["penalty"]["tape"]["outputs"].as_array().unwrap();
        assert_eq!(penalties.len(), 4 * 3);
        let lower = json["problem"]["acceleration_bounds"]["lower"].as_array().unwrap();
        assert_eq!(lower.len(), 8);
    }

    #[test]
    fn test_manifest_is_deterministic() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let model = UnicycleModel::default();

        let read = |dir: &Path| -> String {
            let config = small_config(dir);
            let artifact =
                build_mpc(&config, &model, InterfaceMode::Bindings, &ManifestBackend).unwrap();
            fs::read_to_string(artifact.manifest).unwrap()
        };

        let a = read(first.path());
        let b = read(second.path());
        // Only the build directory differs between the two manifests
        let a = a.replace(&first.path().display().to_string(), "<dir>");
        let b = b.replace(&second.path().display().to_string(), "<dir>");
        assert_eq!(a, b);
    }

    #[test]
    fn test_rebuild_replaces_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let model = UnicycleModel::default();

        let mut config = small_config(dir.path());
        build_mpc(&config, &model, InterfaceMode::Bindings, &ManifestBackend).unwrap();
        config.horizon.n_hor = 2;
        let artifact =
            build_mpc(&config, &model, InterfaceMode::Bindings, &ManifestBackend).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(artifact.manifest).unwrap()).unwrap();
        assert_eq!(json["n_decision"], 4);
    }

    #[test]
    fn test_no_staging_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let model = UnicycleModel::default();
        let config = small_config(dir.path());

        build_mpc(&config, &model, InterfaceMode::Bindings, &ManifestBackend).unwrap();
        let artifact =
            build_mpc(&config, &model, InterfaceMode::Bindings, &ManifestBackend).unwrap();

        let entries: Vec<_> = fs::read_dir(&artifact.directory)
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from(MANIFEST_FILE)]);
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&artifact.manifest).unwrap()).unwrap();
        assert_eq!(json["meta"]["optimizer_name"], "navi_manifest");
    }

    #[test]
    fn test_unwritable_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let config = small_config(&blocker);
        let result = build_mpc(
            &config,
            &UnicycleModel::default(),
            InterfaceMode::Bindings,
            &ManifestBackend,
        );
        assert!(matches!(result, Err(BuildError::Backend(_))));
    }
}

mod config_file_tests {
    use super::*;

    fn default_config_path() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/navi_default.toml")
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let config = MpcConfig::from_toml_file(default_config_path()).unwrap();
        assert_eq!(config, MpcConfig::default());
        assert!(config.validate().is_ok());
        assert_eq!(ParameterLayout::new(&config).len(), 2673);
    }

    #[test]
    fn test_missing_file() {
        let result = MpcConfig::from_toml_file("does/not/exist.toml");
        assert!(matches!(result, Err(navi_planner::config::ConfigError::Io { .. })));
    }
}
