//! Config load error messages, validation, and atomic-write integration tests.

use assert_fs::prelude::*;
use hermes_core::{Config, ConfigError};
use predicates::prelude::*;
use rstest::rstest;

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_config_returns_not_found() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let err = Config::load(&dir.path().join("config.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("config not found"));
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yaml");
    file.write_str(": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = Config::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"), "must contain file path, got: {err}");
}

#[test]
fn load_wrong_type_yaml_returns_parse_error() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yaml");
    file.write_str("- this is a list, not a mapping\n").expect("write");

    let err = Config::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Validation
// ---------------------------------------------------------------------------

#[rstest]
#[case::missing_name("projects:\n  - source_paths: [/a]\n", "project name is required")]
#[case::missing_sources("projects:\n  - name: a\n", "source_paths is required")]
#[case::empty_sources("projects:\n  - name: a\n    source_paths: []\n", "source_paths is required")]
#[case::remote_without_name(
    "projects:\n  - name: a\n    source_paths: [/a]\n    rclone_remotes: [{bucket: b}]\n",
    "rclone_remote name is required"
)]
#[case::remote_without_bucket(
    "projects:\n  - name: a\n    source_paths: [/a]\n    rclone_remotes: [{name: r}]\n",
    "rclone_remote bucket is required"
)]
fn invalid_projects_are_rejected(#[case] yaml: &str, #[case] reason: &str) {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yaml");
    file.write_str(yaml).expect("write");

    let err = Config::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)), "got: {err}");
    assert!(err.to_string().contains(reason), "expected '{reason}', got: {err}");
}

#[test]
fn save_refuses_invalid_config() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let mut config = Config::default();
    config.projects.push(hermes_core::Project::default());
    let err = config.save(&dir.path().join("config.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
    dir.child("config.yaml").assert(predicate::path::missing());
}

// ---------------------------------------------------------------------------
// 3. Atomic write safety
// ---------------------------------------------------------------------------

#[test]
fn save_creates_parent_dirs_and_cleans_up_tmp() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let path = dir.path().join("nested").join("config.yaml");
    Config::default().save(&path).expect("save");

    dir.child("nested/config.yaml").assert(predicate::path::exists());
    dir.child("nested/config.yaml.tmp")
        .assert(predicate::path::missing());
}

#[test]
fn save_overwrites_existing_file() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yaml");
    file.write_str("projects:\n  - {name: old, source_paths: [/data]}\n")
        .expect("write");

    let mut config = Config::load_raw(file.path()).expect("load");
    config.projects[0].name = "new".into();
    config.save(file.path()).expect("save");

    file.assert(predicate::str::contains("new"));
    file.assert(predicate::str::contains("old").not());
}
