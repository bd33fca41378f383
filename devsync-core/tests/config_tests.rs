//! Config and answers error-message and layout integration tests.

use assert_fs::prelude::*;
use devsync_core::{answers, config, CoreError};
use predicates::prelude::predicate;
use std::path::Path;

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn corrupt_config_returns_parse_error_with_path() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child("devsync.yaml")
        .write_str("versions: [unclosed\n  - : :")
        .expect("write");

    let err = config::load_at(root.path()).unwrap_err();
    assert!(matches!(err, CoreError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("devsync.yaml"));
}

#[test]
fn wrong_type_config_returns_parse_error() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child("devsync.yaml")
        .write_str("deps:\n  hooks: [1, 2]\n")
        .expect("write");

    let err = config::load_at(root.path()).unwrap_err();
    assert!(matches!(err, CoreError::Parse { .. }), "got: {err}");
}

#[test]
fn empty_config_file_is_defaults() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child("devsync.yaml").write_str("\n").expect("write");
    let loaded = config::load_at(root.path()).expect("load");
    assert_eq!(loaded, config::ProjectConfig::default());
}

// ---------------------------------------------------------------------------
// 2. Save
// ---------------------------------------------------------------------------

#[test]
fn save_writes_yaml_with_pins() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let mut cfg = config::ProjectConfig::default();
    cfg.versions.insert("uv".into(), "0.4.10".into());
    config::save_at(root.path(), &cfg).expect("save");

    root.child("devsync.yaml")
        .assert(predicate::str::contains("uv: 0.4.10"));
    root.child("devsync.yaml.tmp").assert(predicate::path::missing());
}

#[test]
fn tasks_section_parses_steps_and_commands() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child("devsync.yaml")
        .write_str(
            "tasks:\n  notebooks:\n    run: [uv, run, jupyter, lab]\n    deps: [sync]\n  env:\n    step: project-env\n",
        )
        .expect("write");
    let cfg = config::load_at(root.path()).expect("load");
    assert_eq!(cfg.tasks["notebooks"].run, vec!["uv", "run", "jupyter", "lab"]);
    assert_eq!(cfg.tasks["notebooks"].deps, vec!["sync"]);
    assert_eq!(
        cfg.tasks["env"].step,
        Some(devsync_core::BuiltinStep::ProjectEnv)
    );
}

// ---------------------------------------------------------------------------
// 3. Answers file
// ---------------------------------------------------------------------------

#[test]
fn missing_answers_file_is_io_error_with_path() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let err = answers::load_at(root.path(), Path::new(".copier-answers.yml")).unwrap_err();
    assert!(matches!(err, CoreError::Io { .. }), "got: {err}");
    assert!(err.to_string().contains(".copier-answers.yml"));
}

#[test]
fn answers_load_from_root() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child(".copier-answers.yml")
        .write_str("_commit: v0.1.0-3-gdeadbeef\n_src_path: gh:org/template\n")
        .expect("write");
    let parsed = answers::load_at(root.path(), Path::new(".copier-answers.yml")).expect("load");
    assert_eq!(parsed.commit_hash().expect("hash"), "deadbeef");
}
