//! End-to-end behaviour of the sync steps against a scripted command runner.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use devsync_core::config::{self, EnvConfig, FollowerRule, TaskSpec};
use devsync_core::{CommandOutput, ExecContext, Platform, ProjectConfig, RecordingRunner};
use devsync_sync::bootstrap::{self, BootstrapOutcome};
use devsync_sync::deps::{self, DepsRequest};
use devsync_sync::env_projection::{self, Targets};
use devsync_sync::tasks::{dispatch, TaskTable};
use devsync_sync::template::{sync_template, TemplateRequest};
use devsync_sync::{coupled, versions, HostEnv, Pipeline, SyncError};
use filetime::{set_file_mtime, FileTime};
use rstest::rstest;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn write(root: &Path, relative: &str, content: &str) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(&path, content).expect("write");
    path
}

/// Repo with `uv` pinned and a fake `bin/uv` so lookup never hits PATH.
fn pinned_repo(platform: Platform) -> (TempDir, ProjectConfig) {
    let root = TempDir::new().expect("tempdir");
    let mut cfg = ProjectConfig::default();
    cfg.versions.insert("uv".into(), "0.4.10".into());
    config::save_at(root.path(), &cfg).expect("save config");
    write(root.path(), &format!("bin/{}", platform.exe_name("uv")), "");
    fs::create_dir_all(root.path().join(".git")).expect("git dir");
    (root, cfg)
}

fn count(commands: &[String], needle: &str) -> usize {
    commands.iter().filter(|c| c.as_str() == needle).count()
}

// ---------------------------------------------------------------------------
// Environment projection
// ---------------------------------------------------------------------------

#[test]
fn ci_env_file_is_identical_after_second_projection() {
    init_logging();
    let root = TempDir::new().expect("tempdir");
    write(
        root.path(),
        ".dev/env.json",
        r#"{"PYTHONIOENCODING": "utf-8", "COVERAGE_CORE": "sysmon", "DISABLED": null}"#,
    );
    let github_env = write(root.path(), "runner/github_env", "PREVIOUS_STEP=1\n");

    let context = ExecContext {
        ci: true,
        ..Default::default()
    };
    let targets = Targets {
        process: false,
        editor: false,
        ci_env_file: Some(github_env.clone()),
    };

    let first =
        env_projection::project(root.path(), &EnvConfig::default(), context, &targets, false)
            .expect("first projection");
    assert_eq!(first.exported, "COVERAGE_CORE=sysmon;PYTHONIOENCODING=utf-8");
    let after_first = fs::read_to_string(&github_env).expect("read");

    let second =
        env_projection::project(root.path(), &EnvConfig::default(), context, &targets, false)
            .expect("second projection");
    let after_second = fs::read_to_string(&github_env).expect("read");

    assert_eq!(after_first, after_second);
    assert!(second.ci.expect("ci target").appended.is_empty());
    assert_eq!(
        after_second,
        "PREVIOUS_STEP=1\nCOVERAGE_CORE=sysmon\nPYTHONIOENCODING=utf-8\n"
    );
}

// ---------------------------------------------------------------------------
// Version registry
// ---------------------------------------------------------------------------

const RENOVATE: &str = r#"{
  "customManagers": [
    {
      "customType": "regex",
      "fileMatch": ["^\\.github/workflows/.+\\.yml$", "^scripts/Sync-Py\\.ps1$"],
      "matchStrings": ["uv-version: (?<currentValue>\\S+)", "\\$UvVersion = '(?<currentValue>[^']+)'"],
      "depNameTemplate": "uv"
    }
  ]
}"#;

#[test]
fn bump_to_current_value_reports_zero_changes() {
    let root = TempDir::new().expect("tempdir");
    write(root.path(), "renovate.json", RENOVATE);
    write(root.path(), ".github/workflows/ci.yml", "env:\n  uv-version: 0.4.10\n");
    write(root.path(), "scripts/Sync-Py.ps1", "$UvVersion = '0.4.10'\r\n");

    let rules = versions::load_rules(root.path(), Path::new("renovate.json")).expect("rules");
    let plan = versions::plan_bump(root.path(), &rules, "uv", "0.4.10").expect("plan");
    assert_eq!(plan.occurrences, 2);
    assert!(plan.is_noop());

    let outcome = versions::apply(root.path(), &plan, false).expect("apply");
    assert!(outcome.writes.is_empty());
}

#[test]
fn bump_rewrites_every_copy_and_keeps_crlf() {
    let root = TempDir::new().expect("tempdir");
    write(root.path(), "renovate.json", RENOVATE);
    let ci = write(root.path(), ".github/workflows/ci.yml", "env:\n  uv-version: 0.4.9\n");
    let ps1 = write(root.path(), "scripts/Sync-Py.ps1", "$UvVersion = '0.4.9'\r\n");

    let rules = versions::load_rules(root.path(), Path::new("renovate.json")).expect("rules");
    let plan = versions::plan_bump(root.path(), &rules, "uv", "0.5.0").expect("plan");

    let preview = versions::apply(root.path(), &plan, true).expect("dry run");
    assert_eq!(preview.diffs.len(), 2);
    assert!(fs::read_to_string(&ci).expect("read").contains("0.4.9"));

    versions::apply(root.path(), &plan, false).expect("apply");
    assert_eq!(fs::read_to_string(&ci).expect("read"), "env:\n  uv-version: 0.5.0\n");
    assert_eq!(fs::read_to_string(&ps1).expect("read"), "$UvVersion = '0.5.0'\r\n");

    let occurrences = versions::find_occurrences(root.path(), &rules).expect("find");
    let pins = [("uv".to_string(), "0.5.0".to_string())].into();
    assert!(versions::check(&occurrences, &pins).is_empty());
}

#[test]
fn rule_matching_nothing_is_config_drift() {
    let root = TempDir::new().expect("tempdir");
    write(root.path(), "renovate.json", RENOVATE);
    write(root.path(), ".github/workflows/ci.yml", "env:\n  python-version: 3.11\n");

    let rules = versions::load_rules(root.path(), Path::new("renovate.json")).expect("rules");
    let err = versions::plan_bump(root.path(), &rules, "uv", "0.5.0").unwrap_err();
    assert!(matches!(err, SyncError::ConfigDrift { .. }), "got {err}");
}

#[test]
fn renamed_script_variable_is_config_drift() {
    let root = TempDir::new().expect("tempdir");
    write(root.path(), "renovate.json", RENOVATE);
    let ci = write(root.path(), ".github/workflows/ci.yml", "env:\n  uv-version: 0.4.9\n");
    write(root.path(), "scripts/Sync-Py.ps1", "$UV_VERSION = '0.4.9'\r\n");

    let rules = versions::load_rules(root.path(), Path::new("renovate.json")).expect("rules");
    let err = versions::plan_bump(root.path(), &rules, "uv", "0.5.0").unwrap_err();
    match err {
        SyncError::ConfigDrift { tool, pattern } => {
            assert_eq!(tool, "uv");
            assert!(pattern.contains("UvVersion"), "got {pattern}");
        }
        other => panic!("expected config drift, got {other}"),
    }
    assert!(fs::read_to_string(&ci).expect("read").contains("0.4.9"));
}

// ---------------------------------------------------------------------------
// Template sync
// ---------------------------------------------------------------------------

#[rstest]
#[case(false, false, "copier update --defaults --vcs-ref v2.0.0")]
#[case(false, true, "copier update --vcs-ref v2.0.0")]
#[case(true, false, "copier recopy --overwrite --defaults")]
#[case(true, true, "copier recopy --overwrite --vcs-ref v2.0.0")]
fn template_mode_selects_exactly_one_command(
    #[case] recopy: bool,
    #[case] prompt: bool,
    #[case] expected: &str,
) {
    let root = TempDir::new().expect("tempdir");
    let runner = RecordingRunner::new();
    let request = TemplateRequest {
        vcs_ref: Some("v2.0.0".into()),
        prompt,
        recopy,
        ..Default::default()
    };
    let outcome = sync_template(root.path(), &Default::default(), &request, &runner).expect("sync");
    assert_eq!(runner.commands(), vec![expected.to_string()]);
    assert!(!outcome.recovered);
}

#[test]
fn stay_mode_uses_recorded_commit_hash() {
    let root = TempDir::new().expect("tempdir");
    write(
        root.path(),
        ".copier-answers.yml",
        "_commit: v1.4.0-7-gabc1234\n_src_path: gh:org/template\n",
    );
    let runner = RecordingRunner::new();
    let request = TemplateRequest {
        vcs_ref: Some("ignored".into()),
        stay: true,
        ..Default::default()
    };
    let outcome = sync_template(root.path(), &Default::default(), &request, &runner).expect("sync");
    assert_eq!(outcome.vcs_ref, "abc1234");
    assert_eq!(
        runner.commands(),
        vec!["copier update --defaults --vcs-ref abc1234"]
    );
}

#[test]
fn failed_update_is_retried_once_with_stash_restored() {
    init_logging();
    let root = TempDir::new().expect("tempdir");
    let runner = RecordingRunner::new()
        .on("copier update", CommandOutput::failed(1))
        .on("copier update", CommandOutput::ok(""))
        .on("git status --porcelain", CommandOutput::ok(" M README.md\n"));

    let outcome = sync_template(
        root.path(),
        &Default::default(),
        &TemplateRequest::default(),
        &runner,
    )
    .expect("recovered");

    assert!(outcome.recovered);
    assert_eq!(
        runner.commands(),
        vec![
            "copier update --defaults --vcs-ref HEAD",
            "git status --porcelain",
            "git stash save",
            "copier update --defaults --vcs-ref HEAD",
            "git stash pop",
        ]
    );
}

#[test]
fn failed_retry_is_reraised_after_restoring_stash() {
    let root = TempDir::new().expect("tempdir");
    let runner = RecordingRunner::new()
        .on("copier update", CommandOutput::failed(2))
        .on("git status --porcelain", CommandOutput::ok("?? new.txt\n"));

    let err = sync_template(
        root.path(),
        &Default::default(),
        &TemplateRequest::default(),
        &runner,
    )
    .unwrap_err();

    assert_eq!(err.exit_code(), Some(2));
    let commands = runner.commands();
    assert_eq!(count(&commands, "copier update --defaults --vcs-ref HEAD"), 2);
    assert_eq!(commands.last().map(String::as_str), Some("git stash pop"));
}

#[test]
fn changed_tree_is_committed_with_ref_in_message() {
    let root = TempDir::new().expect("tempdir");
    let runner =
        RecordingRunner::new().on("git status --porcelain", CommandOutput::ok(" M pyproject.toml\n"));
    let request = TemplateRequest {
        vcs_ref: Some("v2.0.0".into()),
        commit: true,
        ..Default::default()
    };
    let outcome = sync_template(root.path(), &Default::default(), &request, &runner).expect("sync");
    assert!(outcome.committed);
    assert_eq!(
        runner.commands()[2..],
        [
            "git add --all".to_string(),
            "git commit --no-verify -m \"Sync with template at v2.0.0\"".to_string(),
        ]
    );
}

#[test]
fn clean_tree_is_not_committed() {
    let root = TempDir::new().expect("tempdir");
    let runner = RecordingRunner::new();
    let request = TemplateRequest {
        commit: true,
        ..Default::default()
    };
    let outcome = sync_template(root.path(), &Default::default(), &request, &runner).expect("sync");
    assert!(!outcome.committed);
    assert!(!runner.commands().iter().any(|c| c.starts_with("git commit")));
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

#[test]
fn pinned_binary_skips_installer() {
    let (root, cfg) = pinned_repo(Platform::Linux);
    let runner =
        RecordingRunner::new().on("uv --version", CommandOutput::ok("uv 0.4.10 (b3b3ae1 2024-09-12)\n"));

    let outcome =
        bootstrap::ensure(root.path(), &cfg, &runner, Platform::Linux, false).expect("ensure");
    assert!(matches!(outcome, BootstrapOutcome::AlreadyPinned { .. }));
    assert_eq!(runner.commands(), vec!["uv --version"]);
}

#[test]
fn mismatched_binary_runs_installer_and_reverifies() {
    let (root, cfg) = pinned_repo(Platform::Linux);
    let runner = RecordingRunner::new()
        .on("uv --version", CommandOutput::ok("uv 0.4.9\n"))
        .on("uv --version", CommandOutput::ok("uv 0.4.10\n"));

    let outcome =
        bootstrap::ensure(root.path(), &cfg, &runner, Platform::Linux, false).expect("ensure");
    assert_eq!(
        outcome,
        BootstrapOutcome::Installed {
            previous: Some("0.4.9".into()),
            version: "0.4.10".into(),
            program: root.path().join("bin").join("uv").to_string_lossy().into_owned(),
        }
    );
    let calls = runner.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[1].program, "sh");
    assert!(calls[1].args[1].contains("https://astral.sh/uv/0.4.10/install.sh"));
    assert_eq!(calls[1].env[0].0, bootstrap::INSTALL_DIR_VAR);
}

#[test]
fn still_wrong_after_install_is_an_error() {
    let (root, cfg) = pinned_repo(Platform::Linux);
    let runner = RecordingRunner::new().on("uv --version", CommandOutput::ok("uv 0.4.9\n"));
    let err = bootstrap::ensure(root.path(), &cfg, &runner, Platform::Linux, false).unwrap_err();
    assert!(matches!(err, SyncError::VersionMismatch { .. }), "got {err}");
}

#[test]
fn installer_failure_is_fatal_and_not_retried() {
    let (root, cfg) = pinned_repo(Platform::Linux);
    let runner = RecordingRunner::new()
        .missing("uv --version")
        .on("sh -c", CommandOutput::failed(22));
    let err = bootstrap::ensure(root.path(), &cfg, &runner, Platform::Linux, false).unwrap_err();
    assert_eq!(err.exit_code(), Some(22));
    assert_eq!(runner.commands().len(), 2);
}

// ---------------------------------------------------------------------------
// Dependency sync
// ---------------------------------------------------------------------------

fn deps_request<'a>(root: &'a Path, cfg: &'a ProjectConfig, high: bool) -> DepsRequest<'a> {
    DepsRequest {
        root,
        config: cfg,
        context: ExecContext::default(),
        high,
        uv: "uv".into(),
        editor: None,
        extensions_dir: None,
        extra_args: Vec::new(),
        dry_run: false,
    }
}

#[rstest]
#[case(false, "uv sync")]
#[case(true, "uv sync --upgrade")]
fn high_mode_passes_upgrade(#[case] high: bool, #[case] expected: &str) {
    let root = TempDir::new().expect("tempdir");
    let cfg = ProjectConfig::default();
    let runner = RecordingRunner::new();
    deps::sync_dependencies(&deps_request(root.path(), &cfg, high), &runner).expect("sync");
    assert_eq!(runner.commands(), vec![expected.to_string()]);
}

#[test]
fn forced_high_from_environment_also_upgrades() {
    let root = TempDir::new().expect("tempdir");
    let cfg = ProjectConfig::default();
    let runner = RecordingRunner::new();
    let mut request = deps_request(root.path(), &cfg, false);
    request.context.force_high = true;
    deps::sync_dependencies(&request, &runner).expect("sync");
    assert_eq!(runner.commands(), vec!["uv sync --upgrade"]);
}

#[test]
fn extensions_installed_then_stubs_stripped() {
    let root = TempDir::new().expect("tempdir");
    let ext_dir = TempDir::new().expect("extensions");
    let stubs = ext_dir
        .path()
        .join("ms-python.vscode-pylance-2024.9.1/dist/bundled/stubs");
    fs::create_dir_all(&stubs).expect("stubs");

    let mut cfg = ProjectConfig::default();
    cfg.deps.extensions = vec!["ms-python.vscode-pylance".into(), "charliermarsh.ruff".into()];
    cfg.deps.lock_artifact = Some(PathBuf::from("requirements.lock"));
    let runner = RecordingRunner::new().on(
        "code --list-extensions",
        CommandOutput::ok("charliermarsh.ruff\n"),
    );

    let mut request = deps_request(root.path(), &cfg, false);
    request.editor = Some("code".into());
    request.extensions_dir = Some(ext_dir.path().to_path_buf());
    let report = deps::sync_dependencies(&request, &runner).expect("sync");

    assert_eq!(report.installed_extensions, vec!["ms-python.vscode-pylance"]);
    assert_eq!(report.stripped_stubs, vec![stubs.clone()]);
    assert!(!stubs.exists());
    assert_eq!(
        runner.commands(),
        vec![
            "code --list-extensions",
            "code --install-extension ms-python.vscode-pylance",
            "uv sync",
            "uv export --frozen --no-hashes --output-file requirements.lock",
        ]
    );
}

#[test]
fn ci_skips_extensions_and_hooks() {
    let root = TempDir::new().expect("tempdir");
    let mut cfg = ProjectConfig::default();
    cfg.deps.extensions = vec!["charliermarsh.ruff".into()];
    let runner = RecordingRunner::new();
    let mut request = deps_request(root.path(), &cfg, false);
    request.context.ci = true;
    request.editor = Some("code".into());

    deps::sync_dependencies(&request, &runner).expect("sync");
    let installed =
        deps::install_hooks(root.path(), &cfg, request.context, &runner).expect("hooks");
    assert!(!installed);
    assert_eq!(runner.commands(), vec!["uv sync"]);
}

#[test]
fn hooks_installed_only_when_missing() {
    let root = TempDir::new().expect("tempdir");
    let cfg = ProjectConfig::default();
    let runner = RecordingRunner::new();
    assert!(deps::install_hooks(root.path(), &cfg, ExecContext::default(), &runner).expect("first"));
    write(root.path(), ".git/hooks/pre-commit", "#!/bin/sh\n");
    assert!(!deps::install_hooks(root.path(), &cfg, ExecContext::default(), &runner).expect("second"));
    assert_eq!(runner.commands(), vec!["pre-commit install --install-hooks"]);
}

// ---------------------------------------------------------------------------
// Coupled pins
// ---------------------------------------------------------------------------

#[test]
fn follower_pins_track_leader_and_untouched_files_keep_mtime() {
    let root = TempDir::new().expect("tempdir");
    let pyproject = write(
        root.path(),
        "pyproject.toml",
        "[project]\ndependencies = [\n  \"pandas==2.2.2\",\n  \"pandas-stubs==2.1.0\",\n]\n",
    );
    let untouched = write(
        root.path(),
        ".tools/requirements/requirements_dev.txt",
        "pytest==8.3.2\n",
    );
    let old = FileTime::from_system_time(SystemTime::now() - Duration::from_secs(3600));
    set_file_mtime(&untouched, old).expect("mtime");

    let mut cfg = ProjectConfig::default();
    cfg.coupled.followers = vec![FollowerRule {
        leader: "pandas".into(),
        follower: "pandas-stubs".into(),
    }];
    let outcome = coupled::couple(root.path(), &cfg.coupled, &[], false).expect("couple");

    assert_eq!(outcome.writes.len(), 1);
    assert!(fs::read_to_string(&pyproject)
        .expect("read")
        .contains("\"pandas-stubs==2.2.2\","));
    let mtime = FileTime::from_last_modification_time(&fs::metadata(&untouched).expect("meta"));
    assert_eq!(mtime, old);
}

// ---------------------------------------------------------------------------
// Pipeline and tasks
// ---------------------------------------------------------------------------

#[test]
fn sync_chain_runs_steps_in_order() {
    init_logging();
    let platform = Platform::current();
    let (root, cfg) = pinned_repo(platform);
    write(
        root.path(),
        ".dev/env.json",
        r#"{"DEVSYNC_PIPELINE_TEST_VAR": "on"}"#,
    );
    let runner = RecordingRunner::new().on("uv --version", CommandOutput::ok("uv 0.4.10\n"));

    let mut pipeline = Pipeline::new(
        root.path().to_path_buf(),
        cfg,
        ExecContext::default(),
        &runner,
    )
    .with_host(HostEnv::default());
    let report = pipeline.run(&[]).expect("sync");

    assert_eq!(
        runner.commands(),
        vec!["uv --version", "uv sync", "pre-commit install --install-hooks"]
    );
    assert!(report.hooks_installed);
    assert_eq!(report.env.exported, "DEVSYNC_PIPELINE_TEST_VAR=on");
    assert_eq!(
        std::env::var("DEVSYNC_PIPELINE_TEST_VAR").as_deref(),
        Ok("on")
    );
    assert!(root.path().join(".vscode/settings.json").exists());
}

#[test]
fn shared_prerequisites_run_once() {
    let platform = Platform::current();
    let (root, mut cfg) = pinned_repo(platform);
    cfg.tasks.insert(
        "check".into(),
        TaskSpec {
            run: vec!["uv".into(), "run".into(), "ruff".into(), "check".into()],
            deps: vec!["docs".into(), "pytest".into()],
            ..Default::default()
        },
    );
    let runner = RecordingRunner::new().on("uv --version", CommandOutput::ok("uv 0.4.10\n"));
    let table = TaskTable::from_config(&cfg.tasks);
    let mut pipeline =
        Pipeline::new(root.path().to_path_buf(), cfg, ExecContext::default(), &runner);

    let ran = dispatch(&table, "check", &[], root.path(), &runner, &mut pipeline).expect("run");
    let ran: Vec<String> = ran.into_iter().map(|t| t.0).collect();
    assert_eq!(
        ran,
        vec!["project-env", "bootstrap", "sync", "docs", "pytest", "check"]
    );

    let commands = runner.commands();
    assert_eq!(count(&commands, "uv sync"), 1);
    assert_eq!(count(&commands, "uv --version"), 1);
    assert_eq!(commands.last().map(String::as_str), Some("uv run ruff check"));
}
