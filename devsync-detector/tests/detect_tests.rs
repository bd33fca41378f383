//! Parameterised detection tests for `devsync-detector`.
//!
//! Environment lookups are injected; nothing reads the real process env.

use std::collections::{BTreeSet, HashMap};
use std::fs;

use devsync_core::{CommandOutput, Platform, RecordingRunner};
use devsync_detector::{
    detect_context_from, detect_tool_version, installed_extensions, is_truthy, locate_tool,
    missing_extensions, parse_tool_version,
};
use rstest::rstest;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helper
// ---------------------------------------------------------------------------

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

// ---------------------------------------------------------------------------
// Execution context
// ---------------------------------------------------------------------------

#[rstest]
#[case(&[], false, false)]
#[case(&[("CI", "true")], true, false)]
#[case(&[("CI", "1")], true, false)]
#[case(&[("CI", "false")], false, false)]
#[case(&[("CI", "")], false, false)]
#[case(&[("DEVCONTAINER", "true")], false, true)]
#[case(&[("CODESPACES", "true")], false, true)]
#[case(&[("REMOTE_CONTAINERS", "true"), ("CI", "true")], true, true)]
#[case(&[("CI", "true"), ("DEVSYNC_NO_CI", "1")], false, false)]
#[case(&[("DEVCONTAINER", "1"), ("DEVSYNC_NO_DEVCONTAINER", "yes")], false, false)]
fn context_detection(#[case] vars: &[(&str, &str)], #[case] ci: bool, #[case] devcontainer: bool) {
    let ctx = detect_context_from(env(vars));
    assert_eq!(ctx.ci, ci);
    assert_eq!(ctx.devcontainer, devcontainer);
}

#[test]
fn force_high_flag() {
    assert!(detect_context_from(env(&[("DEVSYNC_HIGH", "1")])).force_high);
    assert!(!detect_context_from(env(&[("DEVSYNC_HIGH", "0")])).force_high);
}

#[rstest]
#[case("1", true)]
#[case("TRUE", true)]
#[case("anything", true)]
#[case("0", false)]
#[case("False", false)]
#[case("no", false)]
#[case("off", false)]
#[case("  ", false)]
fn truthiness(#[case] value: &str, #[case] expected: bool) {
    assert_eq!(is_truthy(value), expected);
}

// ---------------------------------------------------------------------------
// Version parsing
// ---------------------------------------------------------------------------

#[rstest]
#[case("uv 0.4.10 (b3b3ae1 2024-09-12)", Some("0.4.10"))]
#[case("uv 0.4.10\n", Some("0.4.10"))]
#[case("Python 3.11.9", Some("3.11.9"))]
#[case("just 1.34.0", Some("1.34.0"))]
#[case("v2.1.0", Some("2.1.0"))]
#[case("\n\ncopier 9.3.1", Some("9.3.1"))]
#[case("no version here", None)]
#[case("", None)]
fn version_parsing(#[case] output: &str, #[case] expected: Option<&str>) {
    assert_eq!(parse_tool_version(output).as_deref(), expected);
}

#[test]
fn detect_version_through_runner() {
    let runner = RecordingRunner::new().on("uv --version", CommandOutput::ok("uv 0.4.10\n"));
    let version = detect_tool_version(&runner, "uv").expect("detect");
    assert_eq!(version.as_deref(), Some("0.4.10"));
    assert_eq!(runner.commands(), vec!["uv --version"]);
}

#[test]
fn detect_version_of_missing_tool_is_none() {
    let runner = RecordingRunner::new().missing("uv --version");
    assert_eq!(detect_tool_version(&runner, "uv").expect("detect"), None);
}

#[test]
fn detect_version_of_failing_tool_is_none() {
    let runner = RecordingRunner::new().on("uv --version", CommandOutput::failed(2));
    assert_eq!(detect_tool_version(&runner, "uv").expect("detect"), None);
}

// ---------------------------------------------------------------------------
// Tool location
// ---------------------------------------------------------------------------

#[test]
fn locate_prefers_install_dir() {
    let dir = TempDir::new().expect("tempdir");
    let platform = Platform::current();
    let binary = dir.path().join(platform.exe_name("uv"));
    fs::write(&binary, "").expect("write fake binary");
    assert_eq!(locate_tool(dir.path(), platform, "uv"), Some(binary));
}

#[test]
fn locate_unknown_tool_is_none() {
    let dir = TempDir::new().expect("tempdir");
    assert_eq!(
        locate_tool(dir.path(), Platform::current(), "devsync-no-such-tool"),
        None
    );
}

// ---------------------------------------------------------------------------
// Editor extensions
// ---------------------------------------------------------------------------

#[test]
fn extensions_are_lowercased_and_diffed() {
    let runner = RecordingRunner::new().on(
        "code --list-extensions",
        CommandOutput::ok("ms-python.python\nCharliermarsh.Ruff\n\n"),
    );
    let installed = installed_extensions(&runner, "code")
        .expect("list")
        .expect("editor present");
    let expected: BTreeSet<String> = ["ms-python.python", "charliermarsh.ruff"]
        .into_iter()
        .map(str::to_string)
        .collect();
    assert_eq!(installed, expected);

    let required = vec![
        "charliermarsh.ruff".to_string(),
        "ms-python.vscode-pylance".to_string(),
    ];
    assert_eq!(
        missing_extensions(&required, &installed),
        vec!["ms-python.vscode-pylance".to_string()]
    );
}

#[test]
fn missing_editor_yields_none() {
    let runner = RecordingRunner::new().missing("code");
    assert_eq!(installed_extensions(&runner, "code").expect("list"), None);
}
