//! Environment detection for `devsync-detector`.
//!
//! Answers the "where am I and what is installed" questions every sync step
//! starts with: execution context (CI, devcontainer, local), the version a
//! tool reports, where a tool binary lives, and which editor extensions are
//! present. Nothing here mutates the machine.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use devsync_core::{CommandRunner, CommandSpec, CoreError, ExecContext, Platform};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Env var set by CI providers.
pub const CI_VAR: &str = "CI";
/// Env vars that mark a containerized development environment.
pub const DEVCONTAINER_VARS: &[&str] = &["DEVCONTAINER", "REMOTE_CONTAINERS", "CODESPACES"];
/// Force high mode for the dependency sync.
pub const FORCE_HIGH_VAR: &str = "DEVSYNC_HIGH";
/// Disable the CI path even when `CI` is set.
pub const NO_CI_VAR: &str = "DEVSYNC_NO_CI";
/// Disable the devcontainer path even inside a container.
pub const NO_DEVCONTAINER_VAR: &str = "DEVSYNC_NO_DEVCONTAINER";

/// Errors from detection.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("'{program} {args}' exited with code {code:?}")]
    Probe {
        program: String,
        args: String,
        code: Option<i32>,
    },
}

// ---------------------------------------------------------------------------
// Execution context
// ---------------------------------------------------------------------------

/// Detect the execution context from the process environment.
pub fn detect_context() -> ExecContext {
    detect_context_from(|key| std::env::var(key).ok())
}

/// Detect the execution context from an arbitrary variable lookup.
///
/// Override flags win over detection: `DEVSYNC_NO_CI=1` turns the CI path
/// off even when `CI=true`.
pub fn detect_context_from(lookup: impl Fn(&str) -> Option<String>) -> ExecContext {
    let flag = |key: &str| lookup(key).as_deref().is_some_and(is_truthy);

    let ci = flag(CI_VAR) && !flag(NO_CI_VAR);
    let devcontainer =
        DEVCONTAINER_VARS.iter().any(|key| flag(key)) && !flag(NO_DEVCONTAINER_VAR);
    ExecContext {
        ci,
        devcontainer,
        force_high: flag(FORCE_HIGH_VAR),
    }
}

/// Shell-style truthiness: anything but empty, `0`, `false`, `no`, `off`.
pub fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    !(value.is_empty()
        || value == "0"
        || value.eq_ignore_ascii_case("false")
        || value.eq_ignore_ascii_case("no")
        || value.eq_ignore_ascii_case("off"))
}

// ---------------------------------------------------------------------------
// Tool versions
// ---------------------------------------------------------------------------

/// Extract the version token from `--version` output.
///
/// `uv 0.4.10 (b3b3ae1 2024-09-12)` → `0.4.10`, `Python 3.11.9` → `3.11.9`,
/// `v1.2.3` → `1.2.3`.
pub fn parse_tool_version(output: &str) -> Option<String> {
    let line = output.lines().find(|l| !l.trim().is_empty())?;
    line.split_whitespace()
        .map(|word| word.strip_prefix('v').unwrap_or(word))
        .find(|word| word.starts_with(|c: char| c.is_ascii_digit()))
        .map(|word| word.trim_end_matches([',', ';', ')']).to_string())
}

/// Ask `program --version` and parse the answer.
///
/// Returns `Ok(None)` when the program is not installed or does not answer
/// with something version-shaped.
pub fn detect_tool_version(
    runner: &dyn CommandRunner,
    program: &str,
) -> Result<Option<String>, DetectError> {
    let cmd = CommandSpec::new(program).arg("--version").captured();
    let output = match runner.run(&cmd) {
        Ok(output) => output,
        Err(err) if err.is_not_found() => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if !output.success() {
        return Ok(None);
    }
    Ok(parse_tool_version(&output.stdout))
}

/// Find `tool`: first in `install_dir`, then on `PATH`.
pub fn locate_tool(install_dir: &Path, platform: Platform, tool: &str) -> Option<PathBuf> {
    let local = install_dir.join(platform.exe_name(tool));
    if local.is_file() {
        return Some(local);
    }
    which::which(tool).ok()
}

// ---------------------------------------------------------------------------
// Editor extensions
// ---------------------------------------------------------------------------

/// Extensions reported by `<editor> --list-extensions`, lowercased.
///
/// `Ok(None)` when the editor CLI is not installed.
pub fn installed_extensions(
    runner: &dyn CommandRunner,
    editor: &str,
) -> Result<Option<BTreeSet<String>>, DetectError> {
    let cmd = CommandSpec::new(editor).arg("--list-extensions").captured();
    let output = match runner.run(&cmd) {
        Ok(output) => output,
        Err(err) if err.is_not_found() => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if !output.success() {
        return Err(DetectError::Probe {
            program: editor.to_string(),
            args: "--list-extensions".to_string(),
            code: output.code,
        });
    }
    Ok(Some(
        output
            .stdout
            .lines()
            .map(|l| l.trim().to_ascii_lowercase())
            .filter(|l| !l.is_empty())
            .collect(),
    ))
}

/// Required extensions not yet installed, in the order they were required.
pub fn missing_extensions(required: &[String], installed: &BTreeSet<String>) -> Vec<String> {
    required
        .iter()
        .filter(|ext| !installed.contains(&ext.to_ascii_lowercase()))
        .cloned()
        .collect()
}
