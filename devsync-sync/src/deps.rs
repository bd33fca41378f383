//! Dependency sync: editor extensions, `uv sync`, the lock export, local
//! shadow configs and the pre-commit hooks.
//!
//! Every step re-checks its own precondition (extension present, hook file
//! present) so re-running after a failure only redoes what is missing.

use std::path::{Path, PathBuf};

use devsync_core::{CommandRunner, CommandSpec, ExecContext, ProjectConfig};
use devsync_detector::{installed_extensions, missing_extensions};
use serde::Serialize;

use crate::command::run_checked;
use crate::dev_configs;
use crate::error::{io_err, SyncError};
use crate::writer::WriteResult;

/// Editor CLI used to list and install extensions.
pub const DEFAULT_EDITOR: &str = "code";

/// Everything [`sync_dependencies`] needs.
#[derive(Debug, Clone)]
pub struct DepsRequest<'a> {
    pub root: &'a Path,
    pub config: &'a ProjectConfig,
    pub context: ExecContext,
    /// Prefer the highest compatible versions (`--upgrade`).
    pub high: bool,
    /// Program for the package manager, usually from bootstrap.
    pub uv: String,
    /// Editor CLI; `None` skips extensions entirely.
    pub editor: Option<String>,
    /// Where the editor keeps installed extensions.
    pub extensions_dir: Option<PathBuf>,
    /// Forwarded verbatim to `uv sync`.
    pub extra_args: Vec<String>,
    pub dry_run: bool,
}

/// What [`sync_dependencies`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DepsReport {
    pub installed_extensions: Vec<String>,
    pub stripped_stubs: Vec<PathBuf>,
    pub high: bool,
    pub lock_exported: Option<PathBuf>,
    pub local_configs: Vec<WriteResult>,
}

/// `uv sync [--python <pin>] [--upgrade] [extra...]`.
pub fn uv_sync_command(uv: &str, python: Option<&str>, high: bool, extra: &[String]) -> CommandSpec {
    let mut cmd = CommandSpec::new(uv).arg("sync");
    if let Some(python) = python {
        cmd = cmd.args(["--python", python]);
    }
    if high {
        cmd = cmd.arg("--upgrade");
    }
    cmd.args(extra.iter().cloned())
}

/// `uv export --frozen --no-hashes --output-file <artifact>`.
pub fn uv_export_command(uv: &str, artifact: &Path) -> CommandSpec {
    CommandSpec::new(uv).args([
        "export".to_string(),
        "--frozen".to_string(),
        "--no-hashes".to_string(),
        "--output-file".to_string(),
        artifact.to_string_lossy().into_owned(),
    ])
}

/// Install missing editor extensions. Returns the ones installed.
///
/// A missing editor CLI is not an error: nothing can be installed.
pub fn sync_extensions(
    runner: &dyn CommandRunner,
    editor: &str,
    required: &[String],
) -> Result<Vec<String>, SyncError> {
    if required.is_empty() {
        return Ok(Vec::new());
    }
    let Some(installed) = installed_extensions(runner, editor)? else {
        tracing::warn!("'{editor}' not found; skipping editor extensions");
        return Ok(Vec::new());
    };
    let missing = missing_extensions(required, &installed);
    for extension in &missing {
        let cmd = CommandSpec::new(editor).args(["--install-extension", extension.as_str()]);
        run_checked(runner, &cmd)?;
    }
    Ok(missing)
}

/// Remove `<extensions_dir>/<prefix>-*/dist/bundled/stubs` for every prefix.
pub fn strip_bundled_stubs(
    extensions_dir: &Path,
    prefixes: &[String],
    dry_run: bool,
) -> Result<Vec<PathBuf>, SyncError> {
    if prefixes.is_empty() || !extensions_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut stripped = Vec::new();
    for entry in std::fs::read_dir(extensions_dir).map_err(|e| io_err(extensions_dir, e))? {
        let entry = entry.map_err(|e| io_err(extensions_dir, e))?;
        let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
        let wanted = prefixes
            .iter()
            .any(|p| name.starts_with(&format!("{}-", p.to_ascii_lowercase())));
        if !wanted {
            continue;
        }
        let stubs = entry.path().join("dist").join("bundled").join("stubs");
        if !stubs.is_dir() {
            continue;
        }
        if dry_run {
            tracing::info!("[dry-run] would remove {}", stubs.display());
        } else {
            std::fs::remove_dir_all(&stubs).map_err(|e| io_err(&stubs, e))?;
            tracing::info!("removed bundled stubs: {}", stubs.display());
        }
        stripped.push(stubs);
    }
    stripped.sort();
    Ok(stripped)
}

/// Extensions, `uv sync`, lock export and local shadow configs, in that order.
pub fn sync_dependencies(
    request: &DepsRequest<'_>,
    runner: &dyn CommandRunner,
) -> Result<DepsReport, SyncError> {
    let deps = &request.config.deps;
    let mut report = DepsReport {
        high: request.high || request.context.force_high,
        ..Default::default()
    };

    if !request.context.ci {
        if let Some(editor) = &request.editor {
            report.installed_extensions = sync_extensions(runner, editor, &deps.extensions)?;
            if !report.installed_extensions.is_empty() {
                if let Some(dir) = &request.extensions_dir {
                    report.stripped_stubs = strip_bundled_stubs(dir, &deps.strip_stubs, request.dry_run)?;
                }
            }
        }
    }

    let sync = uv_sync_command(
        &request.uv,
        request.config.pin("python"),
        report.high,
        &request.extra_args,
    )
    .current_dir(request.root);
    run_checked(runner, &sync)?;

    if let Some(artifact) = &deps.lock_artifact {
        run_checked(runner, &uv_export_command(&request.uv, artifact).current_dir(request.root))?;
        report.lock_exported = Some(artifact.clone());
    }

    if deps.local_dev_configs {
        report.local_configs.extend(dev_configs::sync_local_dev_configs(
            request.root,
            request.dry_run,
        )?);
        report.local_configs.extend(dev_configs::elevate_pyright_warnings(
            request.root,
            request.context.ci,
            request.dry_run,
        )?);
    }

    Ok(report)
}

/// Path of the installed pre-commit hook.
pub fn hook_path(root: &Path) -> PathBuf {
    root.join(".git").join("hooks").join("pre-commit")
}

/// `pre-commit install --install-hooks` on a first local sync.
///
/// Skipped in CI, when disabled, and when the hook is already installed.
/// Returns whether the installer ran.
pub fn install_hooks(
    root: &Path,
    config: &ProjectConfig,
    context: ExecContext,
    runner: &dyn CommandRunner,
) -> Result<bool, SyncError> {
    if context.ci || !config.deps.hooks {
        return Ok(false);
    }
    if hook_path(root).exists() {
        tracing::debug!("pre-commit hook already installed");
        return Ok(false);
    }
    let cmd = CommandSpec::new("pre-commit")
        .args(["install", "--install-hooks"])
        .current_dir(root);
    run_checked(runner, &cmd)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn uv_sync_flags() {
        let extra = vec!["--all-extras".to_string()];
        assert_eq!(
            uv_sync_command("uv", Some("3.11"), true, &extra).short_display(),
            "uv sync --python 3.11 --upgrade --all-extras"
        );
        assert_eq!(uv_sync_command("uv", None, false, &[]).short_display(), "uv sync");
    }

    #[test]
    fn strips_only_matching_extension_stubs() {
        let dir = TempDir::new().unwrap();
        let pylance = dir.path().join("ms-python.vscode-pylance-2024.9.1/dist/bundled/stubs");
        let other = dir.path().join("ms-python.python-2024.1.0/dist/bundled/stubs");
        fs::create_dir_all(&pylance).unwrap();
        fs::create_dir_all(&other).unwrap();

        let stripped =
            strip_bundled_stubs(dir.path(), &["ms-python.vscode-pylance".to_string()], false)
                .unwrap();
        assert_eq!(stripped, vec![pylance.clone()]);
        assert!(!pylance.exists());
        assert!(other.exists());
    }

    #[test]
    fn strip_dry_run_keeps_files() {
        let dir = TempDir::new().unwrap();
        let stubs = dir.path().join("ms-python.vscode-pylance-1/dist/bundled/stubs");
        fs::create_dir_all(&stubs).unwrap();
        let stripped =
            strip_bundled_stubs(dir.path(), &["ms-python.vscode-pylance".to_string()], true)
                .unwrap();
        assert_eq!(stripped.len(), 1);
        assert!(stubs.exists());
    }
}
