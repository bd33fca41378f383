//! Environment variable projection.
//!
//! `.dev/env.json` is the source of truth:
//!
//! ```json
//! { "PYRIGHT_PYTHON_FORCE_VERSION": "latest", "PYDEVD_DISABLE_FILE_VALIDATION": null }
//! ```
//!
//! Context overrides from `devsync.yaml` are overlaid, null entries dropped,
//! and the rest projected into up to three targets: the current process, the
//! editor's integrated terminal settings, and the CI runner's env file.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use devsync_core::config::EnvConfig;
use devsync_core::{EnvVarSet, ExecContext, Platform};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{io_err, json_err, SyncError};
use crate::jsonc;
use crate::writer::{read_or_empty, write_file, WriteResult};

/// Env var naming the CI runner's env file.
pub const CI_ENV_FILE_VAR: &str = "GITHUB_ENV";

/// Settings key prefix for the editor's integrated terminal environment.
const EDITOR_ENV_KEY: &str = "terminal.integrated.env";

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Read the env file. A missing file is an empty set.
pub fn load_env_file(path: &Path) -> Result<EnvVarSet, SyncError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(EnvVarSet::new()),
        Err(err) => return Err(io_err(path, err)),
    };
    if text.trim().is_empty() {
        return Ok(EnvVarSet::new());
    }
    let value: Value = serde_json::from_str(&text).map_err(|e| json_err(path, e))?;
    let Value::Object(entries) = value else {
        return Err(SyncError::Shape {
            path: path.to_path_buf(),
            reason: "expected an object of NAME: value".to_string(),
        });
    };

    entries
        .into_iter()
        .map(|(name, value)| match value {
            Value::Null => Ok((name, None)),
            Value::String(s) => Ok((name, Some(s))),
            Value::Bool(b) => Ok((name, Some(b.to_string()))),
            Value::Number(n) => Ok((name, Some(n.to_string()))),
            _ => Err(SyncError::Shape {
                path: path.to_path_buf(),
                reason: format!("'{name}' must be a string or null"),
            }),
        })
        .collect()
}

/// Overlay the overrides for every active context onto `base`.
///
/// CI overrides apply first, devcontainer overrides last.
pub fn resolve(mut base: EnvVarSet, config: &EnvConfig, context: ExecContext) -> EnvVarSet {
    if context.ci {
        base.extend(config.ci.clone());
    }
    if context.devcontainer {
        base.extend(config.devcontainer.clone());
    }
    base
}

/// Non-null entries, in name order.
pub fn active(vars: &EnvVarSet) -> Vec<(&str, &str)> {
    vars.iter()
        .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
        .collect()
}

/// `NAME=value` pairs joined by `;`.
pub fn delimited(vars: &EnvVarSet) -> String {
    active(vars)
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(";")
}

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

/// Set every non-null entry in the current process; return the delimited form.
pub fn export_to_process(vars: &EnvVarSet) -> String {
    let mut exported = Vec::new();
    for (name, value) in active(vars) {
        std::env::set_var(name, value);
        exported.push(format!("{name}={value}"));
    }
    exported.join(";")
}

/// Rewrite `terminal.integrated.env.<platform>` for every platform, leaving
/// every other setting untouched. Comments and trailing commas in the
/// settings file are kept. The file is created when absent.
pub fn project_to_editor(
    settings: &Path,
    vars: &EnvVarSet,
    dry_run: bool,
) -> Result<WriteResult, SyncError> {
    let text = read_or_empty(settings)?;
    let env: Map<String, Value> = active(vars)
        .into_iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect();
    let members: Vec<(String, Value)> = Platform::all()
        .iter()
        .map(|platform| {
            (
                format!("{EDITOR_ENV_KEY}.{}", platform.settings_key()),
                Value::Object(env.clone()),
            )
        })
        .collect();

    let mut rendered = jsonc::set_members(&text, &members).map_err(|err| SyncError::Shape {
        path: settings.to_path_buf(),
        reason: format!("editor settings must be a JSON object: {err}"),
    })?;
    if !rendered.ends_with('\n') {
        rendered.push('\n');
    }
    write_file(settings, &rendered, dry_run)
}

/// Lines appended to the CI env file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CiProjection {
    pub path: PathBuf,
    pub appended: Vec<String>,
}

/// Append `NAME=value` to the CI env file for every entry whose line is not
/// already there. Running twice leaves the file unchanged the second time.
pub fn project_to_ci(env_file: &Path, vars: &EnvVarSet, dry_run: bool) -> Result<CiProjection, SyncError> {
    let existing = read_or_empty(env_file)?;
    let mut appended = Vec::new();
    for (name, value) in active(vars) {
        if value.contains('\n') {
            tracing::warn!("skipping multi-line value for {name} in CI env file");
            continue;
        }
        let line = format!("{name}={value}");
        if existing.lines().any(|l| l == line) {
            continue;
        }
        appended.push(line);
    }

    if !appended.is_empty() && !dry_run {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(env_file)
            .map_err(|e| io_err(env_file, e))?;
        let mut chunk = String::new();
        if !existing.is_empty() && !existing.ends_with('\n') {
            chunk.push('\n');
        }
        for line in &appended {
            chunk.push_str(line);
            chunk.push('\n');
        }
        file.write_all(chunk.as_bytes())
            .map_err(|e| io_err(env_file, e))?;
    }

    tracing::debug!(
        "{} new line(s) for {}",
        appended.len(),
        env_file.display()
    );
    Ok(CiProjection {
        path: env_file.to_path_buf(),
        appended,
    })
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// Which targets to project into, beyond the process itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Targets {
    pub process: bool,
    pub editor: bool,
    /// CI env file, usually from `GITHUB_ENV`.
    pub ci_env_file: Option<PathBuf>,
}

/// What [`project`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectionReport {
    /// `NAME=value;NAME=value` of everything projected.
    pub exported: String,
    pub count: usize,
    pub editor: Option<WriteResult>,
    pub ci: Option<CiProjection>,
}

/// Read, resolve and project the env file under `root`.
pub fn project(
    root: &Path,
    config: &EnvConfig,
    context: ExecContext,
    targets: &Targets,
    dry_run: bool,
) -> Result<ProjectionReport, SyncError> {
    let vars = resolve(load_env_file(&root.join(&config.file))?, config, context);
    let mut report = ProjectionReport {
        count: active(&vars).len(),
        ..Default::default()
    };

    report.exported = if targets.process && !dry_run {
        export_to_process(&vars)
    } else {
        delimited(&vars)
    };
    if targets.editor {
        report.editor = Some(project_to_editor(
            &root.join(&config.editor_settings),
            &vars,
            dry_run,
        )?);
    }
    if let Some(env_file) = &targets.ci_env_file {
        report.ci = Some(project_to_ci(env_file, &vars, dry_run)?);
    }
    tracing::info!("projected {} environment variable(s) ({context})", report.count);
    Ok(report)
}
