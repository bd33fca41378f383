//! Local shadow configs derived from `pyproject.toml`, and the workflow
//! action allow-list.
//!
//! `pytest.ini` and `.dummy-ci-pyrightconfig.json` shadow the settings in
//! `pyproject.toml` on a contributor machine (both are git-ignored). In CI
//! the pyright config is written as `pyrightconfig.json` so warnings fail
//! the build.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::Path;

use regex::Regex;
use serde_json::Value as Json;
use toml::Value as Toml;

use crate::error::{io_err, json_err, SyncError};
use crate::writer::{write_file, WriteResult};

pub const PYPROJECT: &str = "pyproject.toml";
pub const PYTEST_INI: &str = "pytest.ini";
pub const PYRIGHT_CI: &str = "pyrightconfig.json";
pub const PYRIGHT_LOCAL: &str = ".dummy-ci-pyrightconfig.json";
const WORKFLOWS_DIR: &str = ".github/workflows";

fn load_pyproject(root: &Path) -> Result<Option<Toml>, SyncError> {
    let path = root.join(PYPROJECT);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(&path, err)),
    };
    let value = toml::from_str(&text).map_err(|source| SyncError::Toml { path, source })?;
    Ok(Some(value))
}

fn compile(pattern: &str) -> Result<Regex, SyncError> {
    Regex::new(pattern).map_err(|source| SyncError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

fn table_at<'a>(doc: &'a Toml, keys: &[&str]) -> Option<&'a toml::Table> {
    keys.iter()
        .try_fold(doc, |node, key| node.get(key))
        .and_then(Toml::as_table)
}

// ---------------------------------------------------------------------------
// pytest
// ---------------------------------------------------------------------------

/// Collapse whitespace in `addopts` and force `-n <x>` to `-n 0`.
pub fn disable_concurrent_tests(addopts: &str) -> Result<String, SyncError> {
    let normalized = addopts.split_whitespace().collect::<Vec<_>>().join(" ");
    let workers = compile(r"-n\s[^\s]+")?;
    Ok(workers.replace_all(&normalized, "-n 0").into_owned())
}

fn ini_value(value: &Toml) -> String {
    match value {
        Toml::String(s) => s.clone(),
        Toml::Array(items) => items
            .iter()
            .map(|item| format!("\n    {}", ini_value(item)))
            .collect(),
        other => other.to_string(),
    }
}

/// Render `[tool.pytest.ini_options]` as a `pytest.ini`.
pub fn render_pytest_ini(options: &toml::Table) -> Result<String, SyncError> {
    let mut out = String::from("[pytest]\n");
    for (key, value) in options {
        let rendered = if key == "addopts" {
            let joined = match value {
                Toml::Array(items) => items.iter().map(ini_value).collect::<Vec<_>>().join(" "),
                other => ini_value(other),
            };
            disable_concurrent_tests(&joined)?
        } else {
            ini_value(value)
        };
        if rendered.starts_with('\n') {
            out.push_str(&format!("{key} ={rendered}\n"));
        } else {
            out.push_str(&format!("{key} = {rendered}\n"));
        }
    }
    Ok(out)
}

/// Write `pytest.ini` from `pyproject.toml`. `None` when there is nothing to shadow.
pub fn sync_local_dev_configs(root: &Path, dry_run: bool) -> Result<Option<WriteResult>, SyncError> {
    let Some(doc) = load_pyproject(root)? else {
        return Ok(None);
    };
    let Some(options) = table_at(&doc, &["tool", "pytest", "ini_options"]) else {
        tracing::debug!("no [tool.pytest.ini_options] in {PYPROJECT}");
        return Ok(None);
    };
    let result = write_file(&root.join(PYTEST_INI), &render_pytest_ini(options)?, dry_run)?;
    Ok(Some(result))
}

// ---------------------------------------------------------------------------
// pyright
// ---------------------------------------------------------------------------

/// `[tool.pyright]` as JSON with every `report*` warning raised to an error.
pub fn elevated_pyright(pyright: &toml::Table, path: &Path) -> Result<Json, SyncError> {
    let mut config = match serde_json::to_value(pyright).map_err(|e| json_err(path, e))? {
        Json::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    for (rule, level) in config.iter_mut() {
        if rule.starts_with("report") && level.as_str() == Some("warning") {
            *level = Json::String("error".to_string());
        }
    }
    Ok(Json::Object(config))
}

/// Write the elevated pyright config: `pyrightconfig.json` in CI, the dummy
/// shadow otherwise.
pub fn elevate_pyright_warnings(
    root: &Path,
    ci: bool,
    dry_run: bool,
) -> Result<Option<WriteResult>, SyncError> {
    let Some(doc) = load_pyproject(root)? else {
        return Ok(None);
    };
    let Some(pyright) = table_at(&doc, &["tool", "pyright"]) else {
        tracing::debug!("no [tool.pyright] in {PYPROJECT}");
        return Ok(None);
    };
    let target = root.join(if ci { PYRIGHT_CI } else { PYRIGHT_LOCAL });
    let config = elevated_pyright(pyright, &target)?;
    let mut rendered = serde_json::to_string_pretty(&config).map_err(|e| json_err(&target, e))?;
    rendered.push('\n');
    Ok(Some(write_file(&target, &rendered, dry_run)?))
}

// ---------------------------------------------------------------------------
// Workflow actions
// ---------------------------------------------------------------------------

/// Allow-list lines (`owner/action@*,`) for every action the workflows use.
pub fn get_actions(root: &Path) -> Result<Vec<String>, SyncError> {
    let dir = root.join(WORKFLOWS_DIR);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let uses = compile(r#"uses:\s?"?(?P<action>.+)@"#)?;

    let mut actions = BTreeSet::new();
    for entry in std::fs::read_dir(&dir).map_err(|e| io_err(&dir, e))? {
        let path = entry.map_err(|e| io_err(&dir, e))?.path();
        if !path.is_file() {
            continue;
        }
        let text = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        for caps in uses.captures_iter(&text) {
            actions.insert(format!("{}@*,", &caps["action"]));
        }
    }
    Ok(actions.into_iter().collect())
}
