//! Project configuration (`devsync.yaml`).
//!
//! # Storage layout
//!
//! ```text
//! <repo>/
//!   devsync.yaml            (optional; every field has a default)
//!   renovate.json           (update-bot rules, see `versions`)
//!   .dev/env.json           (declarative environment variables)
//!   .copier-answers.yml     (recorded template answers)
//! ```
//!
//! # API pattern
//!
//! Functions that touch the filesystem take an explicit root (`fn_at(root, …)`)
//! so tests can point them at a `TempDir`. Home-relative helpers have a
//! no-arg wrapper that derives home from `dirs::home_dir()`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::types::{BuiltinStep, EnvVarSet};

pub const CONFIG_FILE: &str = "devsync.yaml";

// ---------------------------------------------------------------------------
// 1. Schema
// ---------------------------------------------------------------------------

/// Root of `devsync.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Pinned tool versions, keyed by tool name (`uv`, `python`, ...).
    pub versions: BTreeMap<String, String>,
    /// Update-bot config holding the regex rules, relative to the repo root.
    pub renovate: PathBuf,
    pub env: EnvConfig,
    pub bootstrap: BootstrapConfig,
    pub deps: DepsConfig,
    pub template: TemplateConfig,
    pub coupled: CoupledConfig,
    /// User tasks. Same-named entries replace the built-in tasks.
    pub tasks: BTreeMap<String, TaskSpec>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            versions: BTreeMap::new(),
            renovate: PathBuf::from("renovate.json"),
            env: EnvConfig::default(),
            bootstrap: BootstrapConfig::default(),
            deps: DepsConfig::default(),
            template: TemplateConfig::default(),
            coupled: CoupledConfig::default(),
            tasks: BTreeMap::new(),
        }
    }
}

impl ProjectConfig {
    /// Pinned version for `tool`, if any.
    pub fn pin(&self, tool: &str) -> Option<&str> {
        self.versions.get(tool).map(String::as_str)
    }
}

/// Environment projection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// JSON source of truth (`{"NAME": "value" | null}`).
    pub file: PathBuf,
    /// Editor settings file whose `terminal.integrated.env.*` keys are rewritten.
    pub editor_settings: PathBuf,
    /// Overrides applied when running under CI.
    pub ci: EnvVarSet,
    /// Overrides applied inside a devcontainer.
    pub devcontainer: EnvVarSet,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from(".dev/env.json"),
            editor_settings: PathBuf::from(".vscode/settings.json"),
            ci: EnvVarSet::new(),
            devcontainer: EnvVarSet::new(),
        }
    }
}

/// Package-manager bootstrap settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Tool to bootstrap; its pin is read from `versions`.
    pub tool: String,
    /// Install location, relative to the repo root.
    pub install_dir: PathBuf,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            tool: "uv".to_string(),
            install_dir: PathBuf::from("bin"),
        }
    }
}

/// Dependency-sync settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepsConfig {
    /// Editor extensions a contributor needs (`publisher.name`).
    pub extensions: Vec<String>,
    /// Extensions whose bundled `dist/bundled/stubs` shadow project stubs.
    pub strip_stubs: Vec<String>,
    /// Optional requirements-style export of the lock, relative to the repo root.
    pub lock_artifact: Option<PathBuf>,
    /// Regenerate local pytest / pyright shadow configs after syncing.
    pub local_dev_configs: bool,
    /// Install pre-commit hooks on first local sync.
    pub hooks: bool,
}

impl Default for DepsConfig {
    fn default() -> Self {
        Self {
            extensions: Vec::new(),
            strip_stubs: vec!["ms-python.vscode-pylance".to_string()],
            lock_artifact: None,
            local_dev_configs: true,
            hooks: true,
        }
    }
}

/// Template-sync settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    pub answers_file: PathBuf,
    /// Ref used when none is given on the command line.
    pub default_ref: String,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            answers_file: PathBuf::from(".copier-answers.yml"),
            default_ref: "HEAD".to_string(),
        }
    }
}

/// A pin that follows another pin's version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowerRule {
    pub leader: String,
    pub follower: String,
}

/// Coupled-pin settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoupledConfig {
    /// Explicit requirement files, relative to the repo root.
    pub files: Vec<PathBuf>,
    /// Directory scanned for `requirements*.txt`.
    pub requirements_dir: PathBuf,
    pub followers: Vec<FollowerRule>,
    /// Rewrite `name@git+https://github.com/org/name@<commit>` pins from git submodules.
    pub submodules: bool,
}

impl Default for CoupledConfig {
    fn default() -> Self {
        Self {
            files: vec![PathBuf::from("pyproject.toml")],
            requirements_dir: PathBuf::from(".tools/requirements"),
            followers: Vec::new(),
            submodules: true,
        }
    }
}

/// A task declared in `devsync.yaml`.
///
/// Exactly one of `run` (an argv prefix) or `step` should be set; `run` wins
/// when both are present.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSpec {
    pub run: Vec<String>,
    pub step: Option<BuiltinStep>,
    pub deps: Vec<String>,
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// 2. Path helpers
// ---------------------------------------------------------------------------

/// `<root>/devsync.yaml`. Pure, no I/O.
pub fn config_path_at(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Walk up from `start` until a directory holding `devsync.yaml` or `.git` is found.
///
/// Falls back to `start` itself when neither marker exists.
pub fn find_root(start: &Path) -> PathBuf {
    for dir in start.ancestors() {
        if dir.join(CONFIG_FILE).is_file() || dir.join(".git").exists() {
            return dir.to_path_buf();
        }
    }
    start.to_path_buf()
}

/// Editor extensions directory under `home`. Devcontainers use the server layout.
pub fn editor_extensions_dir_at(home: &Path, devcontainer: bool) -> PathBuf {
    let base = if devcontainer {
        ".vscode-server"
    } else {
        ".vscode"
    };
    home.join(base).join("extensions")
}

/// `editor_extensions_dir_at` convenience wrapper.
pub fn editor_extensions_dir(devcontainer: bool) -> Result<PathBuf, CoreError> {
    Ok(editor_extensions_dir_at(&home()?, devcontainer))
}

// ---------------------------------------------------------------------------
// 3. Load / save
// ---------------------------------------------------------------------------

/// Load `<root>/devsync.yaml`, or defaults when it does not exist.
///
/// Returns `CoreError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(root: &Path) -> Result<ProjectConfig, CoreError> {
    let path = config_path_at(root);
    if !path.exists() {
        tracing::debug!("no {} at {}; using defaults", CONFIG_FILE, root.display());
        return Ok(ProjectConfig::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if contents.trim().is_empty() {
        return Ok(ProjectConfig::default());
    }
    serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse { path, source: e })
}

/// Atomically save `<root>/devsync.yaml`.
///
/// Write flow: serialize → `devsync.yaml.tmp` sibling → `rename`.
pub fn save_at(root: &Path, config: &ProjectConfig) -> Result<(), CoreError> {
    let yaml = serde_yaml::to_string(config)?;
    write_atomic(&config_path_at(root), &yaml)
}

/// Set `versions.<tool>` in `<root>/devsync.yaml`, editing only that line.
///
/// Comments, quoting and every other key stay as written; the entry (and a
/// `versions:` block) is appended when absent. A flow-style `versions: {..}`
/// mapping falls back to [`save_at`]. Returns whether the file changed.
pub fn set_pin_at(root: &Path, tool: &str, version: &str) -> Result<bool, CoreError> {
    let path = config_path_at(root);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(io_err(&path, e)),
    };

    let Some(updated) = set_pin(&contents, tool, version) else {
        tracing::warn!("versions in {CONFIG_FILE} is not a block mapping; rewriting the file");
        let mut config = load_at(root)?;
        if config.pin(tool) == Some(version) {
            return Ok(false);
        }
        config.versions.insert(tool.to_string(), version.to_string());
        save_at(root, &config)?;
        return Ok(true);
    };
    if updated == contents {
        return Ok(false);
    }
    write_atomic(&path, &updated)?;
    Ok(true)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Write flow: `devsync.yaml.tmp` sibling → `rename`.
fn write_atomic(path: &Path, contents: &str) -> Result<(), CoreError> {
    let tmp_path = path.with_file_name(format!("{CONFIG_FILE}.tmp"));
    std::fs::write(&tmp_path, contents).map_err(|e| io_err(&tmp_path, e))?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(io_err(path, e));
    }
    Ok(())
}

fn leading_ws(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

/// `line` with its value replaced when it is the `tool:` entry.
fn pin_line(line: &str, tool: &str, version: &str) -> Option<String> {
    let body = line.trim_end_matches(['\n', '\r']);
    let eol = &line[body.len()..];
    let (indent, rest) = body.split_at(leading_ws(body).len());
    let colon = rest.find(':')?;
    let key_raw = &rest[..colon];
    if key_raw.trim().trim_matches(['"', '\'']) != tool {
        return None;
    }

    let after = &rest[colon + 1..];
    let (gap, value_part) = after.split_at(leading_ws(after).len());
    let (value, comment) = value_part
        .find(" #")
        .map_or((value_part, ""), |i| value_part.split_at(i));
    let pad = &value[value.trim_end().len()..];
    let quote = match value.chars().next() {
        Some(q @ ('"' | '\'')) => q.to_string(),
        _ => String::new(),
    };
    let gap = if gap.is_empty() { " " } else { gap };
    Some(format!("{indent}{key_raw}:{gap}{quote}{version}{quote}{pad}{comment}{eol}"))
}

/// Text-level pin edit. `None` when `versions` is not a block mapping.
fn set_pin(text: &str, tool: &str, version: &str) -> Option<String> {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let Some(header) = lines.iter().position(|l| l.starts_with("versions:")) else {
        let mut out = text.to_string();
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&format!("versions:\n  {tool}: {version}\n"));
        return Some(out);
    };
    let inline = lines[header]["versions:".len()..].trim();
    if !inline.is_empty() && !inline.starts_with('#') {
        return None;
    }

    let mut out: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
    let mut child_indent: Option<&str> = None;
    let mut last_child = header;
    for (i, line) in lines.iter().enumerate().skip(header + 1) {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let indent = leading_ws(line);
        if indent.is_empty() {
            break;
        }
        if *child_indent.get_or_insert(indent) != indent {
            continue;
        }
        last_child = i;
        if let Some(updated) = pin_line(line, tool, version) {
            out[i] = updated;
            return Some(out.concat());
        }
    }

    if !out[last_child].ends_with('\n') {
        out[last_child].push('\n');
    }
    let indent = child_indent.unwrap_or("  ");
    out.insert(last_child + 1, format!("{indent}{tool}: {version}\n"));
    Some(out.concat())
}

fn home() -> Result<PathBuf, CoreError> {
    dirs::home_dir().ok_or(CoreError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
