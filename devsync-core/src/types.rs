//! Domain types shared by every devsync crate.
//!
//! All types are serializable/deserializable via serde so they can live in
//! `devsync.yaml` and in `--json` reports.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a task in the task table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskName(pub String);

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for TaskName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Declarative environment variables. `None` means "do not export".
pub type EnvVarSet = BTreeMap<String, Option<String>>;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Host platform, as far as installers and editor settings care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Linux,
    Macos,
}

impl Platform {
    /// Platform of the running binary.
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::Macos
        } else {
            Platform::Linux
        }
    }

    /// Suffix used by VS Code's `terminal.integrated.env.<suffix>` settings.
    pub fn settings_key(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Linux => "linux",
            Platform::Macos => "osx",
        }
    }

    pub fn all() -> &'static [Platform] {
        &[Platform::Windows, Platform::Linux, Platform::Macos]
    }

    /// Executable file name for `tool` on this platform.
    pub fn exe_name(&self, tool: &str) -> String {
        match self {
            Platform::Windows => format!("{tool}.exe"),
            _ => tool.to_string(),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Windows => write!(f, "windows"),
            Platform::Linux => write!(f, "linux"),
            Platform::Macos => write!(f, "macos"),
        }
    }
}

/// A built-in operation the task runner can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuiltinStep {
    /// Project the env file into the process, editor and CI.
    ProjectEnv,
    /// Install the pinned package manager if needed.
    Bootstrap,
    /// Dependency sync plus post-sync hooks.
    Sync,
    /// Pull updates from the upstream project template.
    Template,
    /// Rewrite coupled pins (follower versions, submodule commits).
    Couple,
    /// Regenerate local shadow configs (pytest, pyright).
    LocalConfigs,
}

impl fmt::Display for BuiltinStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuiltinStep::ProjectEnv => "project-env",
            BuiltinStep::Bootstrap => "bootstrap",
            BuiltinStep::Sync => "sync",
            BuiltinStep::Template => "template",
            BuiltinStep::Couple => "couple",
            BuiltinStep::LocalConfigs => "local-configs",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Execution context
// ---------------------------------------------------------------------------

/// Where the current invocation runs. Steps skip or adjust work based on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecContext {
    /// Running under continuous integration.
    pub ci: bool,
    /// Running inside a containerized development environment.
    pub devcontainer: bool,
    /// High mode forced through the environment.
    pub force_high: bool,
}

impl fmt::Display for ExecContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.ci, self.devcontainer) {
            (true, true) => write!(f, "ci+devcontainer"),
            (true, false) => write!(f, "ci"),
            (false, true) => write!(f, "devcontainer"),
            (false, false) => write!(f, "local"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
