//! Error types for devsync-sync.

use std::path::PathBuf;

use thiserror::Error;

use devsync_core::CoreError;
use devsync_detector::DetectError;

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Config, answers, or command-boundary error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Environment detection error.
    #[error("detection error: {0}")]
    Detect(#[from] DetectError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed JSON document (env file, editor settings, update-bot config).
    #[error("failed to parse JSON at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Malformed TOML document (`pyproject.toml`).
    #[error("failed to parse TOML at {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A version-matching pattern does not compile.
    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A JSON document has the wrong shape at `path`.
    #[error("unexpected structure in {path}: {reason}")]
    Shape { path: PathBuf, reason: String },

    /// An external command exited non-zero.
    #[error("command failed ({}): {command}", describe_code(.code))]
    CommandFailed { command: String, code: Option<i32> },

    /// A rule naming a tool matched nothing: the files drifted from the rules.
    #[error("config drift: rule for '{tool}' ({pattern}) matched no location")]
    ConfigDrift { tool: String, pattern: String },

    /// No update-bot rule names the tool.
    #[error("no version rule names '{tool}'")]
    UnknownTool { tool: String },

    /// The tool has no entry under `versions:` in devsync.yaml.
    #[error("no pinned version for '{tool}' in devsync.yaml")]
    MissingPin { tool: String },

    /// After installing, the tool still reports the wrong version.
    #[error("'{tool}' reports version {} after install; expected {expected}", .found.as_deref().unwrap_or("<none>"))]
    VersionMismatch {
        tool: String,
        expected: String,
        found: Option<String>,
    },

    /// A task name not present in the task table.
    #[error("unknown task '{name}'")]
    UnknownTask { name: String },

    /// Task prerequisites form a cycle.
    #[error("task dependency cycle: {chain}")]
    TaskCycle { chain: String },
}

impl SyncError {
    /// Exit code of the wrapped command, when the error came from one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            SyncError::CommandFailed { code, .. } => *code,
            _ => None,
        }
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`SyncError::Json`].
pub(crate) fn json_err(path: impl Into<PathBuf>, source: serde_json::Error) -> SyncError {
    SyncError::Json {
        path: path.into(),
        source,
    }
}
