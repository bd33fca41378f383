//! Error types for devsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from config, answers, and command-boundary operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with file path and line context from serde_yaml.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The answers file exists but lacks a required key.
    #[error("{path} has no '{key}' entry")]
    MissingAnswer { path: PathBuf, key: String },

    /// An external program could not be started at all.
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

impl CoreError {
    /// True when the error means "the program is not installed".
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Convenience constructor for [`CoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
