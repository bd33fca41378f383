pub mod bootstrap;
pub mod dev;
pub mod env;
pub mod run;
pub mod sync;
pub mod tasks;
pub mod template;
pub mod versions;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;
use devsync_core::{config, ExecContext, ProjectConfig};
use devsync_detector::detect_context;
use devsync_sync::env_projection::CI_ENV_FILE_VAR;
use devsync_sync::{FileDiff, HostEnv, WriteResult};

/// The repository a command operates on.
#[derive(Debug, Clone)]
pub struct Repo {
    pub root: PathBuf,
    pub config: ProjectConfig,
    pub context: ExecContext,
}

impl Repo {
    /// Resolve the root (explicit or discovered from the cwd) and load its config.
    pub fn open(explicit: Option<PathBuf>) -> Result<Self> {
        let root = match explicit {
            Some(root) => root,
            None => {
                let cwd = std::env::current_dir().context("could not determine current directory")?;
                config::find_root(&cwd)
            }
        };
        let config = config::load_at(&root)
            .with_context(|| format!("failed to load devsync.yaml in {}", root.display()))?;
        let context = detect_context();
        tracing::debug!("repository {} ({context})", root.display());
        Ok(Self {
            root,
            config,
            context,
        })
    }

    /// Host facts for the pipeline: CI env file, editor, extensions dir.
    pub fn host_env(&self) -> HostEnv {
        let extensions_dir = match config::editor_extensions_dir(self.context.devcontainer) {
            Ok(dir) => Some(dir),
            Err(err) => {
                tracing::warn!("editor extensions directory unavailable: {err}");
                None
            }
        };
        HostEnv {
            github_env: std::env::var_os(CI_ENV_FILE_VAR).map(PathBuf::from),
            extensions_dir,
            editor: Some(devsync_sync::deps::DEFAULT_EDITOR.to_string()),
        }
    }

    /// `path` relative to the root, for display.
    pub fn display<'a>(&self, path: &'a Path) -> std::borrow::Cow<'a, str> {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
    }
}

// ---------------------------------------------------------------------------
// Shared output
// ---------------------------------------------------------------------------

pub fn dry_run_prefix(dry_run: bool) -> &'static str {
    if dry_run {
        "[dry-run] "
    } else {
        ""
    }
}

/// One line per write; unchanged files only at the end as a count.
pub fn print_writes(repo: &Repo, writes: &[WriteResult], dry_run: bool) {
    let prefix = dry_run_prefix(dry_run);
    let mut unchanged = 0;
    for write in writes {
        match write {
            WriteResult::Written { path } => {
                println!("{prefix}  {} {}", "wrote".green(), repo.display(path));
            }
            WriteResult::WouldWrite { path } => {
                println!("{prefix}  {} {}", "would write".yellow(), repo.display(path));
            }
            WriteResult::Unchanged { .. } => unchanged += 1,
        }
    }
    if unchanged > 0 {
        println!("{prefix}  {unchanged} file(s) unchanged");
    }
}

pub fn print_diffs(diffs: &[FileDiff]) {
    for diff in diffs {
        print!("{}", diff.unified_diff);
        if !diff.unified_diff.ends_with('\n') {
            println!();
        }
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize JSON")?
    );
    Ok(())
}
