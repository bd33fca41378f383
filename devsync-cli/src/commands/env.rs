//! `devsync env`: project `.dev/env.json` without running the rest of sync.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use devsync_sync::env_projection::{self, Targets, CI_ENV_FILE_VAR};

use super::{print_writes, Repo};

/// With no target flag, projects into the editor locally and the CI env file in CI.
#[derive(Args, Debug)]
pub struct EnvArgs {
    /// Write the editor's terminal env settings.
    #[arg(long)]
    pub editor: bool,

    /// Append to the CI env file named by GITHUB_ENV.
    #[arg(long)]
    pub ci: bool,

    /// Print the resolved `NAME=value` pairs.
    #[arg(long)]
    pub print: bool,
}

impl EnvArgs {
    pub fn run(self, repo: &Repo) -> Result<()> {
        let (editor, ci) = if self.editor || self.ci || self.print {
            (self.editor, self.ci)
        } else {
            (!repo.context.ci, repo.context.ci)
        };

        let ci_env_file = match std::env::var_os(CI_ENV_FILE_VAR).map(PathBuf::from) {
            Some(path) if ci => Some(path),
            None if self.ci => bail!("{CI_ENV_FILE_VAR} is not set; nowhere to write the CI env"),
            None if ci => {
                tracing::warn!("{CI_ENV_FILE_VAR} is not set; skipping the CI env file");
                None
            }
            _ => None,
        };

        if self.print {
            let env_file = repo.root.join(&repo.config.env.file);
            let vars = env_projection::resolve(
                env_projection::load_env_file(&env_file)
                    .with_context(|| format!("failed to read {}", env_file.display()))?,
                &repo.config.env,
                repo.context,
            );
            for (name, value) in env_projection::active(&vars) {
                println!("{name}={value}");
            }
        }

        if !editor && ci_env_file.is_none() {
            return Ok(());
        }
        let targets = Targets {
            process: false,
            editor,
            ci_env_file,
        };
        let report = env_projection::project(&repo.root, &repo.config.env, repo.context, &targets, false)
            .context("environment projection failed")?;

        if let Some(write) = &report.editor {
            print_writes(repo, std::slice::from_ref(write), false);
        }
        if let Some(ci) = &report.ci {
            println!(
                "{} {} line(s) appended to {}",
                "✓".green(),
                ci.appended.len(),
                ci.path.display()
            );
        }
        Ok(())
    }
}
