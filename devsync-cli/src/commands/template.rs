//! `devsync template`: pull updates from the project template.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use devsync_core::{CommandRunner, DryRunRunner, SystemRunner};
use devsync_sync::template::{self, TemplateRequest};

use super::{dry_run_prefix, Repo};

#[derive(Args, Debug)]
pub struct TemplateArgs {
    /// Template ref to sync to. Defaults to `template.default_ref`.
    #[arg(long = "ref", value_name = "REF", conflicts_with = "stay")]
    pub vcs_ref: Option<String>,

    /// Answer the template questions again.
    #[arg(long)]
    pub prompt: bool,

    /// Regenerate from scratch instead of applying the template diff.
    #[arg(long)]
    pub recopy: bool,

    /// Stay on the template commit recorded in the answers file.
    #[arg(long)]
    pub stay: bool,

    /// Leave the result uncommitted.
    #[arg(long)]
    pub no_commit: bool,

    /// Log the copier and git commands without running them.
    #[arg(long)]
    pub dry_run: bool,
}

impl TemplateArgs {
    pub fn run(self, repo: &Repo) -> Result<()> {
        let system = SystemRunner;
        let dry = DryRunRunner::new(&system);
        let runner: &dyn CommandRunner = if self.dry_run { &dry } else { &system };

        let request = TemplateRequest {
            vcs_ref: self.vcs_ref,
            prompt: self.prompt,
            recopy: self.recopy,
            stay: self.stay,
            commit: !self.no_commit,
        };
        let outcome = template::sync_template(&repo.root, &repo.config.template, &request, runner)
            .context("template sync failed")?;

        let prefix = dry_run_prefix(self.dry_run);
        println!(
            "{prefix}{} template synced to {}",
            "✓".green(),
            outcome.vcs_ref.bold()
        );
        if outcome.recovered {
            println!("{prefix}  recovered by stashing local changes and retrying");
        }
        if outcome.committed {
            println!("{prefix}  committed");
        }
        Ok(())
    }
}
