//! `devsync bootstrap`: install the pinned package manager.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use devsync_core::{CommandRunner, DryRunRunner, Platform, SystemRunner};
use devsync_sync::bootstrap::{self, BootstrapOutcome};

use super::{dry_run_prefix, Repo};

#[derive(Args, Debug)]
pub struct BootstrapArgs {
    /// Report whether the installer would run, without running it.
    #[arg(long)]
    pub dry_run: bool,
}

impl BootstrapArgs {
    pub fn run(self, repo: &Repo) -> Result<()> {
        let system = SystemRunner;
        let dry = DryRunRunner::new(&system);
        let runner: &dyn CommandRunner = if self.dry_run { &dry } else { &system };

        let outcome = bootstrap::ensure(
            &repo.root,
            &repo.config,
            runner,
            Platform::current(),
            self.dry_run,
        )
        .with_context(|| format!("bootstrap of '{}' failed", repo.config.bootstrap.tool))?;

        let prefix = dry_run_prefix(self.dry_run);
        let tool = &repo.config.bootstrap.tool;
        match outcome {
            BootstrapOutcome::AlreadyPinned { version, program } => {
                println!("{prefix}{} {tool} {version} ({program})", "✓".green());
            }
            BootstrapOutcome::Installed {
                previous,
                version,
                program,
            } => println!(
                "{prefix}{} installed {tool} {version} ({program}), was {}",
                "✓".green(),
                previous.as_deref().unwrap_or("not installed")
            ),
            BootstrapOutcome::WouldInstall { previous, version } => println!(
                "{prefix}would install {tool} {}, currently {}",
                version.yellow(),
                previous.as_deref().unwrap_or("not installed")
            ),
        }
        Ok(())
    }
}
