//! `devsync sync`: the full chain.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use devsync_core::{CommandRunner, DryRunRunner, SystemRunner};
use devsync_sync::{BootstrapOutcome, Pipeline, SyncOptions, SyncReport, TemplateRequest};

use super::{dry_run_prefix, print_json, print_writes, Repo};

/// Arguments for `devsync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Prefer the highest compatible dependency versions.
    #[arg(long, env = "DEVSYNC_HIGH")]
    pub high: bool,

    /// Also pull updates from the project template and commit them.
    #[arg(long)]
    pub template: bool,

    /// Report what would change without writing files or running installers.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the sync report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Extra arguments forwarded to `uv sync`.
    #[arg(last = true)]
    pub extra: Vec<String>,
}

impl SyncArgs {
    pub fn run(self, repo: &Repo) -> Result<()> {
        let system = SystemRunner;
        let dry = DryRunRunner::new(&system);
        let runner: &dyn CommandRunner = if self.dry_run { &dry } else { &system };

        let options = SyncOptions {
            high: self.high,
            template: self.template.then(|| TemplateRequest {
                commit: true,
                ..Default::default()
            }),
            dry_run: self.dry_run,
        };
        let mut pipeline = Pipeline::new(
            repo.root.clone(),
            repo.config.clone(),
            repo.context,
            runner,
        )
        .with_host(repo.host_env())
        .with_options(options);

        let report = pipeline.run(&self.extra).context("sync failed")?;
        if self.json {
            return print_json(&report);
        }
        print_report(repo, &report);
        Ok(())
    }
}

fn print_report(repo: &Repo, report: &SyncReport) {
    let prefix = dry_run_prefix(report.dry_run);

    println!(
        "{prefix}{} {} ({}, {} ms)",
        "✓".green(),
        "synced".bold(),
        report.context,
        report.duration_ms
    );
    println!("{prefix}  env: {} variable(s)", report.env.count);
    if let Some(ci) = &report.env.ci {
        println!(
            "{prefix}  env: {} line(s) appended to {}",
            ci.appended.len(),
            ci.path.display()
        );
    }
    match &report.bootstrap {
        BootstrapOutcome::AlreadyPinned { version, .. } => {
            println!("{prefix}  bootstrap: {version} already installed");
        }
        BootstrapOutcome::Installed { version, .. } => {
            println!("{prefix}  bootstrap: installed {}", version.green());
        }
        BootstrapOutcome::WouldInstall { version, .. } => {
            println!("{prefix}  bootstrap: would install {}", version.yellow());
        }
    }
    for extension in &report.deps.installed_extensions {
        println!("{prefix}  extension: {extension}");
    }
    if report.deps.high {
        println!("{prefix}  deps: high mode (--upgrade)");
    }
    if let Some(artifact) = &report.deps.lock_exported {
        println!("{prefix}  deps: exported {}", artifact.display());
    }

    let mut writes = report.deps.local_configs.clone();
    writes.extend(report.env.editor.clone());
    print_writes(repo, &writes, report.dry_run);

    if let Some(template) = &report.template {
        println!(
            "{prefix}  template: {}{}",
            template.vcs_ref,
            if template.committed { " (committed)" } else { "" }
        );
    }
    if report.hooks_installed {
        println!("{prefix}  hooks: installed");
    }
}
