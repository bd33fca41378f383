//! `devsync dev ...`: local development config helpers.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use devsync_sync::dev_configs;

use super::{print_writes, Repo};

#[derive(Subcommand, Debug)]
pub enum DevCommand {
    /// Regenerate pytest.ini from pyproject.toml with concurrency disabled.
    SyncLocalConfigs(DryRunArg),

    /// Write the pyright config with warnings promoted to errors.
    ElevatePyright(DryRunArg),

    /// List the GitHub Actions used by the workflows, one `name@*,` per line.
    Actions,
}

#[derive(Args, Debug)]
pub struct DryRunArg {
    #[arg(long)]
    pub dry_run: bool,
}

pub fn run(cmd: DevCommand, repo: &Repo) -> Result<()> {
    match cmd {
        DevCommand::SyncLocalConfigs(args) => {
            let written = dev_configs::sync_local_dev_configs(&repo.root, args.dry_run)
                .context("failed to regenerate local configs")?;
            match written {
                Some(write) => print_writes(repo, &[write], args.dry_run),
                None => println!("No pytest options in pyproject.toml; nothing to do."),
            }
        }
        DevCommand::ElevatePyright(args) => {
            let written =
                dev_configs::elevate_pyright_warnings(&repo.root, repo.context.ci, args.dry_run)
                    .context("failed to write pyright config")?;
            match written {
                Some(write) => print_writes(repo, &[write], args.dry_run),
                None => println!("No pyright options in pyproject.toml; nothing to do."),
            }
        }
        DevCommand::Actions => {
            for action in dev_configs::get_actions(&repo.root).context("failed to scan workflows")? {
                println!("{action}");
            }
        }
    }
    Ok(())
}
