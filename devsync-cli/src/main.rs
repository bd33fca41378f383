//! devsync: keep a templated Python repository's dev environment in sync.
//!
//! # Usage
//!
//! ```text
//! devsync [--repo <dir>] [-v|-q] <command>
//! devsync sync [--high] [--template] [--dry-run] [--json] [-- <uv sync args>...]
//! devsync bootstrap [--dry-run]
//! devsync env [--editor] [--ci] [--print]
//! devsync versions list|check
//! devsync versions bump <tool> <version> [--dry-run]
//! devsync versions couple [--dry-run]
//! devsync template [--ref <ref>] [--prompt] [--recopy] [--stay] [--no-commit] [--dry-run]
//! devsync dev sync-local-configs | elevate-pyright | actions
//! devsync tasks
//! devsync run <task> [-- <args>...]
//! ```

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

use commands::{
    bootstrap::BootstrapArgs, dev::DevCommand, env::EnvArgs, run::RunArgs, sync::SyncArgs,
    tasks::TasksArgs, template::TemplateArgs, versions::VersionsCommand, Repo,
};
use devsync_sync::SyncError;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "devsync",
    version,
    about = "Sync a templated repository's tools, dependencies and environment",
    long_about = None,
)]
struct Cli {
    /// Repository root. Defaults to the nearest ancestor holding devsync.yaml or .git.
    #[arg(long, global = true, env = "DEVSYNC_REPO", value_name = "DIR")]
    repo: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Project env, bootstrap, sync dependencies and install hooks.
    Sync(SyncArgs),

    /// Install the pinned package manager if needed.
    Bootstrap(BootstrapArgs),

    /// Project .dev/env.json into the editor and CI.
    Env(EnvArgs),

    /// Inspect and bump pinned tool versions.
    Versions {
        #[command(subcommand)]
        command: VersionsCommand,
    },

    /// Pull updates from the project template.
    Template(TemplateArgs),

    /// Local development config helpers.
    Dev {
        #[command(subcommand)]
        command: DevCommand,
    },

    /// List the task table.
    Tasks(TasksArgs),

    /// Run a task and its prerequisites.
    Run(RunArgs),
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn init_tracing(verbose: bool, quiet: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn dispatch(cli: Cli) -> Result<()> {
    let repo = Repo::open(cli.repo)?;
    match cli.command {
        Commands::Sync(args) => args.run(&repo),
        Commands::Bootstrap(args) => args.run(&repo),
        Commands::Env(args) => args.run(&repo),
        Commands::Versions { command } => commands::versions::run(command, &repo),
        Commands::Template(args) => args.run(&repo),
        Commands::Dev { command } => commands::dev::run(command, &repo),
        Commands::Tasks(args) => args.run(&repo),
        Commands::Run(args) => args.run(&repo),
    }
}

/// The wrapped command's exit code when one failed, otherwise 1.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<SyncError>())
        .and_then(SyncError::exit_code)
        .and_then(|code| u8::try_from(code).ok())
        .filter(|code| *code != 0)
        .unwrap_or(1)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::from(exit_code_for(&err))
        }
    }
}
