//! `devsync versions list|check|bump|couple`

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use devsync_core::{config, CommandRunner, DryRunRunner, SystemRunner};
use devsync_sync::versions::{self, ToolVersions};
use devsync_sync::{Pipeline, SyncOptions};
use tabled::{settings::Style, Table, Tabled};

use super::{dry_run_prefix, print_diffs, print_writes, Repo};

/// Inspect and bump pinned tool versions.
#[derive(Subcommand, Debug)]
pub enum VersionsCommand {
    /// Every pinned tool with the values found in the repository.
    List,

    /// Fail when copies of a version disagree.
    Check,

    /// Rewrite every occurrence of a tool's version.
    Bump(BumpArgs),

    /// Make follower pins and submodule commits track their leaders.
    Couple(CoupleArgs),
}

#[derive(Args, Debug)]
pub struct BumpArgs {
    /// Tool name as the update-bot rules name it (e.g. `uv`, `python`).
    pub tool: String,

    /// New version.
    pub version: String,

    /// Show the diff without writing.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct CoupleArgs {
    /// Show the diff without writing.
    #[arg(long)]
    pub dry_run: bool,
}

pub fn run(cmd: VersionsCommand, repo: &Repo) -> Result<()> {
    match cmd {
        VersionsCommand::List => list(repo),
        VersionsCommand::Check => check(repo),
        VersionsCommand::Bump(args) => bump(repo, args),
        VersionsCommand::Couple(args) => couple(repo, args),
    }
}

#[derive(Tabled)]
struct VersionRow {
    #[tabled(rename = "Tool")]
    tool: String,
    #[tabled(rename = "Pinned")]
    pinned: String,
    #[tabled(rename = "Found")]
    found: String,
    #[tabled(rename = "Locations")]
    locations: String,
}

fn summary(repo: &Repo) -> Result<Vec<ToolVersions>> {
    let rules = versions::load_rules(&repo.root, &repo.config.renovate)
        .context("failed to load version rules")?;
    let occurrences =
        versions::find_occurrences(&repo.root, &rules).context("failed to scan for versions")?;
    Ok(versions::summarize(&occurrences, &repo.config.versions))
}

fn list(repo: &Repo) -> Result<()> {
    let tools = summary(repo)?;
    if tools.is_empty() {
        println!("No pinned versions found.");
        return Ok(());
    }
    let rows: Vec<VersionRow> = tools
        .iter()
        .map(|t| VersionRow {
            tool: t.tool.clone(),
            pinned: t.pinned.clone().unwrap_or_else(|| "-".to_string()),
            found: t.values.iter().cloned().collect::<Vec<_>>().join(", "),
            locations: t.locations.join("\n"),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn check(repo: &Repo) -> Result<()> {
    let drifted: Vec<ToolVersions> = summary(repo)?
        .into_iter()
        .filter(|t| !t.consistent())
        .collect();
    if drifted.is_empty() {
        println!("{} all pinned versions agree", "✓".green());
        return Ok(());
    }
    for tool in &drifted {
        println!(
            "{} {}: pinned {}, found {}",
            "✗".red(),
            tool.tool.bold(),
            tool.pinned.as_deref().unwrap_or("-"),
            tool.values.iter().cloned().collect::<Vec<_>>().join(", ")
        );
        for location in &tool.locations {
            println!("    {location}");
        }
    }
    bail!("{} tool(s) with inconsistent versions", drifted.len())
}

fn bump(repo: &Repo, args: BumpArgs) -> Result<()> {
    let rules = versions::load_rules(&repo.root, &repo.config.renovate)
        .context("failed to load version rules")?;
    let plan = versions::plan_bump(&repo.root, &rules, &args.tool, &args.version)
        .with_context(|| format!("cannot bump '{}'", args.tool))?;

    let prefix = dry_run_prefix(args.dry_run);
    if plan.is_noop() {
        println!(
            "{prefix}{} {} already at {} ({} occurrence(s))",
            "✓".green(),
            plan.tool,
            plan.target,
            plan.occurrences
        );
    } else {
        let outcome = versions::apply(&repo.root, &plan, args.dry_run)
            .with_context(|| format!("failed to write bump of '{}'", args.tool))?;
        print_diffs(&outcome.diffs);
        print_writes(repo, &outcome.writes, args.dry_run);
    }

    if repo.config.pin(&args.tool).is_some_and(|pin| pin != args.version) {
        if args.dry_run {
            println!("{prefix}would update the {} pin in devsync.yaml", args.tool);
        } else {
            config::set_pin_at(&repo.root, &args.tool, &args.version)
                .context("failed to update devsync.yaml")?;
            println!("  updated the {} pin in devsync.yaml", args.tool);
        }
    }
    Ok(())
}

fn couple(repo: &Repo, args: CoupleArgs) -> Result<()> {
    let system = SystemRunner;
    let dry = DryRunRunner::new(&system);
    let runner: &dyn CommandRunner = if args.dry_run { &dry } else { &system };
    let mut pipeline = Pipeline::new(repo.root.clone(), repo.config.clone(), repo.context, runner)
        .with_options(SyncOptions {
            dry_run: args.dry_run,
            ..Default::default()
        });

    let outcome = pipeline.couple().context("failed to update coupled pins")?;
    if outcome.writes.is_empty() {
        println!("{} coupled pins already in step", "✓".green());
        return Ok(());
    }
    print_diffs(&outcome.diffs);
    print_writes(repo, &outcome.writes, args.dry_run);
    Ok(())
}
