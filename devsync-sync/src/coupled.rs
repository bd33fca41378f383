//! Coupled pins: versions and commits that must follow another value.
//!
//! Two kinds of coupling are rewritten in requirement files
//! (`pyproject.toml`, `.tools/requirements/requirements*.txt`):
//!
//! - follower versions: `pandas-stubs~=X` tracks whatever `pandas==X` says;
//! - submodule commits: `pkg@git+https://github.com/org/pkg@<commit>` tracks
//!   the commit git records for the `pkg` submodule.
//!
//! Both regexes accept the optional `"` prefix and `",` suffix of TOML array
//! entries so `pyproject.toml` and plain requirement files share one rule.

use std::path::{Path, PathBuf};

use devsync_core::config::{CoupledConfig, FollowerRule};
use devsync_core::{CommandRunner, CommandSpec};
use regex::{Captures, Regex};
use serde::Serialize;

use crate::command::run_checked;
use crate::diff::{unified_diff, FileDiff};
use crate::error::{io_err, SyncError};
use crate::writer::{write_file, WriteResult};

const RELATION: &str = r"(?P<relation>[=~>]=)";
const PREFIX: &str = r#"(?P<prefix>\s*['"])?"#;
const SUFFIX: &str = r#"(?P<suffix>['"],)?"#;

/// A git submodule and the commit its superproject records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submodule {
    /// Final path component, matched against the package name.
    pub name: String,
    pub commit: String,
}

/// Parse `git submodule status` output.
///
/// Each line is `<flag><sha> <path>[ (<describe>)]` where the flag is a
/// space, `+`, `-` or `U`.
pub fn parse_submodule_status(output: &str) -> Vec<Submodule> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim_start_matches([' ', '+', '-', 'U']);
            let mut parts = line.split_whitespace();
            let commit = parts.next()?;
            let path = parts.next()?;
            let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
            Some(Submodule {
                name: name.to_string(),
                commit: commit.to_string(),
            })
        })
        .collect()
}

/// Submodules of the repository at `root`.
pub fn submodules(root: &Path, runner: &dyn CommandRunner) -> Result<Vec<Submodule>, SyncError> {
    let cmd = CommandSpec::new("git")
        .args(["submodule", "status"])
        .current_dir(root)
        .captured();
    let output = run_checked(runner, &cmd)?;
    Ok(parse_submodule_status(&output.stdout))
}

/// Requirement files to rewrite: the configured files that exist, then
/// `requirements*.txt` in the requirements dir, sorted.
pub fn requirement_files(root: &Path, config: &CoupledConfig) -> Result<Vec<PathBuf>, SyncError> {
    let mut files: Vec<PathBuf> = config
        .files
        .iter()
        .map(|f| root.join(f))
        .filter(|p| p.is_file())
        .collect();

    let dir = root.join(&config.requirements_dir);
    if dir.is_dir() {
        let mut found = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(|e| io_err(&dir, e))? {
            let entry = entry.map_err(|e| io_err(&dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with("requirements") && name.ends_with(".txt") {
                found.push(entry.path());
            }
        }
        found.sort();
        files.extend(found);
    }
    Ok(files)
}

fn compile(pattern: String) -> Result<Regex, SyncError> {
    Regex::new(&pattern).map_err(|source| SyncError::Pattern { pattern, source })
}

fn leader_regex(leader: &str) -> Result<Regex, SyncError> {
    compile(format!(
        r"(?mR)^{PREFIX}{}(\[[\w,]+\])?{RELATION}(?P<version>[\w.]*){SUFFIX}$",
        regex::escape(leader)
    ))
}

fn follower_regex(follower: &str) -> Result<Regex, SyncError> {
    compile(format!(
        r"(?mR)^{PREFIX}(?P<dep>{}){RELATION}(?P<version>[\w.]*){SUFFIX}$",
        regex::escape(follower)
    ))
}

fn submodule_regex() -> Result<Regex, SyncError> {
    compile(format!(
        r"(?mR)^{PREFIX}(?P<name>[\w-]+)@(?P<domain>git\+https://github\.com/)(?P<org>[\w-]+/)(?P<repo>[\w-]+)@(?P<commit>\w+){SUFFIX}$"
    ))
}

fn group<'a>(caps: &'a Captures<'_>, name: &str) -> &'a str {
    caps.name(name).map_or("", |m| m.as_str())
}

/// Apply follower and submodule coupling to one file's text.
pub fn couple_text(
    content: &str,
    followers: &[FollowerRule],
    submodules: &[Submodule],
) -> Result<String, SyncError> {
    let mut text = content.to_string();

    for rule in followers {
        let leader_re = leader_regex(&rule.leader)?;
        let Some(leader) = leader_re
            .captures(&text)
            .map(|caps| group(&caps, "version").to_string())
        else {
            continue;
        };
        let follower = follower_regex(&rule.follower)?;
        text = follower
            .replace_all(&text, |caps: &Captures<'_>| {
                format!(
                    "{}{}{}{leader}{}",
                    group(caps, "prefix"),
                    group(caps, "dep"),
                    group(caps, "relation"),
                    group(caps, "suffix"),
                )
            })
            .into_owned();
    }

    if !submodules.is_empty() {
        let pinned = submodule_regex()?;
        text = pinned
            .replace_all(&text, |caps: &Captures<'_>| {
                let name = group(caps, "name");
                let tracked = submodules
                    .iter()
                    .find(|s| s.name == name && group(caps, "repo") == name);
                match tracked {
                    Some(sub) => format!(
                        "{}{name}@{}{}{name}@{}{}",
                        group(caps, "prefix"),
                        group(caps, "domain"),
                        group(caps, "org"),
                        sub.commit,
                        group(caps, "suffix"),
                    ),
                    None => caps[0].to_string(),
                }
            })
            .into_owned();
    }

    Ok(text)
}

/// What [`couple`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoupleOutcome {
    /// One entry per changed file; unchanged files are left alone.
    pub writes: Vec<WriteResult>,
    pub diffs: Vec<FileDiff>,
}

/// Rewrite coupled pins in every requirement file under `root`.
pub fn couple(
    root: &Path,
    config: &CoupledConfig,
    submodules: &[Submodule],
    dry_run: bool,
) -> Result<CoupleOutcome, SyncError> {
    let mut outcome = CoupleOutcome::default();
    for path in requirement_files(root, config)? {
        let before = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let after = couple_text(&before, &config.followers, submodules)?;
        if after == before {
            continue;
        }
        if dry_run {
            outcome.diffs.extend(unified_diff(root, &path, &before, &after));
        }
        outcome.writes.push(write_file(&path, &after, dry_run)?);
    }
    Ok(outcome)
}
