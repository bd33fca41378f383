//! Template sync: pull upstream template changes with copier.
//!
//! | recopy | prompt | command |
//! |---|---|---|
//! | no  | no  | `copier update --defaults --vcs-ref <ref>` |
//! | no  | yes | `copier update --vcs-ref <ref>` |
//! | yes | no  | `copier recopy --overwrite --defaults` |
//! | yes | yes | `copier recopy --overwrite --vcs-ref <ref>` |
//!
//! A failing first attempt gets exactly one recovery: stash local edits,
//! retry the same command, pop the stash.

use std::path::Path;

use devsync_core::answers;
use devsync_core::config::TemplateConfig;
use devsync_core::{CommandRunner, CommandSpec};
use serde::Serialize;

use crate::command::run_checked;
use crate::error::SyncError;

const COPIER: &str = "copier";

/// Options for one template sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateRequest {
    /// Target ref; the configured default when `None`.
    pub vcs_ref: Option<String>,
    /// Ask the template questions again instead of using recorded answers.
    pub prompt: bool,
    /// Regenerate from scratch, ignoring the recorded diff.
    pub recopy: bool,
    /// Stay on the template commit recorded in the answers file.
    pub stay: bool,
    /// Commit the result.
    pub commit: bool,
}

/// What [`sync_template`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateOutcome {
    pub vcs_ref: String,
    pub command: String,
    /// The first attempt failed and the stash/retry recovery succeeded.
    pub recovered: bool,
    pub committed: bool,
}

/// The copier invocation for a (recopy, prompt) combination.
pub fn copier_command(recopy: bool, prompt: bool, vcs_ref: &str) -> CommandSpec {
    let cmd = CommandSpec::new(COPIER);
    match (recopy, prompt) {
        (false, false) => cmd.args(["update", "--defaults", "--vcs-ref", vcs_ref]),
        (false, true) => cmd.args(["update", "--vcs-ref", vcs_ref]),
        (true, false) => cmd.args(["recopy", "--overwrite", "--defaults"]),
        (true, true) => cmd.args(["recopy", "--overwrite", "--vcs-ref", vcs_ref]),
    }
}

/// The ref to sync to. Stay mode reads the recorded template commit.
pub fn resolve_ref(
    root: &Path,
    config: &TemplateConfig,
    request: &TemplateRequest,
) -> Result<String, SyncError> {
    if request.stay {
        let recorded = answers::load_at(root, &config.answers_file)?;
        return Ok(recorded.commit_hash()?);
    }
    Ok(request
        .vcs_ref
        .clone()
        .unwrap_or_else(|| config.default_ref.clone()))
}

fn git(root: &Path, args: &[&str]) -> CommandSpec {
    CommandSpec::new("git")
        .args(args.iter().copied())
        .current_dir(root)
}

fn is_dirty(root: &Path, runner: &dyn CommandRunner) -> Result<bool, SyncError> {
    let status = run_checked(runner, &git(root, &["status", "--porcelain"]).captured())?;
    Ok(!status.stdout.trim().is_empty())
}

/// Run copier, recovering once from a failure, then optionally commit.
pub fn sync_template(
    root: &Path,
    config: &TemplateConfig,
    request: &TemplateRequest,
    runner: &dyn CommandRunner,
) -> Result<TemplateOutcome, SyncError> {
    let vcs_ref = resolve_ref(root, config, request)?;
    let cmd = copier_command(request.recopy, request.prompt, &vcs_ref).current_dir(root);

    tracing::info!("running: {cmd}");
    let first = runner.run(&cmd)?;
    let recovered = if first.success() {
        false
    } else {
        tracing::warn!(
            "template sync failed (exit code {:?}); stashing local changes and retrying",
            first.code
        );
        retry_with_stash(root, &cmd, runner)?;
        true
    };

    let committed = request.commit && commit(root, &vcs_ref, runner)?;
    Ok(TemplateOutcome {
        vcs_ref,
        command: cmd.short_display(),
        recovered,
        committed,
    })
}

fn retry_with_stash(
    root: &Path,
    cmd: &CommandSpec,
    runner: &dyn CommandRunner,
) -> Result<(), SyncError> {
    let stashed = is_dirty(root, runner)?;
    if stashed {
        run_checked(runner, &git(root, &["stash", "save"]))?;
    }

    let retry = run_checked(runner, cmd);
    if stashed {
        let pop = run_checked(runner, &git(root, &["stash", "pop"]));
        match (&retry, pop) {
            (Ok(_), pop) => pop.map(|_| ())?,
            (Err(_), Err(pop_err)) => {
                tracing::warn!("could not restore stashed changes: {pop_err}; run `git stash pop` by hand");
            }
            (Err(_), Ok(_)) => {}
        }
    }
    retry.map(|_| ())
}

fn commit(root: &Path, vcs_ref: &str, runner: &dyn CommandRunner) -> Result<bool, SyncError> {
    if !is_dirty(root, runner)? {
        tracing::info!("template sync left the tree clean; nothing to commit");
        return Ok(false);
    }
    run_checked(runner, &git(root, &["add", "--all"]))?;
    let message = format!("Sync with template at {vcs_ref}");
    run_checked(
        runner,
        &git(root, &["commit", "--no-verify", "-m", &message]),
    )?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(false, false, "copier update --defaults --vcs-ref v1.2.0")]
    #[case(false, true, "copier update --vcs-ref v1.2.0")]
    #[case(true, false, "copier recopy --overwrite --defaults")]
    #[case(true, true, "copier recopy --overwrite --vcs-ref v1.2.0")]
    fn command_table(#[case] recopy: bool, #[case] prompt: bool, #[case] expected: &str) {
        assert_eq!(copier_command(recopy, prompt, "v1.2.0").short_display(), expected);
    }

    #[test]
    fn default_ref_comes_from_config() {
        let config = TemplateConfig::default();
        let vcs_ref = resolve_ref(Path::new("."), &config, &TemplateRequest::default()).unwrap();
        assert_eq!(vcs_ref, "HEAD");
    }
}
