//! `devsync run <task> [-- <args>...]`

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use devsync_core::SystemRunner;
use devsync_sync::{tasks, Pipeline, TaskTable};

use super::Repo;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Task name, as listed by `devsync tasks`.
    pub task: String,

    /// Arguments appended to the task's command.
    #[arg(last = true)]
    pub args: Vec<String>,
}

impl RunArgs {
    pub fn run(self, repo: &Repo) -> Result<()> {
        let table = TaskTable::from_config(&repo.config.tasks);
        let runner = SystemRunner;
        let mut pipeline = Pipeline::new(repo.root.clone(), repo.config.clone(), repo.context, &runner)
            .with_host(repo.host_env());

        let ran = tasks::dispatch(&table, &self.task, &self.args, &repo.root, &runner, &mut pipeline)
            .with_context(|| format!("task '{}' failed", self.task))?;
        tracing::debug!(
            "ran {}",
            ran.iter().map(|t| t.0.as_str()).collect::<Vec<_>>().join(", ")
        );
        eprintln!("{} {}", "✓".green(), self.task.bold());
        Ok(())
    }
}
