//! `devsync tasks`: the task table.

use anyhow::Result;
use clap::Args;
use devsync_sync::TaskTable;
use tabled::{settings::Style, Table, Tabled};

use super::{print_json, Repo};

#[derive(Args, Debug)]
pub struct TasksArgs {
    /// Print the table as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "Task")]
    name: String,
    #[tabled(rename = "Runs")]
    action: String,
    #[tabled(rename = "After")]
    deps: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl TasksArgs {
    pub fn run(self, repo: &Repo) -> Result<()> {
        let table = TaskTable::from_config(&repo.config.tasks);
        if self.json {
            return print_json(&table.tasks().collect::<Vec<_>>());
        }
        let rows: Vec<TaskRow> = table
            .tasks()
            .map(|task| TaskRow {
                name: task.name.to_string(),
                action: task.action_display(),
                deps: task
                    .deps
                    .iter()
                    .map(|d| d.0.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                description: task.description.clone(),
            })
            .collect();
        let mut rendered = Table::new(rows);
        rendered.with(Style::rounded());
        println!("{rendered}");
        Ok(())
    }
}
