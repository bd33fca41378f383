//! Task runner dispatch.
//!
//! A task is an external command prefix or a built-in step, plus the tasks
//! that must run before it. `plan` flattens the prerequisites depth-first in
//! post-order so shared prerequisites run once:
//!
//! ```text
//! docs ─▶ sync ─▶ bootstrap ─▶ project-env
//! pytest ─┘
//!
//! plan("docs") = [project-env, bootstrap, sync, docs]
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use devsync_core::config::TaskSpec;
use devsync_core::{BuiltinStep, CommandRunner, CommandSpec, TaskName};
use serde::Serialize;

use crate::command::run_checked;
use crate::error::SyncError;

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// What a task does when it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TaskAction {
    /// Argv prefix; trailing arguments are appended.
    Command(Vec<String>),
    Step(BuiltinStep),
}

/// A named entry in the task table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub name: TaskName,
    pub action: TaskAction,
    pub deps: Vec<TaskName>,
    pub description: String,
}

impl Task {
    fn command(name: &str, argv: &[&str], deps: &[&str], description: &str) -> Self {
        Self {
            name: TaskName::from(name),
            action: TaskAction::Command(argv.iter().map(|s| s.to_string()).collect()),
            deps: deps.iter().copied().map(TaskName::from).collect(),
            description: description.to_string(),
        }
    }

    fn step(name: &str, step: BuiltinStep, deps: &[&str], description: &str) -> Self {
        Self {
            name: TaskName::from(name),
            action: TaskAction::Step(step),
            deps: deps.iter().copied().map(TaskName::from).collect(),
            description: description.to_string(),
        }
    }

    /// Human-readable form of the action, for listings.
    pub fn action_display(&self) -> String {
        match &self.action {
            TaskAction::Command(argv) => argv.join(" "),
            TaskAction::Step(step) => format!("<{step}>"),
        }
    }
}

/// Every task known to this repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTable {
    tasks: BTreeMap<String, Task>,
}

impl TaskTable {
    /// The built-in tasks.
    pub fn builtin() -> Self {
        let tasks = [
            Task::step("project-env", BuiltinStep::ProjectEnv, &[], "Project .dev/env.json into the process, editor and CI"),
            Task::step("bootstrap", BuiltinStep::Bootstrap, &["project-env"], "Install the pinned package manager if needed"),
            Task::step("sync", BuiltinStep::Sync, &["bootstrap"], "Sync dependencies, local configs and hooks"),
            Task::step("template", BuiltinStep::Template, &[], "Pull updates from the project template"),
            Task::step("couple", BuiltinStep::Couple, &[], "Rewrite coupled pins in requirement files"),
            Task::step("local-configs", BuiltinStep::LocalConfigs, &[], "Regenerate pytest.ini and the pyright shadow config"),
            Task::command("run", &["uv", "run"], &["sync"], "Run a command in the project environment"),
            Task::command("lint", &["pre-commit", "run", "--verbose"], &[], "Run pre-commit hooks"),
            Task::command("docs", &["sphinx-build", "-EaT", "docs", "_site"], &["sync"], "Build the documentation"),
            Task::command("build", &["uv", "build"], &[], "Build distributions"),
            Task::command("pytest", &["uv", "run", "pytest"], &["sync"], "Run the test suite"),
        ];
        Self {
            tasks: tasks
                .into_iter()
                .map(|t| (t.name.0.clone(), t))
                .collect(),
        }
    }

    /// Built-ins plus `devsync.yaml` tasks; same-named user tasks win.
    ///
    /// A user task with neither `run` nor `step` is skipped with a warning.
    pub fn from_config(specs: &BTreeMap<String, TaskSpec>) -> Self {
        let mut table = Self::builtin();
        for (name, spec) in specs {
            let action = if !spec.run.is_empty() {
                TaskAction::Command(spec.run.clone())
            } else if let Some(step) = spec.step {
                TaskAction::Step(step)
            } else {
                tracing::warn!("task '{name}' has neither `run` nor `step`; ignoring it");
                continue;
            };
            table.tasks.insert(
                name.clone(),
                Task {
                    name: TaskName::from(name.as_str()),
                    action,
                    deps: spec.deps.iter().map(|d| TaskName::from(d.as_str())).collect(),
                    description: spec.description.clone().unwrap_or_default(),
                },
            );
        }
        table
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    /// Tasks in name order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Prerequisites first, each once, ending with `name`.
    pub fn plan(&self, name: &str) -> Result<Vec<&Task>, SyncError> {
        let mut order = Vec::new();
        let mut done = BTreeSet::new();
        let mut chain = Vec::new();
        self.visit(name, &mut chain, &mut done, &mut order)?;
        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        name: &str,
        chain: &mut Vec<String>,
        done: &mut BTreeSet<String>,
        order: &mut Vec<&'a Task>,
    ) -> Result<(), SyncError> {
        if done.contains(name) {
            return Ok(());
        }
        if let Some(pos) = chain.iter().position(|n| n == name) {
            let mut cycle = chain[pos..].to_vec();
            cycle.push(name.to_string());
            return Err(SyncError::TaskCycle {
                chain: cycle.join(" -> "),
            });
        }
        let task = self.get(name).ok_or_else(|| SyncError::UnknownTask {
            name: name.to_string(),
        })?;

        chain.push(name.to_string());
        for dep in &task.deps {
            self.visit(&dep.0, chain, done, order)?;
        }
        chain.pop();

        done.insert(name.to_string());
        order.push(task);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Runs the built-in steps on behalf of the dispatcher.
pub trait StepExecutor {
    /// Run `step`. `args` are the trailing arguments when the step is the
    /// requested task, empty for prerequisites.
    fn run_step(&mut self, step: BuiltinStep, args: &[String]) -> Result<(), SyncError>;

    /// Program to spawn for a command task's first word.
    fn resolve_program(&self, program: &str) -> String {
        program.to_string()
    }
}

/// Run `name` and its prerequisites. Trailing `args` go to `name` only.
///
/// Returns the tasks that ran, in order. The first failure aborts the chain.
pub fn dispatch(
    table: &TaskTable,
    name: &str,
    args: &[String],
    root: &Path,
    runner: &dyn CommandRunner,
    steps: &mut dyn StepExecutor,
) -> Result<Vec<TaskName>, SyncError> {
    let plan = table.plan(name)?;
    let mut ran = Vec::with_capacity(plan.len());

    for task in plan {
        let forwarded: &[String] = if task.name.0 == name { args } else { &[] };
        tracing::info!("task: {}", task.name);
        match &task.action {
            TaskAction::Step(step) => steps.run_step(*step, forwarded)?,
            TaskAction::Command(argv) => {
                let Some((program, rest)) = argv.split_first() else {
                    continue;
                };
                let cmd = CommandSpec::new(steps.resolve_program(program))
                    .args(rest.iter().cloned())
                    .args(forwarded.iter().cloned())
                    .current_dir(root);
                run_checked(runner, &cmd)?;
            }
        }
        ran.push(task.name.clone());
    }
    Ok(ran)
}
