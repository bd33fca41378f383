//! The external command boundary.
//!
//! Every invocation of uv, copier, git, pre-commit, code or an installer goes
//! through [`CommandRunner`]. [`SystemRunner`] spawns real processes;
//! [`RecordingRunner`] records what would have run and replays scripted
//! outputs, which backs both `--dry-run` and the test suites.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Command description
// ---------------------------------------------------------------------------

/// A command to run: program, arguments, extra env, working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    /// Capture stdout/stderr instead of inheriting the terminal.
    pub capture: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            capture: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn captured(mut self) -> Self {
        self.capture = true;
        self
    }

    /// Program file stem plus arguments, e.g. `uv sync --upgrade`.
    ///
    /// Absolute program paths collapse to their stem so scripted responses
    /// and log lines do not depend on where a binary was found.
    pub fn short_display(&self) -> String {
        let stem = Path::new(&self.program)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.clone());
        join_words(std::iter::once(stem.as_str()).chain(self.args.iter().map(String::as_str)))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        f.write_str(&join_words(words))
    }
}

fn join_words<'a>(words: impl Iterator<Item = &'a str>) -> String {
    words
        .map(|w| {
            if w.is_empty() || w.contains(char::is_whitespace) {
                format!("\"{w}\"")
            } else {
                w.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Exit status plus captured output. Output is empty for inherited stdio.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

// ---------------------------------------------------------------------------
// Runner trait
// ---------------------------------------------------------------------------

/// Run an external command and report its exit code.
///
/// Spawn failures are errors; a non-zero exit is a normal [`CommandOutput`]
/// so callers decide what is fatal.
pub trait CommandRunner {
    fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput, CoreError>;
}

/// Spawns real processes with `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CoreError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }

        let spawn_err = |source| CoreError::Spawn {
            program: spec.program.clone(),
            source,
        };

        if spec.capture {
            cmd.stdin(Stdio::null());
            let output = cmd.output().map_err(spawn_err)?;
            Ok(CommandOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        } else {
            let status = cmd.status().map_err(spawn_err)?;
            Ok(CommandOutput {
                code: status.code(),
                ..Default::default()
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Recording runner
// ---------------------------------------------------------------------------

struct Scripted {
    prefix: String,
    outputs: VecDeque<Result<CommandOutput, std::io::ErrorKind>>,
}

/// Records every command and answers from a script instead of spawning.
///
/// Responses are matched by prefix against [`CommandSpec::short_display`].
/// Queued responses for one prefix are consumed in order; the last one keeps
/// answering. Unmatched commands succeed with empty output.
#[derive(Default)]
pub struct RecordingRunner {
    calls: RefCell<Vec<CommandSpec>>,
    script: RefCell<Vec<Scripted>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `output` for commands starting with `prefix`.
    pub fn on(self, prefix: impl Into<String>, output: CommandOutput) -> Self {
        self.push(prefix.into(), Ok(output));
        self
    }

    /// Make commands starting with `prefix` fail to spawn (program not installed).
    pub fn missing(self, prefix: impl Into<String>) -> Self {
        self.push(prefix.into(), Err(std::io::ErrorKind::NotFound));
        self
    }

    fn push(&self, prefix: String, output: Result<CommandOutput, std::io::ErrorKind>) {
        let mut script = self.script.borrow_mut();
        match script.iter_mut().find(|s| s.prefix == prefix) {
            Some(entry) => entry.outputs.push_back(output),
            None => script.push(Scripted {
                prefix,
                outputs: VecDeque::from([output]),
            }),
        }
    }

    /// Every command run so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.borrow().clone()
    }

    /// [`CommandSpec::short_display`] of every command run so far.
    pub fn commands(&self) -> Vec<String> {
        self.calls.borrow().iter().map(CommandSpec::short_display).collect()
    }

    fn respond(&self, line: &str) -> Option<Result<CommandOutput, std::io::ErrorKind>> {
        let mut script = self.script.borrow_mut();
        let entry = script
            .iter_mut()
            .filter(|s| line.starts_with(&s.prefix))
            .max_by_key(|s| s.prefix.len())?;
        if entry.outputs.len() > 1 {
            entry.outputs.pop_front()
        } else {
            entry.outputs.front().cloned()
        }
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput, CoreError> {
        let line = cmd.short_display();
        tracing::debug!("recorded: {line}");
        self.calls.borrow_mut().push(cmd.clone());
        match self.respond(&line) {
            Some(Ok(output)) => Ok(output),
            Some(Err(kind)) => Err(CoreError::Spawn {
                program: cmd.program.clone(),
                source: std::io::Error::from(kind),
            }),
            None => Ok(CommandOutput::ok("")),
        }
    }
}

// ---------------------------------------------------------------------------
// Dry-run runner
// ---------------------------------------------------------------------------

/// Lets read-only probes through and records everything else.
///
/// Captured commands (`--version`, `--list-extensions`, `git status
/// --porcelain`) only ever query state, so they run for real against `inner`.
/// Inherited-stdio commands mutate the machine; they are logged, recorded and
/// reported as successful without running.
pub struct DryRunRunner<'a> {
    inner: &'a dyn CommandRunner,
    skipped: RefCell<Vec<CommandSpec>>,
}

impl<'a> DryRunRunner<'a> {
    pub fn new(inner: &'a dyn CommandRunner) -> Self {
        Self {
            inner,
            skipped: RefCell::new(Vec::new()),
        }
    }

    /// Commands that would have run, in order.
    pub fn skipped(&self) -> Vec<CommandSpec> {
        self.skipped.borrow().clone()
    }
}

impl CommandRunner for DryRunRunner<'_> {
    fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput, CoreError> {
        if cmd.capture {
            return self.inner.run(cmd);
        }
        tracing::info!("[dry-run] would run: {cmd}");
        self.skipped.borrow_mut().push(cmd.clone());
        Ok(CommandOutput::ok(""))
    }
}
