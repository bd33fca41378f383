//! The `devsync sync` chain and the built-in task steps.
//!
//! ```text
//! project-env ─▶ bootstrap ─▶ deps ─▶ [template] ─▶ hooks
//! ```
//!
//! Every step is a direct synchronous call; the first error aborts the chain.
//! [`Pipeline`] also implements [`StepExecutor`] so `devsync run <task>` runs
//! the same steps with the same inputs.

use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use devsync_core::{BuiltinStep, CommandRunner, ExecContext, Platform, ProjectConfig};
use serde::Serialize;

use crate::bootstrap::{self, BootstrapOutcome};
use crate::coupled::{self, CoupleOutcome};
use crate::deps::{self, DepsReport, DepsRequest};
use crate::dev_configs;
use crate::env_projection::{self, ProjectionReport, Targets};
use crate::error::SyncError;
use crate::tasks::StepExecutor;
use crate::template::{self, TemplateOutcome, TemplateRequest};
use crate::writer::WriteResult;

/// Facts about the host that come from outside the repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostEnv {
    /// CI env file (`GITHUB_ENV`).
    pub github_env: Option<PathBuf>,
    /// Installed editor extensions directory.
    pub extensions_dir: Option<PathBuf>,
    /// Editor CLI; `None` skips extension management.
    pub editor: Option<String>,
}

/// Per-invocation switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOptions {
    pub high: bool,
    /// Run the template step with these options.
    pub template: Option<TemplateRequest>,
    pub dry_run: bool,
}

/// Everything `devsync sync` did.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub context: ExecContext,
    pub dry_run: bool,
    pub env: ProjectionReport,
    pub bootstrap: BootstrapOutcome,
    pub deps: DepsReport,
    pub template: Option<TemplateOutcome>,
    pub hooks_installed: bool,
}

/// One repository, one context, one command runner.
pub struct Pipeline<'a> {
    pub root: PathBuf,
    pub config: ProjectConfig,
    pub context: ExecContext,
    pub platform: Platform,
    pub host: HostEnv,
    pub options: SyncOptions,
    runner: &'a dyn CommandRunner,
    tool_program: Option<String>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        root: PathBuf,
        config: ProjectConfig,
        context: ExecContext,
        runner: &'a dyn CommandRunner,
    ) -> Self {
        Self {
            root,
            config,
            context,
            platform: Platform::current(),
            host: HostEnv::default(),
            options: SyncOptions::default(),
            runner,
            tool_program: None,
        }
    }

    pub fn with_host(mut self, host: HostEnv) -> Self {
        self.host = host;
        self
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    // -----------------------------------------------------------------------
    // The chain
    // -----------------------------------------------------------------------

    /// Run the whole chain.
    pub fn run(&mut self, extra_args: &[String]) -> Result<SyncReport, SyncError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        tracing::info!("sync started ({})", self.context);

        let env = self.project_env()?;
        let bootstrap = self.bootstrap()?;
        let deps = self.sync_deps(extra_args)?;
        let template = match self.options.template.clone() {
            Some(request) => Some(self.template(&request)?),
            None => None,
        };
        let hooks_installed = self.install_hooks()?;

        let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!("sync finished in {duration_ms} ms");
        Ok(SyncReport {
            started_at,
            duration_ms,
            context: self.context,
            dry_run: self.options.dry_run,
            env,
            bootstrap,
            deps,
            template,
            hooks_installed,
        })
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    /// Env projection: process always, editor off CI, env file in CI.
    pub fn project_env(&mut self) -> Result<ProjectionReport, SyncError> {
        let targets = Targets {
            process: true,
            editor: !self.context.ci,
            ci_env_file: if self.context.ci {
                self.host.github_env.clone()
            } else {
                None
            },
        };
        env_projection::project(
            &self.root,
            &self.config.env,
            self.context,
            &targets,
            self.options.dry_run,
        )
    }

    pub fn bootstrap(&mut self) -> Result<BootstrapOutcome, SyncError> {
        let outcome = bootstrap::ensure(
            &self.root,
            &self.config,
            self.runner,
            self.platform,
            self.options.dry_run,
        )?;
        self.tool_program = outcome.program().map(str::to_string);
        Ok(outcome)
    }

    /// The program for the bootstrapped tool, located on demand.
    pub fn tool_program(&self) -> String {
        self.tool_program
            .clone()
            .unwrap_or_else(|| bootstrap::tool_program(&self.root, &self.config, self.platform))
    }

    pub fn sync_deps(&mut self, extra_args: &[String]) -> Result<DepsReport, SyncError> {
        let request = DepsRequest {
            root: &self.root,
            config: &self.config,
            context: self.context,
            high: self.options.high,
            uv: self.tool_program(),
            editor: self.host.editor.clone(),
            extensions_dir: self.host.extensions_dir.clone(),
            extra_args: extra_args.to_vec(),
            dry_run: self.options.dry_run,
        };
        deps::sync_dependencies(&request, self.runner)
    }

    pub fn template(&mut self, request: &TemplateRequest) -> Result<TemplateOutcome, SyncError> {
        template::sync_template(&self.root, &self.config.template, request, self.runner)
    }

    pub fn install_hooks(&mut self) -> Result<bool, SyncError> {
        deps::install_hooks(&self.root, &self.config, self.context, self.runner)
    }

    /// Coupled pins, reading submodule commits when the repo has submodules.
    pub fn couple(&mut self) -> Result<CoupleOutcome, SyncError> {
        let submodules = if self.config.coupled.submodules && self.root.join(".gitmodules").is_file() {
            coupled::submodules(&self.root, self.runner)?
        } else {
            Vec::new()
        };
        coupled::couple(
            &self.root,
            &self.config.coupled,
            &submodules,
            self.options.dry_run,
        )
    }

    pub fn local_configs(&mut self) -> Result<Vec<WriteResult>, SyncError> {
        let mut writes = Vec::new();
        writes.extend(dev_configs::sync_local_dev_configs(
            &self.root,
            self.options.dry_run,
        )?);
        writes.extend(dev_configs::elevate_pyright_warnings(
            &self.root,
            self.context.ci,
            self.options.dry_run,
        )?);
        Ok(writes)
    }
}

impl StepExecutor for Pipeline<'_> {
    fn run_step(&mut self, step: BuiltinStep, args: &[String]) -> Result<(), SyncError> {
        match step {
            BuiltinStep::ProjectEnv => self.project_env().map(|_| ()),
            BuiltinStep::Bootstrap => self.bootstrap().map(|_| ()),
            BuiltinStep::Sync => {
                self.sync_deps(args)?;
                self.install_hooks().map(|_| ())
            }
            BuiltinStep::Template => {
                let request = self.options.template.clone().unwrap_or(TemplateRequest {
                    commit: true,
                    ..Default::default()
                });
                self.template(&request).map(|_| ())
            }
            BuiltinStep::Couple => self.couple().map(|_| ()),
            BuiltinStep::LocalConfigs => self.local_configs().map(|_| ()),
        }
    }

    fn resolve_program(&self, program: &str) -> String {
        if program == self.config.bootstrap.tool {
            self.tool_program()
        } else {
            program.to_string()
        }
    }
}
