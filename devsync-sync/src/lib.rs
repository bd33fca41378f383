//! # devsync-sync
//!
//! The sync steps and the chain that runs them.
//!
//! Call [`Pipeline::run`] for the full `devsync sync` chain, or
//! [`tasks::dispatch`] to run one named task with its prerequisites. Each
//! step module is usable on its own:
//!
//! - [`versions`] / [`coupled`]: pinned versions duplicated across files
//! - [`bootstrap`]: the pinned package manager
//! - [`env_projection`]: `.dev/env.json` into process, editor and CI
//! - [`deps`] / [`dev_configs`]: dependency sync and local shadow configs
//! - [`template`]: copier updates with one stash/retry recovery
//!
//! Every external command goes through a [`devsync_core::CommandRunner`];
//! every file write goes through [`writer::write_file`].

pub mod bootstrap;
pub mod command;
pub mod coupled;
pub mod deps;
pub mod dev_configs;
pub mod diff;
pub mod env_projection;
pub mod error;
mod jsonc;
pub mod pipeline;
pub mod tasks;
pub mod template;
pub mod versions;
pub mod writer;

pub use bootstrap::BootstrapOutcome;
pub use diff::FileDiff;
pub use error::SyncError;
pub use pipeline::{HostEnv, Pipeline, SyncOptions, SyncReport};
pub use tasks::{StepExecutor, Task, TaskAction, TaskTable};
pub use template::{TemplateOutcome, TemplateRequest};
pub use writer::WriteResult;
