//! devsync core library: domain types, project config, copier answers,
//! and the external command boundary.
//!
//! - [`types`]: newtypes and domain enums
//! - [`error`]: [`CoreError`]
//! - [`config`]: `devsync.yaml` load / save / root discovery
//! - [`answers`]: `.copier-answers.yml` parsing
//! - [`runner`]: [`CommandRunner`] and its system / dry-run / recording implementations

pub mod answers;
pub mod config;
pub mod error;
pub mod runner;
pub mod types;

pub use answers::CopierAnswers;
pub use config::ProjectConfig;
pub use error::CoreError;
pub use runner::{
    CommandOutput, CommandRunner, CommandSpec, DryRunRunner, RecordingRunner, SystemRunner,
};
pub use types::{BuiltinStep, EnvVarSet, ExecContext, Platform, TaskName};
