//! Checked command execution on top of the core [`CommandRunner`] boundary.

use devsync_core::{CommandOutput, CommandRunner, CommandSpec};

use crate::error::SyncError;

/// Run `cmd`, turning a non-zero exit into [`SyncError::CommandFailed`].
pub fn run_checked(runner: &dyn CommandRunner, cmd: &CommandSpec) -> Result<CommandOutput, SyncError> {
    tracing::info!("running: {cmd}");
    let output = runner.run(cmd)?;
    if output.success() {
        Ok(output)
    } else {
        Err(SyncError::CommandFailed {
            command: cmd.to_string(),
            code: output.code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devsync_core::RecordingRunner;

    #[test]
    fn non_zero_exit_carries_code() {
        let runner = RecordingRunner::new().on("uv sync", CommandOutput::failed(2));
        let err = run_checked(&runner, &CommandSpec::new("uv").arg("sync")).unwrap_err();
        assert_eq!(err.exit_code(), Some(2));
        assert!(err.to_string().contains("uv sync"));
    }

    #[test]
    fn spawn_failure_is_core_error() {
        let runner = RecordingRunner::new().missing("pre-commit");
        let err = run_checked(&runner, &CommandSpec::new("pre-commit").arg("install")).unwrap_err();
        assert!(matches!(err, SyncError::Core(_)));
        assert_eq!(err.exit_code(), None);
    }
}
