//! Bootstrap: make the pinned package manager available before anything else.
//!
//! ```text
//! locate (install dir, then PATH) ─▶ --version ─▶ == pin? ─ yes ─▶ AlreadyPinned
//!                                                   │ no
//!                                                   ▼
//!                              platform installer ─▶ re-verify ─▶ Installed
//! ```
//!
//! The installer is fatal on failure and never retried.

use std::path::{Path, PathBuf};

use devsync_core::{CommandRunner, CommandSpec, Platform, ProjectConfig};
use devsync_detector::{detect_tool_version, locate_tool};
use serde::Serialize;

use crate::command::run_checked;
use crate::error::SyncError;

/// Env var the installer scripts read for an unmanaged install location.
pub const INSTALL_DIR_VAR: &str = "UV_UNMANAGED_INSTALL";

/// Result of [`ensure`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BootstrapOutcome {
    /// The located binary already reports the pinned version. No installer ran.
    AlreadyPinned { version: String, program: String },
    /// The installer ran and the new binary reports the pinned version.
    Installed {
        previous: Option<String>,
        version: String,
        program: String,
    },
    /// `--dry-run`: the installer would have run.
    WouldInstall {
        previous: Option<String>,
        version: String,
    },
}

impl BootstrapOutcome {
    /// Program to invoke for the bootstrapped tool from here on.
    pub fn program(&self) -> Option<&str> {
        match self {
            BootstrapOutcome::AlreadyPinned { program, .. }
            | BootstrapOutcome::Installed { program, .. } => Some(program),
            BootstrapOutcome::WouldInstall { .. } => None,
        }
    }
}

/// The platform installer for `version`, installing into `install_dir`.
pub fn installer_command(platform: Platform, version: &str, install_dir: &Path) -> CommandSpec {
    let spec = match platform {
        Platform::Windows => CommandSpec::new("powershell").args([
            "-ExecutionPolicy".to_string(),
            "ByPass".to_string(),
            "-NoProfile".to_string(),
            "-Command".to_string(),
            format!("irm https://astral.sh/uv/{version}/install.ps1 | iex"),
        ]),
        Platform::Linux | Platform::Macos => CommandSpec::new("sh").args([
            "-c".to_string(),
            format!("curl -LsSf https://astral.sh/uv/{version}/install.sh | sh"),
        ]),
    };
    spec.env(INSTALL_DIR_VAR, install_dir.to_string_lossy())
}

/// Absolute install directory for the bootstrapped tool.
pub fn install_dir(root: &Path, config: &ProjectConfig) -> PathBuf {
    root.join(&config.bootstrap.install_dir)
}

/// The program to run for the bootstrapped tool: the located binary, or the
/// bare name when it is nowhere to be found.
pub fn tool_program(root: &Path, config: &ProjectConfig, platform: Platform) -> String {
    let tool = &config.bootstrap.tool;
    locate_tool(&install_dir(root, config), platform, tool)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| tool.clone())
}

/// Install the pinned tool if it is missing or reports another version.
pub fn ensure(
    root: &Path,
    config: &ProjectConfig,
    runner: &dyn CommandRunner,
    platform: Platform,
    dry_run: bool,
) -> Result<BootstrapOutcome, SyncError> {
    let tool = config.bootstrap.tool.as_str();
    let pin = config.pin(tool).ok_or_else(|| SyncError::MissingPin {
        tool: tool.to_string(),
    })?;

    let program = tool_program(root, config, platform);
    let previous = detect_tool_version(runner, &program)?;
    if previous.as_deref() == Some(pin) {
        tracing::info!("{tool} {pin} already installed");
        return Ok(BootstrapOutcome::AlreadyPinned {
            version: pin.to_string(),
            program,
        });
    }

    tracing::info!(
        "installing {tool} {pin} (found {})",
        previous.as_deref().unwrap_or("none")
    );
    let dir = install_dir(root, config);
    run_checked(runner, &installer_command(platform, pin, &dir))?;
    if dry_run {
        return Ok(BootstrapOutcome::WouldInstall {
            previous,
            version: pin.to_string(),
        });
    }

    let program = tool_program(root, config, platform);
    let found = detect_tool_version(runner, &program)?;
    if found.as_deref() != Some(pin) {
        return Err(SyncError::VersionMismatch {
            tool: tool.to_string(),
            expected: pin.to_string(),
            found,
        });
    }
    Ok(BootstrapOutcome::Installed {
        previous,
        version: pin.to_string(),
        program,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posix_installer_uses_curl_and_install_dir() {
        let cmd = installer_command(Platform::Linux, "0.4.10", Path::new("/repo/bin"));
        assert_eq!(cmd.program, "sh");
        assert_eq!(cmd.args[0], "-c");
        assert_eq!(
            cmd.args[1],
            "curl -LsSf https://astral.sh/uv/0.4.10/install.sh | sh"
        );
        assert_eq!(
            cmd.env,
            vec![(INSTALL_DIR_VAR.to_string(), "/repo/bin".to_string())]
        );
    }

    #[test]
    fn windows_installer_uses_powershell() {
        let cmd = installer_command(Platform::Windows, "0.4.10", Path::new("bin"));
        assert_eq!(cmd.program, "powershell");
        assert_eq!(
            cmd.args,
            vec![
                "-ExecutionPolicy",
                "ByPass",
                "-NoProfile",
                "-Command",
                "irm https://astral.sh/uv/0.4.10/install.ps1 | iex",
            ]
        );
    }
}
