use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};
use crate::monitor::SessionFlags;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitCommandConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Everything the monitor needs to know about one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub api_version: u32,
    pub exec: bool,
    pub terminal: bool,
    pub exec_attach: bool,
    pub restore: bool,
    /// Seconds; zero disables the deadline.
    pub timeout: u64,
    pub exit_command: Option<ExitCommandConfig>,
    pub container_pidfile: Option<PathBuf>,
    pub sync_pipe_fd: Option<i32>,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.exec && self.restore {
            return Err(config_error("Cannot use 'exec' and 'restore' at the same time"));
        }
        if self.exec_attach && !self.exec {
            return Err(config_error("Attach can only be specified with exec"));
        }
        if self.exec_attach && self.api_version < SessionFlags::MIN_API_VERSION {
            return Err(config_error(
                "Attach can only be specified for a non-legacy exec session",
            ));
        }
        if let Some(exit_command) = &self.exit_command {
            if exit_command.path.as_os_str().is_empty() {
                return Err(config_error("Exit command path must not be empty"));
            }
        }
        Ok(())
    }

    pub fn flags(&self) -> SessionFlags {
        SessionFlags {
            api_version: self.api_version,
            exec: self.exec,
            terminal: self.terminal,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }
}

fn config_error(message: &str) -> MonitorError {
    MonitorError::Configuration(message.to_string())
}
