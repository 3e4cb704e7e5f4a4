use nix::unistd::Pid;
use thiserror::Error;

use crate::monitor::Role;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Failed to read child process status: {0}")]
    Wait(nix::Error),

    #[error("Failed to fork: {0}")]
    Fork(nix::Error),

    #[error("Failed to install handler for {signal}: {source}")]
    SignalSetup {
        signal: nix::sys::signal::Signal,
        source: nix::Error,
    },

    #[error("An event loop is already active in this process")]
    LoopAlreadyActive,

    #[error("{role} is already tracked as pid {pid}")]
    RoleAlreadyLive { role: Role, pid: Pid },

    #[error("{role} has already exited and cannot be tracked again")]
    RoleAlreadyReaped { role: Role },

    #[error("Invalid container pid file {path}: {reason}")]
    InvalidPidFile { path: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
