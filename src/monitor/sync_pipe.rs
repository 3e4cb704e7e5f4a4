use std::fs::File;
use std::io::Write;
use std::os::unix::io::{FromRawFd, RawFd};

use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use serde::Serialize;
use tracing::debug;

use crate::error::{MonitorError, Result};

#[derive(Debug, Serialize)]
struct SyncMessage<'a> {
    data: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

/// Channel back to whoever launched the monitor. Closed on drop.
#[derive(Debug)]
pub struct SyncPipe {
    file: File,
}

impl SyncPipe {
    pub fn new(file: File) -> Self {
        Self { file }
    }

    /// Adopt a descriptor inherited from the parent process.
    ///
    /// # Safety
    ///
    /// `fd` must be open and not owned by anything else in this process.
    pub unsafe fn from_inherited_fd(fd: RawFd) -> Result<Self> {
        fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map_err(|e| {
            MonitorError::Configuration(format!("Invalid sync pipe fd {}: {}", fd, e))
        })?;
        Ok(Self::new(File::from_raw_fd(fd)))
    }

    /// Write one newline-terminated JSON message.
    pub fn send(&mut self, data: i32, message: Option<&str>) -> Result<()> {
        let mut buf = serde_json::to_vec(&SyncMessage { data, message })?;
        buf.push(b'\n');
        self.file.write_all(&buf)?;
        debug!("Sent {} over sync pipe", data);
        Ok(())
    }
}
