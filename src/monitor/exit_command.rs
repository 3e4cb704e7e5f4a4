use std::ffi::{CString, NulError};
use std::os::unix::ffi::OsStrExt;
use std::ptr;

use libc::c_char;
use nix::errno::Errno;
use nix::unistd::{self, ForkResult, Pid};
use tracing::{debug, info};

use crate::config::ExitCommandConfig;
use crate::error::{MonitorError, Result};
use crate::monitor::signals;
use crate::monitor::status::RawStatus;
use crate::monitor::sync_pipe::SyncPipe;

/// Code the forked child exits with when it cannot exec the command.
pub const EXIT_COMMAND_FAILURE: i32 = libc::EXIT_FAILURE;

/// Post-session hook: runs an external command once the loop has stopped.
#[derive(Debug)]
pub struct ExitCommand {
    argv: std::result::Result<Vec<CString>, NulError>,
}

impl ExitCommand {
    pub fn new(config: &ExitCommandConfig) -> Self {
        let argv = std::iter::once(CString::new(config.path.as_os_str().as_bytes()))
            .chain(config.args.iter().map(|arg| CString::new(arg.as_bytes())))
            .collect();
        Self { argv }
    }

    /// Close the sync pipe, restore SIGCHLD, then run the command and wait
    /// for it. A non-zero exit of the command terminates this process with
    /// the same code.
    pub fn run(self, sync_pipe: &mut Option<SyncPipe>) -> Result<()> {
        if let Some(pipe) = sync_pipe.take() {
            drop(pipe);
        }
        signals::detach_child_notifications()?;

        let code = self.spawn_and_wait()?;
        if code != 0 {
            info!("Exit command failed with status {}", code);
            // SAFETY: _exit never returns; nothing after the session needs
            // to run.
            unsafe { libc::_exit(code) }
        }
        Ok(())
    }

    /// Fork, exec the command in the child, and return its normalized exit
    /// code.
    pub fn spawn_and_wait(self) -> Result<i32> {
        // Everything the child needs is allocated before forking.
        let pointers: Option<Vec<*const c_char>> = self.argv.as_ref().ok().map(|argv| {
            argv.iter()
                .map(|arg| arg.as_ptr())
                .chain(std::iter::once(ptr::null()))
                .collect()
        });

        // SAFETY: the child only calls execv and _exit.
        match unsafe { unistd::fork() }.map_err(MonitorError::Fork)? {
            ForkResult::Child => exec_child(pointers.as_deref()),
            ForkResult::Parent { child } => {
                debug!("Exit command started as pid {}", child);
                wait_for(child)
            }
        }
    }
}

fn exec_child(argv: Option<&[*const c_char]>) -> ! {
    if let Some(argv) = argv {
        // SAFETY: argv is a null-terminated array of pointers into CStrings
        // that outlive this call.
        unsafe {
            libc::execv(argv[0], argv.as_ptr());
        }
    }
    // SAFETY: _exit is async-signal-safe and never returns.
    unsafe { libc::_exit(EXIT_COMMAND_FAILURE) }
}

fn wait_for(child: Pid) -> Result<i32> {
    loop {
        let mut status: libc::c_int = 0;
        // SAFETY: `status` is a valid out pointer for the duration of the call.
        let ret = unsafe { libc::waitpid(child.as_raw(), &mut status, 0) };
        match Errno::result(ret) {
            Ok(_) => return Ok(RawStatus::from_raw(status).exit_code()),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(MonitorError::Wait(e)),
        }
    }
}
