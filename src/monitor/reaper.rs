use nix::errno::Errno;
use nix::unistd::Pid;
use tracing::{debug, trace};

use crate::error::{MonitorError, Result};
use crate::monitor::event_loop::LoopControl;
use crate::monitor::registry::PidRegistry;
use crate::monitor::session::Session;
use crate::monitor::status::RawStatus;
use crate::monitor::Role;

/// Source of child state changes.
pub trait ChildWaiter {
    /// Non-blocking wait for any child. `Ok(None)` means no child has
    /// changed state yet.
    fn try_wait_any(&mut self) -> nix::Result<Option<(Pid, RawStatus)>>;
}

/// `waitpid(-1, WNOHANG)` against the real process table.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsWaiter;

impl ChildWaiter for OsWaiter {
    fn try_wait_any(&mut self) -> nix::Result<Option<(Pid, RawStatus)>> {
        let mut status: libc::c_int = 0;
        // SAFETY: `status` is a valid out pointer for the duration of the call.
        let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
        match Errno::result(pid)? {
            0 => Ok(None),
            pid => Ok(Some((Pid::from_raw(pid), RawStatus::from_raw(status)))),
        }
    }
}

/// Reap every child that has changed state and dispatch it.
///
/// Returns an error only for wait failures other than EINTR and ECHILD; the
/// caller must treat those as fatal.
pub fn check_child_processes<W: ChildWaiter>(
    waiter: &mut W,
    registry: &mut PidRegistry,
    session: &mut Session,
    ctl: &mut LoopControl,
) -> Result<()> {
    loop {
        let (pid, status) = match waiter.try_wait_any() {
            Ok(Some(reaped)) => reaped,
            Ok(None) => return Ok(()),
            Err(Errno::EINTR) => {
                trace!("waitpid interrupted, retrying");
                continue;
            }
            Err(Errno::ECHILD) => {
                debug!("No children left to wait for, quitting");
                ctl.quit();
                return Ok(());
            }
            Err(e) => return Err(MonitorError::Wait(e)),
        };

        if let Some(role) = registry.take(pid) {
            trace!("Dispatching pid {} to {}", pid, role);
            session.dispatch(role, ctl, pid, status);
            continue;
        }

        if !session.flags().api_gated() {
            continue;
        }
        debug!("Couldn't find handler for pid {}", pid);
        // The container can exit and be reaped before its handler is
        // registered. Only an exec+terminal session with no container on
        // record qualifies.
        if session.container_unaccounted() {
            debug!("Container exited before its handler was registered, calling it manually");
            session.dispatch(Role::ContainerProcess, ctl, pid, status);
        }
    }
}
