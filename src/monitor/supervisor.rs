use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::error::{MonitorError, Result};
use crate::monitor::event_loop::EventLoop;
use crate::monitor::reaper::{ChildWaiter, OsWaiter};
use crate::monitor::registry::PidRegistry;
use crate::monitor::session::{Outcome, Session, SessionFlags};
use crate::monitor::signals;
use crate::monitor::Role;

/// Event loop, pid registry and session state for one monitor process.
pub struct Supervisor<W: ChildWaiter = OsWaiter> {
    event_loop: EventLoop,
    registry: PidRegistry,
    session: Session,
    waiter: W,
}

impl Supervisor<OsWaiter> {
    /// Create the event loop and attach the signal handlers. Must be called
    /// from inside a tokio runtime.
    pub fn new(flags: SessionFlags, timeout: Option<Duration>) -> Result<Self> {
        let event_loop = EventLoop::new(timeout)?;
        signals::install()?;
        Ok(Self {
            event_loop,
            registry: PidRegistry::new(),
            session: Session::new(flags),
            waiter: OsWaiter,
        })
    }
}

impl<W: ChildWaiter> Supervisor<W> {
    /// Record `pid` as the live process for `role` and route its exit to the
    /// role's completion handler.
    pub fn register(&mut self, role: Role, pid: Pid) -> Result<()> {
        self.session.track(role, pid)?;
        self.registry.register(pid, role);
        Ok(())
    }

    /// Spawn the runtime helper. Its exit is delivered once the loop runs.
    pub fn spawn_runtime(&mut self, command: &mut Command) -> Result<Pid> {
        let child = command.spawn()?;
        let pid = Pid::from_raw(child.id() as i32);
        info!("Runtime helper started as pid {}", pid);
        self.register(Role::RuntimeHelper, pid)?;
        Ok(pid)
    }

    pub async fn run(&mut self) -> Result<()> {
        self.event_loop
            .run(&mut self.waiter, &mut self.registry, &mut self.session)
            .await
    }

    /// Send `sig` to every monitored child that is still live.
    pub fn signal_remaining(&self, sig: Signal) {
        for role in [Role::ContainerProcess, Role::RuntimeHelper] {
            let Some(pid) = self.session.live_pid(role) else {
                continue;
            };
            match signal::kill(pid, sig) {
                Ok(()) => debug!("Sent {} to {} {}", sig, role, pid),
                Err(Errno::ESRCH) => {}
                Err(e) => warn!("Failed to send {} to {} {}: {}", sig, role, pid, e),
            }
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn outcome(&self) -> Outcome {
        self.session.outcome()
    }
}

/// Become the reaper for orphaned descendants, so a container double-forked
/// by the runtime helper stays our child.
pub fn become_subreaper() -> Result<()> {
    // SAFETY: PR_SET_CHILD_SUBREAPER takes a plain integer argument.
    let ret = unsafe { libc::prctl(libc::PR_SET_CHILD_SUBREAPER, 1, 0, 0, 0) };
    Errno::result(ret).map(drop).map_err(|e| std::io::Error::from(e).into())
}

/// Read the container pid the runtime wrote.
pub fn read_pidfile(path: &Path) -> Result<Pid> {
    let contents = fs::read_to_string(path)?;
    let invalid = |reason: String| MonitorError::InvalidPidFile {
        path: path.display().to_string(),
        reason,
    };
    let pid: i32 = contents
        .trim()
        .parse()
        .map_err(|e| invalid(format!("{}", e)))?;
    if pid <= 0 {
        return Err(invalid(format!("{} is not a valid pid", pid)));
    }
    Ok(Pid::from_raw(pid))
}
