use nix::unistd::Pid;
use tracing::{debug, info, trace, warn};

use crate::error::{MonitorError, Result};
use crate::monitor::event_loop::LoopControl;
use crate::monitor::signals::{LivePids, LIVE_PIDS};
use crate::monitor::status::RawStatus;
use crate::monitor::Role;

/// Flags that select the exec/terminal race handling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionFlags {
    pub api_version: u32,
    pub exec: bool,
    pub terminal: bool,
}

impl SessionFlags {
    /// First API version with the exec race handling.
    pub const MIN_API_VERSION: u32 = 1;

    pub fn api_gated(&self) -> bool {
        self.api_version >= Self::MIN_API_VERSION
    }

    /// Interactive exec session under a gated API version.
    pub fn exec_terminal(&self) -> bool {
        self.api_gated() && self.exec && self.terminal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Exited(i32),
    TimedOut,
}

impl Outcome {
    /// Value written to the sync pipe.
    pub fn report_code(&self) -> i32 {
        match self {
            Outcome::Exited(code) => *code,
            Outcome::TimedOut => -1,
        }
    }

    /// Exit code of the monitor process itself.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Outcome::Exited(code) => *code & 0xff,
            Outcome::TimedOut => 255,
        }
    }
}

/// State of one supervised session. Owned by the event loop; only the
/// reaper's dispatch and the timeout guard mutate it.
#[derive(Debug)]
pub struct Session {
    flags: SessionFlags,
    runtime_status: Option<RawStatus>,
    container_status: Option<RawStatus>,
    create_pid: Option<Pid>,
    container_pid: Option<Pid>,
    timed_out: bool,
    live: &'static LivePids,
}

impl Session {
    pub fn new(flags: SessionFlags) -> Self {
        Self::with_live_pids(flags, &LIVE_PIDS)
    }

    /// Session publishing its live pids somewhere other than the process-wide
    /// slots read by the signal handlers.
    pub fn with_live_pids(flags: SessionFlags, live: &'static LivePids) -> Self {
        live.set(Role::RuntimeHelper, None);
        live.set(Role::ContainerProcess, None);
        Self {
            flags,
            runtime_status: None,
            container_status: None,
            create_pid: None,
            container_pid: None,
            timed_out: false,
            live,
        }
    }

    pub fn flags(&self) -> SessionFlags {
        self.flags
    }

    pub fn runtime_status(&self) -> Option<RawStatus> {
        self.runtime_status
    }

    pub fn container_status(&self) -> Option<RawStatus> {
        self.container_status
    }

    pub fn create_pid(&self) -> Option<Pid> {
        self.create_pid
    }

    pub fn container_pid(&self) -> Option<Pid> {
        self.container_pid
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn live_pid(&self, role: Role) -> Option<Pid> {
        match role {
            Role::RuntimeHelper => self.create_pid,
            Role::ContainerProcess => self.container_pid,
        }
    }

    pub fn status(&self, role: Role) -> Option<RawStatus> {
        match role {
            Role::RuntimeHelper => self.runtime_status,
            Role::ContainerProcess => self.container_status,
        }
    }

    /// Mark `pid` as the live process for `role`.
    pub fn track(&mut self, role: Role, pid: Pid) -> Result<()> {
        if self.status(role).is_some() {
            return Err(MonitorError::RoleAlreadyReaped { role });
        }
        if let Some(live) = self.live_pid(role) {
            return Err(MonitorError::RoleAlreadyLive { role, pid: live });
        }
        debug!("Tracking {} as pid {}", role, pid);
        self.set_live(role, Some(pid));
        Ok(())
    }

    fn set_live(&mut self, role: Role, pid: Option<Pid>) {
        match role {
            Role::RuntimeHelper => self.create_pid = pid,
            Role::ContainerProcess => self.container_pid = pid,
        }
        self.live.set(role, pid);
    }

    /// The container may have been reaped before anybody registered it.
    pub(crate) fn container_unaccounted(&self) -> bool {
        self.container_status.is_none() && self.container_pid.is_none() && self.flags.exec_terminal()
    }

    pub fn dispatch(&mut self, role: Role, ctl: &mut LoopControl, pid: Pid, status: RawStatus) {
        match role {
            Role::RuntimeHelper => self.on_runtime_exit(ctl, pid, status),
            Role::ContainerProcess => self.on_container_exit(ctl, pid, status),
        }
    }

    pub fn on_runtime_exit(&mut self, ctl: &mut LoopControl, pid: Pid, status: RawStatus) {
        trace!("Runtime helper {} exited with raw status {}", pid, status);
        if self.runtime_status.is_some() {
            warn!("Runtime helper status already recorded, ignoring pid {}", pid);
            return;
        }
        self.runtime_status = Some(status);
        self.set_live(Role::RuntimeHelper, None);
        ctl.quit();
    }

    pub fn on_container_exit(&mut self, ctl: &mut LoopControl, pid: Pid, status: RawStatus) {
        trace!("Container {} exited with raw status {}", pid, status);
        if self.container_status.is_some() {
            warn!("Container status already recorded, ignoring pid {}", pid);
            return;
        }
        let code = status.exit_code();
        if code != 0 {
            info!("container {} exited with status {}", pid, code);
        }
        self.container_status = Some(status);
        self.set_live(Role::ContainerProcess, None);

        // A fast exec can be reaped before the runtime helper that started it.
        // Stopping here would report on the runtime call without its status.
        if self.flags.exec_terminal() && self.create_pid.is_some() {
            debug!("Container exit handled before runtime exit, not quitting yet");
            return;
        }
        ctl.quit();
    }

    pub(crate) fn mark_timed_out(&mut self) {
        self.timed_out = true;
    }

    pub fn outcome(&self) -> Outcome {
        if self.timed_out {
            return Outcome::TimedOut;
        }
        let runtime = self.runtime_status.map(RawStatus::exit_code);
        let container = self.container_status.map(RawStatus::exit_code);
        match (runtime, container) {
            (Some(code), _) if code != 0 => Outcome::Exited(code),
            (_, Some(code)) => Outcome::Exited(code),
            (Some(code), None) => Outcome::Exited(code),
            (None, None) => Outcome::Exited(0),
        }
    }
}
