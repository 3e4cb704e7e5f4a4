//! Asynchronous signal handlers and the pids they are allowed to see.
//!
//! Code in this module may run inside a signal handler. It only loads
//! atomics, calls `kill(2)` and `raise(3)`; everything else is deferred to the
//! event loop through the [`WAKEUP`] signal.

use std::sync::atomic::{AtomicI32, Ordering};

use libc::c_int;
use nix::errno::Errno;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::Pid;
use tracing::debug;

use crate::error::{MonitorError, Result};
use crate::monitor::Role;

/// Self-directed notification the event loop listens for.
pub const WAKEUP: Signal = Signal::SIGUSR1;

/// Termination requests forwarded to the monitored children.
pub const FORWARDED: [Signal; 3] = [Signal::SIGTERM, Signal::SIGINT, Signal::SIGQUIT];

const NO_PID: i32 = -1;

/// Lock-free mirror of the live pid slots, readable from signal context.
#[derive(Debug)]
pub struct LivePids {
    container: AtomicI32,
    runtime: AtomicI32,
}

impl LivePids {
    pub const fn new() -> Self {
        Self {
            container: AtomicI32::new(NO_PID),
            runtime: AtomicI32::new(NO_PID),
        }
    }

    fn slot(&self, role: Role) -> &AtomicI32 {
        match role {
            Role::ContainerProcess => &self.container,
            Role::RuntimeHelper => &self.runtime,
        }
    }

    pub fn set(&self, role: Role, pid: Option<Pid>) {
        let raw = pid.map_or(NO_PID, Pid::as_raw);
        self.slot(role).store(raw, Ordering::SeqCst);
    }

    pub fn get(&self, role: Role) -> Option<Pid> {
        let raw = self.slot(role).load(Ordering::SeqCst);
        (raw > 0).then(|| Pid::from_raw(raw))
    }
}

impl Default for LivePids {
    fn default() -> Self {
        Self::new()
    }
}

/// Pids published by the session for the forwarding handler.
pub static LIVE_PIDS: LivePids = LivePids::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forward {
    Delivered(Pid),
    /// Nobody took the signal; the event loop has to re-check on its own.
    Fallback,
}

/// Deliver a signal to the container process, or the runtime helper when the
/// container is not live or has already gone away.
pub fn forward_signal<F>(live: &LivePids, mut send: F) -> Forward
where
    F: FnMut(Pid) -> nix::Result<()>,
{
    if let Some(container) = live.get(Role::ContainerProcess) {
        match send(container) {
            Ok(()) => return Forward::Delivered(container),
            Err(Errno::ESRCH) => {}
            Err(_) => return Forward::Fallback,
        }
    }

    if let Some(runtime) = live.get(Role::RuntimeHelper) {
        if send(runtime).is_ok() {
            return Forward::Delivered(runtime);
        }
    }

    Forward::Fallback
}

struct ErrnoGuard(c_int);

impl ErrnoGuard {
    fn save() -> Self {
        // SAFETY: __errno_location always returns a valid thread-local pointer.
        Self(unsafe { *libc::__errno_location() })
    }
}

impl Drop for ErrnoGuard {
    fn drop(&mut self) {
        // SAFETY: see `save`.
        unsafe { *libc::__errno_location() = self.0 }
    }
}

extern "C" fn on_sigchld(_: c_int) {
    let _errno = ErrnoGuard::save();
    let _ = signal::raise(WAKEUP);
}

extern "C" fn on_sig_exit(signo: c_int) {
    let _errno = ErrnoGuard::save();
    let Ok(sig) = Signal::try_from(signo) else {
        return;
    };
    if forward_signal(&LIVE_PIDS, |pid| signal::kill(pid, sig)) == Forward::Fallback {
        let _ = signal::raise(WAKEUP);
    }
}

fn set_handler(sig: Signal, handler: SigHandler, flags: SaFlags) -> Result<()> {
    let action = SigAction::new(handler, flags, SigSet::empty());
    // SAFETY: the handlers installed here only touch atomics and call
    // async-signal-safe functions.
    unsafe { signal::sigaction(sig, &action) }
        .map(drop)
        .map_err(|source| MonitorError::SignalSetup { signal: sig, source })
}

/// Attach the asynchronous handlers.
///
/// A listener for [`WAKEUP`] must already be registered: the default action
/// of SIGUSR1 terminates the process.
pub fn install() -> Result<()> {
    set_handler(
        Signal::SIGCHLD,
        SigHandler::Handler(on_sigchld),
        SaFlags::SA_RESTART | SaFlags::SA_NOCLDSTOP,
    )?;
    for sig in FORWARDED {
        set_handler(sig, SigHandler::Handler(on_sig_exit), SaFlags::SA_RESTART)?;
    }
    debug!("Signal handlers installed");
    Ok(())
}

/// Put SIGCHLD back to its default disposition.
pub fn detach_child_notifications() -> Result<()> {
    set_handler(Signal::SIGCHLD, SigHandler::SigDfl, SaFlags::empty())
}
