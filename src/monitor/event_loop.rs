use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::{debug, trace};

use crate::error::{MonitorError, Result};
use crate::monitor::reaper::{self, ChildWaiter};
use crate::monitor::registry::PidRegistry;
use crate::monitor::session::Session;
use crate::monitor::timeout::{self, TimeoutGuard};

static LOOP_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Stop request shared by everything that runs inside the loop.
#[derive(Debug, Default)]
pub struct LoopControl {
    quit: bool,
}

impl LoopControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quit(&mut self) {
        self.quit = true;
    }

    pub fn quit_requested(&self) -> bool {
        self.quit
    }

    fn resume(&mut self) {
        self.quit = false;
    }
}

/// The monitor's main loop. At most one exists per process.
///
/// Must be created inside a tokio runtime, and before the signal bridge is
/// installed, so the wakeup signal always has a listener.
pub struct EventLoop {
    wakeups: Signal,
    guard: Option<TimeoutGuard>,
    ctl: LoopControl,
}

impl EventLoop {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        if LOOP_ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(MonitorError::LoopAlreadyActive);
        }

        let wakeups = match signal(SignalKind::user_defined1()) {
            Ok(wakeups) => wakeups,
            Err(e) => {
                LOOP_ACTIVE.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        if let Some(timeout) = timeout {
            debug!("Session timeout set to {:?}", timeout);
        }

        Ok(Self {
            wakeups,
            guard: timeout.map(TimeoutGuard::new),
            ctl: LoopControl::new(),
        })
    }

    pub fn timed_out(&self) -> bool {
        self.guard.as_ref().is_some_and(TimeoutGuard::fired)
    }

    /// Drive the loop until a completion handler, the reaper or the timeout
    /// guard asks it to stop. May be called again to wait for more children.
    pub async fn run<W: ChildWaiter>(
        &mut self,
        waiter: &mut W,
        registry: &mut PidRegistry,
        session: &mut Session,
    ) -> Result<()> {
        self.ctl.resume();
        if self.timed_out() {
            timeout::on_timeout(session, &mut self.ctl);
            return Ok(());
        }

        while !self.ctl.quit_requested() {
            tokio::select! {
                biased;

                received = self.wakeups.recv() => {
                    if received.is_none() {
                        return Err(io::Error::new(
                            io::ErrorKind::BrokenPipe,
                            "wakeup signal stream closed",
                        )
                        .into());
                    }
                    trace!("Wakeup received, checking children");
                    reaper::check_child_processes(waiter, registry, session, &mut self.ctl)?;
                }
                () = TimeoutGuard::wait(&mut self.guard) => {
                    timeout::on_timeout(session, &mut self.ctl);
                }
            }
        }

        debug!("Main loop stopped");
        Ok(())
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        LOOP_ACTIVE.store(false, Ordering::SeqCst);
    }
}
