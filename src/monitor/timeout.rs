use std::pin::Pin;
use std::time::Duration;

use tokio::time::{sleep, Sleep};
use tracing::info;

use crate::monitor::event_loop::LoopControl;
use crate::monitor::session::Session;

/// One-shot deadline for a whole session.
#[derive(Debug)]
pub struct TimeoutGuard {
    sleep: Pin<Box<Sleep>>,
    fired: bool,
}

impl TimeoutGuard {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sleep: Box::pin(sleep(timeout)),
            fired: false,
        }
    }

    pub fn fired(&self) -> bool {
        self.fired
    }

    /// Resolves once when the deadline passes; never resolves afterwards or
    /// when no guard is set.
    pub async fn wait(guard: &mut Option<TimeoutGuard>) {
        match guard {
            Some(guard) if !guard.fired => {
                guard.sleep.as_mut().await;
                guard.fired = true;
            }
            _ => std::future::pending().await,
        }
    }
}

/// Deadline expiry: always stops the loop, whatever the session is waiting on.
pub fn on_timeout(session: &mut Session, ctl: &mut LoopControl) {
    session.mark_timed_out();
    info!("Timed out, killing main loop");
    ctl.quit();
}
