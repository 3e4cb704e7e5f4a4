//! ctrmon - container monitor core
//!
//! Supervises the runtime helper that creates or execs into a container and
//! the container process itself, forwards termination signals to them, reaps
//! them from a single-threaded event loop and reports one exit code.
//!
//! ## Components
//!
//! - **Status codec**: raw wait statuses to exit codes
//! - **Signal bridge**: async-signal-safe handlers that only wake the loop
//! - **Reaper**: drains exited children and dispatches them by role
//! - **Session**: which children are live, their statuses, when to stop
//! - **Timeout guard**: wall-clock deadline for the whole session
//! - **Exit command**: optional hook run after the loop stops

pub mod config;
pub mod error;
pub mod logging;
pub mod monitor;

// Re-export commonly used types
pub use config::{ExitCommandConfig, SessionConfig};
pub use error::{MonitorError, Result};
pub use monitor::{Outcome, RawStatus, Role, Session, SessionFlags, Supervisor};
