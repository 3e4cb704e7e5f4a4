pub mod event_loop;
pub mod exit_command;
pub mod reaper;
pub mod registry;
pub mod session;
pub mod signals;
pub mod status;
pub mod supervisor;
pub mod sync_pipe;
pub mod timeout;

pub use event_loop::{EventLoop, LoopControl};
pub use exit_command::ExitCommand;
pub use reaper::{ChildWaiter, OsWaiter};
pub use registry::{PidRegistry, Role};
pub use session::{Outcome, Session, SessionFlags};
pub use status::{ExitStatus, RawStatus};
pub use supervisor::Supervisor;
pub use sync_pipe::SyncPipe;
