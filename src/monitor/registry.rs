use std::collections::HashMap;
use std::fmt;

use nix::unistd::Pid;
use tracing::trace;

/// The two kinds of child the monitor watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    RuntimeHelper,
    ContainerProcess,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::RuntimeHelper => f.write_str("runtime helper"),
            Role::ContainerProcess => f.write_str("container process"),
        }
    }
}

/// Maps live child pids to the completion handler that must see their status.
///
/// The handler is identified by the child's [`Role`]; the session dispatches
/// on it. An entry is taken out of the map before its handler runs, so a pid
/// can only ever be dispatched once.
#[derive(Debug, Default)]
pub struct PidRegistry {
    handlers: HashMap<Pid, Role>,
}

impl PidRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, pid: Pid, role: Role) {
        trace!("Registering {} for pid {}", role, pid);
        if let Some(previous) = self.handlers.insert(pid, role) {
            trace!("Pid {} was registered as {}, replaced", pid, previous);
        }
    }

    /// Remove and return the handler for `pid`.
    pub fn take(&mut self, pid: Pid) -> Option<Role> {
        self.handlers.remove(&pid)
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, pid: Pid) -> bool {
        self.handlers.contains_key(&pid)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.handlers.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
