use std::fmt;

use libc::c_int;

/// A wait status exactly as `waitpid(2)` reported it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawStatus(c_int);

impl RawStatus {
    pub const fn from_raw(raw: c_int) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> c_int {
        self.0
    }

    /// Status of a process that called `exit(code)`.
    pub const fn exited(code: u8) -> Self {
        Self((code as c_int) << 8)
    }

    /// Status of a process killed by `signal`.
    pub const fn signaled(signal: c_int) -> Self {
        Self(signal & 0x7f)
    }

    /// Status of a process stopped by `signal` (only seen with `WUNTRACED`).
    pub const fn stopped(signal: c_int) -> Self {
        Self(((signal & 0xff) << 8) | 0x7f)
    }

    pub fn decode(self) -> ExitStatus {
        if libc::WIFEXITED(self.0) {
            ExitStatus::Code(libc::WEXITSTATUS(self.0))
        } else if libc::WIFSIGNALED(self.0) {
            ExitStatus::Signal(libc::WTERMSIG(self.0))
        } else if libc::WIFSTOPPED(self.0) {
            ExitStatus::Stopped(libc::WSTOPSIG(self.0))
        } else {
            ExitStatus::Unknown
        }
    }

    /// Normalized exit code: the exit code, `128 + signal`, or `-1`.
    pub fn exit_code(self) -> i32 {
        self.decode().normalized()
    }
}

impl fmt::Display for RawStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExitStatus {
    Code(i32),
    Signal(i32),
    Stopped(i32),
    Unknown,
}

impl ExitStatus {
    /// Value returned when a status is neither an exit nor a termination.
    pub const UNCLASSIFIED: i32 = -1;

    pub fn normalized(&self) -> i32 {
        match self {
            ExitStatus::Code(code) => *code,
            ExitStatus::Signal(sig) => 128 + sig,
            ExitStatus::Stopped(_) | ExitStatus::Unknown => Self::UNCLASSIFIED,
        }
    }
}
