//! Small process-related helpers shared across the workspace.
//!
//! Child processes started through these helpers are placed in their own
//! process group so a single signal reaches the child and everything it
//! spawned, without touching the parent's group.

use std::ffi::OsStr;
use std::io;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;
#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Place a child process in a new process group.
///
/// On unix the child becomes the leader of a fresh group (`pgid == pid`).
/// On Windows the child gets a new console process group and no window.
pub trait IsolatedGroupExt {
    fn isolate_group(&mut self) -> &mut Self;
}

impl IsolatedGroupExt for std::process::Command {
    fn isolate_group(&mut self) -> &mut Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            self.process_group(0);
        }
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.creation_flags(CREATE_NO_WINDOW | CREATE_NEW_PROCESS_GROUP);
        }
        self
    }
}

/// Create a `std::process::Command` running in its own process group.
pub fn std_command(program: impl AsRef<OsStr>) -> std::process::Command {
    let mut cmd = std::process::Command::new(program);
    cmd.isolate_group();
    cmd
}

#[cfg(feature = "tokio")]
impl IsolatedGroupExt for tokio::process::Command {
    fn isolate_group(&mut self) -> &mut Self {
        #[cfg(unix)]
        {
            self.process_group(0);
        }
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut()
                .creation_flags(CREATE_NO_WINDOW | CREATE_NEW_PROCESS_GROUP);
        }
        self
    }
}

/// Create a `tokio::process::Command` running in its own process group.
///
/// The child is also killed when its handle is dropped, so a panicking
/// owner never leaks the process.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.isolate_group().kill_on_drop(true);
    cmd
}

/// Signal delivered to a whole process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSignal {
    /// Ask the group to exit (`SIGTERM`).
    Terminate,
    /// Force the group down (`SIGKILL`).
    Kill,
}

/// Send `signal` to the process group led by `pid`.
///
/// A group that no longer exists is not an error.
#[cfg(unix)]
pub fn signal_group(pid: u32, signal: GroupSignal) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = i32::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    let sig = match signal {
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };

    match killpg(Pid::from_raw(pgid), sig) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

/// Process-group signalling is only implemented for unix targets.
#[cfg(not(unix))]
pub fn signal_group(_pid: u32, _signal: GroupSignal) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "process group signals are not supported on this platform",
    ))
}
