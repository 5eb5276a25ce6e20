use crate::{Error, Result};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

/// Signal-level process operations
pub struct ProcessExecutor;

impl ProcessExecutor {
    /// Check if process exists
    ///
    /// Uses kill(pid, 0) - doesn't kill the process, only checks existence
    pub fn process_exists(pid: u32) -> Result<bool> {
        let process_pid = Self::to_pid(pid)?;

        match kill(process_pid, None) {
            Ok(_) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            // No permission, but process exists
            Err(Errno::EPERM) => Ok(true),
            Err(e) => Err(Error::Signal(format!(
                "Failed to check process {}: {}",
                pid, e
            ))),
        }
    }

    /// Ask a process to exit (SIGTERM). Does not wait for it.
    pub fn terminate_process(pid: u32) -> Result<()> {
        Self::send(pid, Signal::SIGTERM)
    }

    /// Force a process to exit (SIGKILL). Does not wait for it.
    pub fn kill_process(pid: u32) -> Result<()> {
        Self::send(pid, Signal::SIGKILL)
    }

    fn send(pid: u32, signal: Signal) -> Result<()> {
        let process_pid = Self::to_pid(pid)?;

        match kill(process_pid, signal) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => Err(Error::ProcessNotFound(pid)),
            Err(e) => Err(Error::Signal(format!(
                "Failed to send {} to process {}: {}",
                signal, pid, e
            ))),
        }
    }

    // pid 0 and anything above i32::MAX would address process groups
    fn to_pid(pid: u32) -> Result<Pid> {
        match i32::try_from(pid) {
            Ok(raw) if raw > 0 => Ok(Pid::from_raw(raw)),
            _ => Err(Error::ProcessNotFound(pid)),
        }
    }
}
