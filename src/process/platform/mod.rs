/*!
 * Platform Process Control
 *
 * OS primitives for spawning a child in its own process group and signalling
 * the whole group. One implementation per target OS, selected at compile time
 * by `default_controller`, so the supervisor stays platform-agnostic.
 */

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use unix::UnixController;
#[cfg(windows)]
pub use windows::WindowsController;

use super::types::ProcessResult;
use std::process::ExitStatus;
use std::sync::Arc;
use tokio::process::Command;

/// Signal classes the supervisor sends to a process group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSignal {
    /// Catchable termination request
    Terminate,
    /// Non-catchable termination
    Kill,
    /// Freeze without terminating
    Pause,
    /// Thaw a frozen group
    Resume,
}

/// Platform process controller
pub trait ProcessController: Send + Sync {
    /// Configure `cmd` so the child leads a new process group
    fn setup_group(&self, cmd: &mut Command);

    /// Send `signal` to the group led by `pid`
    ///
    /// Returns `Ok(false)` when the group no longer exists or the signal class
    /// is not available on this platform.
    fn signal(&self, pid: u32, signal: GroupSignal) -> ProcessResult<bool>;

    /// Immediately terminate the group led by `pid`
    fn kill(&self, pid: u32) -> ProcessResult<bool> {
        self.signal(pid, GroupSignal::Kill)
    }

    /// Whether `Pause`/`Resume` have any effect here
    fn supports_pause(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Controller for the compilation target
pub fn default_controller() -> Arc<dyn ProcessController> {
    #[cfg(unix)]
    {
        Arc::new(UnixController::new())
    }
    #[cfg(windows)]
    {
        Arc::new(WindowsController::new())
    }
}

/// Normalise an exit status to a single code
///
/// A child terminated by a signal reports `128 + signal`, so a killed child
/// records 137.
pub fn exit_code(status: &ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status
            .code()
            .or_else(|| {
                status
                    .signal()
                    .map(|sig| crate::core::limits::SIGNAL_EXIT_BASE + sig)
            })
            .unwrap_or(crate::core::limits::UNKNOWN_EXIT_CODE)
    }
    #[cfg(not(unix))]
    {
        status
            .code()
            .unwrap_or(crate::core::limits::UNKNOWN_EXIT_CODE)
    }
}
