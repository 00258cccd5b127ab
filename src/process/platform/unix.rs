/*!
 * Unix Process Control
 * Process groups via setpgid and group signals via killpg
 */

use super::{GroupSignal, ProcessController};
use crate::process::types::{ProcessError, ProcessResult};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal as UnixSignal};
use nix::unistd::Pid as NixPid;
use tokio::process::Command;
use tracing::debug;

/// Signals the whole process group so no descendant survives a stop
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixController;

impl UnixController {
    pub fn new() -> Self {
        Self
    }

    fn unix_signal(signal: GroupSignal) -> UnixSignal {
        match signal {
            GroupSignal::Terminate => UnixSignal::SIGTERM,
            GroupSignal::Kill => UnixSignal::SIGKILL,
            GroupSignal::Pause => UnixSignal::SIGSTOP,
            GroupSignal::Resume => UnixSignal::SIGCONT,
        }
    }
}

impl ProcessController for UnixController {
    fn setup_group(&self, cmd: &mut Command) {
        // pgid = child pid
        cmd.process_group(0);
    }

    fn signal(&self, pid: u32, signal: GroupSignal) -> ProcessResult<bool> {
        // killpg(0) targets the caller's own group
        let raw = i32::try_from(pid)
            .ok()
            .filter(|raw| *raw > 0)
            .ok_or_else(|| ProcessError::SignalFailed(format!("invalid pid {}", pid)))?;
        let sig = Self::unix_signal(signal);

        match killpg(NixPid::from_raw(raw), sig) {
            Ok(()) => {
                debug!(pgid = pid, signal = ?sig, "Signalled process group");
                Ok(true)
            }
            Err(Errno::ESRCH) => {
                debug!(pgid = pid, signal = ?sig, "Process group already gone");
                Ok(false)
            }
            Err(e) => Err(ProcessError::SignalFailed(format!(
                "{:?} to group {}: {}",
                sig, pid, e
            ))),
        }
    }

    fn supports_pause(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "unix"
    }
}
