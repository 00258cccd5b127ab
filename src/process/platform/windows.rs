/*!
 * Windows Process Control
 *
 * Children are spawned with CREATE_NEW_PROCESS_GROUP and terminated through
 * `taskkill /T`, which walks the process tree. There is no stop/continue
 * signal class, so pause is reported as unsupported.
 */

use super::{GroupSignal, ProcessController};
use crate::process::types::{ProcessError, ProcessResult};
use std::process::Command as StdCommand;
use tokio::process::Command;
use tracing::{debug, warn};

const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// taskkill exit code when the target PID does not exist
const TASKKILL_NOT_FOUND: i32 = 128;

#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsController;

impl WindowsController {
    pub fn new() -> Self {
        Self
    }

    fn taskkill(&self, pid: u32, force: bool) -> ProcessResult<bool> {
        if pid == 0 {
            return Err(ProcessError::SignalFailed(format!("invalid pid {}", pid)));
        }
        let mut cmd = StdCommand::new("taskkill");
        cmd.arg("/T");
        if force {
            cmd.arg("/F");
        }
        cmd.arg("/PID").arg(pid.to_string());

        let output = cmd
            .output()
            .map_err(|e| ProcessError::SignalFailed(format!("taskkill {}: {}", pid, e)))?;

        match output.status.code() {
            Some(0) => {
                debug!(pid = pid, force = force, "taskkill delivered");
                Ok(true)
            }
            Some(TASKKILL_NOT_FOUND) => Ok(false),
            code => Err(ProcessError::SignalFailed(format!(
                "taskkill {} exited with {:?}: {}",
                pid,
                code,
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }
}

impl ProcessController for WindowsController {
    fn setup_group(&self, cmd: &mut Command) {
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }

    fn signal(&self, pid: u32, signal: GroupSignal) -> ProcessResult<bool> {
        match signal {
            GroupSignal::Terminate => self.taskkill(pid, false),
            GroupSignal::Kill => self.taskkill(pid, true),
            GroupSignal::Pause | GroupSignal::Resume => {
                warn!(pid = pid, "Process pause not supported on this platform");
                Ok(false)
            }
        }
    }

    fn supports_pause(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "windows"
    }
}
