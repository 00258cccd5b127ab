/*!
 * Managed Process
 *
 * Live record for one (project, component) slot. State, PID, and timestamps
 * sit behind a per-process lock so the monitor and explicit stop/kill calls
 * can never interleave a transition. The OS child handle itself is owned by
 * the monitor task; exit is published through a watch channel.
 */

use super::log_buffer::LogBuffer;
use super::types::{
    Process, ProcessError, ProcessEvent, ProcessEventKind, ProcessResult, ProcessState,
};
use crate::core::types::{process_id, ComponentKind};
use parking_lot::{Mutex, MutexGuard};
use std::path::PathBuf;
use std::time::SystemTime;
use tokio::sync::watch;

/// Mutable fields guarded by the per-process lock
#[derive(Debug)]
pub(crate) struct ProcessInner {
    pub(crate) state: ProcessState,
    pub(crate) pid: Option<u32>,
    pub(crate) started_at: Option<SystemTime>,
    pub(crate) stopped_at: Option<SystemTime>,
    pub(crate) restarts: u32,
    pub(crate) last_error: Option<String>,
    pub(crate) exit_code: Option<i32>,
    pub(crate) work_dir: PathBuf,
    pub(crate) command: String,
    pub(crate) args: Vec<String>,
    pub(crate) port: Option<u16>,
}

impl ProcessInner {
    /// Move to `to`, rejecting edges outside the state machine
    pub(crate) fn transition(&mut self, to: ProcessState) -> ProcessResult<ProcessState> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(ProcessError::InvalidStateTransition { from, to });
        }
        self.state = to;
        Ok(from)
    }
}

/// One supervised process slot
#[derive(Debug)]
pub struct ManagedProcess {
    id: String,
    project_id: String,
    component: ComponentKind,
    inner: Mutex<ProcessInner>,
    logs: LogBuffer,
    exit_tx: watch::Sender<Option<i32>>,
}

impl ManagedProcess {
    pub(crate) fn new(
        project_id: &str,
        component: ComponentKind,
        restarts: u32,
        log_capacity: usize,
    ) -> Self {
        let (exit_tx, _) = watch::channel(None);
        Self {
            id: process_id(project_id, component),
            project_id: project_id.to_string(),
            component,
            inner: Mutex::new(ProcessInner {
                state: ProcessState::Stopped,
                pid: None,
                started_at: None,
                stopped_at: None,
                restarts,
                last_error: None,
                exit_code: None,
                work_dir: PathBuf::new(),
                command: String::new(),
                args: Vec::new(),
                port: None,
            }),
            logs: LogBuffer::new(log_capacity),
            exit_tx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn component(&self) -> ComponentKind {
        self.component
    }

    pub fn logs(&self) -> &LogBuffer {
        &self.logs
    }

    pub fn state(&self) -> ProcessState {
        self.inner.lock().state
    }

    pub fn pid(&self) -> Option<u32> {
        self.inner.lock().pid
    }

    pub fn restarts(&self) -> u32 {
        self.inner.lock().restarts
    }

    pub fn is_live(&self) -> bool {
        self.state().is_live()
    }

    /// Copy of the current fields
    pub fn snapshot(&self) -> Process {
        let inner = self.inner.lock();
        Process {
            id: self.id.clone(),
            project_id: self.project_id.clone(),
            component: self.component,
            pid: inner.pid,
            state: inner.state,
            started_at: inner.started_at,
            stopped_at: inner.stopped_at,
            restarts: inner.restarts,
            last_error: inner.last_error.clone(),
            exit_code: inner.exit_code,
            work_dir: inner.work_dir.clone(),
            command: inner.command.clone(),
            args: inner.args.clone(),
            port: inner.port,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ProcessInner> {
        self.inner.lock()
    }

    /// Receiver that yields `Some(exit_code)` once the OS process is reaped
    pub(crate) fn exit_receiver(&self) -> watch::Receiver<Option<i32>> {
        self.exit_tx.subscribe()
    }

    pub(crate) fn publish_exit(&self, code: i32) {
        self.exit_tx.send_replace(Some(code));
    }

    pub fn has_exited(&self) -> bool {
        self.exit_tx.borrow().is_some()
    }

    pub(crate) fn event(&self, kind: ProcessEventKind, message: impl Into<String>) -> ProcessEvent {
        ProcessEvent::new(
            kind,
            self.id.clone(),
            self.project_id.clone(),
            self.component,
            message,
        )
    }
}
