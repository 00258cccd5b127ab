/*!
 * Process Types
 * Common types for process supervision
 */

use crate::core::serde::{
    is_empty_vec, is_none, is_zero_u32, optional_duration_millis, optional_system_time_micros,
    system_time_micros,
};
use crate::core::types::{ComponentKind, ProjectId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

pub use crate::core::errors::ProcessError;

/// Process operation result
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Supervised process state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// No OS process; initial and final state after an intentional stop
    Stopped,
    /// Reserved, spawn in progress
    Starting,
    /// OS process alive
    Running,
    /// OS process frozen with a stop signal
    Paused,
    /// Termination requested, waiting for exit
    Stopping,
    /// OS process exited without being asked to, or failed to spawn
    Crashed,
}

impl ProcessState {
    /// Whether an OS process handle may exist in this state
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            ProcessState::Starting
                | ProcessState::Running
                | ProcessState::Paused
                | ProcessState::Stopping
        )
    }

    /// Terminal until the next start
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessState::Stopped | ProcessState::Crashed)
    }

    pub fn can_transition_to(&self, to: ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (self, to),
            (Stopped, Starting)
                | (Crashed, Starting)
                | (Starting, Running)
                | (Starting, Crashed)
                | (Running, Paused)
                | (Paused, Running)
                | (Starting, Stopping)
                | (Running, Stopping)
                | (Paused, Stopping)
                | (Stopping, Stopped)
                | (Running, Crashed)
                | (Paused, Crashed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessState::Stopped => "stopped",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Paused => "paused",
            ProcessState::Stopping => "stopping",
            ProcessState::Crashed => "crashed",
        }
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a supervised process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Process {
    pub id: String,
    pub project_id: ProjectId,
    pub component: ComponentKind,
    #[serde(skip_serializing_if = "is_none", default)]
    pub pid: Option<u32>,
    pub state: ProcessState,
    #[serde(
        with = "optional_system_time_micros",
        skip_serializing_if = "is_none",
        default
    )]
    pub started_at: Option<SystemTime>,
    #[serde(
        with = "optional_system_time_micros",
        skip_serializing_if = "is_none",
        default
    )]
    pub stopped_at: Option<SystemTime>,
    #[serde(skip_serializing_if = "is_zero_u32", default)]
    pub restarts: u32,
    #[serde(skip_serializing_if = "is_none", default)]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "is_none", default)]
    pub exit_code: Option<i32>,
    pub work_dir: PathBuf,
    pub command: String,
    #[serde(skip_serializing_if = "is_empty_vec", default)]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "is_none", default)]
    pub port: Option<u16>,
}

impl Process {
    pub fn is_live(&self) -> bool {
        self.state.is_live()
    }

    /// Time since start while the process is live
    pub fn uptime(&self) -> Option<Duration> {
        if !self.state.is_live() {
            return None;
        }
        self.started_at.and_then(|t| t.elapsed().ok())
    }

    pub fn summary(&self) -> ProcessSummary {
        ProcessSummary {
            id: self.id.clone(),
            project_id: self.project_id.clone(),
            component: self.component,
            state: self.state,
            pid: self.pid,
            port: self.port,
            restarts: self.restarts,
            uptime: self.uptime(),
        }
    }
}

/// Compact process view for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProcessSummary {
    pub id: String,
    pub project_id: ProjectId,
    pub component: ComponentKind,
    pub state: ProcessState,
    #[serde(skip_serializing_if = "is_none", default)]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "is_none", default)]
    pub port: Option<u16>,
    pub restarts: u32,
    #[serde(
        with = "optional_duration_millis",
        skip_serializing_if = "is_none",
        default
    )]
    pub uptime: Option<Duration>,
}

/// Output stream a log line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// A single captured output line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LogLine {
    #[serde(with = "system_time_micros")]
    pub timestamp: SystemTime,
    pub stream: LogStream,
    pub text: String,
}

impl LogLine {
    pub fn new(stream: LogStream, text: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            stream,
            text: text.into(),
        }
    }
}

/// Process event type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessEventKind {
    Starting,
    Started,
    /// A stdout line
    Output,
    /// A stderr line
    Error,
    Stopping,
    /// Graceful stop timed out and the group is being killed
    StopEscalated,
    Stopped,
    Crashed,
    Paused,
    Resumed,
}

/// Immutable process notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProcessEvent {
    pub kind: ProcessEventKind,
    pub process_id: String,
    pub project_id: ProjectId,
    pub component: ComponentKind,
    #[serde(skip_serializing_if = "is_none", default)]
    pub pid: Option<u32>,
    pub message: String,
    #[serde(skip_serializing_if = "is_none", default)]
    pub exit_code: Option<i32>,
    #[serde(with = "system_time_micros")]
    pub timestamp: SystemTime,
}

impl ProcessEvent {
    pub fn new(
        kind: ProcessEventKind,
        process_id: impl Into<String>,
        project_id: impl Into<String>,
        component: ComponentKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            process_id: process_id.into(),
            project_id: project_id.into(),
            component,
            pid: None,
            message: message.into(),
            exit_code: None,
            timestamp: SystemTime::now(),
        }
    }

    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_exit_code(mut self, exit_code: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self
    }
}
