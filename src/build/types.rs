/*!
 * Build Types
 * Build records, per-project results, and build events
 */

use crate::core::serde::{
    is_empty_vec, is_none, optional_duration_millis, optional_system_time_micros,
    system_time_micros,
};
use crate::core::types::{ComponentKind, ProjectId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub use crate::core::errors::BuildError;

/// Build operation result
pub type BuildServiceResult<T> = Result<T, BuildError>;

/// Build lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
}

impl BuildStatus {
    /// Success, Failed, and Canceled are final
    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            BuildStatus::Success | BuildStatus::Failed | BuildStatus::Canceled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Pending => "pending",
            BuildStatus::Running => "running",
            BuildStatus::Success => "success",
            BuildStatus::Failed => "failed",
            BuildStatus::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collision-resistant build id: creation time in millis plus a random suffix
pub fn generate_build_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let random = Uuid::new_v4().simple().to_string();
    format!("{}-{}", millis, &random[..8])
}

/// Whether a stderr line is a warning rather than an error
pub fn is_warning_line(line: &str) -> bool {
    line.to_ascii_lowercase().contains("warn")
}

/// One build invocation for a (project, component) pair
///
/// Immutable once complete: lifecycle calls and output recording are ignored
/// after `Success`, `Failed`, or `Canceled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Build {
    pub id: String,
    pub project_id: ProjectId,
    pub component: ComponentKind,
    pub status: BuildStatus,
    #[serde(with = "system_time_micros")]
    pub created_at: SystemTime,
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
    pub finished_at: Option<SystemTime>,
    #[serde(
        with = "optional_duration_millis",
        skip_serializing_if = "is_none",
        default
    )]
    pub duration: Option<Duration>,
    #[serde(skip_serializing_if = "is_empty_vec", default)]
    pub output: Vec<String>,
    #[serde(skip_serializing_if = "is_empty_vec", default)]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "is_empty_vec", default)]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "is_none", default)]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "is_none", default)]
    pub artifact: Option<PathBuf>,
}

impl Build {
    pub fn new(project_id: impl Into<String>, component: ComponentKind) -> Self {
        Self {
            id: generate_build_id(),
            project_id: project_id.into(),
            component,
            status: BuildStatus::Pending,
            created_at: SystemTime::now(),
            started_at: None,
            finished_at: None,
            duration: None,
            output: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            exit_code: None,
            artifact: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }

    pub fn is_success(&self) -> bool {
        self.status == BuildStatus::Success
    }

    /// Pending -> Running
    pub fn start(&mut self) -> bool {
        if self.status != BuildStatus::Pending {
            return false;
        }
        self.status = BuildStatus::Running;
        self.started_at = Some(SystemTime::now());
        true
    }

    /// Success on exit code 0, Failed otherwise
    pub fn finish(&mut self, exit_code: i32) -> bool {
        let status = if exit_code == 0 {
            BuildStatus::Success
        } else {
            BuildStatus::Failed
        };
        if !self.complete(status) {
            return false;
        }
        self.exit_code = Some(exit_code);
        true
    }

    /// Failed without an exit code, e.g. the toolchain could not be spawned
    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        if self.is_complete() {
            return false;
        }
        self.errors.push(reason.into());
        self.complete(BuildStatus::Failed)
    }

    pub fn cancel(&mut self) -> bool {
        self.complete(BuildStatus::Canceled)
    }

    fn complete(&mut self, status: BuildStatus) -> bool {
        if self.is_complete() {
            return false;
        }
        let now = SystemTime::now();
        self.status = status;
        self.finished_at = Some(now);
        self.duration = self
            .started_at
            .and_then(|started| now.duration_since(started).ok());
        true
    }

    pub fn record_stdout(&mut self, line: impl Into<String>) {
        if !self.is_complete() {
            self.output.push(line.into());
        }
    }

    /// Classify a stderr line into warnings or errors
    pub fn record_stderr(&mut self, line: impl Into<String>) {
        if self.is_complete() {
            return;
        }
        let line = line.into();
        if is_warning_line(&line) {
            self.warnings.push(line);
        } else {
            self.errors.push(line);
        }
    }

    pub fn set_artifact(&mut self, artifact: impl Into<PathBuf>) {
        if !self.is_complete() {
            self.artifact = Some(artifact.into());
        }
    }

    /// Human-readable failure reason, if the build did not succeed
    pub fn failure_reason(&self) -> Option<String> {
        match self.status {
            BuildStatus::Success | BuildStatus::Pending | BuildStatus::Running => None,
            BuildStatus::Canceled => Some("build canceled".to_string()),
            BuildStatus::Failed => Some(match (self.errors.last(), self.exit_code) {
                (Some(last), _) => last.clone(),
                (None, Some(code)) => format!("exited with code {}", code),
                (None, None) => "build failed".to_string(),
            }),
        }
    }

    pub fn result(&self) -> BuildResult {
        BuildResult {
            project_id: self.project_id.clone(),
            component: self.component,
            build_id: Some(self.id.clone()),
            status: self.status,
            duration: self.duration,
            artifact: self.artifact.clone(),
            error: self.failure_reason(),
        }
    }
}

/// Shared, lockable build record
///
/// The service map and the running builder hold clones of the same handle,
/// so listings observe output while the build is in flight.
#[derive(Debug, Clone)]
pub struct BuildHandle {
    inner: Arc<RwLock<Build>>,
}

impl BuildHandle {
    pub fn new(build: Build) -> Self {
        Self {
            inner: Arc::new(RwLock::new(build)),
        }
    }

    pub fn id(&self) -> String {
        self.inner.read().id.clone()
    }

    pub fn status(&self) -> BuildStatus {
        self.inner.read().status
    }

    pub fn is_complete(&self) -> bool {
        self.inner.read().is_complete()
    }

    pub fn snapshot(&self) -> Build {
        self.inner.read().clone()
    }

    pub fn record_stdout(&self, line: impl Into<String>) {
        self.inner.write().record_stdout(line);
    }

    pub fn record_stderr(&self, line: impl Into<String>) {
        self.inner.write().record_stderr(line);
    }

    pub fn set_artifact(&self, artifact: impl Into<PathBuf>) {
        self.inner.write().set_artifact(artifact);
    }

    /// Apply a lifecycle change under the write lock
    pub fn update<R>(&self, f: impl FnOnce(&mut Build) -> R) -> R {
        let mut build = self.inner.write();
        f(&mut *build)
    }
}

/// Outcome of one component build inside a project pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BuildResult {
    pub project_id: ProjectId,
    pub component: ComponentKind,
    /// Absent when the build was rejected before a record was created
    #[serde(skip_serializing_if = "is_none", default)]
    pub build_id: Option<String>,
    pub status: BuildStatus,
    #[serde(
        with = "optional_duration_millis",
        skip_serializing_if = "is_none",
        default
    )]
    pub duration: Option<Duration>,
    #[serde(skip_serializing_if = "is_none", default)]
    pub artifact: Option<PathBuf>,
    #[serde(skip_serializing_if = "is_none", default)]
    pub error: Option<String>,
}

impl BuildResult {
    /// Result for a component whose build could not be created
    pub fn rejected(project_id: &str, component: ComponentKind, error: &BuildError) -> Self {
        Self {
            project_id: project_id.to_string(),
            component,
            build_id: None,
            status: BuildStatus::Failed,
            duration: None,
            artifact: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == BuildStatus::Success
    }
}

/// Outcome of a project pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProjectBuildResult {
    pub project_id: ProjectId,
    pub success: bool,
    /// In build order, ending at the first failure
    pub results: Vec<BuildResult>,
    #[serde(with = "crate::core::serde::duration_millis")]
    pub duration: Duration,
    /// Project-level failure not tied to one component
    #[serde(skip_serializing_if = "is_none", default)]
    pub error: Option<String>,
}

impl ProjectBuildResult {
    pub fn rejected(project_id: &str, error: &BuildError) -> Self {
        Self {
            project_id: project_id.to_string(),
            success: false,
            results: Vec::new(),
            duration: Duration::ZERO,
            error: Some(error.to_string()),
        }
    }

    /// The failing component result, if any
    pub fn failure(&self) -> Option<&BuildResult> {
        self.results.iter().find(|r| !r.is_success())
    }
}

/// Build event type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildEventKind {
    Started,
    Finished,
}

/// Immutable build notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BuildEvent {
    pub kind: BuildEventKind,
    pub build_id: String,
    pub project_id: ProjectId,
    pub component: ComponentKind,
    pub status: BuildStatus,
    pub message: String,
    #[serde(with = "system_time_micros")]
    pub timestamp: SystemTime,
}

impl BuildEvent {
    pub fn new(kind: BuildEventKind, build: &Build, message: impl Into<String>) -> Self {
        Self {
            kind,
            build_id: build.id.clone(),
            project_id: build.project_id.clone(),
            component: build.component,
            status: build.status,
            message: message.into(),
            timestamp: SystemTime::now(),
        }
    }
}
