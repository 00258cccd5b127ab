/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use crate::core::types::ComponentKind;
use crate::process::types::ProcessState;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Process supervision errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ProcessError {
    #[error("Project {0} not found")]
    #[diagnostic(
        code(process::project_not_found),
        help("Check that the project is registered in the catalog.")
    )]
    ProjectNotFound(String),

    #[error("Component {component} not found in project {project}")]
    #[diagnostic(
        code(process::component_not_found),
        help("The project does not declare this component.")
    )]
    ComponentNotFound {
        project: String,
        component: ComponentKind,
    },

    #[error("Process {0} not found")]
    #[diagnostic(
        code(process::not_found),
        help("The process was never started or has been unregistered.")
    )]
    NotFound(String),

    #[error("Component {0} is disabled")]
    #[diagnostic(
        code(process::disabled),
        help("Enable the component in the project configuration.")
    )]
    Disabled(String),

    #[error("Process {0} is already running")]
    #[diagnostic(
        code(process::already_running),
        help("Stop or restart the process instead of starting it again.")
    )]
    AlreadyRunning(String),

    #[error("Process {0} is not running")]
    #[diagnostic(code(process::not_running))]
    NotRunning(String),

    #[error("Process {0} is not paused")]
    #[diagnostic(code(process::not_paused))]
    NotPaused(String),

    #[error("Process {0} still owns a live OS process")]
    #[diagnostic(
        code(process::still_running),
        help("Stop the process before unregistering it.")
    )]
    StillRunning(String),

    #[error("Failed to spawn process: {0}")]
    #[diagnostic(
        code(process::spawn_failed),
        help("Check that the executable exists and the working directory is valid.")
    )]
    SpawnFailed(String),

    #[error("Failed to signal process: {0}")]
    #[diagnostic(code(process::signal_failed))]
    SignalFailed(String),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    #[diagnostic(code(process::invalid_state))]
    InvalidStateTransition {
        from: ProcessState,
        to: ProcessState,
    },

    #[error("Start of {0} was cancelled")]
    #[diagnostic(code(process::cancelled))]
    Cancelled(String),
}

/// Build errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum BuildError {
    #[error("Project {0} not found")]
    #[diagnostic(code(build::project_not_found))]
    ProjectNotFound(String),

    #[error("Component {component} not found in project {project}")]
    #[diagnostic(code(build::component_not_found))]
    ComponentNotFound {
        project: String,
        component: ComponentKind,
    },

    #[error("Component {0} is disabled")]
    #[diagnostic(
        code(build::disabled),
        help("Enable the component in the project configuration.")
    )]
    Disabled(String),

    #[error("No builder registered for {0} components")]
    #[diagnostic(
        code(build::no_builder),
        help("Register a Builder for this component kind before building.")
    )]
    NoBuilder(ComponentKind),

    #[error("Invalid build command: {0}")]
    #[diagnostic(code(build::invalid_command))]
    InvalidCommand(String),

    #[error("Failed to spawn build command: {0}")]
    #[diagnostic(
        code(build::spawn_failed),
        help("Check that the toolchain is installed and on PATH.")
    )]
    SpawnFailed(String),

    #[error("Build I/O error: {0}")]
    #[diagnostic(code(build::io))]
    Io(String),

    #[error("Build canceled")]
    #[diagnostic(code(build::canceled))]
    Canceled,
}

/// Unified error type with miette diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum DevfleetError {
    #[error("Process error: {0}")]
    #[diagnostic(transparent)]
    Process(#[from] ProcessError),

    #[error("Build error: {0}")]
    #[diagnostic(transparent)]
    Build(#[from] BuildError),
}
