/*!
 * devfleet
 * Process supervision and build orchestration for multi-component projects
 */

pub mod build;
pub mod core;
pub mod monitoring;
pub mod process;

// Re-exports
pub use build::{
    Build, BuildEvent, BuildResult, BuildService, BuildStatus, BuildSummary, Builder,
    Orchestrator, ProjectBuildResult,
};
pub use crate::core::{
    BuildError, Component, ComponentKind, DevfleetConfig, DevfleetError, EventSink,
    OrchestratorConfig, ProcessError, Project, ProjectCatalog, StaticCatalog, SupervisorConfig,
};
pub use monitoring::init_tracing;
pub use process::{
    Process, ProcessEvent, ProcessManager, ProcessState, ProcessSummary, StopOutcome, Supervisor,
};
