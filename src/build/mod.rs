/*!
 * Build Module
 * Component builders, the build service, and fleet orchestration
 */

pub mod builder;
pub mod bundler;
pub mod native;
pub mod orchestrator;
pub mod service;
pub mod types;

// Re-export for convenience
pub use builder::{run_build_command, BuildCommand, BuildFuture, Builder};
pub use bundler::BundlerBuilder;
pub use native::NativeBuilder;
pub use orchestrator::{BuildSummary, FleetResults, Orchestrator};
pub use service::BuildService;
pub use types::{
    generate_build_id, is_warning_line, Build, BuildError, BuildEvent, BuildEventKind,
    BuildHandle, BuildResult, BuildServiceResult, BuildStatus, ProjectBuildResult,
};
