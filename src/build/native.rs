/*!
 * Native Toolchain Builder
 * Compiles backend, CLI, and agent components into a binary artifact
 */

use super::builder::{run_build_command, BuildCommand, BuildFuture, Builder};
use super::types::{BuildError, BuildHandle};
use crate::core::limits::{DEFAULT_ARTIFACT_DIR, DEFAULT_NATIVE_TOOLCHAIN};
use crate::core::types::{Component, Project};
use crate::process::command::explicit_command;
use crate::process::platform::{self, ProcessController};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// `<toolchain> build -o <artifact> <entrypoint>` unless the component
/// declares its own build command
pub struct NativeBuilder {
    toolchain: String,
    controller: Arc<dyn ProcessController>,
}

impl NativeBuilder {
    pub fn new(toolchain: impl Into<String>) -> Self {
        Self::with_controller(toolchain, platform::default_controller())
    }

    pub fn with_controller(
        toolchain: impl Into<String>,
        controller: Arc<dyn ProcessController>,
    ) -> Self {
        Self {
            toolchain: toolchain.into(),
            controller,
        }
    }

    pub fn toolchain(&self) -> &str {
        &self.toolchain
    }

    /// Where the binary lands: the declared output, or `bin/<project>-<kind>`
    pub fn artifact_path(project: &Project, component: &Component) -> PathBuf {
        let work_dir = project.work_dir(component);
        match &component.output {
            Some(output) => work_dir.join(output),
            None => {
                let name = format!(
                    "{}-{}{}",
                    project.id,
                    component.kind,
                    std::env::consts::EXE_SUFFIX
                );
                work_dir.join(DEFAULT_ARTIFACT_DIR).join(name)
            }
        }
    }

    /// Program and arguments for `component`
    pub fn command(&self, project: &Project, component: &Component) -> (String, Vec<String>) {
        if let Some(explicit) = explicit_command(component.build_cmd.as_deref()) {
            return explicit;
        }
        let artifact = Self::artifact_path(project, component);
        let entrypoint = component
            .entrypoint
            .clone()
            .unwrap_or_else(|| ".".to_string());
        (
            self.toolchain.clone(),
            vec![
                "build".to_string(),
                "-o".to_string(),
                artifact.to_string_lossy().into_owned(),
                entrypoint,
            ],
        )
    }
}

impl Default for NativeBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_NATIVE_TOOLCHAIN)
    }
}

impl Builder for NativeBuilder {
    fn name(&self) -> &'static str {
        "native"
    }

    fn can_build(&self, component: &Component) -> bool {
        !component.kind.is_bundled()
    }

    fn build<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        project: &'a Project,
        component: &'a Component,
        build: &'a BuildHandle,
    ) -> BuildFuture<'a> {
        Box::pin(async move {
            let work_dir = project.work_dir(component);
            let (program, args) = self.command(project, component);
            if component.build_cmd.is_none() || component.output.is_some() {
                let artifact = Self::artifact_path(project, component);
                if let Some(dir) = artifact.parent() {
                    tokio::fs::create_dir_all(dir)
                        .await
                        .map_err(|e| BuildError::Io(format!("{}: {}", dir.display(), e)))?;
                }
                build.set_artifact(artifact);
            }

            info!(
                build = %build.id(),
                project = %project.id,
                component = %component.kind,
                program = %program,
                "Building native component"
            );

            run_build_command(
                self.controller.as_ref(),
                cancel,
                BuildCommand {
                    program,
                    args,
                    work_dir: &work_dir,
                    env: component
                        .env
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                },
                build,
            )
            .await
        })
    }
}
