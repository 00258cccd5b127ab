/*!
 * Script Bundler Builder
 * Builds web components through the package script runner
 */

use super::builder::{run_build_command, BuildCommand, BuildFuture, Builder};
use super::types::BuildHandle;
use crate::core::limits::DEFAULT_SCRIPT_RUNNER;
use crate::core::types::{Component, Project};
use crate::process::command::explicit_command;
use crate::process::platform::{self, ProcessController};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// `<runner> run build` unless the component declares its own build command
pub struct BundlerBuilder {
    runner: String,
    controller: Arc<dyn ProcessController>,
}

impl BundlerBuilder {
    pub fn new(runner: impl Into<String>) -> Self {
        Self {
            runner: runner.into(),
            controller: platform::default_controller(),
        }
    }

    pub fn runner(&self) -> &str {
        &self.runner
    }

    pub fn command(&self, component: &Component) -> (String, Vec<String>) {
        explicit_command(component.build_cmd.as_deref())
            .unwrap_or_else(|| (self.runner.clone(), vec!["run".into(), "build".into()]))
    }
}

impl Default for BundlerBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SCRIPT_RUNNER)
    }
}

impl Builder for BundlerBuilder {
    fn name(&self) -> &'static str {
        "bundler"
    }

    fn can_build(&self, component: &Component) -> bool {
        component.kind.is_bundled()
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
            let (program, args) = self.command(component);
            if let Some(output) = &component.output {
                build.set_artifact(work_dir.join(output));
            }

            info!(
                build = %build.id(),
                project = %project.id,
                component = %component.kind,
                program = %program,
                "Bundling web component"
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
