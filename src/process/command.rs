/*!
 * Launch Resolution
 * Turns a component definition into the program, arguments, and environment
 * the supervisor spawns
 */

use crate::core::config::SupervisorConfig;
use crate::core::types::{Component, Project};
use std::path::PathBuf;

/// Environment variable carrying the project id
pub const ENV_PROJECT_ID: &str = "DEVFLEET_PROJECT_ID";
/// Environment variable carrying the project display name
pub const ENV_PROJECT_NAME: &str = "DEVFLEET_PROJECT_NAME";
/// Environment variable carrying the component kind
pub const ENV_COMPONENT: &str = "DEVFLEET_COMPONENT";
/// Environment variable carrying the assigned port
pub const ENV_PORT: &str = "PORT";

/// Everything needed to spawn one component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub work_dir: PathBuf,
    /// Added on top of the inherited environment, later entries win
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    /// Resolve how to run `component`
    ///
    /// A non-blank `run_cmd` is split on whitespace and used verbatim.
    /// Otherwise bundled components run `<script runner> run dev` and native
    /// components run `<toolchain> run <entrypoint>`, with the component's
    /// extra arguments appended.
    pub fn resolve(config: &SupervisorConfig, project: &Project, component: &Component) -> Self {
        let (program, args) = match explicit_command(component.run_cmd.as_deref()) {
            Some(parts) => parts,
            None if component.kind.is_bundled() => {
                let mut args = vec!["run".to_string(), "dev".to_string()];
                if !component.args.is_empty() {
                    args.push("--".to_string());
                    args.extend(component.args.iter().cloned());
                }
                (config.script_runner.clone(), args)
            }
            None => {
                let entrypoint = component
                    .entrypoint
                    .clone()
                    .unwrap_or_else(|| ".".to_string());
                let mut args = vec!["run".to_string(), entrypoint];
                args.extend(component.args.iter().cloned());
                (config.native_toolchain.clone(), args)
            }
        };

        Self {
            program,
            args,
            work_dir: project.work_dir(component),
            env: identity_env(project, component),
        }
    }

    /// Program and arguments joined for display
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Split an explicit command; blank commands fall back to the defaults
pub fn explicit_command(cmd: Option<&str>) -> Option<(String, Vec<String>)> {
    let mut parts = cmd?.split_whitespace().map(str::to_string);
    let program = parts.next()?;
    Some((program, parts.collect()))
}

fn identity_env(project: &Project, component: &Component) -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = component
        .env
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    env.push((ENV_PROJECT_ID.to_string(), project.id.clone()));
    env.push((ENV_PROJECT_NAME.to_string(), project.name.clone()));
    env.push((ENV_COMPONENT.to_string(), component.kind.to_string()));
    if let Some(port) = component.port {
        env.push((ENV_PORT.to_string(), port.to_string()));
    }
    env
}
