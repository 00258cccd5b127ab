/*!
 * Core Types
 * Project and component model shared by the supervisor and the build engine
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Project identifier
pub type ProjectId = String;

/// Kind of a project component
///
/// The declaration order is the build dependency order: later components may
/// consume artifacts produced by earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Backend,
    Cli,
    Agent,
    Frontend,
}

impl ComponentKind {
    /// Fixed build order within a project
    pub const BUILD_ORDER: [ComponentKind; 4] = [
        ComponentKind::Backend,
        ComponentKind::Cli,
        ComponentKind::Agent,
        ComponentKind::Frontend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Backend => "backend",
            ComponentKind::Cli => "cli",
            ComponentKind::Agent => "agent",
            ComponentKind::Frontend => "frontend",
        }
    }

    /// Whether the component is built and run by the script bundler
    /// rather than the native toolchain
    pub fn is_bundled(&self) -> bool {
        matches!(self, ComponentKind::Frontend)
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "backend" => Ok(ComponentKind::Backend),
            "cli" => Ok(ComponentKind::Cli),
            "agent" => Ok(ComponentKind::Agent),
            "frontend" => Ok(ComponentKind::Frontend),
            other => Err(format!("unknown component kind: {}", other)),
        }
    }
}

/// One buildable/runnable unit of a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Component {
    pub kind: ComponentKind,
    pub enabled: bool,
    /// Directory relative to the project root
    pub path: PathBuf,
    /// Explicit run command; whitespace separated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_cmd: Option<String>,
    /// Explicit build command; whitespace separated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_cmd: Option<String>,
    /// Package or file handed to the native toolchain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    /// Extra arguments appended to the default run command
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Build artifact path, relative to the component directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

impl Component {
    pub fn new(kind: ComponentKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            enabled: true,
            path: path.into(),
            run_cmd: None,
            build_cmd: None,
            entrypoint: None,
            args: Vec::new(),
            env: BTreeMap::new(),
            port: None,
            output: None,
        }
    }

    pub fn with_run_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.run_cmd = Some(cmd.into());
        self
    }

    pub fn with_build_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.build_cmd = Some(cmd.into());
        self
    }

    pub fn with_entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.entrypoint = Some(entrypoint.into());
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A developer project made of components
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub root: PathBuf,
    #[serde(default)]
    pub components: BTreeMap<ComponentKind, Component>,
}

impl Project {
    pub fn new(id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            root: root.into(),
            components: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_component(mut self, component: Component) -> Self {
        self.components.insert(component.kind, component);
        self
    }

    pub fn component(&self, kind: ComponentKind) -> Option<&Component> {
        self.components.get(&kind)
    }

    /// Enabled components in build order
    pub fn enabled_components(&self) -> impl Iterator<Item = &Component> {
        ComponentKind::BUILD_ORDER
            .iter()
            .filter_map(move |kind| self.components.get(kind))
            .filter(|c| c.enabled)
    }

    /// Working directory of a component
    pub fn work_dir(&self, component: &Component) -> PathBuf {
        join_relative(&self.root, &component.path)
    }
}

fn join_relative(root: &Path, path: &Path) -> PathBuf {
    if path.as_os_str().is_empty() {
        root.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Deterministic process identifier for a (project, component) pair
pub fn process_id(project_id: &str, kind: ComponentKind) -> String {
    format!("{}/{}", project_id, kind)
}

/// Split a process identifier back into its parts
pub fn parse_process_id(id: &str) -> Option<(&str, ComponentKind)> {
    let (project, component) = id.rsplit_once('/')?;
    let kind = component.parse().ok()?;
    Some((project, kind))
}
