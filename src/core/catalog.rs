/*!
 * Project Catalog
 * Lookup boundary towards whatever loads project configuration
 */

use super::types::Project;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Source of project definitions
///
/// Implementations return owned snapshots; callers never hold a borrow into
/// the catalog across an await.
pub trait ProjectCatalog: Send + Sync {
    fn project(&self, id: &str) -> Option<Project>;

    /// All projects, ordered by id
    fn projects(&self) -> Vec<Project>;
}

/// In-memory catalog
#[derive(Debug, Default)]
pub struct StaticCatalog {
    projects: RwLock<BTreeMap<String, Project>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_projects(projects: impl IntoIterator<Item = Project>) -> Self {
        let catalog = Self::new();
        for project in projects {
            catalog.insert(project);
        }
        catalog
    }

    /// Insert or replace a project, returning the previous definition
    pub fn insert(&self, project: Project) -> Option<Project> {
        self.projects.write().insert(project.id.clone(), project)
    }

    pub fn remove(&self, id: &str) -> Option<Project> {
        self.projects.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.projects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.read().is_empty()
    }
}

impl ProjectCatalog for StaticCatalog {
    fn project(&self, id: &str) -> Option<Project> {
        self.projects.read().get(id).cloned()
    }

    fn projects(&self) -> Vec<Project> {
        self.projects.read().values().cloned().collect()
    }
}
