/*!
 * Catalog Boundary Tests
 * Services only consult the catalog through the ProjectCatalog trait
 */

use devfleet::build::BuildService;
use devfleet::core::{
    BuildError, Component, ComponentKind, EventSink, ProcessError, Project, ProjectCatalog,
};
use devfleet::process::ProcessManager;
use mockall::mock;
use mockall::predicate::eq;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mock! {
    pub Catalog {}

    impl ProjectCatalog for Catalog {
        fn project(&self, id: &str) -> Option<Project>;
        fn projects(&self) -> Vec<Project>;
    }
}

#[tokio::test]
async fn test_unknown_project_is_looked_up_once() {
    let mut catalog = MockCatalog::new();
    catalog
        .expect_project()
        .with(eq("ghost"))
        .times(1)
        .returning(|_| None);

    let service = BuildService::new(Arc::new(catalog), EventSink::disconnected());
    let err = service
        .build_component(&CancellationToken::new(), "ghost", ComponentKind::Backend)
        .await
        .unwrap_err();
    assert_eq!(err, BuildError::ProjectNotFound("ghost".into()));
    assert!(service.list_builds().is_empty());
}

#[tokio::test]
async fn test_build_all_lists_projects_from_catalog() {
    let project = Project::new("api", "/tmp")
        .with_component(Component::new(ComponentKind::Backend, "").disabled());
    let listed = project.clone();

    let mut catalog = MockCatalog::new();
    catalog
        .expect_projects()
        .times(1)
        .returning(move || vec![listed.clone()]);
    catalog
        .expect_project()
        .with(eq("api"))
        .returning(move |_| Some(project.clone()));

    let service = BuildService::new(Arc::new(catalog), EventSink::disconnected());
    let results = service.build_all(&CancellationToken::new()).await;

    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert!(results[0].results.is_empty());
}

#[test]
fn test_process_manager_rejects_disabled_component_from_catalog() {
    let project = Project::new("api", "/tmp")
        .with_component(Component::new(ComponentKind::Agent, "agent").disabled());

    let mut catalog = MockCatalog::new();
    catalog
        .expect_project()
        .with(eq("api"))
        .times(1)
        .returning(move |_| Some(project.clone()));

    let manager = ProcessManager::new(Arc::new(catalog));
    let err = manager
        .start_component(&CancellationToken::new(), "api", ComponentKind::Agent)
        .unwrap_err();
    assert_eq!(err, ProcessError::Disabled("api/agent".into()));
    assert!(manager.is_empty());
}
