/*!
 * Build Pipeline Tests
 * Real toolchain invocations through the default builders
 */

use crate::support::{script, Recorder};
use devfleet::build::{BuildEvent, BuildEventKind, BuildService, BuildStatus};
use devfleet::core::{Component, ComponentKind, EventSink, Project, StaticCatalog, SupervisorConfig};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn service_for(project: Project) -> (BuildService, Recorder<BuildEvent>) {
    let events = Recorder::new();
    let service = BuildService::with_default_builders(
        Arc::new(StaticCatalog::with_projects([project])),
        &SupervisorConfig::default(),
        EventSink::new(events.handler()),
    );
    (service, events)
}

fn scripts() -> TempDir {
    let dir = TempDir::new().unwrap();
    script(
        dir.path(),
        "fail.sh",
        "echo 'compiling'\necho 'warning: unused import' >&2\necho 'error: mismatched types' >&2\nexit 1",
    );
    script(dir.path(), "ok.sh", "echo built");
    script(dir.path(), "slow.sh", "echo started\nexec sleep 30");
    dir
}

#[tokio::test]
async fn test_first_failure_stops_the_pipeline() {
    let dir = scripts();
    let project = Project::new("web", dir.path())
        .with_component(Component::new(ComponentKind::Backend, "").with_build_cmd("sh fail.sh"))
        .with_component(Component::new(ComponentKind::Cli, "").with_build_cmd("sh ok.sh"))
        .with_component(Component::new(ComponentKind::Frontend, "").with_build_cmd("sh ok.sh"));
    let (service, events) = service_for(project);

    let result = service
        .build_project(&CancellationToken::new(), "web")
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.results.len(), 1);
    let failed = &result.results[0];
    assert_eq!(failed.component, ComponentKind::Backend);
    assert_eq!(failed.status, BuildStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("error: mismatched types"));

    let build = service
        .get_build(failed.build_id.as_deref().unwrap())
        .unwrap();
    assert_eq!(build.exit_code, Some(1));
    assert_eq!(build.output, vec!["compiling"]);
    assert_eq!(build.warnings, vec!["warning: unused import"]);
    assert_eq!(build.errors, vec!["error: mismatched types"]);

    let kinds: Vec<_> = events.events().iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![BuildEventKind::Started, BuildEventKind::Finished]);
}

#[tokio::test]
async fn test_successful_pipeline_builds_every_enabled_component() {
    let dir = scripts();
    let project = Project::new("web", dir.path())
        .with_component(Component::new(ComponentKind::Frontend, "").with_build_cmd("sh ok.sh"))
        .with_component(
            Component::new(ComponentKind::Backend, "")
                .with_build_cmd("sh ok.sh")
                .with_output("bin/web-api"),
        )
        .with_component(Component::new(ComponentKind::Agent, "").disabled());
    let (service, events) = service_for(project);

    let result = service
        .build_project(&CancellationToken::new(), "web")
        .await
        .unwrap();

    assert!(result.success);
    let order: Vec<_> = result.results.iter().map(|r| r.component).collect();
    assert_eq!(order, vec![ComponentKind::Backend, ComponentKind::Frontend]);
    assert_eq!(
        result.results[0].artifact,
        Some(dir.path().join("bin/web-api"))
    );
    assert_eq!(events.events().len(), 4);

    let latest = service.latest_build("web", ComponentKind::Frontend).unwrap();
    assert_eq!(latest.status, BuildStatus::Success);
    assert_eq!(latest.output, vec!["built"]);
}

#[tokio::test]
async fn test_cancel_aborts_running_build() {
    let dir = scripts();
    let project = Project::new("web", dir.path())
        .with_component(Component::new(ComponentKind::Backend, "").with_build_cmd("sh slow.sh"));
    let (service, events) = service_for(project);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let build = service
        .build_component(&cancel, "web", ComponentKind::Backend)
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(build.status, BuildStatus::Canceled);
    assert!(build.is_complete());

    let events = events.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].status, BuildStatus::Canceled);
}

#[tokio::test]
async fn test_missing_toolchain_fails_build() {
    let dir = scripts();
    let project = Project::new("web", dir.path()).with_component(
        Component::new(ComponentKind::Backend, "").with_build_cmd("devfleet-no-such-toolchain build"),
    );
    let (service, events) = service_for(project);

    let build = service
        .build_component(&CancellationToken::new(), "web", ComponentKind::Backend)
        .await
        .unwrap();

    assert_eq!(build.status, BuildStatus::Failed);
    assert!(build.exit_code.is_none());
    assert!(build.errors[0].contains("devfleet-no-such-toolchain"));
    assert_eq!(events.events().len(), 2);
}
