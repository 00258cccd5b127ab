/*!
 * Build Service
 *
 * Resolves a builder per component kind, owns every build record, and runs
 * project pipelines in the fixed dependency order.
 */

use super::builder::Builder;
use super::bundler::BundlerBuilder;
use super::native::NativeBuilder;
use super::types::{
    Build, BuildError, BuildEvent, BuildEventKind, BuildHandle, BuildResult, BuildServiceResult,
    ProjectBuildResult,
};
use crate::core::catalog::ProjectCatalog;
use crate::core::config::SupervisorConfig;
use crate::core::events::EventSink;
use crate::core::limits::SLOW_BUILD_THRESHOLD;
use crate::core::types::{process_id, Component, ComponentKind, Project};
use crate::monitoring::span_operation;
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};

/// Build service
pub struct BuildService {
    catalog: Arc<dyn ProjectCatalog>,
    builders: RwLock<HashMap<ComponentKind, Arc<dyn Builder>, RandomState>>,
    builds: DashMap<String, BuildEntry, RandomState>,
    next_seq: AtomicU64,
    events: EventSink<BuildEvent>,
}

/// Build record plus its creation order
struct BuildEntry {
    seq: u64,
    handle: BuildHandle,
}

impl BuildService {
    /// Service with no builders registered
    pub fn new(catalog: Arc<dyn ProjectCatalog>, events: EventSink<BuildEvent>) -> Self {
        Self {
            catalog,
            builders: RwLock::new(HashMap::with_hasher(RandomState::new())),
            builds: DashMap::with_hasher(RandomState::new()),
            next_seq: AtomicU64::new(0),
            events,
        }
    }

    /// Service with the native builder for compiled kinds and the bundler
    /// for web kinds, using the configured toolchain programs
    pub fn with_default_builders(
        catalog: Arc<dyn ProjectCatalog>,
        config: &SupervisorConfig,
        events: EventSink<BuildEvent>,
    ) -> Self {
        let service = Self::new(catalog, events);
        let native: Arc<dyn Builder> =
            Arc::new(NativeBuilder::new(config.native_toolchain.clone()));
        let bundler: Arc<dyn Builder> =
            Arc::new(BundlerBuilder::new(config.script_runner.clone()));
        for kind in ComponentKind::BUILD_ORDER {
            let builder = if kind.is_bundled() { &bundler } else { &native };
            service.register(kind, Arc::clone(builder));
        }
        service
    }

    pub fn catalog(&self) -> &Arc<dyn ProjectCatalog> {
        &self.catalog
    }

    /// Register `builder` for `kind`, replacing any previous one
    pub fn register(&self, kind: ComponentKind, builder: Arc<dyn Builder>) {
        info!(component = %kind, builder = builder.name(), "Registered builder");
        self.builders.write().insert(kind, builder);
    }

    pub fn has_builder(&self, kind: ComponentKind) -> bool {
        self.builders.read().contains_key(&kind)
    }

    /// Build one component
    ///
    /// Configuration problems (unknown project or component, disabled
    /// component, no builder) are returned as errors and create nothing.
    /// Once a build record exists the call always returns it, with the
    /// outcome in its status.
    pub async fn build_component(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        kind: ComponentKind,
    ) -> BuildServiceResult<Build> {
        let (project, component) = self.resolve(project_id, kind)?;
        let builder = self.builder_for(&component)?;
        Ok(self.run(cancel, &project, &component, builder).await)
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        project: &Project,
        component: &Component,
        builder: Arc<dyn Builder>,
    ) -> Build {
        let handle = BuildHandle::new(Build::new(project.id.clone(), component.kind));
        let build_id = handle.id();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.builds.insert(
            build_id.clone(),
            BuildEntry {
                seq,
                handle: handle.clone(),
            },
        );

        let span = span_operation("build")
            .with_subject(&build_id)
            .with_slow_threshold(SLOW_BUILD_THRESHOLD);

        let started = handle.update(|build| {
            build.start();
            BuildEvent::new(
                BuildEventKind::Started,
                build,
                format!("building {}", process_id(&project.id, component.kind)),
            )
        });
        self.events.emit(started);

        let outcome = builder
            .build(cancel, project, component, &handle)
            .instrument(span.span().clone())
            .await;

        let finished = handle.update(|build| {
            match &outcome {
                Ok(code) => {
                    build.finish(*code);
                }
                Err(BuildError::Canceled) => {
                    build.cancel();
                }
                Err(e) => {
                    build.fail(e.to_string());
                }
            }
            let message = build
                .failure_reason()
                .unwrap_or_else(|| "build succeeded".to_string());
            BuildEvent::new(BuildEventKind::Finished, build, message)
        });

        let snapshot = handle.snapshot();
        span.record_result(snapshot.is_success());
        if let Some(reason) = snapshot.failure_reason() {
            span.record_error(&reason);
            warn!(
                build = %build_id,
                project = %project.id,
                component = %component.kind,
                status = %snapshot.status,
                reason = %reason,
                "Build did not succeed"
            );
        } else {
            info!(
                build = %build_id,
                project = %project.id,
                component = %component.kind,
                duration_ms = snapshot.duration.unwrap_or_default().as_millis() as u64,
                warnings = snapshot.warnings.len(),
                "Build succeeded"
            );
        }

        self.events.emit(finished);
        snapshot
    }

    /// Build enabled components in dependency order, stopping at the first failure
    pub async fn build_project(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> BuildServiceResult<ProjectBuildResult> {
        let project = self
            .catalog
            .project(project_id)
            .ok_or_else(|| BuildError::ProjectNotFound(project_id.to_string()))?;

        let start = Instant::now();
        let mut results = Vec::new();
        let mut error = None;

        for component in project.enabled_components() {
            if cancel.is_cancelled() {
                error = Some(BuildError::Canceled.to_string());
                break;
            }

            let result = match self.builder_for(component) {
                Ok(builder) => self.run(cancel, &project, component, builder).await.result(),
                Err(e) => BuildResult::rejected(project_id, component.kind, &e),
            };
            let failed = !result.is_success();
            results.push(result);
            if failed {
                break;
            }
        }

        let success = error.is_none() && results.iter().all(BuildResult::is_success);
        Ok(ProjectBuildResult {
            project_id: project_id.to_string(),
            success,
            results,
            duration: start.elapsed(),
            error,
        })
    }

    /// Build every catalog project in turn; failures are collected, not fatal
    pub async fn build_all(&self, cancel: &CancellationToken) -> Vec<ProjectBuildResult> {
        let mut results = Vec::new();
        for project in self.catalog.projects() {
            let result = match self.build_project(cancel, &project.id).await {
                Ok(result) => result,
                Err(e) => ProjectBuildResult::rejected(&project.id, &e),
            };
            results.push(result);
        }
        results
    }

    pub fn get_build(&self, id: &str) -> Option<Build> {
        self.builds.get(id).map(|entry| entry.handle.snapshot())
    }

    /// Every build, oldest first
    pub fn list_builds(&self) -> Vec<Build> {
        let mut builds: Vec<(u64, Build)> = self
            .builds
            .iter()
            .map(|entry| (entry.seq, entry.handle.snapshot()))
            .collect();
        builds.sort_by_key(|(seq, _)| *seq);
        builds.into_iter().map(|(_, build)| build).collect()
    }

    pub fn builds_for_project(&self, project_id: &str) -> Vec<Build> {
        self.list_builds()
            .into_iter()
            .filter(|b| b.project_id == project_id)
            .collect()
    }

    /// Most recent build of one component
    pub fn latest_build(&self, project_id: &str, kind: ComponentKind) -> Option<Build> {
        self.builds_for_project(project_id)
            .into_iter()
            .filter(|b| b.component == kind)
            .last()
    }

    /// Drop finished builds; returns how many were removed
    pub fn clear_completed(&self) -> usize {
        let before = self.builds.len();
        self.builds.retain(|_, entry| !entry.handle.is_complete());
        before - self.builds.len()
    }

    fn resolve(
        &self,
        project_id: &str,
        kind: ComponentKind,
    ) -> BuildServiceResult<(Project, Component)> {
        let project = self
            .catalog
            .project(project_id)
            .ok_or_else(|| BuildError::ProjectNotFound(project_id.to_string()))?;
        let component = project
            .component(kind)
            .cloned()
            .ok_or_else(|| BuildError::ComponentNotFound {
                project: project_id.to_string(),
                component: kind,
            })?;
        if !component.enabled {
            return Err(BuildError::Disabled(process_id(project_id, kind)));
        }
        Ok((project, component))
    }

    fn builder_for(&self, component: &Component) -> BuildServiceResult<Arc<dyn Builder>> {
        self.builders
            .read()
            .get(&component.kind)
            .filter(|builder| builder.can_build(component))
            .cloned()
            .ok_or(BuildError::NoBuilder(component.kind))
    }
}
