/*!
 * Process Management
 * Registry of supervised processes keyed by `project/component`
 */

use super::managed::ManagedProcess;
use super::platform::ProcessController;
use super::supervisor::{StopOutcome, Supervisor};
use super::types::{
    LogLine, Process, ProcessError, ProcessEvent, ProcessResult, ProcessState, ProcessSummary,
};
use crate::core::catalog::ProjectCatalog;
use crate::core::config::SupervisorConfig;
use crate::core::events::EventSink;
use crate::core::types::{process_id, Component, ComponentKind, Project};
use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Per-component outcome of starting a whole project
pub type ComponentStart = (ComponentKind, ProcessResult<Process>);

/// Process registry and service entry point
///
/// Cheap to clone; clones share the same registry and supervisor.
#[derive(Clone)]
pub struct ProcessManager {
    catalog: Arc<dyn ProjectCatalog>,
    supervisor: Arc<Supervisor>,
    processes: Arc<DashMap<String, Arc<ManagedProcess>, RandomState>>,
}

/// Builder for ProcessManager
pub struct ProcessManagerBuilder {
    catalog: Arc<dyn ProjectCatalog>,
    config: SupervisorConfig,
    events: EventSink<ProcessEvent>,
    controller: Option<Arc<dyn ProcessController>>,
}

impl ProcessManagerBuilder {
    pub fn new(catalog: Arc<dyn ProjectCatalog>) -> Self {
        Self {
            catalog,
            config: SupervisorConfig::default(),
            events: EventSink::disconnected(),
            controller: None,
        }
    }

    pub fn with_config(mut self, config: SupervisorConfig) -> Self {
        self.config = config;
        self
    }

    /// Install the event handler
    pub fn with_event_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(ProcessEvent) + Send + Sync + 'static,
    {
        self.events = EventSink::new(handler);
        self
    }

    pub fn with_events(mut self, events: EventSink<ProcessEvent>) -> Self {
        self.events = events;
        self
    }

    /// Override the platform controller
    pub fn with_controller(mut self, controller: Arc<dyn ProcessController>) -> Self {
        self.controller = Some(controller);
        self
    }

    pub fn build(self) -> ProcessManager {
        let supervisor = match self.controller {
            Some(controller) => Supervisor::with_controller(controller, self.config, self.events),
            None => Supervisor::new(self.config, self.events),
        };

        ProcessManager {
            catalog: self.catalog,
            supervisor: Arc::new(supervisor),
            processes: Arc::new(DashMap::with_hasher(RandomState::new())),
        }
    }
}

impl ProcessManager {
    pub fn new(catalog: Arc<dyn ProjectCatalog>) -> Self {
        ProcessManagerBuilder::new(catalog).build()
    }

    pub fn builder(catalog: Arc<dyn ProjectCatalog>) -> ProcessManagerBuilder {
        ProcessManagerBuilder::new(catalog)
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn supports_pause(&self) -> bool {
        self.supervisor.supports_pause()
    }

    /// Start one component
    ///
    /// The token only gates the start itself; cancelling it later does not
    /// stop a process that was already spawned.
    pub fn start_component(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        kind: ComponentKind,
    ) -> ProcessResult<Process> {
        let id = process_id(project_id, kind);
        if cancel.is_cancelled() {
            return Err(ProcessError::Cancelled(id));
        }

        let (project, component) = self.resolve(project_id, kind)?;
        let process = self.reserve(&id, project_id, kind, 0)?;
        self.supervisor.start(&process, &project, &component)?;
        Ok(process.snapshot())
    }

    /// Start every enabled component of a project in build order
    ///
    /// Components that are already live are reported with their current
    /// snapshot. Per-component failures do not stop the remaining starts.
    pub fn start_project(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> ProcessResult<Vec<ComponentStart>> {
        let project = self
            .catalog
            .project(project_id)
            .ok_or_else(|| ProcessError::ProjectNotFound(project_id.to_string()))?;

        let mut results = Vec::new();
        for component in project.enabled_components() {
            if cancel.is_cancelled() {
                return Err(ProcessError::Cancelled(project_id.to_string()));
            }

            let id = process_id(project_id, component.kind);
            let live = self
                .processes
                .get(&id)
                .filter(|existing| existing.is_live())
                .map(|existing| existing.snapshot());
            let result = match live {
                Some(snapshot) => Ok(snapshot),
                None => self.start_component(cancel, project_id, component.kind),
            };
            if let Err(e) = &result {
                warn!(process = %id, error = %e, "Component failed to start");
            }
            results.push((component.kind, result));
        }

        info!(
            project = project_id,
            components = results.len(),
            "Started project"
        );
        Ok(results)
    }

    /// Stop one process; a no-op when it is not live
    pub async fn stop_process(&self, id: &str, force: bool) -> ProcessResult<StopOutcome> {
        let process = self.managed(id)?;
        if force {
            self.supervisor.kill(&process).await
        } else {
            self.supervisor.stop(&process).await
        }
    }

    pub async fn kill_process(&self, id: &str) -> ProcessResult<StopOutcome> {
        self.stop_process(id, true).await
    }

    /// Stop every process of a project concurrently; returns how many were live
    pub async fn stop_project(&self, project_id: &str, force: bool) -> ProcessResult<usize> {
        let targets: Vec<_> = self
            .processes
            .iter()
            .filter(|entry| entry.value().project_id() == project_id)
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        if targets.is_empty() && self.catalog.project(project_id).is_none() {
            return Err(ProcessError::ProjectNotFound(project_id.to_string()));
        }

        let (stopped, first_error) = self.stop_many(targets, force).await;
        match first_error {
            Some(e) => Err(e),
            None => Ok(stopped),
        }
    }

    /// Stop every live process; errors are logged, not returned
    pub async fn stop_all(&self, force: bool) -> usize {
        let targets: Vec<_> = self
            .processes
            .iter()
            .filter(|entry| entry.value().is_live())
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let (stopped, _) = self.stop_many(targets, force).await;
        info!(stopped = stopped, "Stopped all processes");
        stopped
    }

    async fn stop_many(
        &self,
        targets: Vec<Arc<ManagedProcess>>,
        force: bool,
    ) -> (usize, Option<ProcessError>) {
        let mut tasks = JoinSet::new();
        for process in targets {
            let supervisor = Arc::clone(&self.supervisor);
            tasks.spawn(async move {
                let result = if force {
                    supervisor.kill(&process).await
                } else {
                    supervisor.stop(&process).await
                };
                (process.id().to_string(), result)
            });
        }

        let mut stopped = 0;
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(StopOutcome::AlreadyStopped))) => {}
                Ok((_, Ok(_))) => stopped += 1,
                Ok((id, Err(e))) => {
                    warn!(process = %id, error = %e, "Failed to stop process");
                    first_error.get_or_insert(e);
                }
                Err(e) => warn!(error = %e, "Stop task panicked"),
            }
        }
        (stopped, first_error)
    }

    /// Stop if live, then start a fresh process with the restart counter bumped
    pub async fn restart_process(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> ProcessResult<Process> {
        let previous = self.managed(id)?;
        let project_id = previous.project_id().to_string();
        let kind = previous.component();

        self.supervisor.stop(&previous).await?;
        if cancel.is_cancelled() {
            return Err(ProcessError::Cancelled(id.to_string()));
        }

        let (project, component) = self.resolve(&project_id, kind)?;
        let process = self.reserve(id, &project_id, kind, 1)?;
        self.supervisor.start(&process, &project, &component)?;

        info!(process = id, restarts = process.restarts(), "Restarted process");
        Ok(process.snapshot())
    }

    pub fn pause_process(&self, id: &str) -> ProcessResult<bool> {
        self.supervisor.pause(&self.managed(id)?)
    }

    pub fn resume_process(&self, id: &str) -> ProcessResult<bool> {
        self.supervisor.resume(&self.managed(id)?)
    }

    pub fn toggle_pause(&self, id: &str) -> ProcessResult<ProcessState> {
        self.supervisor.toggle_pause(&self.managed(id)?)
    }

    pub fn get_process(&self, id: &str) -> Option<Process> {
        self.processes.get(id).map(|p| p.snapshot())
    }

    /// Snapshots of every registered process, sorted by id
    pub fn get_all_processes(&self) -> Vec<Process> {
        self.collect(|_| true)
    }

    pub fn get_processes_for_project(&self, project_id: &str) -> Vec<Process> {
        self.collect(|p| p.project_id() == project_id)
    }

    /// Processes that currently own an OS process
    pub fn get_running_processes(&self) -> Vec<Process> {
        self.collect(|p| p.is_live())
    }

    pub fn summaries(&self) -> Vec<ProcessSummary> {
        self.get_all_processes()
            .iter()
            .map(Process::summary)
            .collect()
    }

    /// Buffered output lines, the most recent `limit` when given
    pub fn get_logs(&self, id: &str, limit: Option<usize>) -> ProcessResult<Vec<LogLine>> {
        let process = self.managed(id)?;
        Ok(match limit {
            Some(n) => process.logs().tail(n),
            None => process.logs().read_all(),
        })
    }

    pub fn clear_logs(&self, id: &str) -> ProcessResult<()> {
        self.managed(id)?.logs().clear();
        Ok(())
    }

    /// Remove a process record that no longer owns an OS process
    pub fn unregister(&self, id: &str) -> ProcessResult<Process> {
        if let Some((_, process)) = self.processes.remove_if(id, |_, p| !p.is_live()) {
            info!(process = id, "Unregistered process");
            return Ok(process.snapshot());
        }
        if self.processes.contains_key(id) {
            Err(ProcessError::StillRunning(id.to_string()))
        } else {
            Err(ProcessError::NotFound(id.to_string()))
        }
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    fn managed(&self, id: &str) -> ProcessResult<Arc<ManagedProcess>> {
        self.processes
            .get(id)
            .map(|p| Arc::clone(p.value()))
            .ok_or_else(|| ProcessError::NotFound(id.to_string()))
    }

    fn collect<F>(&self, filter: F) -> Vec<Process>
    where
        F: Fn(&ManagedProcess) -> bool,
    {
        let mut snapshots: Vec<Process> = self
            .processes
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        snapshots
    }

    fn resolve(&self, project_id: &str, kind: ComponentKind) -> ProcessResult<(Project, Component)> {
        let project = self
            .catalog
            .project(project_id)
            .ok_or_else(|| ProcessError::ProjectNotFound(project_id.to_string()))?;
        let component = project
            .component(kind)
            .cloned()
            .ok_or_else(|| ProcessError::ComponentNotFound {
                project: project_id.to_string(),
                component: kind,
            })?;
        if !component.enabled {
            return Err(ProcessError::Disabled(process_id(project_id, kind)));
        }
        Ok((project, component))
    }

    /// Atomically claim the slot for `id` and move it to `Starting`
    ///
    /// Holding the map entry makes the live check and the insert one step,
    /// so concurrent starts of the same id yield exactly one reservation.
    /// The restart count belongs to the slot: the fresh record inherits the
    /// replaced one's count plus `bump`.
    fn reserve(
        &self,
        id: &str,
        project_id: &str,
        kind: ComponentKind,
        bump: u32,
    ) -> ProcessResult<Arc<ManagedProcess>> {
        let fresh = |restarts: u32| -> ProcessResult<Arc<ManagedProcess>> {
            let process = Arc::new(ManagedProcess::new(
                project_id,
                kind,
                restarts,
                self.supervisor.config().log_capacity,
            ));
            process.lock().transition(ProcessState::Starting)?;
            Ok(process)
        };

        match self.processes.entry(id.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_live() {
                    return Err(ProcessError::AlreadyRunning(id.to_string()));
                }
                let process = fresh(entry.get().restarts().saturating_add(bump))?;
                entry.insert(Arc::clone(&process));
                Ok(process)
            }
            Entry::Vacant(entry) => {
                let process = fresh(bump)?;
                entry.insert(Arc::clone(&process));
                Ok(process)
            }
        }
    }
}
