/*!
 * Build Orchestrator
 *
 * Runs project pipelines concurrently under a counting semaphore and reduces
 * their results into a summary. Components inside one project are always
 * sequenced by the build service; the orchestrator only decides how many
 * projects are in flight.
 */

use super::service::BuildService;
use super::types::ProjectBuildResult;
use crate::core::config::OrchestratorConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Project id to its pipeline result
pub type FleetResults = BTreeMap<String, ProjectBuildResult>;

/// Aggregate view of a set of project builds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BuildSummary {
    pub total_projects: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Component builds attempted across all projects
    pub total_builds: usize,
    /// Sum of project pipeline durations
    #[serde(with = "crate::core::serde::duration_millis")]
    pub total_duration: Duration,
    /// `project/component: reason`, in project then build order
    pub errors: Vec<String>,
}

impl BuildSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Top-level build coordinator
pub struct Orchestrator {
    service: Arc<BuildService>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(service: Arc<BuildService>, config: OrchestratorConfig) -> Self {
        Self { service, config }
    }

    pub fn service(&self) -> &Arc<BuildService> {
        &self.service
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Build several projects, at most `max_parallel` at a time
    ///
    /// Failures are isolated per project. Duplicate ids are built once.
    pub async fn build_multiple(
        &self,
        cancel: &CancellationToken,
        project_ids: &[String],
    ) -> FleetResults {
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel.max(1)));
        let results = Arc::new(Mutex::new(FleetResults::new()));
        let mut set = JoinSet::new();
        let mut seen = HashSet::new();

        for id in project_ids.iter().filter(|id| seen.insert(*id)) {
            let id = id.clone();
            let service = Arc::clone(&self.service);
            let semaphore = Arc::clone(&semaphore);
            let results = Arc::clone(&results);
            let cancel = cancel.clone();

            set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let result = match service.build_project(&cancel, &id).await {
                    Ok(result) => result,
                    Err(e) => ProjectBuildResult::rejected(&id, &e),
                };
                results.lock().insert(id, result);
            });
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Project build task failed");
            }
        }

        let results = std::mem::take(&mut *results.lock());
        info!(
            projects = results.len(),
            failed = results.values().filter(|r| !r.success).count(),
            "Fleet build finished"
        );
        results
    }

    /// Build every catalog project, bounded by the configured fleet timeout
    ///
    /// When the timeout fires the in-flight builds are canceled and reported
    /// as such; it is not an error.
    pub async fn build_fleet(&self, cancel: &CancellationToken) -> FleetResults {
        let ids: Vec<String> = self
            .service
            .catalog()
            .projects()
            .into_iter()
            .map(|p| p.id)
            .collect();

        let fleet = cancel.child_token();
        let timer = self.config.fleet_timeout.map(|timeout| {
            let fleet = fleet.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "Fleet build timed out, canceling"
                );
                fleet.cancel();
            })
        });

        let results = self.build_multiple(&fleet, &ids).await;
        if let Some(timer) = timer {
            timer.abort();
        }
        results
    }

    /// Reduce results into counts, durations, and flattened error strings
    pub fn summarize(results: &FleetResults) -> BuildSummary {
        let mut summary = BuildSummary {
            total_projects: results.len(),
            ..BuildSummary::default()
        };

        for (project_id, result) in results {
            if result.success {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            summary.total_builds += result.results.len();
            summary.total_duration += result.duration;

            for build in &result.results {
                if let Some(error) = &build.error {
                    summary
                        .errors
                        .push(format!("{}/{}: {}", project_id, build.component, error));
                }
            }
            if let Some(error) = &result.error {
                summary.errors.push(format!("{}: {}", project_id, error));
            }
        }
        summary
    }
}
