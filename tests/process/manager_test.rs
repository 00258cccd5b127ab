/*!
 * Process Manager Tests
 * Lifecycle scenarios against real shell children
 */

use crate::support::{eventually, script, Recorder};
use devfleet::core::limits::MAX_LOG_LINE_BYTES;
use devfleet::core::{Component, ComponentKind, Project, StaticCatalog, SupervisorConfig};
use devfleet::process::platform::UnixController;
use devfleet::process::{
    GroupSignal, LogStream, ProcessController, ProcessError, ProcessEvent, ProcessEventKind,
    ProcessManager, ProcessResult, ProcessState, StopOutcome,
};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const STOP_TIMEOUT: Duration = Duration::from_millis(400);
const SETTLE: Duration = Duration::from_secs(5);

struct Fixture {
    manager: ProcessManager,
    events: Recorder<ProcessEvent>,
    _dir: TempDir,
}

fn fixture(components: impl FnOnce(&Path) -> Vec<Component>) -> Fixture {
    fixture_with(SupervisorConfig::default(), None, components)
}

fn fixture_with(
    config: SupervisorConfig,
    controller: Option<Arc<dyn ProcessController>>,
    components: impl FnOnce(&Path) -> Vec<Component>,
) -> Fixture {
    let dir = TempDir::new().unwrap();
    script(dir.path(), "serve.sh", "echo ready\necho 'listening failed once' >&2\nexec sleep 30");
    script(
        dir.path(),
        "stubborn.sh",
        "trap '' TERM\necho ready\nwhile true; do sleep 0.1; done",
    );
    script(dir.path(), "crash.sh", "echo booting\nsleep 0.2\nexit 3");
    script(
        dir.path(),
        "flood.sh",
        "head -c 150000 /dev/zero | tr '\\0' x\necho\necho done\nexec sleep 30",
    );
    script(
        dir.path(),
        "identity.sh",
        "echo \"$DEVFLEET_PROJECT_ID $DEVFLEET_COMPONENT $PORT\"\nexec sleep 30",
    );

    let mut project = Project::new("web", dir.path());
    for component in components(dir.path()) {
        project = project.with_component(component);
    }

    let events = Recorder::new();
    let mut builder = ProcessManager::builder(Arc::new(StaticCatalog::with_projects([project])))
        .with_config(
            config
                .with_stop_timeout(STOP_TIMEOUT)
                .with_kill_grace(Duration::from_secs(3)),
        )
        .with_event_handler(events.handler());
    if let Some(controller) = controller {
        builder = builder.with_controller(controller);
    }
    let manager = builder.build();

    Fixture {
        manager,
        events,
        _dir: dir,
    }
}

/// OS controller that cannot thaw a frozen group
struct ResumeRefused(UnixController);

impl ProcessController for ResumeRefused {
    fn setup_group(&self, cmd: &mut tokio::process::Command) {
        self.0.setup_group(cmd);
    }

    fn signal(&self, pid: u32, signal: GroupSignal) -> ProcessResult<bool> {
        match signal {
            GroupSignal::Resume => Err(ProcessError::SignalFailed("resume refused".into())),
            other => self.0.signal(pid, other),
        }
    }

    fn supports_pause(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "resume-refused"
    }
}

fn backend(run_cmd: &str) -> Component {
    Component::new(ComponentKind::Backend, "").with_run_cmd(run_cmd)
}

#[tokio::test]
async fn test_start_runs_and_captures_output() {
    let fx = fixture(|_| vec![backend("sh serve.sh")]);
    let cancel = CancellationToken::new();

    let process = fx
        .manager
        .start_component(&cancel, "web", ComponentKind::Backend)
        .unwrap();
    assert_eq!(process.id, "web/backend");
    assert_eq!(process.state, ProcessState::Running);
    assert!(process.pid.unwrap_or_default() > 0);
    assert_eq!(process.command, "sh");

    assert!(
        eventually(SETTLE, || {
            fx.manager
                .get_logs("web/backend", None)
                .map(|logs| logs.len() == 2)
                .unwrap_or(false)
        })
        .await
    );
    let logs = fx.manager.get_logs("web/backend", None).unwrap();
    let stdout: Vec<_> = logs
        .iter()
        .filter(|l| l.stream == LogStream::Stdout)
        .map(|l| l.text.as_str())
        .collect();
    assert_eq!(stdout, vec!["ready"]);
    assert_eq!(fx.events.count(ProcessEventKind::Output), 1);
    assert_eq!(fx.events.count(ProcessEventKind::Error), 1);

    let outcome = fx.manager.stop_process("web/backend", false).await.unwrap();
    assert_eq!(outcome, StopOutcome::Graceful);

    let stopped = fx.manager.get_process("web/backend").unwrap();
    assert_eq!(stopped.state, ProcessState::Stopped);
    assert_eq!(stopped.exit_code, Some(143));
    assert!(stopped.pid.is_none());

    assert_eq!(fx.events.count(ProcessEventKind::Starting), 1);
    assert_eq!(fx.events.count(ProcessEventKind::Started), 1);
    assert_eq!(fx.events.count(ProcessEventKind::Stopping), 1);
    assert_eq!(fx.events.count(ProcessEventKind::Stopped), 1);
    assert_eq!(fx.events.count(ProcessEventKind::Crashed), 0);
}

#[tokio::test]
async fn test_bundled_component_defaults_to_runner_dev_script() {
    // `sh run dev` executes the `run` script in the component directory
    let fx = fixture_with(SupervisorConfig::default().with_script_runner("sh"), None, |root| {
        std::fs::create_dir(root.join("app")).unwrap();
        script(&root.join("app"), "run", "echo \"dev server $1\"\nexec sleep 30");
        vec![Component::new(ComponentKind::Frontend, "app")]
    });

    let process = fx
        .manager
        .start_component(&CancellationToken::new(), "web", ComponentKind::Frontend)
        .unwrap();
    assert_eq!(process.id, "web/frontend");
    assert_eq!(process.state, ProcessState::Running);
    assert!(process.pid.unwrap_or_default() > 0);
    assert_eq!(process.command, "sh");
    assert_eq!(process.args, vec!["run".to_string(), "dev".to_string()]);
    assert_eq!(process.work_dir, fx._dir.path().join("app"));

    assert!(
        eventually(SETTLE, || {
            fx.manager
                .get_logs("web/frontend", None)
                .map(|logs| logs.iter().any(|l| l.text == "dev server dev"))
                .unwrap_or(false)
        })
        .await
    );
    fx.manager.stop_all(true).await;
}

#[tokio::test]
async fn test_unterminated_output_is_split_into_bounded_lines() {
    let fx = fixture(|_| vec![backend("sh flood.sh")]);
    fx.manager
        .start_component(&CancellationToken::new(), "web", ComponentKind::Backend)
        .unwrap();

    assert!(
        eventually(SETTLE, || {
            fx.manager
                .get_logs("web/backend", Some(1))
                .map(|logs| logs.iter().any(|l| l.text == "done"))
                .unwrap_or(false)
        })
        .await
    );
    let logs = fx.manager.get_logs("web/backend", None).unwrap();
    assert!(logs
        .iter()
        .all(|l| l.text.len() as u64 <= MAX_LOG_LINE_BYTES));
    let flooded: usize = logs
        .iter()
        .filter(|l| l.text != "done")
        .map(|l| l.text.len())
        .sum();
    assert_eq!(flooded, 150_000);
    assert_eq!(logs.len(), 4);
    fx.manager.stop_all(true).await;
}

#[tokio::test]
async fn test_identity_environment_reaches_child() {
    let fx = fixture(|_| vec![backend("sh identity.sh").with_port(8080)]);
    fx.manager
        .start_component(&CancellationToken::new(), "web", ComponentKind::Backend)
        .unwrap();

    assert!(
        eventually(SETTLE, || {
            fx.manager
                .get_logs("web/backend", Some(1))
                .map(|logs| logs.iter().any(|l| l.text == "web backend 8080"))
                .unwrap_or(false)
        })
        .await
    );
    fx.manager.stop_all(true).await;
}

#[tokio::test]
async fn test_stop_escalates_for_term_ignoring_child() {
    let fx = fixture(|_| vec![backend("sh stubborn.sh")]);
    fx.manager
        .start_component(&CancellationToken::new(), "web", ComponentKind::Backend)
        .unwrap();
    assert!(
        eventually(SETTLE, || {
            fx.manager
                .get_logs("web/backend", None)
                .map(|logs| !logs.is_empty())
                .unwrap_or(false)
        })
        .await
    );

    let started = Instant::now();
    let outcome = fx.manager.stop_process("web/backend", false).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome, StopOutcome::Escalated);
    assert!(elapsed >= STOP_TIMEOUT);
    assert!(elapsed < STOP_TIMEOUT + Duration::from_secs(3));

    let process = fx.manager.get_process("web/backend").unwrap();
    assert_eq!(process.state, ProcessState::Stopped);
    assert_eq!(process.exit_code, Some(137));
    assert_eq!(fx.events.count(ProcessEventKind::StopEscalated), 1);
    assert_eq!(fx.events.count(ProcessEventKind::Crashed), 0);
}

#[tokio::test]
async fn test_force_stop_kills_immediately() {
    let fx = fixture(|_| vec![backend("sh stubborn.sh")]);
    fx.manager
        .start_component(&CancellationToken::new(), "web", ComponentKind::Backend)
        .unwrap();

    let outcome = fx.manager.kill_process("web/backend").await.unwrap();
    assert_eq!(outcome, StopOutcome::Killed);
    let process = fx.manager.get_process("web/backend").unwrap();
    assert_eq!(process.state, ProcessState::Stopped);
    assert_eq!(process.exit_code, Some(137));

    let again = fx.manager.stop_process("web/backend", false).await.unwrap();
    assert_eq!(again, StopOutcome::AlreadyStopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_yield_one_process() {
    let fx = fixture(|_| vec![backend("sh serve.sh")]);
    let mut set = JoinSet::new();
    for _ in 0..8 {
        let manager = fx.manager.clone();
        set.spawn(async move {
            manager.start_component(&CancellationToken::new(), "web", ComponentKind::Backend)
        });
    }

    let mut started = 0;
    let mut rejected = 0;
    while let Some(result) = set.join_next().await {
        match result.unwrap() {
            Ok(_) => started += 1,
            Err(ProcessError::AlreadyRunning(id)) => {
                assert_eq!(id, "web/backend");
                rejected += 1;
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(started, 1);
    assert_eq!(rejected, 7);
    assert_eq!(fx.events.count(ProcessEventKind::Started), 1);
    assert_eq!(fx.manager.get_running_processes().len(), 1);
    fx.manager.stop_all(true).await;
}

#[tokio::test]
async fn test_unexpected_exit_is_a_crash() {
    let fx = fixture(|_| vec![backend("sh crash.sh")]);
    fx.manager
        .start_component(&CancellationToken::new(), "web", ComponentKind::Backend)
        .unwrap();

    assert!(
        eventually(SETTLE, || {
            fx.manager
                .get_process("web/backend")
                .map(|p| p.state == ProcessState::Crashed)
                .unwrap_or(false)
        })
        .await
    );
    let process = fx.manager.get_process("web/backend").unwrap();
    assert_eq!(process.exit_code, Some(3));
    assert!(process.last_error.unwrap().contains("code 3"));
    assert_eq!(fx.events.count(ProcessEventKind::Crashed), 1);
    assert_eq!(fx.events.count(ProcessEventKind::Stopped), 0);

    // A crashed slot can be started again
    let restarted = fx
        .manager
        .start_component(&CancellationToken::new(), "web", ComponentKind::Backend)
        .unwrap();
    assert_eq!(restarted.state, ProcessState::Running);
    fx.manager.stop_all(true).await;
}

#[tokio::test]
async fn test_spawn_failure_marks_crashed() {
    let fx = fixture(|_| vec![backend("devfleet-no-such-binary --flag")]);
    let err = fx
        .manager
        .start_component(&CancellationToken::new(), "web", ComponentKind::Backend)
        .unwrap_err();
    assert!(matches!(err, ProcessError::SpawnFailed(_)));

    let process = fx.manager.get_process("web/backend").unwrap();
    assert_eq!(process.state, ProcessState::Crashed);
    assert!(process.last_error.is_some());
    assert!(process.pid.is_none());
    assert_eq!(fx.events.count(ProcessEventKind::Crashed), 1);
}

#[tokio::test]
async fn test_restart_bumps_counter_with_fresh_process() {
    let fx = fixture(|_| vec![backend("sh serve.sh")]);
    let cancel = CancellationToken::new();
    let first = fx
        .manager
        .start_component(&cancel, "web", ComponentKind::Backend)
        .unwrap();
    assert_eq!(first.restarts, 0);

    let second = fx.manager.restart_process(&cancel, "web/backend").await.unwrap();
    assert_eq!(second.restarts, 1);
    assert_eq!(second.state, ProcessState::Running);
    assert_ne!(second.pid, first.pid);

    let third = fx.manager.restart_process(&cancel, "web/backend").await.unwrap();
    assert_eq!(third.restarts, 2);
    assert_eq!(fx.events.count(ProcessEventKind::Started), 3);
    fx.manager.stop_all(false).await;

    // The count belongs to the slot, a plain start keeps it
    let fourth = fx
        .manager
        .start_component(&cancel, "web", ComponentKind::Backend)
        .unwrap();
    assert_eq!(fourth.restarts, 2);
    fx.manager.stop_all(true).await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_pause_resume_and_toggle() {
    let fx = fixture(|_| vec![backend("sh serve.sh")]);
    assert!(fx.manager.supports_pause());
    fx.manager
        .start_component(&CancellationToken::new(), "web", ComponentKind::Backend)
        .unwrap();

    assert_eq!(
        fx.manager.resume_process("web/backend"),
        Err(ProcessError::NotPaused("web/backend".into()))
    );
    assert_eq!(fx.manager.pause_process("web/backend"), Ok(true));
    assert_eq!(
        fx.manager.get_process("web/backend").unwrap().state,
        ProcessState::Paused
    );
    assert_eq!(
        fx.manager.pause_process("web/backend"),
        Err(ProcessError::NotRunning("web/backend".into()))
    );
    assert_eq!(fx.manager.toggle_pause("web/backend"), Ok(ProcessState::Running));
    assert_eq!(fx.manager.toggle_pause("web/backend"), Ok(ProcessState::Paused));

    // A paused group still stops gracefully
    let outcome = fx.manager.stop_process("web/backend", false).await.unwrap();
    assert_eq!(outcome, StopOutcome::Graceful);
    assert_eq!(
        fx.manager.get_process("web/backend").unwrap().state,
        ProcessState::Stopped
    );
    assert_eq!(
        fx.manager.toggle_pause("web/backend"),
        Err(ProcessError::NotRunning("web/backend".into()))
    );
}

#[tokio::test]
async fn test_unregister_requires_stopped_process() {
    let fx = fixture(|_| vec![backend("sh serve.sh")]);
    fx.manager
        .start_component(&CancellationToken::new(), "web", ComponentKind::Backend)
        .unwrap();

    assert_eq!(
        fx.manager.unregister("web/backend"),
        Err(ProcessError::StillRunning("web/backend".into()))
    );
    fx.manager.stop_process("web/backend", true).await.unwrap();

    let removed = fx.manager.unregister("web/backend").unwrap();
    assert_eq!(removed.state, ProcessState::Stopped);
    assert!(fx.manager.get_process("web/backend").is_none());
    assert!(fx.manager.is_empty());
}

#[tokio::test]
async fn test_project_wide_start_and_stop() {
    let fx = fixture(|_| {
        vec![
            backend("sh serve.sh"),
            Component::new(ComponentKind::Frontend, "").with_run_cmd("sh serve.sh"),
            Component::new(ComponentKind::Agent, "").disabled(),
        ]
    });
    let cancel = CancellationToken::new();

    let started = fx.manager.start_project(&cancel, "web").unwrap();
    let kinds: Vec<_> = started.iter().map(|(kind, _)| *kind).collect();
    assert_eq!(kinds, vec![ComponentKind::Backend, ComponentKind::Frontend]);
    assert!(started.iter().all(|(_, result)| result.is_ok()));

    // Already-live components are reported, not restarted
    let again = fx.manager.start_project(&cancel, "web").unwrap();
    assert!(again.iter().all(|(_, result)| result.is_ok()));
    assert_eq!(fx.events.count(ProcessEventKind::Started), 2);

    let summaries = fx.manager.summaries();
    assert_eq!(summaries.len(), 2);
    assert!(summaries.iter().all(|s| s.uptime.is_some()));
    assert_eq!(fx.manager.get_processes_for_project("web").len(), 2);

    assert_eq!(fx.manager.stop_project("web", false).await, Ok(2));
    assert!(fx.manager.get_running_processes().is_empty());
    assert_eq!(fx.manager.stop_project("web", false).await, Ok(0));
    assert_eq!(
        fx.manager.stop_project("ghost", false).await,
        Err(ProcessError::ProjectNotFound("ghost".into()))
    );
}

#[tokio::test]
async fn test_clear_logs() {
    let fx = fixture(|_| vec![backend("sh serve.sh")]);
    fx.manager
        .start_component(&CancellationToken::new(), "web", ComponentKind::Backend)
        .unwrap();
    assert!(
        eventually(SETTLE, || {
            fx.manager
                .get_logs("web/backend", None)
                .map(|logs| logs.len() == 2)
                .unwrap_or(false)
        })
        .await
    );

    fx.manager.clear_logs("web/backend").unwrap();
    assert!(fx.manager.get_logs("web/backend", None).unwrap().is_empty());
    fx.manager.stop_all(true).await;
}

#[tokio::test]
async fn test_stop_of_frozen_group_escalates_when_resume_fails() {
    let fx = fixture_with(
        SupervisorConfig::default(),
        Some(Arc::new(ResumeRefused(UnixController::new()))),
        |_| vec![backend("sh serve.sh")],
    );
    fx.manager
        .start_component(&CancellationToken::new(), "web", ComponentKind::Backend)
        .unwrap();
    assert_eq!(fx.manager.pause_process("web/backend"), Ok(true));

    // The pending TERM never runs, so the kill finishes the stop
    let outcome = fx.manager.stop_process("web/backend", false).await.unwrap();
    assert_eq!(outcome, StopOutcome::Escalated);

    let process = fx.manager.get_process("web/backend").unwrap();
    assert_eq!(process.state, ProcessState::Stopped);
    assert_eq!(process.exit_code, Some(137));
}
