/*!
 * Process Supervisor
 *
 * All interaction with the OS process API: spawning a component in its own
 * process group, capturing its output, stopping it with escalation, and
 * monitoring it to completion.
 *
 * # Tasks per live process
 *
 * - one monitor that owns the child handle and classifies the exit
 * - one reader per output stream feeding the log buffer and the event sink
 *
 * The monitor is the only place that decides between an intentional stop and
 * a crash. It does so under the per-process lock, so a concurrent stop or
 * kill either moved the state to `Stopping` before the exit was observed or
 * finds the process already terminal.
 */

use super::command::LaunchSpec;
use super::managed::ManagedProcess;
use super::platform::{self, GroupSignal, ProcessController};
use super::types::{
    LogStream, ProcessError, ProcessEvent, ProcessEventKind, ProcessResult, ProcessState,
};
use crate::core::config::SupervisorConfig;
use crate::core::events::EventSink;
use crate::core::limits::{MAX_LOG_LINE_BYTES, UNKNOWN_EXIT_CODE};
use crate::core::types::{Component, Project};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// How a stop request concluded
///
/// Every variant is a success; `Escalated` records that the graceful
/// termination window expired and the group had to be killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// Nothing to do, the process was not live
    AlreadyStopped,
    /// Exited within the stop timeout
    Graceful,
    /// Stop timeout expired, the group was killed
    Escalated,
    /// Forced stop requested by the caller
    Killed,
}

impl StopOutcome {
    pub fn was_escalated(&self) -> bool {
        matches!(self, StopOutcome::Escalated)
    }
}

/// Process control engine
pub struct Supervisor {
    controller: Arc<dyn ProcessController>,
    config: SupervisorConfig,
    events: EventSink<ProcessEvent>,
}

impl Supervisor {
    /// Supervisor using the controller for the compilation target
    pub fn new(config: SupervisorConfig, events: EventSink<ProcessEvent>) -> Self {
        Self::with_controller(platform::default_controller(), config, events)
    }

    pub fn with_controller(
        controller: Arc<dyn ProcessController>,
        config: SupervisorConfig,
        events: EventSink<ProcessEvent>,
    ) -> Self {
        info!(
            controller = controller.name(),
            stop_timeout_ms = config.stop_timeout.as_millis() as u64,
            "Process supervisor initialized"
        );
        Self {
            controller,
            config,
            events,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn supports_pause(&self) -> bool {
        self.controller.supports_pause()
    }

    /// Spawn `component` for a process already reserved in `Starting`
    ///
    /// Must be called from within a Tokio runtime. On spawn failure the
    /// process ends `Crashed` with `last_error` set and the error is returned;
    /// it is never left in `Starting`. A stop that arrived after reservation
    /// settles the process `Stopped` and returns `Cancelled`.
    pub fn start(
        &self,
        process: &Arc<ManagedProcess>,
        project: &Project,
        component: &Component,
    ) -> ProcessResult<u32> {
        let spec = LaunchSpec::resolve(&self.config, project, component);

        let stopped_before_spawn = {
            let mut inner = process.lock();
            match inner.state {
                ProcessState::Starting => {
                    inner.work_dir = spec.work_dir.clone();
                    inner.command = spec.program.clone();
                    inner.args = spec.args.clone();
                    inner.port = component.port;
                    inner.last_error = None;
                    inner.exit_code = None;
                    false
                }
                // Stopped between reservation and spawn; nothing to launch
                ProcessState::Stopping => {
                    inner.state = ProcessState::Stopped;
                    inner.stopped_at = Some(SystemTime::now());
                    inner.pid = None;
                    true
                }
                state => {
                    return Err(ProcessError::InvalidStateTransition {
                        from: state,
                        to: ProcessState::Running,
                    })
                }
            }
        };
        if stopped_before_spawn {
            info!(process = process.id(), "Stop requested before spawn, not starting");
            self.events.emit(process.event(ProcessEventKind::Stopped, "stopped before spawn"));
            process.publish_exit(UNKNOWN_EXIT_CODE);
            return Err(ProcessError::Cancelled(process.id().to_string()));
        }

        self.events.emit(process.event(
            ProcessEventKind::Starting,
            format!("starting {}", spec.command_line()),
        ));

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.work_dir)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        self.controller.setup_group(&mut cmd);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = format!("{}: {}", spec.command_line(), e);
                error!(process = process.id(), error = %message, "Failed to spawn process");
                self.record_spawn_failure(process, &message);
                return Err(ProcessError::SpawnFailed(message));
            }
        };

        let Some(pid) = child.id() else {
            let message = format!("{}: no pid for spawned child", spec.command_line());
            error!(process = process.id(), error = %message, "Failed to spawn process");
            self.record_spawn_failure(process, &message);
            return Err(ProcessError::SpawnFailed(message));
        };
        let stop_requested = {
            let mut inner = process.lock();
            inner.pid = Some(pid);
            inner.started_at = Some(SystemTime::now());
            inner.stopped_at = None;
            match inner.transition(ProcessState::Running) {
                Ok(_) => false,
                // A stop arrived while spawning; the monitor will record it
                Err(_) => inner.state == ProcessState::Stopping,
            }
        };

        info!(
            process = process.id(),
            pid = pid,
            command = %spec.command_line(),
            work_dir = %spec.work_dir.display(),
            "Spawned process"
        );
        if !stop_requested {
            self.events.emit(
                process
                    .event(ProcessEventKind::Started, format!("started with pid {}", pid))
                    .with_pid(Some(pid)),
            );
        }

        if let Some(stdout) = child.stdout.take() {
            self.spawn_reader(Arc::clone(process), pid, stdout, LogStream::Stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            self.spawn_reader(Arc::clone(process), pid, stderr, LogStream::Stderr);
        }
        tokio::spawn(monitor(Arc::clone(process), child, self.events.clone()));

        if stop_requested {
            if let Err(e) = self.controller.signal(pid, GroupSignal::Terminate) {
                warn!(process = process.id(), error = %e, "Failed to terminate process stopped during start");
            }
        }

        Ok(pid)
    }

    fn record_spawn_failure(&self, process: &Arc<ManagedProcess>, message: &str) {
        let kind = {
            let mut inner = process.lock();
            inner.last_error = Some(message.to_string());
            inner.stopped_at = Some(SystemTime::now());
            inner.pid = None;
            if inner.state == ProcessState::Stopping {
                inner.state = ProcessState::Stopped;
                ProcessEventKind::Stopped
            } else {
                inner.state = ProcessState::Crashed;
                ProcessEventKind::Crashed
            }
        };
        self.events.emit(process.event(kind, message.to_string()));
        process.publish_exit(UNKNOWN_EXIT_CODE);
    }

    fn spawn_reader<R>(&self, process: Arc<ManagedProcess>, pid: u32, reader: R, stream: LogStream)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let events = self.events.clone();
        let kind = match stream {
            LogStream::Stdout => ProcessEventKind::Output,
            LogStream::Stderr => ProcessEventKind::Error,
        };

        tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                let mut line_reader = (&mut reader).take(MAX_LOG_LINE_BYTES);
                match line_reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf)
                            .trim_end_matches(['\n', '\r'])
                            .to_string();
                        process.logs().push_line(stream, line.clone());
                        events.emit(process.event(kind, line).with_pid(Some(pid)));
                    }
                    Err(e) => {
                        debug!(process = process.id(), error = %e, "Output reader stopped");
                        break;
                    }
                }
            }
        });
    }

    /// Graceful stop with transparent escalation
    ///
    /// Sends a termination signal to the whole group and waits up to the
    /// configured stop timeout. If the process is still alive the group is
    /// killed; the caller still receives success.
    pub async fn stop(&self, process: &Arc<ManagedProcess>) -> ProcessResult<StopOutcome> {
        let (pid, was_paused, newly_stopping) = {
            let mut inner = process.lock();
            match inner.state {
                ProcessState::Stopped | ProcessState::Crashed => {
                    return Ok(StopOutcome::AlreadyStopped)
                }
                ProcessState::Stopping => (inner.pid, false, false),
                state => {
                    inner.transition(ProcessState::Stopping)?;
                    (inner.pid, state == ProcessState::Paused, true)
                }
            }
        };

        if newly_stopping {
            self.events
                .emit(process.event(ProcessEventKind::Stopping, "stopping").with_pid(pid));
        }

        let mut exit_rx = process.exit_receiver();
        if let Some(pid) = pid {
            if let Err(e) = self.controller.signal(pid, GroupSignal::Terminate) {
                warn!(process = process.id(), pid = pid, error = %e, "Termination signal failed");
            }
            if was_paused {
                // A frozen group cannot act on the termination signal
                if let Err(e) = self.controller.signal(pid, GroupSignal::Resume) {
                    warn!(process = process.id(), pid = pid, error = %e, "Resume signal failed");
                }
            }
        }

        if wait_for_exit(&mut exit_rx, self.config.stop_timeout).await {
            debug!(process = process.id(), "Process stopped gracefully");
            return Ok(StopOutcome::Graceful);
        }

        warn!(
            process = process.id(),
            timeout_ms = self.config.stop_timeout.as_millis() as u64,
            "Process did not exit in time, killing process group"
        );
        self.events.emit(
            process
                .event(
                    ProcessEventKind::StopEscalated,
                    format!(
                        "no exit after {}ms, killing",
                        self.config.stop_timeout.as_millis()
                    ),
                )
                .with_pid(process.pid()),
        );
        self.kill_and_wait(process).await;
        Ok(StopOutcome::Escalated)
    }

    /// Immediate non-catchable termination of the whole group
    ///
    /// A no-op when the process is not live.
    pub async fn kill(&self, process: &Arc<ManagedProcess>) -> ProcessResult<StopOutcome> {
        let (pid, newly_stopping) = {
            let mut inner = process.lock();
            match inner.state {
                ProcessState::Stopped | ProcessState::Crashed => {
                    return Ok(StopOutcome::AlreadyStopped)
                }
                ProcessState::Stopping => (inner.pid, false),
                _ => {
                    inner.transition(ProcessState::Stopping)?;
                    (inner.pid, true)
                }
            }
        };

        if newly_stopping {
            self.events
                .emit(process.event(ProcessEventKind::Stopping, "killing").with_pid(pid));
        }
        self.kill_and_wait(process).await;
        Ok(StopOutcome::Killed)
    }

    async fn kill_and_wait(&self, process: &Arc<ManagedProcess>) {
        let mut exit_rx = process.exit_receiver();
        match process.pid() {
            Some(pid) => {
                if let Err(e) = self.controller.kill(pid) {
                    warn!(process = process.id(), pid = pid, error = %e, "Kill signal failed");
                }
            }
            None => debug!(process = process.id(), "No OS process to kill"),
        }

        if !wait_for_exit(&mut exit_rx, self.config.kill_grace).await {
            warn!(
                process = process.id(),
                "Exit not observed after kill; monitor will record it when it happens"
            );
        }
    }

    /// Freeze a running process
    ///
    /// Returns `Ok(false)` without changing state on platforms that cannot
    /// pause processes.
    pub fn pause(&self, process: &Arc<ManagedProcess>) -> ProcessResult<bool> {
        let pid = {
            let mut inner = process.lock();
            if inner.state != ProcessState::Running {
                return Err(ProcessError::NotRunning(process.id().to_string()));
            }
            if !self.controller.supports_pause() {
                warn!(process = process.id(), "Pause not supported on this platform");
                return Ok(false);
            }
            let pid = inner
                .pid
                .ok_or_else(|| ProcessError::NotRunning(process.id().to_string()))?;
            if !self.controller.signal(pid, GroupSignal::Pause)? {
                return Err(ProcessError::NotRunning(process.id().to_string()));
            }
            inner.transition(ProcessState::Paused)?;
            pid
        };

        info!(process = process.id(), pid = pid, "Paused process");
        self.events
            .emit(process.event(ProcessEventKind::Paused, "paused").with_pid(Some(pid)));
        Ok(true)
    }

    /// Thaw a paused process
    pub fn resume(&self, process: &Arc<ManagedProcess>) -> ProcessResult<bool> {
        let pid = {
            let mut inner = process.lock();
            if inner.state != ProcessState::Paused {
                return Err(ProcessError::NotPaused(process.id().to_string()));
            }
            if !self.controller.supports_pause() {
                return Ok(false);
            }
            let pid = inner
                .pid
                .ok_or_else(|| ProcessError::NotRunning(process.id().to_string()))?;
            if !self.controller.signal(pid, GroupSignal::Resume)? {
                return Err(ProcessError::NotRunning(process.id().to_string()));
            }
            inner.transition(ProcessState::Running)?;
            pid
        };

        info!(process = process.id(), pid = pid, "Resumed process");
        self.events
            .emit(process.event(ProcessEventKind::Resumed, "resumed").with_pid(Some(pid)));
        Ok(true)
    }

    /// Pause a running process or resume a paused one; returns the new state
    pub fn toggle_pause(&self, process: &Arc<ManagedProcess>) -> ProcessResult<ProcessState> {
        match process.state() {
            ProcessState::Running => self.pause(process)?,
            ProcessState::Paused => self.resume(process)?,
            _ => return Err(ProcessError::NotRunning(process.id().to_string())),
        };
        Ok(process.state())
    }
}

/// Wait until the exit is published or `timeout` elapses
async fn wait_for_exit(exit_rx: &mut watch::Receiver<Option<i32>>, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, exit_rx.wait_for(Option::is_some)).await,
        Ok(Ok(_))
    )
}

/// Reap the child and classify its exit
async fn monitor(process: Arc<ManagedProcess>, mut child: Child, events: EventSink<ProcessEvent>) {
    let code = match child.wait().await {
        Ok(status) => platform::exit_code(&status),
        Err(e) => {
            warn!(process = process.id(), error = %e, "Failed to wait for process");
            UNKNOWN_EXIT_CODE
        }
    };

    let event = {
        let mut inner = process.lock();
        let pid = inner.pid.take();
        inner.exit_code = Some(code);
        inner.stopped_at = Some(SystemTime::now());

        match inner.state {
            ProcessState::Stopping => {
                inner.state = ProcessState::Stopped;
                info!(process = process.id(), exit_code = code, "Process stopped");
                Some(
                    process
                        .event(ProcessEventKind::Stopped, format!("stopped with code {}", code))
                        .with_pid(pid)
                        .with_exit_code(Some(code)),
                )
            }
            ProcessState::Running | ProcessState::Paused => {
                let message = format!("process exited unexpectedly with code {}", code);
                inner.state = ProcessState::Crashed;
                inner.last_error = Some(message.clone());
                warn!(process = process.id(), exit_code = code, "Process crashed");
                Some(
                    process
                        .event(ProcessEventKind::Crashed, message)
                        .with_pid(pid)
                        .with_exit_code(Some(code)),
                )
            }
            state => {
                error!(process = process.id(), state = %state, "Exit observed in unexpected state");
                None
            }
        }
    };

    if let Some(event) = event {
        events.emit(event);
    }
    process.publish_exit(code);
}
