/*!
 * Builder Capability
 *
 * A builder knows how to compile one family of components. The build service
 * looks builders up by component kind; adding a kind means registering a
 * builder, nothing else.
 */

use super::types::{BuildError, BuildHandle, BuildServiceResult};
use crate::core::types::{Component, Project};
use crate::process::platform::{self, ProcessController};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Future returned by [`Builder::build`], resolving to the toolchain exit code
pub type BuildFuture<'a> = Pin<Box<dyn Future<Output = BuildServiceResult<i32>> + Send + 'a>>;

/// Build capability for a family of components
pub trait Builder: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_build(&self, component: &Component) -> bool;

    /// Run the build, streaming output into `build`
    ///
    /// Cancelling `cancel` must abort the toolchain and resolve to
    /// `BuildError::Canceled`. A nonzero exit is not an error here; the
    /// service turns it into a failed build.
    fn build<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        project: &'a Project,
        component: &'a Component,
        build: &'a BuildHandle,
    ) -> BuildFuture<'a>;
}

/// A resolved toolchain invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommand<'a> {
    pub program: String,
    pub args: Vec<String>,
    pub work_dir: &'a Path,
    pub env: Vec<(String, String)>,
}

/// Spawn a build command in its own process group and wait for it
///
/// Stdout lines are appended to the build output, stderr lines are
/// classified into warnings and errors. On cancellation the whole group is
/// killed and `Canceled` is returned.
pub async fn run_build_command(
    controller: &dyn ProcessController,
    cancel: &CancellationToken,
    command: BuildCommand<'_>,
    build: &BuildHandle,
) -> BuildServiceResult<i32> {
    if cancel.is_cancelled() {
        return Err(BuildError::Canceled);
    }

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .current_dir(command.work_dir)
        .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    controller.setup_group(&mut cmd);

    let mut child = cmd.spawn().map_err(|e| {
        BuildError::SpawnFailed(format!(
            "{} in {}: {}",
            command.program,
            command.work_dir.display(),
            e
        ))
    })?;
    let pid = child.id();
    debug!(
        build = %build.id(),
        pid = ?pid,
        program = %command.program,
        "Build command spawned"
    );

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let waited = {
        let run = async {
            let (_, _, status) = tokio::join!(
                pump(stdout, |line| build.record_stdout(line)),
                pump(stderr, |line| build.record_stderr(line)),
                child.wait()
            );
            status
        };
        tokio::select! {
            status = run => Some(status),
            _ = cancel.cancelled() => None,
        }
    };

    match waited {
        Some(Ok(status)) => Ok(platform::exit_code(&status)),
        Some(Err(e)) => Err(BuildError::Io(e.to_string())),
        None => {
            if let Some(pid) = pid {
                if let Err(e) = controller.kill(pid) {
                    warn!(build = %build.id(), error = %e, "Failed to kill canceled build");
                }
            }
            let _ = child.kill().await;
            Err(BuildError::Canceled)
        }
    }
}

async fn pump<R, F>(reader: Option<R>, mut record: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let Some(reader) = reader else { return };
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => record(line),
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "Build output stream closed");
                break;
            }
        }
    }
}
