use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// How long a cooperatively signalled process gets before the forced kill.
const GRACE_PERIOD: Duration = Duration::from_secs(4);

/// Synthetic exit code reported when the process could not be spawned.
const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// Outcome of one supervised process invocation.
///
/// This structure carries all failure information; [`execute`] itself never
/// fails, so callers have one uniform path for success, failure and timeout.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// True when the timeout fired and a termination signal was sent.
    pub killed: bool,
}

impl ExecOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && !self.killed
    }

    fn spawn_failure(program: &str, error: std::io::Error) -> Self {
        Self {
            stdout: String::new(),
            stderr: format!("Failed to spawn '{}': {}", program, error),
            exit_code: SPAWN_FAILURE_EXIT_CODE,
            killed: false,
        }
    }
}

/// Spawns `program` with `args` (a discrete argument list, never a shell
/// string) in `cwd`, with `extra_env` merged over the inherited environment.
///
/// Both output streams are accumulated incrementally. When `timeout`
/// expires the process receives a cooperative termination signal; if it is
/// still alive after [`GRACE_PERIOD`] it is killed outright. A missing exit
/// code is normalized to 0 only for a clean, un-killed exit.
pub async fn execute(
    program: &str,
    args: &[String],
    cwd: &Path,
    timeout: Duration,
    extra_env: &[(String, String)],
) -> ExecOutcome {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    for (key, value) in extra_env {
        cmd.env(key, value);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!("Spawn failed for '{}': {}", program, e);
            return ExecOutcome::spawn_failure(program, e);
        }
    };

    let pid = child.id();
    let stdout_task = tokio::spawn(drain(child.stdout.take()));
    let stderr_task = tokio::spawn(drain(child.stderr.take()));

    let mut killed = false;
    let status = tokio::select! {
        status = child.wait() => status,
        _ = tokio::time::sleep(timeout) => {
            killed = true;
            warn!("'{}' exceeded {:?}, sending termination signal", program, timeout);
            send_terminate(pid);

            tokio::select! {
                status = child.wait() => status,
                _ = tokio::time::sleep(GRACE_PERIOD) => {
                    warn!("'{}' ignored termination signal, killing", program);
                    let _ = child.start_kill();
                    child.wait().await
                }
            }
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let mut stderr = stderr_task.await.unwrap_or_default();

    let exit_code = match status {
        Ok(status) => {
            debug!("'{}' exited with {:?} (killed: {})", program, status.code(), killed);
            match status.code() {
                Some(code) => code,
                None if killed => -1,
                None => 0,
            }
        }
        Err(e) => {
            stderr.push_str(&format!("Failed to wait for '{}': {}\n", program, e));
            -1
        }
    };

    ExecOutcome {
        stdout,
        stderr,
        exit_code,
        killed,
    }
}

/// Accumulates a pipe to EOF as raw bytes. Non-UTF-8 sequences are replaced
/// rather than truncating the stream, and the output is kept byte-exact
/// otherwise (no synthesized trailing newline).
async fn drain(pipe: Option<impl AsyncRead + Unpin + Send + 'static>) -> String {
    let mut collected = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut collected).await {
            warn!("Failed to drain process stream: {}", e);
        }
    }
    String::from_utf8_lossy(&collected).into_owned()
}

/// Cooperative termination: SIGTERM on unix, no-op elsewhere (the forced
/// kill after the grace period still applies).
#[cfg(unix)]
fn send_terminate(pid: Option<u32>) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = pid {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            warn!("Failed to signal pid {}: {}", pid, e);
        }
    }
}

#[cfg(not(unix))]
fn send_terminate(_pid: Option<u32>) {}
