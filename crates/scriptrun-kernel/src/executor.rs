//! Run one script as a child process under a timeout.
//!
//! The command line is always `interpreter path args...`, each argument its
//! own argv token. Nothing is passed through a shell string, so metacharacters
//! in arguments reach the script literally.
//!
//! On Unix the child leads a fresh process group. A timeout sends SIGTERM to
//! the whole group, waits a short grace period, then SIGKILLs it; reaping
//! happens on a detached task so the caller gets its result right away. A run
//! that is dropped mid-flight (an aborted request) SIGKILLs its group.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::config::DEFAULT_INTERPRETER;
use crate::result::{EXIT_SIGNAL_BASE, ExecutionResult};
use crate::script::ScriptSpec;

/// Grace period between SIGTERM and SIGKILL on timeout.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(250);

/// Spawns scripts and collects their results.
///
/// Cheap to clone. Holds no per-run state, so any number of runs may be in
/// flight at once.
#[derive(Debug, Clone)]
pub struct Executor {
    interpreter: Option<String>,
    kill_grace: Duration,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    pub fn new() -> Self {
        Self {
            interpreter: None,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    /// Force an interpreter regardless of what the registry snapshot says.
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn kill_grace(&self) -> Duration {
        self.kill_grace
    }

    /// Run `spec` with the snapshot's interpreter (or the forced one).
    ///
    /// Never fails: spawn errors, non-zero exits, and timeouts all come back
    /// as an [`ExecutionResult`].
    pub async fn execute(
        &self,
        spec: &ScriptSpec,
        arguments: &[String],
        default_cwd: &Path,
        snapshot_interpreter: Option<&str>,
    ) -> ExecutionResult {
        let interpreter = self
            .interpreter
            .as_deref()
            .or(snapshot_interpreter)
            .unwrap_or(DEFAULT_INTERPRETER);
        let cwd = spec.effective_working_directory(default_cwd);
        let limit = Duration::from_secs(spec.timeout_seconds);

        tracing::debug!(
            script = spec.name(),
            interpreter,
            cwd = %cwd.display(),
            args = arguments.len(),
            "spawning script"
        );

        let started = Instant::now();
        let mut command = build_command(interpreter, spec, arguments, &cwd);
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(script = spec.name(), error = %e, "spawn failed");
                return ExecutionResult::spawn_failure(spec.name(), &e, started.elapsed());
            }
        };

        // Captured now: once the leader is reaped `child.id()` is gone, but
        // its group may still hold the pipes.
        let pgid = child.id();
        let mut group = GroupGuard::new(pgid);
        let mut stdout_task = spawn_drain(child.stdout.take());
        let mut stderr_task = spawn_drain(child.stderr.take());

        // Output drain counts against the timeout too: a grandchild holding
        // the pipe open must not stall the caller.
        let completion = tokio::time::timeout(limit, async {
            let status = child.wait().await?;
            let stdout = (&mut stdout_task).await.unwrap_or_default();
            let stderr = (&mut stderr_task).await.unwrap_or_default();
            Ok::<_, std::io::Error>((status, stdout, stderr))
        })
        .await;

        let result = match completion {
            Ok(Ok((status, stdout, stderr))) => {
                group.disarm();
                ExecutionResult::from_output(
                    spec.name(),
                    exit_code(status),
                    &stdout,
                    &stderr,
                    started.elapsed(),
                )
            }
            Ok(Err(e)) => {
                stdout_task.abort();
                stderr_task.abort();
                terminate(child, pgid, self.kill_grace).await;
                group.disarm();
                ExecutionResult::spawn_failure(spec.name(), &e, started.elapsed())
            }
            Err(_) => {
                stdout_task.abort();
                stderr_task.abort();
                terminate(child, pgid, self.kill_grace).await;
                group.disarm();
                tracing::warn!(
                    script = spec.name(),
                    timeout_secs = spec.timeout_seconds,
                    "script timed out"
                );
                ExecutionResult::timed_out(spec.name(), spec.timeout_seconds, started.elapsed())
            }
        };

        tracing::info!(
            script = %result.script_name,
            exit_code = result.exit_code,
            elapsed_ms = (result.execution_time_seconds * 1000.0) as u64,
            "script finished"
        );
        result
    }
}

fn build_command(interpreter: &str, spec: &ScriptSpec, arguments: &[String], cwd: &Path) -> Command {
    let mut cmd = Command::new(interpreter);
    cmd.arg(&spec.path)
        .args(arguments)
        .current_dir(cwd)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

/// Read a pipe to EOF on its own task.
fn spawn_drain<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            // Explicitly ignored: a read error just truncates the capture
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}

/// Exit code for a finished child.
///
/// Death by signal maps to `128 + signal`, so it never reads as success.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return EXIT_SIGNAL_BASE + signal;
        }
    }
    EXIT_SIGNAL_BASE
}

/// SIGKILLs the child's group if the run is dropped before it resolves.
///
/// `kill_on_drop` only reaches the leader; an aborted request must not leave
/// the rest of the group running.
struct GroupGuard {
    pgid: Option<u32>,
    armed: bool,
}

impl GroupGuard {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(pgid = ?self.pgid, "run dropped, killing process group");
            signal_group(self.pgid, Termination::Forced);
        }
    }
}

/// SIGTERM the child's group, give it `grace` to exit, then SIGKILL.
///
/// Returns once the kill has been issued; reaping continues in the background.
async fn terminate(mut child: Child, pgid: Option<u32>, grace: Duration) {
    signal_group(pgid, Termination::Polite);
    if tokio::time::timeout(grace, child.wait()).await.is_ok() {
        // Leader exited; clear out whatever is left in its group.
        signal_group(pgid, Termination::Forced);
        return;
    }

    signal_group(pgid, Termination::Forced);
    // Explicitly ignored: the group may already be gone
    let _ = child.start_kill();
    tokio::spawn(async move {
        let _ = child.wait().await;
    });
}

#[derive(Debug, Clone, Copy)]
enum Termination {
    Polite,
    Forced,
}

#[cfg(unix)]
fn signal_group(pgid: Option<u32>, how: Termination) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pid) = pgid else { return };
    let signal = match how {
        Termination::Polite => Signal::SIGTERM,
        Termination::Forced => Signal::SIGKILL,
    };
    if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
        tracing::debug!(pid, ?signal, error = %e, "killpg failed");
    }
}

#[cfg(not(unix))]
fn signal_group(pgid: Option<u32>, how: Termination) {
    let _ = (pgid, how);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_grace_is_bounded() {
        let executor = Executor::new();
        assert_eq!(executor.kill_grace(), DEFAULT_KILL_GRACE);
        assert!(executor.kill_grace() < Duration::from_secs(1));
    }

    #[cfg(unix)]
    #[test]
    fn signal_death_maps_above_signal_base() {
        use std::os::unix::process::ExitStatusExt;

        // Raw wait status: low bits carry the terminating signal.
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 137);
        assert_eq!(exit_code(ExitStatus::from_raw(15)), 143);
        // Normal exit keeps its code.
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
        assert_eq!(exit_code(ExitStatus::from_raw(0)), 0);
    }

    #[tokio::test]
    async fn missing_interpreter_is_spawn_failure() {
        let executor = Executor::new().with_interpreter("/nonexistent/interpreter");
        let spec = ScriptSpec::new("ghost", "/tmp/ghost.sh");

        let result = executor
            .execute(&spec, &[], &std::env::temp_dir(), None)
            .await;

        assert_eq!(result.exit_code, crate::result::EXIT_SPAWN_FAILURE);
        assert!(!result.success());
        assert!(result.stderr.starts_with("Error executing script:"));
        assert_eq!(result.script_name, "ghost");
    }

    #[tokio::test]
    async fn missing_working_directory_is_spawn_failure() {
        let executor = Executor::new();
        let spec = ScriptSpec::new("ghost", "/tmp/ghost.sh").with_working_directory("/no/such/dir");

        let result = executor
            .execute(&spec, &[], &std::env::temp_dir(), None)
            .await;

        assert_eq!(result.exit_code, crate::result::EXIT_SPAWN_FAILURE);
    }
}
