//! The structured outcome of every script run.
//!
//! Every failure the executor can see is folded into this type: a non-zero
//! exit, a timeout, or a spawn error all come back as a normal result whose
//! `success()` is false.

use std::fmt::Write as _;
use std::time::Duration;

/// Exit code reported when a run hits its timeout.
pub const EXIT_TIMEOUT: i32 = 124;

/// Exit code reported when the process could not be spawned or awaited.
pub const EXIT_SPAWN_FAILURE: i32 = 1;

/// Added to the signal number when a script is killed by a signal, as shells do.
pub const EXIT_SIGNAL_BASE: i32 = 128;

/// The result of running one script.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    /// Name of the script that ran.
    pub script_name: String,
    /// Exit code. 0 means success.
    pub exit_code: i32,
    /// Captured standard output, lossily decoded.
    pub stdout: String,
    /// Captured standard error, lossily decoded.
    pub stderr: String,
    /// Wall-clock time from spawn attempt to resolution.
    pub execution_time_seconds: f64,
}

impl ExecutionResult {
    /// Create a result from a completed process.
    pub fn from_output(
        script_name: impl Into<String>,
        exit_code: i32,
        stdout: &[u8],
        stderr: &[u8],
        elapsed: Duration,
    ) -> Self {
        Self {
            script_name: script_name.into(),
            exit_code,
            stdout: String::from_utf8_lossy(stdout).into_owned(),
            stderr: String::from_utf8_lossy(stderr).into_owned(),
            execution_time_seconds: elapsed.as_secs_f64(),
        }
    }

    /// Create the result for a run that exceeded its timeout.
    pub fn timed_out(script_name: impl Into<String>, timeout_secs: u64, elapsed: Duration) -> Self {
        Self {
            script_name: script_name.into(),
            exit_code: EXIT_TIMEOUT,
            stdout: String::new(),
            stderr: format!("Script execution timed out after {timeout_secs} seconds"),
            execution_time_seconds: elapsed.as_secs_f64(),
        }
    }

    /// Create the result for a process that could not be started or awaited.
    pub fn spawn_failure(
        script_name: impl Into<String>,
        error: &std::io::Error,
        elapsed: Duration,
    ) -> Self {
        Self {
            script_name: script_name.into(),
            exit_code: EXIT_SPAWN_FAILURE,
            stdout: String::new(),
            stderr: format!("Error executing script: {error}"),
            execution_time_seconds: elapsed.as_secs_f64(),
        }
    }

    /// True if the script exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// True if this result came from a timeout kill.
    pub fn is_timeout(&self) -> bool {
        self.exit_code == EXIT_TIMEOUT
    }

    /// Render the plain-text report returned to callers.
    pub fn report(&self) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail.
        let _ = writeln!(out, "Script: {}", self.script_name);
        let _ = writeln!(out, "Exit Code: {}", self.exit_code);
        let _ = writeln!(out, "Execution Time: {:.2}s", self.execution_time_seconds);
        let _ = writeln!(out, "Success: {}", self.success());
        out.push('\n');
        out.push_str("STDOUT:\n");
        out.push_str(&self.stdout);
        out.push_str("\n\nSTDERR:\n");
        out.push_str(&self.stderr);
        out
    }
}
