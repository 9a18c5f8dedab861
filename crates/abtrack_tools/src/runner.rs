//! Subprocess execution with a per-invocation timeout.
//!
//! Tools are blocking from the caller's point of view, but each invocation is
//! driven on a shared tokio runtime so that it can be bounded by
//! [`tokio::time::timeout`]. The child is spawned with `kill_on_drop`, so a
//! timed-out process is killed when its future is dropped.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::error::ToolError;

/// Captured result of a finished process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` if killed by a signal.
    pub code: Option<i32>,
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

impl ProcessOutput {
    /// Returns `true` if the process exited with status zero.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external tools on a shared runtime.
///
/// Callers must not be inside an async context of the same runtime; the
/// pipeline calls the runner from plain or rayon worker threads.
#[derive(Debug)]
pub struct ProcessRunner {
    handle: Handle,
    timeout: Option<Duration>,
}

impl ProcessRunner {
    /// Creates a runner driving processes on `handle`.
    pub fn new(handle: Handle, timeout: Option<Duration>) -> Self {
        Self { handle, timeout }
    }

    /// Returns the per-invocation timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Runs `program` and captures its output regardless of exit status.
    pub fn run<I, S>(&self, tool: &str, program: &Path, args: I) -> Result<ProcessOutput, ToolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(tool, program = %program.display(), "running tool");
        let output = self.handle.block_on(async {
            let finished = match self.timeout {
                Some(limit) => tokio::time::timeout(limit, cmd.output())
                    .await
                    .map_err(|_| ToolError::Timeout {
                        tool: tool.to_string(),
                        after: limit,
                    })?,
                None => cmd.output().await,
            };
            finished.map_err(|source| ToolError::Spawn {
                tool: tool.to_string(),
                source,
            })
        })?;

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Runs `program` and fails unless it exits with status zero.
    pub fn run_checked<I, S>(
        &self,
        tool: &str,
        program: &Path,
        args: I,
    ) -> Result<ProcessOutput, ToolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = self.run(tool, program, args)?;
        if !output.success() {
            return Err(ToolError::Failed {
                tool: tool.to_string(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn captures_stdout() {
        let rt = runtime();
        let runner = ProcessRunner::new(rt.handle().clone(), Some(Duration::from_secs(10)));
        let out = runner
            .run_checked("sh", Path::new("sh"), ["-c", "echo hello"])
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn nonzero_exit_is_failure() {
        let rt = runtime();
        let runner = ProcessRunner::new(rt.handle().clone(), None);
        let err = runner
            .run_checked("sh", Path::new("sh"), ["-c", "echo oops >&2; exit 3"])
            .unwrap_err();
        match err {
            ToolError::Failed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn timeout_kills_slow_process() {
        let rt = runtime();
        let runner = ProcessRunner::new(rt.handle().clone(), Some(Duration::from_millis(100)));
        let started = std::time::Instant::now();
        let err = runner
            .run("sleep", Path::new("sleep"), ["5"])
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let rt = runtime();
        let runner = ProcessRunner::new(rt.handle().clone(), None);
        let err = runner
            .run("nope", Path::new("/nonexistent/abtrack-no-such-tool"), Vec::<String>::new())
            .unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }
}
