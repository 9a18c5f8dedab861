//! Error types for external tool invocations.

use std::path::PathBuf;
use std::time::Duration;

/// Errors raised while locating or running an external tool.
///
/// Discovery errors ([`is_fatal`](Self::is_fatal)) abort a run. Everything
/// else is a per-item failure: the item is skipped and retried next run.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The tool is not installed or not on `PATH`.
    #[error("required tool `{tool}` not found in PATH")]
    NotFound {
        /// Tool name.
        tool: String,
    },

    /// The tool is older than the supported minimum.
    #[error("`{tool}` {found} is older than the required {required}")]
    TooOld {
        /// Tool name.
        tool: String,
        /// Version reported by the tool.
        found: String,
        /// Minimum supported version.
        required: String,
    },

    /// The tool's version could not be determined.
    #[error("cannot determine version of `{tool}` from {output:?}")]
    UnknownVersion {
        /// Tool name.
        tool: String,
        /// The unparsable version output.
        output: String,
    },

    /// The process could not be started.
    #[error("failed to start `{tool}`: {source}")]
    Spawn {
        /// Tool name.
        tool: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The process exited unsuccessfully.
    #[error("`{tool}` exited with {}: {stderr}", .code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}")))]
    Failed {
        /// Tool name.
        tool: String,
        /// Exit code, `None` if killed by a signal.
        code: Option<i32>,
        /// Trimmed standard error.
        stderr: String,
    },

    /// The process exceeded the configured timeout and was killed.
    #[error("`{tool}` timed out after {}s", .after.as_secs())]
    Timeout {
        /// Tool name.
        tool: String,
        /// The timeout that elapsed.
        after: Duration,
    },

    /// The tool reported success but did not produce its output.
    #[error("`{tool}` did not produce {path}")]
    MissingOutput {
        /// Tool name.
        tool: String,
        /// The expected output file.
        path: PathBuf,
    },

    /// Reading or writing a tool's input or output failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

impl ToolError {
    /// Returns `true` for errors that make a tool unusable for the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ToolError::NotFound { .. } | ToolError::TooOld { .. } | ToolError::UnknownVersion { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ToolError::Io {
            path: path.into(),
            source,
        }
    }
}
