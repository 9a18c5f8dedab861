//! Error types for pipeline runs.

use std::path::PathBuf;

use abtrack_cache::CacheError;
use abtrack_common::InternalError;

/// Errors that end a pipeline run.
///
/// Per-item tool failures are not errors at this level; they become
/// diagnostics and the run continues.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The artifact store could not be written.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A pipeline output outside the store could not be written.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A broken internal invariant.
    #[error(transparent)]
    Internal(#[from] InternalError),

    /// The run was cancelled; completed work has been persisted.
    #[error("interrupted")]
    Interrupted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_error_is_transparent() {
        let err = PipelineError::from(InternalError::new("store lock poisoned"));
        assert_eq!(err.to_string(), "internal error: store lock poisoned");
    }

    #[test]
    fn io_error_display() {
        let err = PipelineError::Io {
            path: PathBuf::from("/cache/libfoo/timeline.json"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        };
        assert!(err.to_string().contains("timeline.json"));
    }
}
