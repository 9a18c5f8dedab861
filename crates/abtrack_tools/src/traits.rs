//! Adapter interfaces for the external tools.
//!
//! Implementations must be shareable across worker threads. Every method is
//! blocking and reports failure through [`ToolError`]; none of them may panic
//! on bad tool output.

use std::path::{Path, PathBuf};

use crate::error::ToolError;
use crate::summary::{CompareSummary, DiffSummary};

/// Input of one dump invocation.
#[derive(Clone, Copy, Debug)]
pub struct DumpRequest<'a> {
    /// Absolute path of the shared object.
    pub object: &'a Path,
    /// Version label recorded in the dump.
    pub version_label: &'a str,
    /// Where the dump must be written.
    pub output: &'a Path,
    /// Include private symbols.
    pub private_symbols: bool,
}

/// Metadata of a produced dump.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DumpOutput {
    /// Exported symbol count.
    pub symbols: u64,
    /// Implementation language.
    pub language: Option<String>,
    /// Version of the producing tool.
    pub tool_version: Option<String>,
}

/// Produces an ABI dump of one shared object.
pub trait DumpTool: Send + Sync {
    /// Dumps `request.object` to `request.output`.
    ///
    /// Succeeds only if the output file exists afterwards.
    fn dump(&self, request: &DumpRequest<'_>) -> Result<DumpOutput, ToolError>;
}

/// Input of one comparison.
#[derive(Clone, Copy, Debug)]
pub struct CompareRequest<'a> {
    /// Library name shown in the report.
    pub library: &'a str,
    /// Dump of the older object.
    pub old_dump: &'a Path,
    /// Dump of the newer object.
    pub new_dump: &'a Path,
    /// Directory the report is written into.
    pub report_dir: &'a Path,
    /// Compare private symbols too.
    pub private_symbols: bool,
}

/// Compares two ABI dumps.
pub trait CompareTool: Send + Sync {
    /// Writes a report under `request.report_dir` and returns its path with
    /// the parsed summary line.
    fn compare(&self, request: &CompareRequest<'_>) -> Result<(PathBuf, CompareSummary), ToolError>;
}

/// Reads the declared soname of a shared object.
pub trait SonameProbe: Send + Sync {
    /// Returns the soname, or `None` if the object declares none.
    fn soname(&self, object: &Path) -> Result<Option<String>, ToolError>;
}

/// Input of a header or package diff.
#[derive(Clone, Copy, Debug)]
pub struct DiffRequest<'a> {
    /// Older tree or archive.
    pub old: &'a Path,
    /// Newer tree or archive.
    pub new: &'a Path,
    /// Directory the report is written into.
    pub report_dir: &'a Path,
    /// Patterns of files to leave out.
    pub skip_patterns: &'a [String],
}

/// Diffs two trees or archives.
pub trait DiffTool: Send + Sync {
    /// Writes a report under `request.report_dir` and returns its path with
    /// the parsed summary line.
    fn diff(&self, request: &DiffRequest<'_>) -> Result<(PathBuf, DiffSummary), ToolError>;
}

/// Extracts the changelog of a source tree or archive.
pub trait ChangelogTool: Send + Sync {
    /// Writes the changelog of `source` to `output`.
    ///
    /// Fails with [`ToolError::MissingOutput`] if the source has no
    /// changelog or it is empty.
    fn extract(&self, source: &Path, output: &Path) -> Result<(), ToolError>;
}

/// State of a live checkout as reported by its source control system.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upstream {
    /// Opaque marker that changes whenever the checkout changes.
    pub marker: String,
    /// Commit time in Unix seconds, if the system reports one.
    pub timestamp: Option<u64>,
}

/// Probes a live checkout for its upstream marker.
pub trait ScmProbe: Send + Sync {
    /// Returns the marker of the checkout at `dir`.
    fn probe(&self, dir: &Path) -> Result<Upstream, ToolError>;
}
