//! Adapters for the external analysis tools.
//!
//! Each tool sits behind a narrow trait ([`DumpTool`], [`CompareTool`],
//! [`SonameProbe`], [`DiffTool`], [`ChangelogTool`], [`ScmProbe`]) with a
//! process-backed implementation. All subprocesses go through a shared
//! [`ProcessRunner`] that enforces the configured timeout. Free-text scraping
//! of tool output is confined to [`summary`] and the individual adapters.

#![warn(missing_docs)]

mod patterns;

pub mod adapters;
pub mod discover;
pub mod error;
pub mod runner;
pub mod summary;
pub mod traits;

pub use adapters::{
    AbiComplianceChecker, AbiDumper, ChangelogExtractor, GitProbe, PkgDiff, Readelf, SvnProbe,
    Unavailable,
};
pub use discover::{locate, required_tools, DottedVersion, LocatedTool, ToolSpec, Toolset};
pub use error::ToolError;
pub use runner::{ProcessOutput, ProcessRunner};
pub use summary::{CompareSummary, DiffSummary, DumpHeader};
pub use traits::{
    ChangelogTool, CompareRequest, CompareTool, DiffRequest, DiffTool, DumpOutput, DumpRequest,
    DumpTool, ScmProbe, SonameProbe, Upstream,
};
