//! Diagnostic codes emitted by the command line front end.

use abtrack_diagnostics::{Category, DiagnosticCode};

/// A required tool is missing or too old.
pub const TOOL_UNAVAILABLE: DiagnosticCode = DiagnosticCode::new(Category::Fatal, 101);

/// The profile could not be read, parsed, or resolved.
pub const PROFILE_UNREADABLE: DiagnosticCode = DiagnosticCode::new(Category::Access, 101);
/// The cache root could not be created or its store opened.
pub const CACHE_UNUSABLE: DiagnosticCode = DiagnosticCode::new(Category::Access, 102);

/// The upstream marker of the live checkout is unknown.
pub const UPSTREAM_UNKNOWN: DiagnosticCode = DiagnosticCode::new(Category::Warning, 405);
