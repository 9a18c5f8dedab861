//! Diagnostic codes emitted by the pipeline.

use abtrack_diagnostics::{Category, DiagnosticCode};

/// An ABI dump failed.
pub const DUMP_FAILED: DiagnosticCode = DiagnosticCode::new(Category::Build, 201);
/// An object-pair comparison failed.
pub const COMPARE_FAILED: DiagnosticCode = DiagnosticCode::new(Category::Build, 202);
/// Reading a soname failed.
pub const SONAME_FAILED: DiagnosticCode = DiagnosticCode::new(Category::Build, 203);
/// Changelog extraction failed.
pub const CHANGELOG_FAILED: DiagnosticCode = DiagnosticCode::new(Category::Build, 204);
/// A header diff failed.
pub const HEADERS_DIFF_FAILED: DiagnosticCode = DiagnosticCode::new(Category::Build, 205);
/// A package diff failed.
pub const PKG_DIFF_FAILED: DiagnosticCode = DiagnosticCode::new(Category::Build, 206);
/// A release date could not be determined.
pub const DATE_FAILED: DiagnosticCode = DiagnosticCode::new(Category::Build, 207);
/// A produced artifact could not be hashed or recorded.
pub const ARTIFACT_UNREADABLE: DiagnosticCode = DiagnosticCode::new(Category::Build, 208);

/// Several new objects declare one soname.
pub const SONAME_AMBIGUOUS: DiagnosticCode = DiagnosticCode::new(Category::Match, 301);

/// The installed directory of a version is missing.
pub const INSTALLED_MISSING: DiagnosticCode = DiagnosticCode::new(Category::Warning, 401);
/// The source of a version is missing.
pub const SOURCE_MISSING: DiagnosticCode = DiagnosticCode::new(Category::Warning, 402);
/// A version has no public headers to diff.
pub const HEADERS_MISSING: DiagnosticCode = DiagnosticCode::new(Category::Warning, 403);
/// The installed tree of a version could not be scanned.
pub const SCAN_FAILED: DiagnosticCode = DiagnosticCode::new(Category::Warning, 404);
