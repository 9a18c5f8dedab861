//! Collects diagnostics from the pipeline's worker threads.
//!
//! Items fail on rayon workers while the CLI renders on the main thread, so
//! the sink is shared by reference and keeps a running tally per severity.
//! The tally survives [`take_all`](DiagnosticSink::take_all), which lets the
//! CLI print diagnostics as they arrive and still report totals at the end.

use crate::code::DiagnosticCode;
use crate::diagnostic::Diagnostic;
use crate::severity::Severity;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Thread-safe diagnostic collector with cumulative per-severity counts.
#[derive(Default)]
pub struct DiagnosticSink {
    pending: Mutex<Vec<Diagnostic>>,
    // Indexed by `Severity as usize`.
    tally: [AtomicUsize; 4],
}

impl DiagnosticSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a diagnostic.
    pub fn emit(&self, diag: Diagnostic) {
        self.tally[diag.severity as usize].fetch_add(1, Ordering::Relaxed);
        self.pending().push(diag);
    }

    /// Number of diagnostics of exactly `severity` emitted so far.
    pub fn count(&self, severity: Severity) -> usize {
        self.tally[severity as usize].load(Ordering::Relaxed)
    }

    /// Number of error and fatal diagnostics emitted so far.
    pub fn error_count(&self) -> usize {
        self.count(Severity::Error) + self.count(Severity::Fatal)
    }

    /// Returns `true` if any error or fatal diagnostic was emitted.
    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// Takes the diagnostics not yet taken. Counts are not reset.
    pub fn take_all(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.pending())
    }

    /// A copy of the diagnostics not yet taken.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.pending().clone()
    }

    /// Codes of the diagnostics not yet taken, in emission order.
    pub fn codes(&self) -> Vec<DiagnosticCode> {
        self.pending().iter().map(|d| d.code).collect()
    }

    // A panic on another worker must not lose what was already collected.
    fn pending(&self) -> MutexGuard<'_, Vec<Diagnostic>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
