//! User-facing diagnostics with severity levels, codes, and terminal rendering.
//!
//! This crate provides structured [`Diagnostic`] messages. The thread-safe
//! [`DiagnosticSink`] accumulates them while the pipeline runs (possibly on
//! several worker threads), and [`TerminalRenderer`] formats them with a
//! severity prefix such as `error[B201]: ...`.

#![warn(missing_docs)]

pub mod code;
pub mod diagnostic;
pub mod renderer;
pub mod severity;
pub mod sink;

pub use code::{Category, DiagnosticCode};
pub use diagnostic::Diagnostic;
pub use renderer::{DiagnosticRenderer, TerminalRenderer};
pub use severity::Severity;
pub use sink::DiagnosticSink;
