//! Parsing and validation of library profiles.
//!
//! A profile names the tracked library, lists its versions newest first, and
//! carries the global filters and run settings. This crate reads it into a
//! strongly-typed [`Profile`] and resolves it, together with the command-line
//! options, into the immutable [`RunContext`] handed to every component.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_profile, load_profile_from_str, ProfileFormat};
pub use resolve::{library_cache_root, live_source, resolve_run_context, RunContext, RunOptions};
pub use types::*;
