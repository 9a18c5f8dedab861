//! Shared foundational types used across the abtrack workspace.
//!
//! This crate provides content hashing and the stable short keys derived from
//! it, the ordered version model, the stage enumeration, shared-object
//! artifact descriptors, and the common internal error type.

#![warn(missing_docs)]

pub mod hash;
pub mod object;
pub mod result;
pub mod stage;
pub mod version;

pub use hash::ContentHash;
pub use object::{ObjectArtifact, ObjectKey};
pub use result::{InternalError, TrackResult};
pub use stage::{ParseStageError, Stage};
pub use version::{Version, VersionFlags, VersionId, VersionList, VersionPair, CURRENT};
