//! Persistent artifact cache for the incremental build pipeline.
//!
//! The [`ArtifactStore`] maps artifact keys (per version, per version pair, or
//! per compared object pair) to metadata about the artifact produced for that
//! key. It is the single source of truth for "is this already built"; only the
//! repair pass inspects the filesystem. The [`StalenessOracle`] decides, from
//! the cached record and the run's flags, whether an artifact must be
//! regenerated.

#![warn(missing_docs)]

pub mod error;
pub mod hasher;
pub mod key;
pub mod layout;
pub mod record;
pub mod staleness;
pub mod store;

pub use error::CacheError;
pub use hasher::FileHasher;
pub use key::ArtifactKey;
pub use record::{
    ArtifactData, ArtifactRecord, CompareRecord, DateRecord, DiffRecord, DumpRecord, GraphRecord,
    SonameRecord, SummaryRecord,
};
pub use staleness::{Freshness, StalenessOracle};
pub use store::{ArtifactStore, RepairReport, STORE_FILE, STORE_SCHEMA};
