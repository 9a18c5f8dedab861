//! Cross-version object matching and compatibility aggregation.
//!
//! [`ObjectIdentityResolver`] decides which shared object of the newer
//! version corresponds to which object of the older one.
//! [`CompatibilityAggregator`] folds the per-object comparison results of a
//! version pair into one backward-compatibility score.

#![warn(missing_docs)]

pub mod aggregate;
pub mod names;
pub mod resolver;

pub use aggregate::{CompatibilityAggregator, ObjectWeights};
pub use resolver::{Ambiguity, MappedPair, MatchTier, ObjectIdentityResolver, ObjectMapping};
