//! The ordered version model.
//!
//! Versions are held newest-first. The position of a version in the list is
//! its ordinal, and adjacency is defined purely by ordinal: the previous
//! (older) version of the one at position `i` is the one at position `i + 1`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Identifier of the live, mutable checkout version.
pub const CURRENT: &str = "current";

/// A version identifier such as `"1.2.3"` or [`CURRENT`].
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(String);

impl VersionId {
    /// Creates a version identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the live checkout sentinel.
    pub fn is_current(&self) -> bool {
        self.0 == CURRENT
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VersionId({})", self.0)
    }
}

/// Per-version switches for the optional stages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VersionFlags {
    /// Extract the changelog from the version's sources.
    pub changelog: bool,
    /// Diff this version's public headers against the previous version.
    pub headers_diff: bool,
    /// Diff this version's source package against the previous version.
    pub pkg_diff: bool,
}

/// One released (or live) version of the tracked library.
#[derive(Clone, Debug)]
pub struct Version {
    /// Version identifier.
    pub id: VersionId,
    /// Position in the newest-first list.
    pub ordinal: usize,
    /// Source archive or working-copy path.
    pub source: PathBuf,
    /// Root of the installed tree holding the built shared objects, if any.
    pub installed: Option<PathBuf>,
    /// Optional stage switches.
    pub flags: VersionFlags,
}

impl Version {
    /// Returns `true` if this version tracks a live, mutable source.
    pub fn is_current(&self) -> bool {
        self.id.is_current()
    }
}

/// Two adjacent versions.
#[derive(Clone, Copy, Debug)]
pub struct VersionPair<'a> {
    /// The older version (higher ordinal).
    pub older: &'a Version,
    /// The newer version (lower ordinal).
    pub newer: &'a Version,
}

/// The newest-first list of versions for one library.
///
/// Immutable once built. Ordinals are assigned from list position so that
/// they always form a contiguous total order.
#[derive(Clone, Debug, Default)]
pub struct VersionList {
    versions: Vec<Version>,
}

impl VersionList {
    /// Builds a list from versions given newest first, reassigning ordinals
    /// from their positions.
    pub fn from_newest_first(versions: impl IntoIterator<Item = Version>) -> Self {
        let versions = versions
            .into_iter()
            .enumerate()
            .map(|(ordinal, mut v)| {
                v.ordinal = ordinal;
                v
            })
            .collect();
        Self { versions }
    }

    /// Returns the number of versions.
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Returns `true` if the list holds no versions.
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Iterates newest first.
    pub fn iter(&self) -> std::slice::Iter<'_, Version> {
        self.versions.iter()
    }

    /// Iterates oldest first.
    pub fn oldest_first(&self) -> impl Iterator<Item = &Version> {
        self.versions.iter().rev()
    }

    /// Looks up a version by identifier.
    pub fn get(&self, id: &VersionId) -> Option<&Version> {
        self.versions.iter().find(|v| &v.id == id)
    }

    /// Returns the version at the given ordinal.
    pub fn at(&self, ordinal: usize) -> Option<&Version> {
        self.versions.get(ordinal)
    }

    /// Returns the version immediately older than `id`, or `None` for the
    /// oldest version (or an unknown identifier).
    pub fn previous(&self, id: &VersionId) -> Option<&Version> {
        let v = self.get(id)?;
        self.at(v.ordinal + 1)
    }

    /// Returns the version immediately newer than `id`, or `None` for the
    /// newest version.
    pub fn next(&self, id: &VersionId) -> Option<&Version> {
        let v = self.get(id)?;
        v.ordinal.checked_sub(1).and_then(|i| self.at(i))
    }

    /// Returns all adjacent pairs, newest pair first.
    ///
    /// The oldest version never appears as the newer half of a pair.
    pub fn pairs(&self) -> Vec<VersionPair<'_>> {
        self.versions
            .windows(2)
            .map(|w| VersionPair {
                newer: &w[0],
                older: &w[1],
            })
            .collect()
    }
}
