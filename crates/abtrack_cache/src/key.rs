//! Artifact keys.
//!
//! The derived ordering (stage first, then version, pair, and object) is the
//! iteration order of the store and of the persisted file.

use abtrack_common::{ObjectKey, Stage, VersionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one cached artifact.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "lowercase")]
pub enum ArtifactKey {
    /// Release date of a version.
    Date {
        /// Version.
        version: VersionId,
    },
    /// Sonames of all objects of a version.
    Soname {
        /// Version.
        version: VersionId,
    },
    /// Extracted changelog of a version.
    Changelog {
        /// Version.
        version: VersionId,
    },
    /// ABI dump of one object of a version.
    #[serde(rename = "abidump")]
    Dump {
        /// Version.
        version: VersionId,
        /// Object key (hash of the relative path).
        object: ObjectKey,
    },
    /// Comparison of one mapped object pair.
    #[serde(rename = "abireport")]
    Compare {
        /// Older version.
        old: VersionId,
        /// Newer version.
        new: VersionId,
        /// Pair key (hash of both relative paths).
        pair: ObjectKey,
    },
    /// Aggregate compatibility of a version pair.
    Summary {
        /// Older version.
        old: VersionId,
        /// Newer version.
        new: VersionId,
    },
    /// Public header diff of a version pair.
    #[serde(rename = "headersdiff")]
    HeadersDiff {
        /// Older version.
        old: VersionId,
        /// Newer version.
        new: VersionId,
    },
    /// Source package diff of a version pair.
    #[serde(rename = "pkgdiff")]
    PkgDiff {
        /// Older version.
        old: VersionId,
        /// Newer version.
        new: VersionId,
    },
    /// Compatibility timeline of the whole library.
    Graph,
}

impl ArtifactKey {
    /// Returns the stage that produces this artifact.
    pub fn stage(&self) -> Stage {
        match self {
            ArtifactKey::Date { .. } => Stage::Date,
            ArtifactKey::Soname { .. } => Stage::Soname,
            ArtifactKey::Changelog { .. } => Stage::Changelog,
            ArtifactKey::Dump { .. } => Stage::AbiDump,
            ArtifactKey::Compare { .. } | ArtifactKey::Summary { .. } => Stage::AbiReport,
            ArtifactKey::HeadersDiff { .. } => Stage::HeadersDiff,
            ArtifactKey::PkgDiff { .. } => Stage::PkgDiff,
            ArtifactKey::Graph => Stage::Graph,
        }
    }

    /// Returns the version of a per-version key.
    pub fn version(&self) -> Option<&VersionId> {
        match self {
            ArtifactKey::Date { version }
            | ArtifactKey::Soname { version }
            | ArtifactKey::Changelog { version }
            | ArtifactKey::Dump { version, .. } => Some(version),
            _ => None,
        }
    }

    /// Returns `(old, new)` of a pairwise key.
    pub fn pair(&self) -> Option<(&VersionId, &VersionId)> {
        match self {
            ArtifactKey::Compare { old, new, .. }
            | ArtifactKey::Summary { old, new }
            | ArtifactKey::HeadersDiff { old, new }
            | ArtifactKey::PkgDiff { old, new } => Some((old, new)),
            _ => None,
        }
    }

    /// Returns `true` if the artifact derives from a mutable source.
    ///
    /// Keys touching the live `current` version are mutable. The timeline is
    /// derived from every other record and is treated as mutable too.
    pub fn is_live(&self) -> bool {
        if matches!(self, ArtifactKey::Graph) {
            return true;
        }
        if let Some(version) = self.version() {
            return version.is_current();
        }
        self.pair()
            .is_some_and(|(old, new)| old.is_current() || new.is_current())
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = self.stage();
        match self {
            ArtifactKey::Dump { version, object } => write!(f, "{stage}/{version}/{object}"),
            ArtifactKey::Compare { old, new, pair } => write!(f, "{stage}/{old}..{new}/{pair}"),
            ArtifactKey::Summary { old, new } => write!(f, "summary/{old}..{new}"),
            ArtifactKey::Graph => write!(f, "{stage}"),
            _ => {
                if let Some(version) = self.version() {
                    write!(f, "{stage}/{version}")
                } else if let Some((old, new)) = self.pair() {
                    write!(f, "{stage}/{old}..{new}")
                } else {
                    write!(f, "{stage}")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn v(id: &str) -> VersionId {
        VersionId::new(id)
    }

    #[test]
    fn stage_mapping() {
        let obj = ObjectKey::from_rel_path(Path::new("libfoo.so.1"));
        assert_eq!(ArtifactKey::Date { version: v("1.0") }.stage(), Stage::Date);
        assert_eq!(
            ArtifactKey::Dump { version: v("1.0"), object: obj.clone() }.stage(),
            Stage::AbiDump
        );
        assert_eq!(
            ArtifactKey::Compare { old: v("1.0"), new: v("2.0"), pair: obj }.stage(),
            Stage::AbiReport
        );
        assert_eq!(
            ArtifactKey::Summary { old: v("1.0"), new: v("2.0") }.stage(),
            Stage::AbiReport
        );
    }

    #[test]
    fn liveness() {
        assert!(ArtifactKey::Soname { version: v("current") }.is_live());
        assert!(!ArtifactKey::Soname { version: v("1.0") }.is_live());
        assert!(ArtifactKey::Summary { old: v("2.0"), new: v("current") }.is_live());
        assert!(!ArtifactKey::PkgDiff { old: v("1.0"), new: v("2.0") }.is_live());
        assert!(ArtifactKey::Graph.is_live());
    }

    #[test]
    fn display_forms() {
        let obj = ObjectKey::from_rel_path(Path::new("libfoo.so.1"));
        let dump = ArtifactKey::Dump { version: v("2.0"), object: obj.clone() };
        assert_eq!(dump.to_string(), format!("abidump/2.0/{obj}"));
        let diff = ArtifactKey::HeadersDiff { old: v("1.0"), new: v("2.0") };
        assert_eq!(diff.to_string(), "headersdiff/1.0..2.0");
        assert_eq!(ArtifactKey::Graph.to_string(), "graph");
    }

    #[test]
    fn ordering_groups_by_stage_then_version() {
        let mut keys = vec![
            ArtifactKey::Graph,
            ArtifactKey::Date { version: v("2.0") },
            ArtifactKey::Summary { old: v("1.0"), new: v("2.0") },
            ArtifactKey::Date { version: v("1.0") },
        ];
        keys.sort();
        assert_eq!(keys[0], ArtifactKey::Date { version: v("1.0") });
        assert_eq!(keys[1], ArtifactKey::Date { version: v("2.0") });
        assert_eq!(keys[3], ArtifactKey::Graph);
    }

    #[test]
    fn serde_roundtrip() {
        let key = ArtifactKey::Compare {
            old: v("1.0"),
            new: v("2.0"),
            pair: ObjectKey::for_pair(Path::new("a.so"), Path::new("b.so")),
        };
        let json = serde_json::to_string(&key).unwrap();
        assert!(json.contains("\"stage\":\"abireport\""));
        let back: ArtifactKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
