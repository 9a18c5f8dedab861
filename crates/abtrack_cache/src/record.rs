//! Cached artifact records.
//!
//! Every record field except the stage tag is optional or defaulted when
//! deserialized, so stores written by older builds that lack newer fields
//! still load.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use abtrack_common::ContentHash;
use serde::{Deserialize, Serialize};

/// Metadata about one produced artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Artifact file, relative to the library cache root.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Content hash of the artifact file, when one was computed.
    #[serde(default)]
    pub content_hash: Option<ContentHash>,
    /// Upstream marker of the live source at build time.
    #[serde(default)]
    pub upstream_marker: Option<String>,
    /// Stage-specific payload.
    pub data: ArtifactData,
}

impl ArtifactRecord {
    /// Creates a record with no artifact file.
    pub fn new(data: impl Into<ArtifactData>) -> Self {
        Self {
            path: None,
            content_hash: None,
            upstream_marker: None,
            data: data.into(),
        }
    }

    /// Sets the artifact file path (relative to the library cache root).
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the artifact content hash.
    pub fn with_hash(mut self, hash: ContentHash) -> Self {
        self.content_hash = Some(hash);
        self
    }

    /// Sets the upstream marker observed when the artifact was built.
    pub fn with_marker(mut self, marker: Option<String>) -> Self {
        self.upstream_marker = marker;
        self
    }

    /// Returns the artifact file path, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Stage-specific artifact payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ArtifactData {
    /// Release date.
    Date(DateRecord),
    /// Soname table.
    Soname(SonameRecord),
    /// Extracted changelog (the file itself is the payload).
    Changelog,
    /// ABI dump of one object.
    Dump(DumpRecord),
    /// Comparison of one object pair.
    Compare(CompareRecord),
    /// Aggregate of a version pair.
    Summary(SummaryRecord),
    /// Header or package diff.
    Diff(DiffRecord),
    /// Compatibility timeline.
    Graph(GraphRecord),
}

impl ArtifactData {
    /// Returns the dump payload, if this is one.
    pub fn as_dump(&self) -> Option<&DumpRecord> {
        match self {
            ArtifactData::Dump(d) => Some(d),
            _ => None,
        }
    }

    /// Returns the compare payload, if this is one.
    pub fn as_compare(&self) -> Option<&CompareRecord> {
        match self {
            ArtifactData::Compare(c) => Some(c),
            _ => None,
        }
    }

    /// Returns the summary payload, if this is one.
    pub fn as_summary(&self) -> Option<&SummaryRecord> {
        match self {
            ArtifactData::Summary(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the soname table, if this is one.
    pub fn as_soname(&self) -> Option<&SonameRecord> {
        match self {
            ArtifactData::Soname(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the date payload, if this is one.
    pub fn as_date(&self) -> Option<&DateRecord> {
        match self {
            ArtifactData::Date(d) => Some(d),
            _ => None,
        }
    }

    /// Returns the diff payload, if this is one.
    pub fn as_diff(&self) -> Option<&DiffRecord> {
        match self {
            ArtifactData::Diff(d) => Some(d),
            _ => None,
        }
    }

    /// Returns the timeline record, if this is one.
    pub fn as_graph(&self) -> Option<&GraphRecord> {
        match self {
            ArtifactData::Graph(g) => Some(g),
            _ => None,
        }
    }
}

/// Release date of a version.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRecord {
    /// Seconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: u64,
}

/// Sonames of the objects of one version, keyed by relative path.
///
/// Objects without a `DT_SONAME` entry are absent from the map.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SonameRecord {
    /// Relative path to soname.
    #[serde(default)]
    pub sonames: BTreeMap<PathBuf, String>,
}

/// ABI dump of one object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpRecord {
    /// Object path relative to the version's installed tree.
    #[serde(default)]
    pub object: PathBuf,
    /// Soname of the object, if it has one.
    #[serde(default)]
    pub soname: Option<String>,
    /// Detected implementation language.
    #[serde(default)]
    pub language: Option<String>,
    /// Number of exported symbols, used as the aggregation weight.
    #[serde(default)]
    pub symbols: u64,
    /// Version of the dump tool that produced the dump.
    #[serde(default)]
    pub tool_version: Option<String>,
}

/// Comparison of one object pair.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompareRecord {
    /// Old object (relative path).
    #[serde(default)]
    pub old_object: PathBuf,
    /// New object (relative path).
    #[serde(default)]
    pub new_object: PathBuf,
    /// Percentage of old symbols affected by incompatible changes.
    #[serde(default)]
    pub affected: f64,
    /// Number of added symbols.
    #[serde(default)]
    pub added: u64,
    /// Number of removed symbols.
    #[serde(default)]
    pub removed: u64,
    /// Total number of reported problems.
    #[serde(default)]
    pub problems: u64,
    /// Fingerprint of the two input dumps.
    #[serde(default)]
    pub inputs: Option<ContentHash>,
}

/// Aggregate compatibility of a version pair.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    /// Backward compatibility percentage, in `[0, 100]`.
    #[serde(default)]
    pub backward_compat: f64,
    /// Total added symbols.
    #[serde(default)]
    pub added: u64,
    /// Total removed symbols.
    #[serde(default)]
    pub removed: u64,
    /// Total reported problems.
    #[serde(default)]
    pub problems: u64,
    /// Objects present only in the newer version.
    #[serde(default)]
    pub added_objects: Vec<PathBuf>,
    /// Objects present only in the older version.
    #[serde(default)]
    pub removed_objects: Vec<PathBuf>,
    /// Mapped objects whose soname changed.
    #[serde(default)]
    pub soname_changes: Vec<PathBuf>,
    /// Old objects that were renamed in the newer version.
    #[serde(default)]
    pub renamed_objects: Vec<PathBuf>,
}

/// Header or package diff statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRecord {
    /// Number of changed files.
    #[serde(default)]
    pub changed: u64,
    /// Number of added files.
    #[serde(default)]
    pub added: u64,
    /// Number of removed files.
    #[serde(default)]
    pub removed: u64,
}

/// Compatibility timeline.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphRecord {
    /// Number of timeline rows.
    #[serde(default)]
    pub rows: usize,
    /// Fingerprint of the records the timeline was built from.
    #[serde(default)]
    pub inputs: Option<ContentHash>,
}

macro_rules! impl_into_data {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ArtifactData {
                fn from(value: $ty) -> Self {
                    ArtifactData::$variant(value)
                }
            }
        )*
    };
}

impl_into_data! {
    DateRecord => Date,
    SonameRecord => Soname,
    DumpRecord => Dump,
    CompareRecord => Compare,
    SummaryRecord => Summary,
    DiffRecord => Diff,
    GraphRecord => Graph,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let rec = ArtifactRecord::new(DateRecord { timestamp: 1_700_000_000 })
            .with_path("dates/2.0")
            .with_marker(Some("abc123".into()));
        assert_eq!(rec.path(), Some(Path::new("dates/2.0")));
        assert_eq!(rec.upstream_marker.as_deref(), Some("abc123"));
        assert_eq!(rec.data.as_date().map(|d| d.timestamp), Some(1_700_000_000));
    }

    #[test]
    fn legacy_record_without_optional_fields_loads() {
        let json = r#"{"data":{"kind":"compare","affected":12.5}}"#;
        let rec: ArtifactRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.path, None);
        assert_eq!(rec.upstream_marker, None);
        let cmp = rec.data.as_compare().unwrap();
        assert_eq!(cmp.affected, 12.5);
        assert_eq!(cmp.added, 0);
        assert_eq!(cmp.inputs, None);
    }

    #[test]
    fn unit_changelog_variant() {
        let rec = ArtifactRecord::new(ArtifactData::Changelog).with_path("changelog/1.0/log.txt");
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("\"kind\":\"changelog\""));
        let back: ArtifactRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn accessors_reject_other_kinds() {
        let data = ArtifactData::from(DumpRecord::default());
        assert!(data.as_dump().is_some());
        assert!(data.as_compare().is_none());
        assert!(data.as_summary().is_none());
    }
}
