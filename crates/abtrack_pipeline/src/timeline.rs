//! The compatibility timeline written by the graph stage.

use std::io::Write;
use std::path::Path;

use abtrack_cache::{ArtifactKey, ArtifactStore};
use abtrack_common::{ContentHash, InternalError, VersionList};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// One version of the timeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineRow {
    /// Version identifier.
    pub version: String,
    /// Release date in Unix seconds, if known.
    #[serde(default)]
    pub date: Option<u64>,
    /// Number of dumped objects.
    pub objects: usize,
    /// Total exported symbols over the dumped objects.
    pub symbols: u64,
    /// Backward compatibility with the previous version.
    #[serde(default)]
    pub backward_compatibility: Option<f64>,
    /// Symbols added since the previous version.
    #[serde(default)]
    pub added: Option<u64>,
    /// Symbols removed since the previous version.
    #[serde(default)]
    pub removed: Option<u64>,
    /// Problems reported against the previous version.
    #[serde(default)]
    pub problems: Option<u64>,
}

/// Per-version statistics of a library, oldest version first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    /// Library name.
    pub library: String,
    /// Rows, oldest version first.
    pub rows: Vec<TimelineRow>,
}

impl Timeline {
    /// Builds the timeline from the records currently in `store`.
    ///
    /// Missing records leave the matching cells empty; the oldest version
    /// never has compatibility figures.
    pub fn collect(library: &str, versions: &VersionList, store: &ArtifactStore) -> Self {
        let rows = versions
            .oldest_first()
            .map(|version| {
                let date = store
                    .get(&ArtifactKey::Date {
                        version: version.id.clone(),
                    })
                    .and_then(|r| r.data.as_date())
                    .map(|d| d.timestamp);
                let (objects, symbols) = store
                    .dumps(&version.id)
                    .filter_map(|(_, r)| r.data.as_dump())
                    .fold((0, 0), |(n, s), d| (n + 1, s + d.symbols));
                let summary = versions
                    .previous(&version.id)
                    .and_then(|older| {
                        store.get(&ArtifactKey::Summary {
                            old: older.id.clone(),
                            new: version.id.clone(),
                        })
                    })
                    .and_then(|r| r.data.as_summary());
                TimelineRow {
                    version: version.id.to_string(),
                    date,
                    objects,
                    symbols,
                    backward_compatibility: summary.map(|s| s.backward_compat),
                    added: summary.map(|s| s.added),
                    removed: summary.map(|s| s.removed),
                    problems: summary.map(|s| s.problems),
                }
            })
            .collect();
        Self {
            library: library.to_string(),
            rows,
        }
    }

    fn to_json(&self) -> Result<String, PipelineError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| InternalError::new(format!("cannot serialize timeline: {e}")).into())
    }

    /// Hash of the serialized timeline.
    pub fn fingerprint(&self) -> Result<ContentHash, PipelineError> {
        Ok(ContentHash::from_bytes(self.to_json()?.as_bytes()))
    }

    /// Writes the timeline as JSON, replacing `path` atomically.
    pub fn write(&self, path: &Path) -> Result<(), PipelineError> {
        let json = self.to_json()?;
        let io_err = |source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        };
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(io_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(json.as_bytes()).map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abtrack_cache::{ArtifactRecord, DateRecord, DumpRecord, SummaryRecord};
    use abtrack_common::{ObjectKey, Version, VersionFlags, VersionId};
    use std::path::PathBuf;

    fn versions(ids: &[&str]) -> VersionList {
        VersionList::from_newest_first(ids.iter().map(|id| Version {
            id: VersionId::new(*id),
            ordinal: 0,
            source: PathBuf::from(format!("/src/{id}")),
            installed: None,
            flags: VersionFlags::default(),
        }))
    }

    fn store_with_records(root: &Path) -> ArtifactStore {
        let mut store = ArtifactStore::new(root, "libfoo");
        store.put(
            ArtifactKey::Date {
                version: VersionId::new("1.0"),
            },
            ArtifactRecord::new(DateRecord { timestamp: 1000 }),
        );
        for (version, object, symbols) in [("1.0", "lib/libfoo.so.1", 10), ("2.0", "lib/libfoo.so.2", 12), ("2.0", "lib/libbar.so.1", 3)] {
            store.put(
                ArtifactKey::Dump {
                    version: VersionId::new(version),
                    object: ObjectKey::from_rel_path(Path::new(object)),
                },
                ArtifactRecord::new(DumpRecord {
                    object: PathBuf::from(object),
                    symbols,
                    ..DumpRecord::default()
                }),
            );
        }
        store.put(
            ArtifactKey::Summary {
                old: VersionId::new("1.0"),
                new: VersionId::new("2.0"),
            },
            ArtifactRecord::new(SummaryRecord {
                backward_compat: 87.5,
                added: 3,
                removed: 1,
                problems: 2,
                ..SummaryRecord::default()
            }),
        );
        store
    }

    #[test]
    fn rows_are_oldest_first_with_pair_figures() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_records(dir.path());
        let timeline = Timeline::collect("libfoo", &versions(&["2.0", "1.0"]), &store);
        assert_eq!(timeline.rows.len(), 2);

        let oldest = &timeline.rows[0];
        assert_eq!(oldest.version, "1.0");
        assert_eq!(oldest.date, Some(1000));
        assert_eq!((oldest.objects, oldest.symbols), (1, 10));
        assert_eq!(oldest.backward_compatibility, None);

        let newest = &timeline.rows[1];
        assert_eq!(newest.version, "2.0");
        assert_eq!(newest.date, None);
        assert_eq!((newest.objects, newest.symbols), (2, 15));
        assert_eq!(newest.backward_compatibility, Some(87.5));
        assert_eq!(newest.problems, Some(2));
    }

    #[test]
    fn fingerprint_follows_content() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with_records(dir.path());
        let list = versions(&["2.0", "1.0"]);
        let before = Timeline::collect("libfoo", &list, &store).fingerprint().unwrap();
        assert_eq!(before, Timeline::collect("libfoo", &list, &store).fingerprint().unwrap());

        store.put(
            ArtifactKey::Date {
                version: VersionId::new("2.0"),
            },
            ArtifactRecord::new(DateRecord { timestamp: 2000 }),
        );
        let after = Timeline::collect("libfoo", &list, &store).fingerprint().unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn write_produces_readable_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_records(dir.path());
        let timeline = Timeline::collect("libfoo", &versions(&["2.0", "1.0"]), &store);
        let path = dir.path().join("timeline.json");
        timeline.write(&path).unwrap();
        let back: Timeline = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, timeline);
    }
}
