//! The artifact store: persisted mapping from artifact keys to records.
//!
//! The store lives at `<cache_root>/store.json`. Loading is fail-safe: a
//! missing, unreadable, or incompatible file yields an empty store. Writes go
//! to a temporary file in the same directory that is then renamed over the
//! store, so an interrupted write never leaves a truncated store behind.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use abtrack_common::VersionId;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::key::ArtifactKey;
use crate::layout::ARTIFACT_DIRS;
use crate::record::ArtifactRecord;

/// Name of the store file within the library cache root.
pub const STORE_FILE: &str = "store.json";

/// Current store schema. Stores with any other schema are discarded on load.
pub const STORE_SCHEMA: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StoreFile {
    schema: u32,
    library: String,
    #[serde(default)]
    entries: Vec<StoredEntry>,
}

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    key: ArtifactKey,
    record: ArtifactRecord,
}

/// Outcome of a [`ArtifactStore::repair`] pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Entries dropped because their artifact file no longer exists.
    pub dropped: Vec<ArtifactKey>,
    /// Summaries dropped because one of their comparisons was dropped.
    pub dropped_summaries: Vec<ArtifactKey>,
    /// Orphan artifact files removed from disk.
    pub removed_files: usize,
}

impl RepairReport {
    /// Returns `true` if the pass changed nothing.
    pub fn is_clean(&self) -> bool {
        self.dropped.is_empty() && self.dropped_summaries.is_empty() && self.removed_files == 0
    }
}

/// In-memory view of one library's artifact store.
///
/// Only the repair pass touches the filesystem to check artifact files;
/// every other decision is made from the records alone.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    library: String,
    entries: BTreeMap<ArtifactKey, ArtifactRecord>,
    dirty: bool,
}

impl ArtifactStore {
    /// Creates an empty store rooted at `root`.
    pub fn new(root: &Path, library: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            library: library.to_string(),
            entries: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Loads the store under `root`, or starts an empty one.
    ///
    /// A store written for another library or with a different schema is
    /// ignored with a warning.
    pub fn load_or_create(root: &Path, library: &str) -> Self {
        let path = root.join(STORE_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Self::new(root, library);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "store unreadable, starting fresh");
                return Self::new(root, library);
            }
        };

        let file: StoreFile = match serde_json::from_str(&content) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "store unparsable, starting fresh");
                return Self::new(root, library);
            }
        };

        if file.schema != STORE_SCHEMA {
            tracing::warn!(
                schema = file.schema,
                expected = STORE_SCHEMA,
                "store schema incompatible, starting fresh"
            );
            return Self::new(root, library);
        }
        if file.library != library {
            tracing::warn!(
                found = %file.library,
                expected = %library,
                "store belongs to another library, starting fresh"
            );
            return Self::new(root, library);
        }

        let entries = file
            .entries
            .into_iter()
            .map(|e| (e.key, e.record))
            .collect();
        Self {
            root: root.to_path_buf(),
            library: library.to_string(),
            entries,
            dirty: false,
        }
    }

    /// Loads the store and runs the repair pass.
    pub fn open(root: &Path, library: &str) -> Result<(Self, RepairReport), CacheError> {
        let mut store = Self::load_or_create(root, library);
        let report = store.repair()?;
        Ok((store, report))
    }

    /// Returns the library cache root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the library name the store belongs to.
    pub fn library(&self) -> &str {
        &self.library
    }

    /// Returns the path of the store file.
    pub fn store_path(&self) -> PathBuf {
        self.root.join(STORE_FILE)
    }

    /// Resolves a cache-relative artifact path.
    pub fn absolute(&self, rel: &Path) -> PathBuf {
        self.root.join(rel)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the store has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if there are unpersisted changes.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Looks up the record for `key`.
    pub fn get(&self, key: &ArtifactKey) -> Option<&ArtifactRecord> {
        self.entries.get(key)
    }

    /// Inserts or replaces the record for `key`.
    pub fn put(&mut self, key: ArtifactKey, record: ArtifactRecord) {
        self.entries.insert(key, record);
        self.dirty = true;
    }

    /// Removes the record for `key`.
    ///
    /// Invalidating a comparison also invalidates the summary of its version
    /// pair, since the summary was aggregated from it.
    pub fn invalidate(&mut self, key: &ArtifactKey) -> Option<ArtifactRecord> {
        let removed = self.entries.remove(key);
        if let ArtifactKey::Compare { old, new, .. } = key {
            let summary = ArtifactKey::Summary {
                old: old.clone(),
                new: new.clone(),
            };
            if self.entries.remove(&summary).is_some() {
                self.dirty = true;
            }
        }
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Iterates over all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&ArtifactKey, &ArtifactRecord)> {
        self.entries.iter()
    }

    /// Iterates over the dump entries of `version`.
    pub fn dumps<'a>(
        &'a self,
        version: &'a VersionId,
    ) -> impl Iterator<Item = (&'a ArtifactKey, &'a ArtifactRecord)> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| matches!(k, ArtifactKey::Dump { version: v, .. } if v == version))
    }

    /// Iterates over the comparison entries of the pair `old`..`new`.
    pub fn compares<'a>(
        &'a self,
        old: &'a VersionId,
        new: &'a VersionId,
    ) -> impl Iterator<Item = (&'a ArtifactKey, &'a ArtifactRecord)> + 'a {
        self.entries.iter().filter(move |(k, _)| {
            matches!(k, ArtifactKey::Compare { old: o, new: n, .. } if o == old && n == new)
        })
    }

    /// Writes the store to disk if it has unpersisted changes.
    pub fn persist(&mut self) -> Result<(), CacheError> {
        if !self.dirty {
            return Ok(());
        }
        std::fs::create_dir_all(&self.root).map_err(|e| CacheError::io(&self.root, e))?;

        let file = StoreFile {
            schema: STORE_SCHEMA,
            library: self.library.clone(),
            entries: self
                .entries
                .iter()
                .map(|(key, record)| StoredEntry {
                    key: key.clone(),
                    record: record.clone(),
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;

        let path = self.store_path();
        let mut tmp =
            tempfile::NamedTempFile::new_in(&self.root).map_err(|e| CacheError::io(&self.root, e))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| CacheError::io(tmp.path(), e))?;
        tmp.persist(&path).map_err(|e| CacheError::io(&path, e.error))?;

        self.dirty = false;
        tracing::debug!(entries = self.entries.len(), path = %path.display(), "store persisted");
        Ok(())
    }

    /// Brings the store and the artifact directories back in agreement.
    ///
    /// Drops entries whose artifact file is missing (and summaries whose
    /// comparisons were dropped), then removes artifact files that no
    /// remaining entry references.
    pub fn repair(&mut self) -> Result<RepairReport, CacheError> {
        let mut report = RepairReport::default();

        let missing: Vec<ArtifactKey> = self
            .entries
            .iter()
            .filter(|(_, record)| {
                record
                    .path()
                    .is_some_and(|rel| !self.root.join(rel).is_file())
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in missing {
            if let ArtifactKey::Compare { old, new, .. } = &key {
                let summary = ArtifactKey::Summary {
                    old: old.clone(),
                    new: new.clone(),
                };
                if self.entries.contains_key(&summary) && !report.dropped_summaries.contains(&summary) {
                    report.dropped_summaries.push(summary);
                }
            }
            self.invalidate(&key);
            tracing::debug!(key = %key, "dropped entry with missing artifact");
            report.dropped.push(key);
        }

        report.removed_files = self.gc()?;
        Ok(report)
    }

    /// Removes artifact files that no entry references.
    ///
    /// A file is live when it shares a directory with a recorded artifact
    /// file, so companion outputs of a tool survive. Returns the number of
    /// files removed.
    pub fn gc(&self) -> Result<usize, CacheError> {
        let live: BTreeSet<PathBuf> = self
            .entries
            .values()
            .filter_map(|record| record.path())
            .filter_map(|rel| self.root.join(rel).parent().map(Path::to_path_buf))
            .collect();

        let mut removed = 0;
        for sub in ARTIFACT_DIRS {
            let dir = self.root.join(sub);
            if dir.is_dir() {
                sweep(&dir, &live, &mut removed)?;
            }
        }
        if removed > 0 {
            tracing::debug!(removed, "removed orphan artifact files");
        }
        Ok(removed)
    }

    /// Deletes a library cache root and everything under it.
    pub fn clear(root: &Path) -> Result<bool, CacheError> {
        if !root.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(root).map_err(|e| CacheError::io(root, e))?;
        Ok(true)
    }
}

/// Removes unreferenced files under `dir`. Returns `true` if `dir` ended up
/// empty and was removed.
fn sweep(dir: &Path, live: &BTreeSet<PathBuf>, removed: &mut usize) -> Result<bool, CacheError> {
    let entries = std::fs::read_dir(dir).map_err(|e| CacheError::io(dir, e))?;
    let mut remaining = 0usize;
    for entry in entries {
        let entry = entry.map_err(|e| CacheError::io(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| CacheError::io(&path, e))?;
        if file_type.is_dir() {
            if !sweep(&path, live, removed)? {
                remaining += 1;
            }
        } else if live.contains(dir) {
            remaining += 1;
        } else {
            std::fs::remove_file(&path).map_err(|e| CacheError::io(&path, e))?;
            *removed += 1;
        }
    }
    if remaining == 0 {
        std::fs::remove_dir(dir).map_err(|e| CacheError::io(dir, e))?;
        return Ok(true);
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout;
    use crate::record::{CompareRecord, DateRecord, DumpRecord, SummaryRecord};
    use abtrack_common::ObjectKey;

    fn v(id: &str) -> VersionId {
        VersionId::new(id)
    }

    fn write_artifact(root: &Path, rel: &Path, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn dump_entry(root: &Path, version: &str, obj: &str) -> (ArtifactKey, ArtifactRecord) {
        let object = ObjectKey::from_rel_path(Path::new(obj));
        let rel = layout::dump_dir(&v(version), &object).join("ABI.dump");
        write_artifact(root, &rel, obj);
        (
            ArtifactKey::Dump {
                version: v(version),
                object,
            },
            ArtifactRecord::new(DumpRecord {
                object: PathBuf::from(obj),
                ..Default::default()
            })
            .with_path(rel),
        )
    }

    fn compare_entry(root: &Path, old: &str, new: &str, obj: &str) -> (ArtifactKey, ArtifactRecord) {
        let pair = ObjectKey::for_pair(Path::new(obj), Path::new(obj));
        let rel = layout::report_dir(&v(old), &v(new), &pair).join("compat_report.txt");
        write_artifact(root, &rel, "affected:0;");
        (
            ArtifactKey::Compare {
                old: v(old),
                new: v(new),
                pair,
            },
            ArtifactRecord::new(CompareRecord::default()).with_path(rel),
        )
    }

    #[test]
    fn missing_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::load_or_create(dir.path(), "libfoo");
        assert!(store.is_empty());
        assert!(!store.is_dirty());
    }

    #[test]
    fn persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArtifactStore::new(dir.path(), "libfoo");
        let key = ArtifactKey::Date { version: v("1.0") };
        store.put(key.clone(), ArtifactRecord::new(DateRecord { timestamp: 42 }));
        store.persist().unwrap();
        assert!(!store.is_dirty());

        let loaded = ArtifactStore::load_or_create(dir.path(), "libfoo");
        assert_eq!(loaded.len(), 1);
        assert_eq!(
            loaded.get(&key).and_then(|r| r.data.as_date()).map(|d| d.timestamp),
            Some(42)
        );
    }

    #[test]
    fn persist_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArtifactStore::new(dir.path(), "libfoo");
        store.put(
            ArtifactKey::Date { version: v("1.0") },
            ArtifactRecord::new(DateRecord { timestamp: 1 }),
        );
        store.persist().unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from(STORE_FILE)]);
    }

    #[test]
    fn corrupt_store_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(STORE_FILE), "not json {{{").unwrap();
        let store = ArtifactStore::load_or_create(dir.path(), "libfoo");
        assert!(store.is_empty());
    }

    #[test]
    fn newer_schema_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(STORE_FILE),
            r#"{"schema":99,"library":"libfoo","entries":[]}"#,
        )
        .unwrap();
        let store = ArtifactStore::load_or_create(dir.path(), "libfoo");
        assert!(store.is_empty());
    }

    #[test]
    fn other_library_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArtifactStore::new(dir.path(), "libfoo");
        store.put(
            ArtifactKey::Date { version: v("1.0") },
            ArtifactRecord::new(DateRecord { timestamp: 1 }),
        );
        store.persist().unwrap();
        let other = ArtifactStore::load_or_create(dir.path(), "libbar");
        assert!(other.is_empty());
    }

    #[test]
    fn invalidating_compare_drops_summary() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArtifactStore::new(dir.path(), "libfoo");
        let (ckey, crec) = compare_entry(dir.path(), "1.0", "2.0", "libfoo.so.1");
        let skey = ArtifactKey::Summary {
            old: v("1.0"),
            new: v("2.0"),
        };
        store.put(ckey.clone(), crec);
        store.put(skey.clone(), ArtifactRecord::new(SummaryRecord::default()));

        assert!(store.invalidate(&ckey).is_some());
        assert!(store.get(&skey).is_none());
    }

    #[test]
    fn repair_drops_entries_with_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArtifactStore::new(dir.path(), "libfoo");
        let (kept_key, kept) = dump_entry(dir.path(), "1.0", "libfoo.so.1");
        let (lost_key, lost) = dump_entry(dir.path(), "1.0", "libbar.so.1");
        std::fs::remove_file(dir.path().join(lost.path().unwrap())).unwrap();
        store.put(kept_key.clone(), kept);
        store.put(lost_key.clone(), lost);
        store.persist().unwrap();

        let (reloaded, report) = ArtifactStore::open(dir.path(), "libfoo").unwrap();
        assert_eq!(report.dropped, vec![lost_key.clone()]);
        assert!(reloaded.get(&lost_key).is_none());
        assert!(reloaded.get(&kept_key).is_some());
    }

    #[test]
    fn repair_drops_summary_of_lost_compare() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArtifactStore::new(dir.path(), "libfoo");
        let (ckey, crec) = compare_entry(dir.path(), "1.0", "2.0", "libfoo.so.1");
        std::fs::remove_file(dir.path().join(crec.path().unwrap())).unwrap();
        let skey = ArtifactKey::Summary {
            old: v("1.0"),
            new: v("2.0"),
        };
        store.put(ckey, crec);
        store.put(skey.clone(), ArtifactRecord::new(SummaryRecord::default()));

        let report = store.repair().unwrap();
        assert_eq!(report.dropped_summaries, vec![skey.clone()]);
        assert!(store.get(&skey).is_none());
    }

    #[test]
    fn gc_removes_orphans_and_keeps_companions() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArtifactStore::new(dir.path(), "libfoo");
        let (key, rec) = dump_entry(dir.path(), "1.0", "libfoo.so.1");
        let rel = rec.path().unwrap().to_path_buf();
        write_artifact(dir.path(), &rel.with_file_name("dump.log"), "log");
        store.put(key, rec);

        let orphan = layout::dump_dir(&v("0.9"), &ObjectKey::from_rel_path(Path::new("old.so")))
            .join("ABI.dump");
        write_artifact(dir.path(), &orphan, "stale");

        let removed = store.gc().unwrap();
        assert_eq!(removed, 1);
        assert!(!dir.path().join(&orphan).exists());
        assert!(!dir.path().join("abi_dump/0.9").exists());
        assert!(dir.path().join(&rel).exists());
        assert!(dir.path().join(rel.with_file_name("dump.log")).exists());
    }

    #[test]
    fn clean_repair_reports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArtifactStore::new(dir.path(), "libfoo");
        let (key, rec) = dump_entry(dir.path(), "1.0", "libfoo.so.1");
        store.put(key, rec);
        assert!(store.repair().unwrap().is_clean());
    }

    #[test]
    fn scoped_iterators() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArtifactStore::new(dir.path(), "libfoo");
        let (k1, r1) = dump_entry(dir.path(), "1.0", "libfoo.so.1");
        let (k2, r2) = dump_entry(dir.path(), "2.0", "libfoo.so.2");
        let (k3, r3) = compare_entry(dir.path(), "1.0", "2.0", "libfoo.so");
        store.put(k1, r1);
        store.put(k2, r2);
        store.put(k3, r3);

        let one = v("1.0");
        let two = v("2.0");
        assert_eq!(store.dumps(&one).count(), 1);
        assert_eq!(store.compares(&one, &two).count(), 1);
        assert_eq!(store.compares(&two, &one).count(), 0);
    }

    #[test]
    fn clear_removes_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("libfoo");
        std::fs::create_dir_all(root.join("abi_dump")).unwrap();
        assert!(ArtifactStore::clear(&root).unwrap());
        assert!(!root.exists());
        assert!(!ArtifactStore::clear(&root).unwrap());
    }
}
