//! Pairwise stages: abireport (with the pair summary), headersdiff, pkgdiff.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use abtrack_cache::layout;
use abtrack_cache::{ArtifactKey, ArtifactRecord, CompareRecord, DiffRecord, FileHasher};
use abtrack_common::{ContentHash, ObjectArtifact, ObjectKey, Version};
use abtrack_diagnostics::{Diagnostic, DiagnosticCode};
use abtrack_match::{CompatibilityAggregator, MappedPair, ObjectMapping, ObjectWeights};
use abtrack_tools::{CompareRequest, DiffRequest};
use rayon::prelude::*;

use super::version::Sonames;
use crate::codes::{
    COMPARE_FAILED, HEADERS_DIFF_FAILED, HEADERS_MISSING, PKG_DIFF_FAILED, SONAME_AMBIGUOUS,
    SOURCE_MISSING,
};
use crate::error::PipelineError;
use crate::orchestrator::{ensure_dir, PipelineOrchestrator, Plan};
use crate::report::PairSummary;

/// One half of a version pair with its sonames.
struct Side<'v> {
    version: &'v Version,
    sonames: Sonames,
}

impl PipelineOrchestrator<'_> {
    pub(crate) fn compare_stage(&self) -> Result<(), PipelineError> {
        for pair in self.targeted_pairs() {
            self.ensure_running()?;
            self.compare_versions(pair.older, pair.newer)?;
            self.checkpoint()?;
        }
        Ok(())
    }

    fn compare_versions(&self, old: &Version, new: &Version) -> Result<(), PipelineError> {
        let (Some(old_objects), Some(new_objects)) = (self.objects(old)?, self.objects(new)?) else {
            return Ok(());
        };
        let (Some(old_sonames), Some(new_sonames)) = (self.sonames(old)?, self.sonames(new)?) else {
            tracing::debug!(old = %old.id, new = %new.id, "sonames unavailable; pair not compared");
            return Ok(());
        };
        let old_side = Side {
            version: old,
            sonames: old_sonames,
        };
        let new_side = Side {
            version: new,
            sonames: new_sonames,
        };

        let mapping = self.resolver.resolve(
            &with_sonames(&old_objects, &old_side.sonames),
            &with_sonames(&new_objects, &new_side.sonames),
        );
        for ambiguity in &mapping.ambiguities {
            self.sink.emit(Diagnostic::error(
                SONAME_AMBIGUOUS,
                format!("{}..{}: {ambiguity}", old.id, new.id),
            ));
        }
        tracing::debug!(
            old = %old.id,
            new = %new.id,
            mapped = mapping.pairs.len(),
            added = mapping.added.len(),
            removed = mapping.removed.len(),
            "objects matched"
        );

        let results: Vec<Option<CompareRecord>> = self.pool.install(|| {
            mapping
                .pairs
                .par_iter()
                .map(|pair| {
                    self.ensure_running()?;
                    self.compare_pair(&old_side, &new_side, pair)
                })
                .collect::<Result<Vec<_>, PipelineError>>()
        })?;

        // Unmatched objects still need dumps for their weights.
        let unmatched: Vec<Option<ArtifactRecord>> = self.pool.install(|| {
            mapping
                .removed
                .par_iter()
                .map(|object| (&old_side, object))
                .chain(mapping.added.par_iter().map(|object| (&new_side, object)))
                .map(|(side, object)| {
                    self.ensure_running()?;
                    self.dump(side.version, object, &side.sonames)
                })
                .collect::<Result<Vec<_>, PipelineError>>()
        })?;

        let Some(results) = results.into_iter().collect::<Option<Vec<_>>>() else {
            tracing::debug!(old = %old.id, new = %new.id, "comparisons incomplete; summary deferred");
            return Ok(());
        };
        if unmatched.iter().any(Option::is_none) {
            tracing::debug!(old = %old.id, new = %new.id, "dumps of unmatched objects missing; summary deferred");
            return Ok(());
        }
        self.summarize(old, new, &mapping, &results)
    }

    fn compare_pair(&self, old: &Side<'_>, new: &Side<'_>, pair: &MappedPair) -> Result<Option<CompareRecord>, PipelineError> {
        let old_dump = self.dump(old.version, &pair.old, &old.sonames)?;
        let new_dump = self.dump(new.version, &pair.new, &new.sonames)?;
        let (Some(old_dump), Some(new_dump)) = (old_dump, new_dump) else {
            return Ok(None);
        };
        let (Some(old_path), Some(new_path)) = (old_dump.path(), new_dump.path()) else {
            return Ok(None);
        };
        let inputs = FileHasher::fingerprint([old_dump.content_hash.as_ref(), new_dump.content_hash.as_ref()]);

        let pair_key = ObjectKey::for_pair(&pair.old.rel_path, &pair.new.rel_path);
        let key = ArtifactKey::Compare {
            old: old.version.id.clone(),
            new: new.version.id.clone(),
            pair: pair_key.clone(),
        };
        match self.plan(&key, |cached| inputs_changed(cached, inputs))? {
            Plan::Skip => return Ok(None),
            Plan::Reuse => return Ok(self.record(&key)?.and_then(|r| r.data.as_compare().cloned())),
            // Drops the pair summary along with the comparison.
            Plan::Build(_) => self.invalidate(&key)?,
        }

        let report_dir = self.absolute(&layout::report_dir(&old.version.id, &new.version.id, &pair_key));
        let old_dump = self.absolute(old_path);
        let new_dump = self.absolute(new_path);
        let request = CompareRequest {
            library: &self.ctx.library,
            old_dump: &old_dump,
            new_dump: &new_dump,
            report_dir: &report_dir,
            private_symbols: self.ctx.private_symbols,
        };
        let compared = ensure_dir(&report_dir).and_then(|()| self.invoke(|| self.tools.comparator.compare(&request)));
        match compared {
            Ok((report, summary)) => {
                let record = CompareRecord {
                    old_object: pair.old.rel_path.clone(),
                    new_object: pair.new.rel_path.clone(),
                    affected: summary.affected,
                    added: summary.added,
                    removed: summary.removed,
                    problems: summary.problems,
                    inputs: Some(inputs),
                };
                self.commit(key, ArtifactRecord::new(record.clone()).with_path(self.relative(&report)))?;
                Ok(Some(record))
            }
            Err(e) => {
                let diagnostic = Diagnostic::error(
                    COMPARE_FAILED,
                    format!(
                        "cannot compare {} ({}) with {} ({})",
                        pair.old.rel_path.display(),
                        old.version.id,
                        pair.new.rel_path.display(),
                        new.version.id
                    ),
                )
                .with_note(e.to_string());
                self.fail(key, diagnostic)?;
                Ok(None)
            }
        }
    }

    /// Writes the aggregate of a fully compared pair.
    fn summarize(
        &self,
        old: &Version,
        new: &Version,
        mapping: &ObjectMapping,
        results: &[CompareRecord],
    ) -> Result<(), PipelineError> {
        let key = ArtifactKey::Summary {
            old: old.id.clone(),
            new: new.id.clone(),
        };
        let summary = match self.plan_by_marker(&key)? {
            Plan::Skip => return Ok(()),
            Plan::Reuse => self.record(&key)?.and_then(|r| r.data.as_summary().cloned()),
            Plan::Build(_) => {
                let weights = self.weights(old, new)?;
                let summary = CompatibilityAggregator::aggregate(mapping, results, &weights);
                tracing::info!(
                    old = %old.id,
                    new = %new.id,
                    backward_compat = summary.backward_compat,
                    "pair summarized"
                );
                let record = ArtifactRecord::new(summary.clone()).with_marker(self.marker(&new.id));
                self.commit(key, record)?;
                Some(summary)
            }
        };
        if let Some(summary) = summary {
            self.report_summary(PairSummary {
                old: old.id.clone(),
                new: new.id.clone(),
                summary,
            })?;
        }
        Ok(())
    }

    /// Exported-symbol counts from the dumps recorded for both versions.
    fn weights(&self, old: &Version, new: &Version) -> Result<ObjectWeights, PipelineError> {
        let store = self.lock_store()?;
        let weights = |version: &Version| -> BTreeMap<PathBuf, u64> {
            store
                .dumps(&version.id)
                .filter_map(|(_, record)| record.data.as_dump())
                .map(|dump| (dump.object.clone(), dump.symbols))
                .collect()
        };
        Ok(ObjectWeights {
            old: weights(old),
            new: weights(new),
        })
    }

    pub(crate) fn headers_diff_stage(&self) -> Result<(), PipelineError> {
        for pair in self.targeted_pairs() {
            self.ensure_running()?;
            if !pair.newer.flags.headers_diff {
                continue;
            }
            let key = ArtifactKey::HeadersDiff {
                old: pair.older.id.clone(),
                new: pair.newer.id.clone(),
            };
            if !matches!(self.plan_by_marker(&key)?, Plan::Build(_)) {
                continue;
            }
            let (old_include, new_include) = match (include_dir(pair.older), include_dir(pair.newer)) {
                (Ok(old), Ok(new)) => (old, new),
                (old, new) => {
                    let missing = [old.err(), new.err()].into_iter().flatten().collect();
                    self.fail_missing(key, missing)?;
                    continue;
                }
            };
            let rel = layout::headers_diff_dir(&pair.older.id, &pair.newer.id);
            self.diff(key, &old_include, &new_include, &rel, &self.ctx.skip_headers, HEADERS_DIFF_FAILED)?;
            self.checkpoint()?;
        }
        Ok(())
    }

    pub(crate) fn pkg_diff_stage(&self) -> Result<(), PipelineError> {
        for pair in self.targeted_pairs() {
            self.ensure_running()?;
            if !pair.newer.flags.pkg_diff {
                continue;
            }
            let key = ArtifactKey::PkgDiff {
                old: pair.older.id.clone(),
                new: pair.newer.id.clone(),
            };
            if !matches!(self.plan_by_marker(&key)?, Plan::Build(_)) {
                continue;
            }
            let missing: Vec<Diagnostic> = [pair.older, pair.newer]
                .into_iter()
                .filter(|v| !v.source.exists())
                .map(|version| {
                    Diagnostic::warning(
                        SOURCE_MISSING,
                        format!("source of {} is missing; no package diff", version.id),
                    )
                    .with_note(version.source.display().to_string())
                })
                .collect();
            if !missing.is_empty() {
                self.fail_missing(key, missing)?;
                continue;
            }
            let rel = layout::pkg_diff_dir(&pair.older.id, &pair.newer.id);
            self.diff(key, &pair.older.source, &pair.newer.source, &rel, &[], PKG_DIFF_FAILED)?;
            self.checkpoint()?;
        }
        Ok(())
    }

    fn diff(
        &self,
        key: ArtifactKey,
        old: &Path,
        new: &Path,
        rel: &Path,
        skip_patterns: &[String],
        code: DiagnosticCode,
    ) -> Result<(), PipelineError> {
        let report_dir = self.absolute(rel);
        let request = DiffRequest {
            old,
            new,
            report_dir: &report_dir,
            skip_patterns,
        };
        let marker = key.pair().and_then(|(_, newer)| self.marker(newer));
        match ensure_dir(&report_dir).and_then(|()| self.invoke(|| self.tools.differ.diff(&request))) {
            Ok((report, summary)) => {
                let record = ArtifactRecord::new(DiffRecord {
                    changed: summary.changed,
                    added: summary.added,
                    removed: summary.removed,
                })
                .with_path(self.relative(&report))
                .with_marker(marker);
                self.commit(key, record)
            }
            Err(e) => {
                let diagnostic = Diagnostic::error(
                    code,
                    format!("cannot diff {} with {}", old.display(), new.display()),
                )
                .with_note(e.to_string());
                self.fail(key, diagnostic)
            }
        }
    }
}

/// The public header directory of `version`, or the warning explaining why
/// there is none.
fn include_dir(version: &Version) -> Result<PathBuf, Diagnostic> {
    let include = version.installed.as_ref().map(|dir| dir.join("include"));
    match include {
        Some(dir) if dir.is_dir() => Ok(dir),
        other => {
            let diagnostic = Diagnostic::warning(
                HEADERS_MISSING,
                format!("version {} has no public headers; no header diff", version.id),
            );
            Err(match other {
                Some(dir) => diagnostic.with_note(format!("{} is not a directory", dir.display())),
                None => diagnostic.with_note("no installed path is configured"),
            })
        }
    }
}

/// Copies `objects` with the sonames read for them attached.
fn with_sonames(objects: &[ObjectArtifact], sonames: &Sonames) -> Vec<ObjectArtifact> {
    objects
        .iter()
        .map(|object| match sonames.get(&object.rel_path) {
            Some(soname) => object.clone().with_soname(soname.clone()),
            None => object.clone(),
        })
        .collect()
}

/// Returns `true` if a cached comparison was made from different dumps.
fn inputs_changed(cached: &ArtifactRecord, inputs: ContentHash) -> bool {
    cached
        .data
        .as_compare()
        .map_or(true, |compare| compare.inputs != Some(inputs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use abtrack_cache::SummaryRecord;

    #[test]
    fn sonames_are_attached_by_relative_path() {
        let objects = vec![
            ObjectArtifact::new("lib/libfoo.so.1"),
            ObjectArtifact::new("lib/libbar.so"),
        ];
        let mut sonames = Sonames::new();
        sonames.insert(PathBuf::from("lib/libfoo.so.1"), "libfoo.so.1".to_string());
        let attached = with_sonames(&objects, &sonames);
        assert_eq!(attached[0].soname.as_deref(), Some("libfoo.so.1"));
        assert_eq!(attached[1].soname, None);
        assert_eq!(attached[0].key, objects[0].key);
    }

    #[test]
    fn missing_include_dir_is_explained() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("include")).unwrap();
        let mut version = Version {
            id: abtrack_common::VersionId::new("1.0"),
            ordinal: 0,
            source: dir.path().join("src"),
            installed: Some(dir.path().to_path_buf()),
            flags: Default::default(),
        };
        assert_eq!(include_dir(&version).unwrap(), dir.path().join("include"));

        version.installed = None;
        let diagnostic = include_dir(&version).unwrap_err();
        assert_eq!(diagnostic.code.to_string(), "W403");
        assert_eq!(diagnostic.notes, vec!["no installed path is configured".to_string()]);
    }

    #[test]
    fn comparison_inputs_are_checked() {
        let a = ContentHash::from_bytes(b"a");
        let b = ContentHash::from_bytes(b"b");
        let record = ArtifactRecord::new(CompareRecord {
            inputs: Some(a),
            ..CompareRecord::default()
        });
        assert!(!inputs_changed(&record, a));
        assert!(inputs_changed(&record, b));

        let unrelated = ArtifactRecord::new(SummaryRecord::default());
        assert!(inputs_changed(&unrelated, a));
    }
}
