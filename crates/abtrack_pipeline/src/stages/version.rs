//! Per-version stages: date, soname, changelog, abidump.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use abtrack_cache::layout::{self, CHANGELOG_FILE, DUMP_FILE};
use abtrack_cache::{
    ArtifactData, ArtifactKey, ArtifactRecord, DateRecord, DumpRecord, Freshness, SonameRecord,
};
use abtrack_common::{ObjectArtifact, ObjectKey, Version};
use abtrack_diagnostics::Diagnostic;
use abtrack_tools::DumpRequest;
use rayon::prelude::*;

use crate::codes::{CHANGELOG_FAILED, DATE_FAILED, DUMP_FAILED, SONAME_FAILED, SOURCE_MISSING};
use crate::error::PipelineError;
use crate::orchestrator::{ensure_dir, PipelineOrchestrator, Plan};

/// Soname of every object of one version, keyed by relative path.
pub(crate) type Sonames = BTreeMap<PathBuf, String>;

impl PipelineOrchestrator<'_> {
    pub(crate) fn date_stage(&self) -> Result<(), PipelineError> {
        for version in self.targeted_versions() {
            self.ensure_running()?;
            let key = ArtifactKey::Date {
                version: version.id.clone(),
            };
            if !matches!(self.plan_by_marker(&key)?, Plan::Build(_)) {
                continue;
            }
            let found = match (version.is_current(), self.ctx.upstream_time) {
                (true, Some(time)) => Ok(time),
                _ => modified_secs(&version.source),
            };
            match found {
                Ok(timestamp) => {
                    let record = ArtifactRecord::new(DateRecord { timestamp })
                        .with_marker(self.marker(&version.id));
                    self.commit(key, record)?;
                }
                Err(e) => {
                    let diagnostic = Diagnostic::error(
                        DATE_FAILED,
                        format!("cannot determine the release date of {}", version.id),
                    )
                    .with_note(format!("{}: {e}", version.source.display()));
                    self.fail(key, diagnostic)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn soname_stage(&self) -> Result<(), PipelineError> {
        for version in self.targeted_versions() {
            self.ensure_running()?;
            self.sonames(version)?;
        }
        Ok(())
    }

    /// Returns the sonames of `version`, reading them if needed.
    ///
    /// `None` means the version has no usable objects or reading failed;
    /// either has already been reported.
    pub(crate) fn sonames(&self, version: &Version) -> Result<Option<Sonames>, PipelineError> {
        let Some(objects) = self.objects(version)? else {
            return Ok(None);
        };
        let Some(installed) = version.installed.as_deref() else {
            return Ok(None);
        };
        let key = ArtifactKey::Soname {
            version: version.id.clone(),
        };
        match self.plan_by_marker(&key)? {
            Plan::Skip => return Ok(None),
            Plan::Reuse => {
                return Ok(self
                    .record(&key)?
                    .and_then(|r| r.data.as_soname().map(|s| s.sonames.clone())))
            }
            Plan::Build(_) => {}
        }

        let mut sonames = Sonames::new();
        for object in objects.iter() {
            self.ensure_running()?;
            let path = installed.join(&object.rel_path);
            match self.invoke(|| self.tools.soname.soname(&path)) {
                Ok(Some(soname)) => {
                    sonames.insert(object.rel_path.clone(), soname);
                }
                Ok(None) => {}
                Err(e) => {
                    let diagnostic = Diagnostic::error(
                        SONAME_FAILED,
                        format!("cannot read the soname of {} ({})", object.rel_path.display(), version.id),
                    )
                    .with_note(e.to_string());
                    self.fail(key, diagnostic)?;
                    return Ok(None);
                }
            }
        }
        let record = ArtifactRecord::new(SonameRecord {
            sonames: sonames.clone(),
        })
        .with_marker(self.marker(&version.id));
        self.commit(key, record)?;
        Ok(Some(sonames))
    }

    pub(crate) fn changelog_stage(&self) -> Result<(), PipelineError> {
        for version in self.targeted_versions() {
            self.ensure_running()?;
            if !version.flags.changelog {
                continue;
            }
            let key = ArtifactKey::Changelog {
                version: version.id.clone(),
            };
            if !matches!(self.plan_by_marker(&key)?, Plan::Build(_)) {
                continue;
            }
            if !version.source.exists() {
                let diagnostic = Diagnostic::warning(
                    SOURCE_MISSING,
                    format!("source of {} is missing; no changelog", version.id),
                )
                .with_note(version.source.display().to_string());
                self.fail(key, diagnostic)?;
                continue;
            }

            let rel = layout::changelog_dir(&version.id).join(CHANGELOG_FILE);
            let output = self.absolute(&rel);
            let extracted = ensure_dir(parent(&output))
                .and_then(|()| self.invoke(|| self.tools.changelog.extract(&version.source, &output)));
            match extracted {
                Ok(()) => {
                    let record = ArtifactRecord::new(ArtifactData::Changelog)
                        .with_marker(self.marker(&version.id));
                    self.commit_file(key, rel, record)?;
                }
                Err(e) => {
                    let diagnostic = Diagnostic::error(
                        CHANGELOG_FAILED,
                        format!("cannot extract the changelog of {}", version.id),
                    )
                    .with_note(e.to_string());
                    self.fail(key, diagnostic)?;
                }
            }
            self.checkpoint()?;
        }
        Ok(())
    }

    pub(crate) fn dump_stage(&self) -> Result<(), PipelineError> {
        for version in self.targeted_versions() {
            self.ensure_running()?;
            let Some(objects) = self.objects(version)? else {
                continue;
            };
            let sonames = self.sonames(version)?.unwrap_or_default();
            self.pool.install(|| {
                objects.par_iter().try_for_each(|object| {
                    self.ensure_running()?;
                    self.dump(version, object, &sonames).map(drop)
                })
            })?;
            if version.is_current() {
                self.prune_dumps(version, &objects)?;
            }
            self.checkpoint()?;
        }
        Ok(())
    }

    /// Returns the dump record of one object, dumping it if needed.
    ///
    /// `None` means the dump is unavailable for this run (already
    /// reported).
    pub(crate) fn dump(
        &self,
        version: &Version,
        object: &ObjectArtifact,
        sonames: &Sonames,
    ) -> Result<Option<ArtifactRecord>, PipelineError> {
        let key = ArtifactKey::Dump {
            version: version.id.clone(),
            object: object.key.clone(),
        };
        match self.plan_by_marker(&key)? {
            Plan::Skip => return Ok(None),
            Plan::Reuse => return self.record(&key),
            Plan::Build(Freshness::SourceChanged) => self.invalidate(&key)?,
            Plan::Build(_) => {}
        }
        let Some(installed) = version.installed.as_deref() else {
            return Ok(None);
        };

        let rel = layout::dump_dir(&version.id, &object.key).join(DUMP_FILE);
        let output = self.absolute(&rel);
        let input = installed.join(&object.rel_path);
        let request = DumpRequest {
            object: &input,
            version_label: version.id.as_str(),
            output: &output,
            private_symbols: self.ctx.private_symbols,
        };
        let dumped = ensure_dir(parent(&output)).and_then(|()| self.invoke(|| self.tools.dumper.dump(&request)));
        match dumped {
            Ok(out) => {
                let record = ArtifactRecord::new(DumpRecord {
                    object: object.rel_path.clone(),
                    soname: sonames.get(&object.rel_path).cloned(),
                    language: out.language,
                    symbols: out.symbols,
                    tool_version: out.tool_version,
                })
                .with_marker(self.marker(&version.id));
                self.commit_file(key, rel, record)
            }
            Err(e) => {
                let diagnostic = Diagnostic::error(
                    DUMP_FAILED,
                    format!("cannot dump {} ({})", object.rel_path.display(), version.id),
                )
                .with_note(e.to_string());
                self.fail(key, diagnostic)?;
                Ok(None)
            }
        }
    }

    /// Drops dumps of objects that vanished from the live tree.
    fn prune_dumps(&self, version: &Version, objects: &[ObjectArtifact]) -> Result<(), PipelineError> {
        let live: BTreeSet<&ObjectKey> = objects.iter().map(|o| &o.key).collect();
        let mut store = self.lock_store()?;
        let vanished: Vec<ArtifactKey> = store
            .dumps(&version.id)
            .filter(|(key, _)| matches!(key, ArtifactKey::Dump { object, .. } if !live.contains(object)))
            .map(|(key, _)| key.clone())
            .collect();
        for key in vanished {
            tracing::debug!(key = %key, "dropping dump of vanished object");
            store.invalidate(&key);
        }
        Ok(())
    }
}

fn parent(path: &Path) -> &Path {
    path.parent().unwrap_or(path)
}

fn modified_secs(path: &Path) -> std::io::Result<u64> {
    let modified = std::fs::metadata(path)?.modified()?;
    modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(std::io::Error::other)
}
