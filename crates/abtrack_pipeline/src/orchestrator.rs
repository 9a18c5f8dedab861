//! Stage scheduling and the per-item build protocol.
//!
//! Every artifact goes through the same steps: plan (reuse, rebuild, or skip
//! because it already failed this run), invoke the adapter, then commit the
//! record or report the failure. Each key settles at most once per run, so a
//! prerequisite pulled by several pairs is built once and counted once.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use abtrack_cache::{ArtifactKey, ArtifactRecord, ArtifactStore, FileHasher, Freshness, StalenessOracle};
use abtrack_common::{InternalError, ObjectArtifact, Stage, Version, VersionId, VersionPair};
use abtrack_config::RunContext;
use abtrack_diagnostics::{Diagnostic, DiagnosticSink};
use abtrack_match::ObjectIdentityResolver;
use abtrack_tools::{ToolError, Toolset};

use crate::codes::{ARTIFACT_UNREADABLE, INSTALLED_MISSING, SCAN_FAILED};
use crate::error::PipelineError;
use crate::report::{Outcome, RunReport};
use crate::scan::scan_objects;

/// How a key ended up in this run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Settled {
    Reused,
    Built,
    Failed,
}

/// What to do with one key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Plan {
    /// Use the cached record.
    Reuse,
    /// Produce the artifact.
    Build(Freshness),
    /// The key already failed this run.
    Skip,
}

/// Runs the selected stages of one library.
///
/// The orchestrator owns the artifact store for the duration of the run and
/// persists it after every stage, version, and pair, and once more on the way
/// out (also when interrupted). Fan-out stages run on a dedicated worker pool
/// sized by `RunContext::jobs`.
pub struct PipelineOrchestrator<'a> {
    pub(crate) ctx: &'a RunContext,
    pub(crate) tools: &'a Toolset,
    pub(crate) sink: &'a DiagnosticSink,
    pub(crate) resolver: ObjectIdentityResolver,
    pub(crate) pool: rayon::ThreadPool,
    store: Mutex<ArtifactStore>,
    oracle: StalenessOracle,
    report: Mutex<RunReport>,
    invocations: AtomicUsize,
    settled: Mutex<BTreeMap<ArtifactKey, Settled>>,
    objects: Mutex<BTreeMap<VersionId, Arc<Vec<ObjectArtifact>>>>,
    blocked: Mutex<BTreeSet<VersionId>>,
}

impl<'a> PipelineOrchestrator<'a> {
    /// Creates an orchestrator over an opened store.
    pub fn new(
        ctx: &'a RunContext,
        tools: &'a Toolset,
        sink: &'a DiagnosticSink,
        store: ArtifactStore,
    ) -> Result<Self, PipelineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(ctx.jobs)
            .thread_name(|i| format!("abtrack-worker-{i}"))
            .build()
            .map_err(|e| InternalError::new(format!("cannot start worker pool: {e}")))?;
        Ok(Self {
            ctx,
            tools,
            sink,
            resolver: ObjectIdentityResolver::new(ctx.kernel),
            pool,
            store: Mutex::new(store),
            oracle: StalenessOracle::new(ctx.rebuild),
            report: Mutex::new(RunReport::default()),
            invocations: AtomicUsize::new(0),
            settled: Mutex::new(BTreeMap::new()),
            objects: Mutex::new(BTreeMap::new()),
            blocked: Mutex::new(BTreeSet::new()),
        })
    }

    /// Runs every selected stage in order.
    ///
    /// Per-item failures are emitted to the sink and counted in the report.
    /// An interrupt ends the run early with `interrupted` set; completed
    /// artifacts are persisted either way.
    pub fn run(self) -> Result<RunReport, PipelineError> {
        let outcome = self.run_stages();
        let flushed = self.checkpoint();

        let mut report = self
            .report
            .into_inner()
            .map_err(|_| InternalError::new("run report lock poisoned"))?;
        report.tool_invocations = self.invocations.into_inner();

        match outcome {
            Ok(()) => {}
            Err(PipelineError::Interrupted) => {
                tracing::warn!("run interrupted; completed artifacts were saved");
                report.interrupted = true;
            }
            Err(err) => return Err(err),
        }
        flushed?;
        Ok(report)
    }

    fn run_stages(&self) -> Result<(), PipelineError> {
        for &stage in &self.ctx.stages {
            self.ensure_running()?;
            tracing::info!(stage = %stage, library = %self.ctx.library, "running stage");
            match stage {
                Stage::Date => self.date_stage()?,
                Stage::Soname => self.soname_stage()?,
                Stage::Changelog => self.changelog_stage()?,
                Stage::AbiDump => self.dump_stage()?,
                Stage::AbiReport => self.compare_stage()?,
                Stage::HeadersDiff => self.headers_diff_stage()?,
                Stage::PkgDiff => self.pkg_diff_stage()?,
                Stage::Graph => self.graph_stage()?,
            }
            self.checkpoint()?;
        }
        Ok(())
    }

    /// Fails with [`PipelineError::Interrupted`] once cancellation was
    /// requested.
    pub(crate) fn ensure_running(&self) -> Result<(), PipelineError> {
        if self.ctx.is_cancelled() {
            Err(PipelineError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Persists the store if anything changed.
    pub(crate) fn checkpoint(&self) -> Result<(), PipelineError> {
        self.lock_store()?.persist()?;
        Ok(())
    }

    /// Versions passing the version filter, newest first.
    pub(crate) fn targeted_versions(&self) -> impl Iterator<Item = &'a Version> + '_ {
        self.ctx
            .versions
            .iter()
            .filter(|v| self.ctx.targets(&v.id))
    }

    /// Adjacent pairs whose newer half passes the version filter, newest
    /// pair first.
    pub(crate) fn targeted_pairs(&self) -> Vec<VersionPair<'a>> {
        self.ctx
            .versions
            .pairs()
            .into_iter()
            .filter(|p| self.ctx.targets(&p.newer.id))
            .collect()
    }

    /// The upstream marker to record on artifacts of `version`.
    pub(crate) fn marker(&self, version: &VersionId) -> Option<String> {
        if version.is_current() {
            self.ctx.upstream_marker.clone()
        } else {
            None
        }
    }

    pub(crate) fn lock_store(&self) -> Result<MutexGuard<'_, ArtifactStore>, PipelineError> {
        lock(&self.store, "artifact store")
    }

    /// Decides what to do with `key`.
    ///
    /// `live_changed` is asked only for keys involving the live version
    /// that have a cached record.
    pub(crate) fn plan(
        &self,
        key: &ArtifactKey,
        live_changed: impl FnOnce(&ArtifactRecord) -> bool,
    ) -> Result<Plan, PipelineError> {
        match lock(&self.settled, "settled keys")?.get(key) {
            Some(Settled::Reused | Settled::Built) => return Ok(Plan::Reuse),
            Some(Settled::Failed) => return Ok(Plan::Skip),
            None => {}
        }

        let freshness = {
            let store = self.lock_store()?;
            let cached = store.get(key);
            let changed = key.is_live() && cached.is_some_and(live_changed);
            self.oracle.check(key, cached, changed)
        };

        if freshness.needs_rebuild() {
            tracing::debug!(key = %key, reason = %freshness, "rebuilding");
            return Ok(Plan::Build(freshness));
        }
        tracing::debug!(key = %key, "cached");
        self.settle(key.clone(), Settled::Reused)?;
        self.count(key.stage(), Outcome::Skipped)?;
        Ok(Plan::Reuse)
    }

    /// [`plan`](Self::plan) with the upstream marker as the change signal.
    pub(crate) fn plan_by_marker(&self, key: &ArtifactKey) -> Result<Plan, PipelineError> {
        let marker = self.ctx.upstream_marker.as_deref();
        self.plan(key, |cached| StalenessOracle::marker_changed(cached, marker))
    }

    /// Returns a copy of the cached record of `key`.
    pub(crate) fn record(&self, key: &ArtifactKey) -> Result<Option<ArtifactRecord>, PipelineError> {
        Ok(self.lock_store()?.get(key).cloned())
    }

    /// Drops the record of `key` (and anything derived from it).
    pub(crate) fn invalidate(&self, key: &ArtifactKey) -> Result<(), PipelineError> {
        self.lock_store()?.invalidate(key);
        Ok(())
    }

    /// Records a produced artifact.
    pub(crate) fn commit(&self, key: ArtifactKey, record: ArtifactRecord) -> Result<(), PipelineError> {
        let stage = key.stage();
        tracing::info!(key = %key, "built");
        self.lock_store()?.put(key.clone(), record);
        self.settle(key, Settled::Built)?;
        self.count(stage, Outcome::Built)
    }

    /// Hashes the artifact file at `rel` and records it.
    ///
    /// Returns the committed record, or `None` if the file could not be
    /// read (which is reported as a failure of `key`).
    pub(crate) fn commit_file(
        &self,
        key: ArtifactKey,
        rel: PathBuf,
        record: ArtifactRecord,
    ) -> Result<Option<ArtifactRecord>, PipelineError> {
        match FileHasher::hash_file(&self.absolute(&rel)) {
            Ok(hash) => {
                let record = record.with_path(rel).with_hash(hash);
                self.commit(key, record.clone())?;
                Ok(Some(record))
            }
            Err(e) => {
                let message = format!("cannot record {key}");
                self.fail(key, Diagnostic::error(ARTIFACT_UNREADABLE, message).with_note(e.to_string()))?;
                Ok(None)
            }
        }
    }

    /// Reports a failed item. The key is not retried for the rest of the run.
    pub(crate) fn fail(&self, key: ArtifactKey, diagnostic: Diagnostic) -> Result<(), PipelineError> {
        let stage = key.stage();
        tracing::warn!(key = %key, "{}", diagnostic.message);
        self.sink.emit(diagnostic);
        self.settle(key, Settled::Failed)?;
        self.count(stage, Outcome::Failed)
    }

    /// Reports the missing prerequisites of `key` and fails it once.
    pub(crate) fn fail_missing(&self, key: ArtifactKey, mut diagnostics: Vec<Diagnostic>) -> Result<(), PipelineError> {
        let Some(last) = diagnostics.pop() else {
            return Ok(());
        };
        for diagnostic in diagnostics {
            self.sink.emit(diagnostic);
        }
        self.fail(key, last)
    }

    fn settle(&self, key: ArtifactKey, how: Settled) -> Result<(), PipelineError> {
        lock(&self.settled, "settled keys")?.insert(key, how);
        Ok(())
    }

    fn count(&self, stage: Stage, outcome: Outcome) -> Result<(), PipelineError> {
        lock(&self.report, "run report")?.record(stage, outcome);
        Ok(())
    }

    /// Runs one adapter call, counting it as a tool invocation.
    pub(crate) fn invoke<T>(&self, call: impl FnOnce() -> Result<T, ToolError>) -> Result<T, ToolError> {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        call()
    }

    /// Adds a pair aggregate to the run report.
    pub(crate) fn report_summary(&self, summary: crate::report::PairSummary) -> Result<(), PipelineError> {
        lock(&self.report, "run report")?.summaries.push(summary);
        Ok(())
    }

    /// Resolves a cache-relative path.
    pub(crate) fn absolute(&self, rel: &Path) -> PathBuf {
        self.ctx.cache_root.join(rel)
    }

    /// Makes a tool output path cache-relative where possible.
    pub(crate) fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.ctx.cache_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    /// Returns the shared objects of `version`, scanning its installed tree
    /// on first use.
    ///
    /// A version without a usable installed tree is reported once and
    /// yields `None` for the rest of the run, which skips all of its object
    /// work.
    pub(crate) fn objects(&self, version: &Version) -> Result<Option<Arc<Vec<ObjectArtifact>>>, PipelineError> {
        if lock(&self.blocked, "blocked versions")?.contains(&version.id) {
            return Ok(None);
        }
        if let Some(found) = lock(&self.objects, "object scan")?.get(&version.id) {
            return Ok(Some(Arc::clone(found)));
        }

        let installed = match version.installed.as_deref() {
            Some(dir) if dir.is_dir() => dir,
            other => {
                let diagnostic = Diagnostic::warning(
                    INSTALLED_MISSING,
                    format!("version {} has no installed tree; its objects are skipped", version.id),
                );
                let diagnostic = match other {
                    Some(dir) => diagnostic.with_note(format!("{} is not a directory", dir.display())),
                    None => diagnostic.with_note("no installed path is configured"),
                };
                self.block(&version.id, diagnostic)?;
                return Ok(None);
            }
        };

        match scan_objects(installed, self.ctx.kernel, &self.ctx.skip_objects) {
            Ok(found) => {
                tracing::debug!(version = %version.id, objects = found.len(), "scanned installed tree");
                let found = Arc::new(found);
                lock(&self.objects, "object scan")?.insert(version.id.clone(), Arc::clone(&found));
                Ok(Some(found))
            }
            Err(e) => {
                let diagnostic = Diagnostic::warning(
                    SCAN_FAILED,
                    format!("cannot scan the installed tree of {}", version.id),
                )
                .with_note(format!("{}: {e}", installed.display()));
                self.block(&version.id, diagnostic)?;
                Ok(None)
            }
        }
    }

    fn block(&self, version: &VersionId, diagnostic: Diagnostic) -> Result<(), PipelineError> {
        if lock(&self.blocked, "blocked versions")?.insert(version.clone()) {
            self.sink.emit(diagnostic);
        }
        Ok(())
    }
}

fn lock<'m, T>(mutex: &'m Mutex<T>, what: &str) -> Result<MutexGuard<'m, T>, PipelineError> {
    mutex
        .lock()
        .map_err(|_| InternalError::new(format!("{what} lock poisoned")).into())
}

/// Creates `dir` (and its parents) for a tool to write into.
pub(crate) fn ensure_dir(dir: &Path) -> Result<(), ToolError> {
    std::fs::create_dir_all(dir).map_err(|source| ToolError::Io {
        path: dir.to_path_buf(),
        source,
    })
}
