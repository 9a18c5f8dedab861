//! Run-context resolution: merging the profile with command-line options.

use crate::error::ConfigError;
use crate::types::{Profile, ScmKind};
use abtrack_common::{Stage, Version, VersionFlags, VersionId, VersionList, CURRENT};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Command-line options that shape a run.
#[derive(Debug, Default)]
pub struct RunOptions {
    /// Force regeneration of every selected artifact.
    pub rebuild: bool,
    /// Restrict work to one version (and the pairs it is the newer half of).
    pub target_version: Option<String>,
    /// Stages to run; empty selects all.
    pub stages: Vec<Stage>,
    /// Upstream marker of the live checkout, probed before the run.
    pub upstream_marker: Option<String>,
    /// Commit time of the live checkout in Unix seconds, when the source
    /// control system reports one.
    pub upstream_time: Option<u64>,
    /// Cancellation flag shared with the interrupt handler.
    pub cancel: Arc<AtomicBool>,
}

/// Everything a run needs, resolved once and passed by reference.
///
/// Apart from the shared cancellation flag the context is immutable for the
/// lifetime of a run.
#[derive(Debug)]
pub struct RunContext {
    /// Library name.
    pub library: String,
    /// Versions, newest first.
    pub versions: VersionList,
    /// Cache namespace of this library: `<cache_dir>/<library>`.
    pub cache_root: PathBuf,
    /// Source control kind of the live checkout.
    pub scm: ScmKind,
    /// Include private symbols in dumps.
    pub private_symbols: bool,
    /// Kernel-module mode.
    pub kernel: bool,
    /// Compiled object skip patterns.
    pub skip_objects: Vec<Regex>,
    /// Header skip patterns, passed through to the header diff tool.
    pub skip_headers: Vec<String>,
    /// Force regeneration of every selected artifact.
    pub rebuild: bool,
    /// Version filter.
    pub target_version: Option<VersionId>,
    /// Selected stages in execution order.
    pub stages: Vec<Stage>,
    /// Per-invocation tool timeout.
    pub tool_timeout: Option<Duration>,
    /// Worker threads for fan-out stages (`0` = all cores).
    pub jobs: usize,
    /// Upstream marker of the live checkout at the start of the run.
    pub upstream_marker: Option<String>,
    /// Commit time of the live checkout, in Unix seconds.
    pub upstream_time: Option<u64>,
    cancel: Arc<AtomicBool>,
}

impl RunContext {
    /// Returns `true` if the stage was selected for this run.
    pub fn runs(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    /// Returns `true` if the version passes the version filter.
    pub fn targets(&self, id: &VersionId) -> bool {
        self.target_version.as_ref().map_or(true, |t| t == id)
    }

    /// Returns `true` once an interrupt has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Returns the shared cancellation flag.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }
}

/// Resolves the cache namespace directory of the profile's library.
///
/// Relative `cache_dir` settings are taken relative to `base_dir` (the
/// directory holding the profile).
pub fn library_cache_root(profile: &Profile, base_dir: &Path) -> PathBuf {
    resolve_path(base_dir, &profile.settings.cache_dir).join(&profile.library.name)
}

/// Resolves the source path of the live checkout, if the newest version is
/// `current`.
pub fn live_source(profile: &Profile, base_dir: &Path) -> Option<PathBuf> {
    profile
        .versions
        .first()
        .filter(|entry| entry.number == CURRENT)
        .map(|entry| resolve_path(base_dir, &entry.source))
}

/// Builds the run context from a validated profile and command-line options.
///
/// Fails if the target version is not in the profile.
pub fn resolve_run_context(
    profile: &Profile,
    base_dir: &Path,
    options: RunOptions,
) -> Result<RunContext, ConfigError> {
    let versions = VersionList::from_newest_first(profile.versions.iter().map(|entry| Version {
        id: VersionId::new(entry.number.clone()),
        ordinal: 0,
        source: resolve_path(base_dir, &entry.source),
        installed: entry
            .installed
            .as_deref()
            .map(|installed| resolve_path(base_dir, installed)),
        flags: VersionFlags {
            changelog: entry.changelog,
            headers_diff: entry.headers_diff,
            pkg_diff: entry.pkg_diff,
        },
    }));

    let target_version = match options.target_version {
        Some(target) => {
            let id = VersionId::new(target);
            if versions.get(&id).is_none() {
                return Err(ConfigError::UnknownVersion(id.to_string()));
            }
            Some(id)
        }
        None => None,
    };

    let skip_objects = profile
        .library
        .skip_objects
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|e| {
                ConfigError::ValidationError(format!("invalid skip pattern '{pattern}': {e}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut stages = if options.stages.is_empty() {
        Stage::ALL.to_vec()
    } else {
        options.stages
    };
    stages.sort();
    stages.dedup();

    Ok(RunContext {
        library: profile.library.name.clone(),
        versions,
        cache_root: library_cache_root(profile, base_dir),
        scm: profile.library.scm,
        private_symbols: profile.library.private_symbols,
        kernel: profile.library.kernel,
        skip_objects,
        skip_headers: profile.library.skip_headers.clone(),
        rebuild: options.rebuild,
        target_version,
        stages,
        tool_timeout: profile.settings.tool_timeout(),
        jobs: profile.settings.jobs,
        upstream_marker: options.upstream_marker,
        upstream_time: options.upstream_time,
        cancel: options.cancel,
    })
}

fn resolve_path(base_dir: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{load_profile_from_str, ProfileFormat};

    fn profile() -> Profile {
        load_profile_from_str(
            r#"
[library]
name = "libfoo"
skip_objects = ["debug"]

[settings]
tool_timeout_secs = 0

[[versions]]
number = "current"
source = "src/libfoo"
installed = "/opt/libfoo/current"

[[versions]]
number = "2.0"
source = "libfoo-2.0.tar.gz"
installed = "inst/2.0"
headers_diff = true

[[versions]]
number = "1.0"
source = "libfoo-1.0.tar.gz"
"#,
            ProfileFormat::Toml,
        )
        .unwrap()
    }

    #[test]
    fn resolves_versions_and_paths() {
        let ctx = resolve_run_context(&profile(), Path::new("/work"), RunOptions::default()).unwrap();
        assert_eq!(ctx.library, "libfoo");
        assert_eq!(ctx.versions.len(), 3);
        let v2 = ctx.versions.get(&VersionId::new("2.0")).unwrap();
        assert_eq!(v2.ordinal, 1);
        assert_eq!(v2.source, PathBuf::from("/work/libfoo-2.0.tar.gz"));
        assert_eq!(v2.installed, Some(PathBuf::from("/work/inst/2.0")));
        assert!(v2.flags.headers_diff);
        let current = ctx.versions.at(0).unwrap();
        assert_eq!(current.installed, Some(PathBuf::from("/opt/libfoo/current")));
        assert!(ctx.versions.at(2).unwrap().installed.is_none());
        assert_eq!(ctx.cache_root, PathBuf::from("/work/abtrack-cache/libfoo"));
    }

    #[test]
    fn empty_stage_filter_selects_all() {
        let ctx = resolve_run_context(&profile(), Path::new("/w"), RunOptions::default()).unwrap();
        assert_eq!(ctx.stages, Stage::ALL.to_vec());
        assert!(ctx.runs(Stage::Graph));
    }

    #[test]
    fn stage_filter_is_sorted_and_deduplicated() {
        let options = RunOptions {
            stages: vec![Stage::AbiReport, Stage::AbiDump, Stage::AbiReport],
            ..RunOptions::default()
        };
        let ctx = resolve_run_context(&profile(), Path::new("/w"), options).unwrap();
        assert_eq!(ctx.stages, vec![Stage::AbiDump, Stage::AbiReport]);
        assert!(!ctx.runs(Stage::Date));
    }

    #[test]
    fn target_version_filter() {
        let options = RunOptions {
            target_version: Some("2.0".to_string()),
            ..RunOptions::default()
        };
        let ctx = resolve_run_context(&profile(), Path::new("/w"), options).unwrap();
        assert!(ctx.targets(&VersionId::new("2.0")));
        assert!(!ctx.targets(&VersionId::new("1.0")));

        let ctx = resolve_run_context(&profile(), Path::new("/w"), RunOptions::default()).unwrap();
        assert!(ctx.targets(&VersionId::new("1.0")));
    }

    #[test]
    fn unknown_target_version_errors() {
        let options = RunOptions {
            target_version: Some("9.9".to_string()),
            ..RunOptions::default()
        };
        let err = resolve_run_context(&profile(), Path::new("/w"), options).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownVersion(ref v) if v == "9.9"));
    }

    #[test]
    fn zero_timeout_disables_it() {
        let ctx = resolve_run_context(&profile(), Path::new("/w"), RunOptions::default()).unwrap();
        assert!(ctx.tool_timeout.is_none());
        assert_eq!(ctx.skip_objects.len(), 1);
    }

    #[test]
    fn live_source_only_for_current() {
        assert_eq!(
            live_source(&profile(), Path::new("/work")),
            Some(PathBuf::from("/work/src/libfoo"))
        );
        let archival = load_profile_from_str(
            "[library]\nname = \"libfoo\"\n[[versions]]\nnumber = \"1.0\"\nsource = \"a.tar.gz\"\n",
            ProfileFormat::Toml,
        )
        .unwrap();
        assert_eq!(live_source(&archival, Path::new("/work")), None);
    }

    #[test]
    fn cancel_flag_is_shared() {
        let ctx = resolve_run_context(&profile(), Path::new("/w"), RunOptions::default()).unwrap();
        assert!(!ctx.is_cancelled());
        ctx.cancel_flag().store(true, Ordering::SeqCst);
        assert!(ctx.is_cancelled());
    }
}
