//! Process-backed implementations of the adapter traits.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::discover::{LocatedTool, GIT, SVN};
use crate::error::ToolError;
use crate::patterns::READELF_SONAME;
use crate::runner::{ProcessOutput, ProcessRunner};
use crate::summary::{self, CompareSummary, DiffSummary};
use crate::traits::{
    ChangelogTool, CompareRequest, CompareTool, DiffRequest, DiffTool, DumpOutput, DumpRequest,
    DumpTool, ScmProbe, SonameProbe, Upstream,
};

/// File name of comparison reports inside their report directory.
pub const COMPARE_REPORT: &str = "compat_report.html";

/// File name of diff reports inside their report directory.
pub const DIFF_REPORT: &str = "changes_report.html";

fn ensure_parent(path: &Path) -> Result<(), ToolError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ToolError::io(parent, e))?;
    }
    Ok(())
}

fn read_lossy(path: &Path) -> Result<String, ToolError> {
    let bytes = std::fs::read(path).map_err(|e| ToolError::io(path, e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Maps a finished report-producing process to its report.
///
/// Report tools signal "differences found" through their exit status, so
/// the report file, not the status, decides success.
fn expect_report(tool: &str, output: &ProcessOutput, report: &Path) -> Result<(), ToolError> {
    if report.is_file() {
        return Ok(());
    }
    if !output.success() {
        return Err(ToolError::Failed {
            tool: tool.to_string(),
            code: output.code,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Err(ToolError::MissingOutput {
        tool: tool.to_string(),
        path: report.to_path_buf(),
    })
}

/// `abi-dumper`.
#[derive(Debug)]
pub struct AbiDumper {
    tool: LocatedTool,
    runner: Arc<ProcessRunner>,
}

impl AbiDumper {
    /// Wraps a located `abi-dumper`.
    pub fn new(tool: LocatedTool, runner: Arc<ProcessRunner>) -> Self {
        Self { tool, runner }
    }
}

impl DumpTool for AbiDumper {
    fn dump(&self, request: &DumpRequest<'_>) -> Result<DumpOutput, ToolError> {
        ensure_parent(request.output)?;
        let mut args = vec![
            request.object.as_os_str().to_owned(),
            "-o".into(),
            request.output.as_os_str().to_owned(),
            "-lver".into(),
            request.version_label.into(),
        ];
        if request.private_symbols {
            args.push("-all".into());
        }
        let name = self.tool.spec.name;
        self.runner.run_checked(name, &self.tool.path, &args)?;

        if !request.output.is_file() {
            return Err(ToolError::MissingOutput {
                tool: name.to_string(),
                path: request.output.to_path_buf(),
            });
        }
        let header = summary::parse_dump_header(&read_lossy(request.output)?);
        Ok(DumpOutput {
            symbols: header.symbols,
            language: header.language,
            tool_version: header
                .tool_version
                .or_else(|| self.tool.version.as_ref().map(ToString::to_string)),
        })
    }
}

/// `abi-compliance-checker`.
#[derive(Debug)]
pub struct AbiComplianceChecker {
    tool: LocatedTool,
    runner: Arc<ProcessRunner>,
}

impl AbiComplianceChecker {
    /// Wraps a located `abi-compliance-checker`.
    pub fn new(tool: LocatedTool, runner: Arc<ProcessRunner>) -> Self {
        Self { tool, runner }
    }
}

impl CompareTool for AbiComplianceChecker {
    fn compare(&self, request: &CompareRequest<'_>) -> Result<(PathBuf, CompareSummary), ToolError> {
        let report = request.report_dir.join(COMPARE_REPORT);
        ensure_parent(&report)?;
        let mut args = vec![
            "-l".into(),
            request.library.into(),
            "-old".into(),
            request.old_dump.as_os_str().to_owned(),
            "-new".into(),
            request.new_dump.as_os_str().to_owned(),
            "-binary".into(),
            "-report-path".into(),
            report.as_os_str().to_owned(),
        ];
        if !request.private_symbols {
            args.push("-skip-internal-symbols".into());
            args.push("_ZN.*detail.*".into());
        }
        let name = self.tool.spec.name;
        let output = self.runner.run(name, &self.tool.path, &args)?;
        expect_report(name, &output, &report)?;
        let parsed = summary::parse_compare(&read_lossy(&report)?);
        Ok((report, parsed))
    }
}

/// `readelf -d`.
#[derive(Debug)]
pub struct Readelf {
    tool: LocatedTool,
    runner: Arc<ProcessRunner>,
}

impl Readelf {
    /// Wraps a located `readelf`.
    pub fn new(tool: LocatedTool, runner: Arc<ProcessRunner>) -> Self {
        Self { tool, runner }
    }
}

impl SonameProbe for Readelf {
    fn soname(&self, object: &Path) -> Result<Option<String>, ToolError> {
        let args = [std::ffi::OsStr::new("-d"), object.as_os_str()];
        let output = self.runner.run_checked(self.tool.spec.name, &self.tool.path, args)?;
        Ok(parse_readelf_soname(&output.stdout))
    }
}

fn parse_readelf_soname(dynamic_section: &str) -> Option<String> {
    READELF_SONAME
        .captures(dynamic_section)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// `pkgdiff`, used for both header and package diffs.
#[derive(Debug)]
pub struct PkgDiff {
    tool: LocatedTool,
    runner: Arc<ProcessRunner>,
}

impl PkgDiff {
    /// Wraps a located `pkgdiff`.
    pub fn new(tool: LocatedTool, runner: Arc<ProcessRunner>) -> Self {
        Self { tool, runner }
    }
}

impl DiffTool for PkgDiff {
    fn diff(&self, request: &DiffRequest<'_>) -> Result<(PathBuf, DiffSummary), ToolError> {
        let report = request.report_dir.join(DIFF_REPORT);
        ensure_parent(&report)?;
        let mut args = vec![
            request.old.as_os_str().to_owned(),
            request.new.as_os_str().to_owned(),
            "-report-path".into(),
            report.as_os_str().to_owned(),
        ];
        for pattern in request.skip_patterns {
            args.push("-skip-pattern".into());
            args.push(pattern.into());
        }
        let name = self.tool.spec.name;
        let output = self.runner.run(name, &self.tool.path, &args)?;
        expect_report(name, &output, &report)?;
        let parsed = summary::parse_diff(&read_lossy(&report)?);
        Ok((report, parsed))
    }
}

/// Copies the changelog out of a source directory or archive.
///
/// Archives are read with `tar`, which is optional: directory sources work
/// without it.
#[derive(Debug)]
pub struct ChangelogExtractor {
    tar: Option<PathBuf>,
    runner: Arc<ProcessRunner>,
}

impl ChangelogExtractor {
    /// Creates an extractor. `tar` is the located `tar` binary, if any.
    pub fn new(tar: Option<PathBuf>, runner: Arc<ProcessRunner>) -> Self {
        Self { tar, runner }
    }

    fn from_archive(&self, archive: &Path) -> Result<String, ToolError> {
        let tar = self.tar.as_ref().ok_or_else(|| ToolError::NotFound {
            tool: "tar".to_string(),
        })?;
        let listing = self
            .runner
            .run_checked("tar", tar, [std::ffi::OsStr::new("-tf"), archive.as_os_str()])?;
        let member = pick_changelog(listing.stdout.lines().filter(|l| !l.ends_with('/')))
            .ok_or_else(|| ToolError::MissingOutput {
                tool: "tar".to_string(),
                path: archive.join("ChangeLog"),
            })?;
        let extracted = self.runner.run_checked(
            "tar",
            tar,
            [
                std::ffi::OsStr::new("-xOf"),
                archive.as_os_str(),
                std::ffi::OsStr::new(&member),
            ],
        )?;
        Ok(extracted.stdout)
    }
}

impl ChangelogTool for ChangelogExtractor {
    fn extract(&self, source: &Path, output: &Path) -> Result<(), ToolError> {
        let text = if source.is_dir() {
            let entries = std::fs::read_dir(source).map_err(|e| ToolError::io(source, e))?;
            let mut names = Vec::new();
            for entry in entries {
                let entry = entry.map_err(|e| ToolError::io(source, e))?;
                if entry.path().is_file() {
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
            names.sort();
            match pick_changelog(names.iter().map(String::as_str)) {
                Some(name) => read_lossy(&source.join(name))?,
                None => String::new(),
            }
        } else {
            self.from_archive(source)?
        };

        if text.trim().is_empty() {
            return Err(ToolError::MissingOutput {
                tool: "changelog".to_string(),
                path: output.to_path_buf(),
            });
        }
        ensure_parent(output)?;
        std::fs::write(output, text).map_err(|e| ToolError::io(output, e))
    }
}

/// Ranks a file name as a changelog candidate; lower is better.
fn changelog_rank(file_name: &str) -> Option<usize> {
    let lower = file_name.to_ascii_lowercase();
    if lower == "changelog" {
        Some(0)
    } else if lower.starts_with("changelog") {
        Some(1)
    } else if lower.starts_with("news") {
        Some(2)
    } else if lower.starts_with("changes") {
        Some(3)
    } else if lower.starts_with("release_notes") || lower.starts_with("release-notes") {
        Some(4)
    } else {
        None
    }
}

/// Picks the best changelog among `paths`: shallowest first, then by rank,
/// then by name.
fn pick_changelog<'a>(paths: impl Iterator<Item = &'a str>) -> Option<String> {
    paths
        .filter_map(|path| {
            let trimmed = path.trim_start_matches("./");
            let file_name = trimmed.rsplit('/').next().unwrap_or(trimmed);
            let rank = changelog_rank(file_name)?;
            let depth = trimmed.matches('/').count();
            Some((depth, rank, path))
        })
        .min()
        .map(|(_, _, path)| path.to_string())
}

/// Upstream probe for git checkouts: the commit time of `HEAD`.
#[derive(Debug)]
pub struct GitProbe {
    path: PathBuf,
    runner: Arc<ProcessRunner>,
}

impl GitProbe {
    /// Locates `git` on `PATH`.
    pub fn locate(runner: Arc<ProcessRunner>) -> Result<Self, ToolError> {
        let path = crate::discover::locate(&GIT, &runner)?.path;
        Ok(Self { path, runner })
    }
}

impl ScmProbe for GitProbe {
    fn probe(&self, dir: &Path) -> Result<Upstream, ToolError> {
        let args = [
            std::ffi::OsStr::new("-C"),
            dir.as_os_str(),
            std::ffi::OsStr::new("log"),
            std::ffi::OsStr::new("-1"),
            std::ffi::OsStr::new("--format=%ct"),
        ];
        let output = self.runner.run_checked(GIT.name, &self.path, args)?;
        let marker = output.stdout.trim().to_string();
        Ok(Upstream {
            timestamp: marker.parse().ok(),
            marker,
        })
    }
}

/// Upstream probe for subversion checkouts: the last changed revision.
#[derive(Debug)]
pub struct SvnProbe {
    path: PathBuf,
    runner: Arc<ProcessRunner>,
}

impl SvnProbe {
    /// Locates `svn` on `PATH`.
    pub fn locate(runner: Arc<ProcessRunner>) -> Result<Self, ToolError> {
        let path = crate::discover::locate(&SVN, &runner)?.path;
        Ok(Self { path, runner })
    }
}

impl ScmProbe for SvnProbe {
    fn probe(&self, dir: &Path) -> Result<Upstream, ToolError> {
        let args = [
            std::ffi::OsStr::new("info"),
            std::ffi::OsStr::new("--show-item"),
            std::ffi::OsStr::new("last-changed-revision"),
            dir.as_os_str(),
        ];
        let output = self.runner.run_checked(SVN.name, &self.path, args)?;
        Ok(Upstream {
            marker: output.stdout.trim().to_string(),
            timestamp: None,
        })
    }
}

/// Stand-in for a tool that was not located because no selected stage
/// needs it. Every call fails with [`ToolError::NotFound`].
#[derive(Clone, Copy, Debug)]
pub struct Unavailable {
    tool: &'static str,
}

impl Unavailable {
    /// Creates a stand-in for `tool`.
    pub fn new(tool: &'static str) -> Self {
        Self { tool }
    }

    fn err(&self) -> ToolError {
        ToolError::NotFound {
            tool: self.tool.to_string(),
        }
    }
}

impl DumpTool for Unavailable {
    fn dump(&self, _: &DumpRequest<'_>) -> Result<DumpOutput, ToolError> {
        Err(self.err())
    }
}

impl CompareTool for Unavailable {
    fn compare(&self, _: &CompareRequest<'_>) -> Result<(PathBuf, CompareSummary), ToolError> {
        Err(self.err())
    }
}

impl SonameProbe for Unavailable {
    fn soname(&self, _: &Path) -> Result<Option<String>, ToolError> {
        Err(self.err())
    }
}

impl DiffTool for Unavailable {
    fn diff(&self, _: &DiffRequest<'_>) -> Result<(PathBuf, DiffSummary), ToolError> {
        Err(self.err())
    }
}

impl ChangelogTool for Unavailable {
    fn extract(&self, _: &Path, _: &Path) -> Result<(), ToolError> {
        Err(self.err())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> (tokio::runtime::Runtime, Arc<ProcessRunner>) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let runner = Arc::new(ProcessRunner::new(rt.handle().clone(), None));
        (rt, runner)
    }

    #[test]
    fn readelf_soname_line() {
        let out = "\nDynamic section at offset 0x2de8 contains 25 entries:\n  Tag        Type                         Name/Value\n 0x0000000000000001 (NEEDED)             Shared library: [libc.so.6]\n 0x000000000000000e (SONAME)             Library soname: [libfoo.so.1]\n";
        assert_eq!(parse_readelf_soname(out).as_deref(), Some("libfoo.so.1"));
    }

    #[test]
    fn readelf_without_soname() {
        let out = " 0x0000000000000001 (NEEDED)             Shared library: [libc.so.6]\n";
        assert_eq!(parse_readelf_soname(out), None);
    }

    #[test]
    fn changelog_preference() {
        let names = ["README", "NEWS", "ChangeLog.old", "ChangeLog"];
        assert_eq!(pick_changelog(names.into_iter()).as_deref(), Some("ChangeLog"));
        let names = ["NEWS.md", "CHANGES"];
        assert_eq!(pick_changelog(names.into_iter()).as_deref(), Some("NEWS.md"));
        assert_eq!(pick_changelog(["README", "COPYING"].into_iter()), None);
    }

    #[test]
    fn changelog_prefers_shallow_archive_members() {
        let members = [
            "libfoo-1.0/doc/ChangeLog",
            "libfoo-1.0/NEWS",
            "libfoo-1.0/src/main.c",
        ];
        assert_eq!(
            pick_changelog(members.into_iter()).as_deref(),
            Some("libfoo-1.0/NEWS")
        );
    }

    #[test]
    fn extract_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("NEWS"), "1.0: first release\n").unwrap();
        let out = dir.path().join("out/changelog.txt");

        let (_rt, runner) = runner();
        let extractor = ChangelogExtractor::new(None, runner);
        extractor.extract(&src, &out).unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "1.0: first release\n");
    }

    #[test]
    fn extract_without_changelog_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README"), "hello").unwrap();
        let (_rt, runner) = runner();
        let extractor = ChangelogExtractor::new(None, runner);
        let err = extractor
            .extract(dir.path(), &dir.path().join("out.txt"))
            .unwrap_err();
        assert!(matches!(err, ToolError::MissingOutput { .. }));
    }

    #[test]
    fn archive_without_tar_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("libfoo-1.0.tar.gz");
        std::fs::write(&archive, b"\x1f\x8b").unwrap();
        let (_rt, runner) = runner();
        let err = ChangelogExtractor::new(None, runner)
            .extract(&archive, &dir.path().join("out.txt"))
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn unavailable_fails_every_call() {
        let tool = Unavailable::new("pkgdiff");
        let req = DiffRequest {
            old: Path::new("a"),
            new: Path::new("b"),
            report_dir: Path::new("r"),
            skip_patterns: &[],
        };
        assert!(matches!(tool.diff(&req), Err(ToolError::NotFound { .. })));
    }
}
