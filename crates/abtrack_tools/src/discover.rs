//! Tool discovery and minimum-version checks.
//!
//! Only the tools needed by the selected stages are located. A tool that is
//! missing or older than its minimum version is a fatal error for the run.

use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use abtrack_common::Stage;

use crate::adapters::{
    AbiComplianceChecker, AbiDumper, ChangelogExtractor, PkgDiff, Readelf, Unavailable,
};
use crate::error::ToolError;
use crate::patterns::DOTTED_VERSION;
use crate::runner::ProcessRunner;
use crate::traits::{ChangelogTool, CompareTool, DiffTool, DumpTool, SonameProbe};

/// An external tool and its minimum supported version.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ToolSpec {
    /// Executable name.
    pub name: &'static str,
    /// Minimum version, checked through `-dumpversion`.
    pub min_version: Option<&'static str>,
}

/// ABI dumper.
pub const ABI_DUMPER: ToolSpec = ToolSpec {
    name: "abi-dumper",
    min_version: Some("1.1"),
};

/// ABI comparator.
pub const ABI_COMPLIANCE_CHECKER: ToolSpec = ToolSpec {
    name: "abi-compliance-checker",
    min_version: Some("2.2"),
};

/// Header and package diff tool.
pub const PKGDIFF: ToolSpec = ToolSpec {
    name: "pkgdiff",
    min_version: Some("1.6"),
};

/// Soname reader.
pub const READELF: ToolSpec = ToolSpec {
    name: "readelf",
    min_version: None,
};

/// Archive reader used for changelogs of archived sources.
pub const TAR: ToolSpec = ToolSpec {
    name: "tar",
    min_version: None,
};

/// Git client.
pub const GIT: ToolSpec = ToolSpec {
    name: "git",
    min_version: None,
};

/// Subversion client.
pub const SVN: ToolSpec = ToolSpec {
    name: "svn",
    min_version: None,
};

/// Returns the tools the given stages need, without duplicates.
///
/// Comparisons pull missing dumps and sonames, so they need the dumper and
/// `readelf` as well.
pub fn required_tools(stages: &[Stage]) -> Vec<ToolSpec> {
    let mut tools = Vec::new();
    let mut add = |spec: ToolSpec| {
        if !tools.contains(&spec) {
            tools.push(spec);
        }
    };
    for stage in stages {
        match stage {
            Stage::Soname => add(READELF),
            Stage::AbiDump => {
                add(READELF);
                add(ABI_DUMPER);
            }
            Stage::AbiReport => {
                add(READELF);
                add(ABI_DUMPER);
                add(ABI_COMPLIANCE_CHECKER);
            }
            Stage::HeadersDiff | Stage::PkgDiff => add(PKGDIFF),
            Stage::Date | Stage::Changelog | Stage::Graph => {}
        }
    }
    tools
}

/// A dotted numeric version such as `2.3` or `1.1.0`.
///
/// Missing trailing components compare as zero, so `1.1` equals `1.1.0`.
#[derive(Clone, Debug)]
pub struct DottedVersion(Vec<u64>);

impl DottedVersion {
    /// Extracts the first dotted numeric run from `text`.
    pub fn parse(text: &str) -> Option<Self> {
        let m = DOTTED_VERSION.find(text)?;
        let parts = m
            .as_str()
            .split('.')
            .map(str::parse)
            .collect::<Result<Vec<u64>, _>>()
            .ok()?;
        Some(Self(parts))
    }

    fn component(&self, i: usize) -> u64 {
        self.0.get(i).copied().unwrap_or(0)
    }
}

impl PartialEq for DottedVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DottedVersion {}

impl PartialOrd for DottedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DottedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl fmt::Display for DottedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u64::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// A tool found on `PATH`.
#[derive(Clone, Debug)]
pub struct LocatedTool {
    /// What was looked for.
    pub spec: ToolSpec,
    /// Resolved executable.
    pub path: PathBuf,
    /// Reported version, for tools with a minimum version.
    pub version: Option<DottedVersion>,
}

/// Locates `spec` on `PATH` and checks its minimum version.
pub fn locate(spec: &ToolSpec, runner: &ProcessRunner) -> Result<LocatedTool, ToolError> {
    let path = which::which(spec.name).map_err(|_| ToolError::NotFound {
        tool: spec.name.to_string(),
    })?;

    let Some(min) = spec.min_version else {
        return Ok(LocatedTool {
            spec: *spec,
            path,
            version: None,
        });
    };

    let output = runner.run(spec.name, &path, ["-dumpversion"])?;
    let answer = format!("{}{}", output.stdout, output.stderr);
    let found = DottedVersion::parse(&answer).ok_or_else(|| ToolError::UnknownVersion {
        tool: spec.name.to_string(),
        output: answer.trim().to_string(),
    })?;
    let required = DottedVersion::parse(min).ok_or_else(|| ToolError::UnknownVersion {
        tool: spec.name.to_string(),
        output: min.to_string(),
    })?;
    if found < required {
        return Err(ToolError::TooOld {
            tool: spec.name.to_string(),
            found: found.to_string(),
            required: required.to_string(),
        });
    }

    tracing::debug!(tool = spec.name, path = %path.display(), version = %found, "located tool");
    Ok(LocatedTool {
        spec: *spec,
        path,
        version: Some(found),
    })
}

/// The adapters a run works with.
#[derive(Clone)]
pub struct Toolset {
    /// ABI dumper.
    pub dumper: Arc<dyn DumpTool>,
    /// ABI comparator.
    pub comparator: Arc<dyn CompareTool>,
    /// Soname reader.
    pub soname: Arc<dyn SonameProbe>,
    /// Header and package diff tool.
    pub differ: Arc<dyn DiffTool>,
    /// Changelog extractor.
    pub changelog: Arc<dyn ChangelogTool>,
}

impl Toolset {
    /// A toolset in which every adapter fails with [`ToolError::NotFound`].
    pub fn unavailable() -> Self {
        Self {
            dumper: Arc::new(Unavailable::new(ABI_DUMPER.name)),
            comparator: Arc::new(Unavailable::new(ABI_COMPLIANCE_CHECKER.name)),
            soname: Arc::new(Unavailable::new(READELF.name)),
            differ: Arc::new(Unavailable::new(PKGDIFF.name)),
            changelog: Arc::new(Unavailable::new("changelog")),
        }
    }

    /// Locates the tools `stages` need and builds their adapters.
    ///
    /// Every missing or outdated tool is reported, not just the first.
    pub fn discover(stages: &[Stage], runner: Arc<ProcessRunner>) -> Result<Self, Vec<ToolError>> {
        let mut toolset = Self::unavailable();
        let mut errors = Vec::new();

        for spec in required_tools(stages) {
            let tool = match locate(&spec, &runner) {
                Ok(tool) => tool,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };
            let shared = Arc::clone(&runner);
            match spec.name {
                n if n == ABI_DUMPER.name => toolset.dumper = Arc::new(AbiDumper::new(tool, shared)),
                n if n == ABI_COMPLIANCE_CHECKER.name => {
                    toolset.comparator = Arc::new(AbiComplianceChecker::new(tool, shared))
                }
                n if n == READELF.name => toolset.soname = Arc::new(Readelf::new(tool, shared)),
                n if n == PKGDIFF.name => toolset.differ = Arc::new(PkgDiff::new(tool, shared)),
                _ => {}
            }
        }

        if stages.contains(&Stage::Changelog) {
            let tar = which::which(TAR.name).ok();
            if tar.is_none() {
                tracing::debug!("tar not found; changelogs of archived sources will fail");
            }
            toolset.changelog = Arc::new(ChangelogExtractor::new(tar, Arc::clone(&runner)));
        }

        if errors.is_empty() {
            Ok(toolset)
        } else {
            Err(errors)
        }
    }
}

impl fmt::Debug for Toolset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Toolset").finish_non_exhaustive()
    }
}
