//! The fixed enumeration of pipeline stages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A pipeline stage, declared in full-build execution order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Release date detection (per version).
    Date,
    /// Soname detection for every shared object (per version).
    Soname,
    /// Changelog extraction (per version).
    Changelog,
    /// ABI dump creation for every shared object (per version).
    AbiDump,
    /// Object matching and pairwise ABI comparison (per adjacent pair).
    AbiReport,
    /// Public header diff (per adjacent pair).
    HeadersDiff,
    /// Source package diff (per adjacent pair).
    PkgDiff,
    /// Compatibility timeline (whole library).
    Graph,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 8] = [
        Stage::Date,
        Stage::Soname,
        Stage::Changelog,
        Stage::AbiDump,
        Stage::AbiReport,
        Stage::HeadersDiff,
        Stage::PkgDiff,
        Stage::Graph,
    ];

    /// Returns the stage's command-line name.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Date => "date",
            Stage::Soname => "soname",
            Stage::Changelog => "changelog",
            Stage::AbiDump => "abidump",
            Stage::AbiReport => "abireport",
            Stage::HeadersDiff => "headersdiff",
            Stage::PkgDiff => "pkgdiff",
            Stage::Graph => "graph",
        }
    }

    /// Returns `true` for stages that operate on adjacent version pairs.
    pub fn is_pairwise(self) -> bool {
        matches!(self, Stage::AbiReport | Stage::HeadersDiff | Stage::PkgDiff)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown stage name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stage '{0}' (expected one of: date, soname, changelog, abidump, abireport, headersdiff, pkgdiff, graph)")]
pub struct ParseStageError(pub String);

impl FromStr for Stage {
    type Err = ParseStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.name() == s)
            .ok_or_else(|| ParseStageError(s.to_string()))
    }
}
