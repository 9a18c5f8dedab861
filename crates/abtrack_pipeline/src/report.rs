//! Per-run statistics.

use std::collections::BTreeMap;
use std::fmt;

use abtrack_cache::SummaryRecord;
use abtrack_common::{Stage, VersionId};

/// What happened to one item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The artifact was produced.
    Built,
    /// The cached artifact was reused.
    Skipped,
    /// Producing the artifact failed.
    Failed,
}

/// Item counts of one stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageCounts {
    /// Items produced.
    pub built: usize,
    /// Items reused from the cache.
    pub skipped: usize,
    /// Items that failed.
    pub failed: usize,
}

impl fmt::Display for StageCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} built, {} cached, {} failed",
            self.built, self.skipped, self.failed
        )
    }
}

/// The aggregate of one version pair, as reported at the end of a run.
#[derive(Clone, Debug, PartialEq)]
pub struct PairSummary {
    /// Older version.
    pub old: VersionId,
    /// Newer version.
    pub new: VersionId,
    /// The aggregate.
    pub summary: SummaryRecord,
}

/// Statistics of one pipeline run.
#[derive(Clone, Debug, Default)]
pub struct RunReport {
    /// Item counts per stage.
    pub stages: BTreeMap<Stage, StageCounts>,
    /// Number of external tool invocations.
    pub tool_invocations: usize,
    /// Pair aggregates available at the end of the run, newest pair first.
    pub summaries: Vec<PairSummary>,
    /// The run stopped early on request.
    pub interrupted: bool,
}

impl RunReport {
    /// Counts one item of `stage`.
    pub fn record(&mut self, stage: Stage, outcome: Outcome) {
        let counts = self.stages.entry(stage).or_default();
        match outcome {
            Outcome::Built => counts.built += 1,
            Outcome::Skipped => counts.skipped += 1,
            Outcome::Failed => counts.failed += 1,
        }
    }

    /// Returns the counts of `stage`.
    pub fn counts(&self, stage: Stage) -> StageCounts {
        self.stages.get(&stage).copied().unwrap_or_default()
    }

    /// Returns the number of failed items across all stages.
    pub fn failed(&self) -> usize {
        self.stages.values().map(|c| c.failed).sum()
    }
}
