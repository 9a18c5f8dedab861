//! Pair-level compatibility aggregation.
//!
//! Each mapped object contributes its affected percentage weighted by the
//! symbol count of the old object:
//!
//! ```text
//! bc_mapped = 100 - Σ(affected · w) / W_m          (100 when W_m = 0)
//! removed   = W_r / (W_m + W_r)                    (by object count when both are 0)
//! bc        = bc_mapped · (1 - removed)
//! ```
//!
//! `W_m` is the weight of mapped objects and `W_r` the weight of objects
//! removed outright. Added objects never lower the score; their symbols only
//! show up in the `added` counter.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use abtrack_cache::{CompareRecord, SummaryRecord};

use crate::resolver::ObjectMapping;

/// Exported-symbol counts of the objects of both versions of a pair.
#[derive(Clone, Debug, Default)]
pub struct ObjectWeights {
    /// Older version, keyed by relative path.
    pub old: BTreeMap<PathBuf, u64>,
    /// Newer version, keyed by relative path.
    pub new: BTreeMap<PathBuf, u64>,
}

impl ObjectWeights {
    fn old_weight(&self, path: &Path) -> u64 {
        self.old.get(path).copied().unwrap_or(0)
    }

    fn new_weight(&self, path: &Path) -> u64 {
        self.new.get(path).copied().unwrap_or(0)
    }
}

/// Folds per-object comparisons into a pair summary.
pub struct CompatibilityAggregator;

impl CompatibilityAggregator {
    /// Aggregates the comparisons of one version pair.
    ///
    /// `results` holds one record per mapped pair of `mapping`.
    pub fn aggregate(
        mapping: &ObjectMapping,
        results: &[CompareRecord],
        weights: &ObjectWeights,
    ) -> SummaryRecord {
        let mut mapped_weight = 0u64;
        let mut weighted_affected = 0f64;
        let mut added = 0u64;
        let mut removed = 0u64;
        let mut problems = 0u64;

        for record in results {
            let w = weights.old_weight(&record.old_object);
            mapped_weight += w;
            weighted_affected += record.affected * w as f64;
            added += record.added;
            removed += record.removed;
            problems += record.problems;
        }

        let removed_weight: u64 = mapping
            .removed
            .iter()
            .map(|o| weights.old_weight(&o.rel_path))
            .sum();
        removed += removed_weight;
        added += mapping
            .added
            .iter()
            .map(|o| weights.new_weight(&o.rel_path))
            .sum::<u64>();

        let bc_mapped = if mapped_weight > 0 {
            100.0 - weighted_affected / mapped_weight as f64
        } else {
            100.0
        };

        let total_weight = mapped_weight + removed_weight;
        let removed_fraction = if total_weight > 0 {
            removed_weight as f64 / total_weight as f64
        } else {
            let total_objects = results.len() + mapping.removed.len();
            if total_objects > 0 {
                mapping.removed.len() as f64 / total_objects as f64
            } else {
                0.0
            }
        };

        let backward_compat = (bc_mapped * (1.0 - removed_fraction)).clamp(0.0, 100.0);

        SummaryRecord {
            backward_compat,
            added,
            removed,
            problems,
            added_objects: mapping.added.iter().map(|o| o.rel_path.clone()).collect(),
            removed_objects: mapping.removed.iter().map(|o| o.rel_path.clone()).collect(),
            soname_changes: mapping
                .soname_changes()
                .map(|p| p.old.rel_path.clone())
                .collect(),
            renamed_objects: mapping.renames().map(|p| p.old.rel_path.clone()).collect(),
        }
    }
}
