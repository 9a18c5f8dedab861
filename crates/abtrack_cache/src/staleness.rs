//! Rebuild decisions.
//!
//! Archival versions are immutable: once an artifact keyed only by archival
//! versions is cached, it stays fresh until a forced rebuild. Artifacts of the
//! live `current` version are rebuilt when their source changed upstream.

use std::fmt;

use crate::key::ArtifactKey;
use crate::record::ArtifactRecord;

/// Why an artifact is (or is not) rebuilt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    /// The cached artifact can be reused.
    Fresh,
    /// No artifact is cached for the key.
    Missing,
    /// The run forces regeneration.
    Forced,
    /// The key involves a live source that changed since the build.
    SourceChanged,
}

impl Freshness {
    /// Returns `true` if the artifact must be regenerated.
    pub fn needs_rebuild(self) -> bool {
        self != Freshness::Fresh
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Freshness::Fresh => "fresh",
            Freshness::Missing => "missing",
            Freshness::Forced => "forced",
            Freshness::SourceChanged => "source changed",
        };
        write!(f, "{s}")
    }
}

/// Decides whether artifacts need regenerating.
#[derive(Clone, Copy, Debug, Default)]
pub struct StalenessOracle {
    forced: bool,
}

impl StalenessOracle {
    /// Creates an oracle. `forced` makes every selected artifact stale.
    pub fn new(forced: bool) -> Self {
        Self { forced }
    }

    /// Returns `true` if the run forces regeneration.
    pub fn is_forced(&self) -> bool {
        self.forced
    }

    /// Classifies the cached record for `key`.
    ///
    /// `live_source_changed` is consulted only for keys that derive from a
    /// mutable source; archival keys ignore it.
    pub fn check(
        &self,
        key: &ArtifactKey,
        cached: Option<&ArtifactRecord>,
        live_source_changed: bool,
    ) -> Freshness {
        if self.forced {
            return Freshness::Forced;
        }
        if cached.is_none() {
            return Freshness::Missing;
        }
        if key.is_live() && live_source_changed {
            return Freshness::SourceChanged;
        }
        Freshness::Fresh
    }

    /// Shorthand for [`check`](Self::check) followed by
    /// [`Freshness::needs_rebuild`].
    pub fn needs_rebuild(
        &self,
        key: &ArtifactKey,
        cached: Option<&ArtifactRecord>,
        live_source_changed: bool,
    ) -> bool {
        self.check(key, cached, live_source_changed).needs_rebuild()
    }

    /// Returns `true` if the upstream marker recorded on `cached` differs
    /// from `marker`.
    ///
    /// Without a marker on either side the source is assumed unchanged.
    pub fn marker_changed(cached: &ArtifactRecord, marker: Option<&str>) -> bool {
        match (cached.upstream_marker.as_deref(), marker) {
            (None, None) => false,
            (recorded, observed) => recorded != observed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DateRecord;
    use abtrack_common::VersionId;

    fn date(version: &str) -> ArtifactKey {
        ArtifactKey::Date {
            version: VersionId::new(version),
        }
    }

    fn record(marker: Option<&str>) -> ArtifactRecord {
        ArtifactRecord::new(DateRecord { timestamp: 1 }).with_marker(marker.map(String::from))
    }

    #[test]
    fn archival_never_stale_once_cached() {
        let oracle = StalenessOracle::new(false);
        let rec = record(None);
        for changed in [false, true] {
            assert_eq!(oracle.check(&date("1.0"), Some(&rec), changed), Freshness::Fresh);
        }
    }

    #[test]
    fn missing_is_stale() {
        let oracle = StalenessOracle::new(false);
        assert_eq!(oracle.check(&date("1.0"), None, false), Freshness::Missing);
    }

    #[test]
    fn forced_overrides_everything() {
        let oracle = StalenessOracle::new(true);
        let rec = record(None);
        assert!(oracle.is_forced());
        assert_eq!(oracle.check(&date("1.0"), Some(&rec), false), Freshness::Forced);
    }

    #[test]
    fn current_rebuilds_on_source_change() {
        let oracle = StalenessOracle::new(false);
        let rec = record(Some("r1"));
        assert!(oracle.needs_rebuild(&date("current"), Some(&rec), true));
        assert!(!oracle.needs_rebuild(&date("current"), Some(&rec), false));
    }

    #[test]
    fn marker_comparison() {
        assert!(!StalenessOracle::marker_changed(&record(None), None));
        assert!(!StalenessOracle::marker_changed(&record(Some("r1")), Some("r1")));
        assert!(StalenessOracle::marker_changed(&record(Some("r1")), Some("r2")));
        assert!(StalenessOracle::marker_changed(&record(None), Some("r2")));
        assert!(StalenessOracle::marker_changed(&record(Some("r1")), None));
    }

    #[test]
    fn freshness_display() {
        assert_eq!(Freshness::SourceChanged.to_string(), "source changed");
        assert!(!Freshness::Fresh.needs_rebuild());
    }
}
