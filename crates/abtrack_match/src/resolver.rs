//! Matching the shared objects of two adjacent versions.
//!
//! Tiers are tried in order: soname, exact relative path, short name, and
//! super-short name. Each tier runs over every still-unclaimed old object
//! before the next tier starts. Within a tier a new object is claimed only if
//! it is the single candidate of exactly one old object; if two old objects
//! both single it out, neither claims it and both fall through. Together with
//! sorting the inputs, this makes the mapping independent of input order.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use abtrack_common::ObjectArtifact;

use crate::names::{short_name, super_short_name};

/// The rule that produced a mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchTier {
    /// Both objects declare the same soname.
    Soname,
    /// Both objects live at the same relative path.
    ExactPath,
    /// Same name after stripping the `.so[.N]*` (or `.ko`) suffix.
    ShortName,
    /// Same name after also stripping embedded version tokens.
    SuperShortName,
    /// Each version has exactly one object and nothing else matched.
    SingleObject,
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchTier::Soname => "soname",
            MatchTier::ExactPath => "path",
            MatchTier::ShortName => "short name",
            MatchTier::SuperShortName => "super-short name",
            MatchTier::SingleObject => "single object",
        };
        write!(f, "{s}")
    }
}

/// One old object mapped to one new object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappedPair {
    /// Object of the older version.
    pub old: ObjectArtifact,
    /// Object of the newer version.
    pub new: ObjectArtifact,
    /// Rule that matched them.
    pub tier: MatchTier,
    /// Both sonames are known and differ.
    pub soname_changed: bool,
    /// The short names differ.
    pub renamed: bool,
}

/// Several new objects declare the soname of one old object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ambiguity {
    /// The old object.
    pub old: PathBuf,
    /// The shared soname.
    pub soname: String,
    /// New objects declaring it, sorted.
    pub candidates: Vec<PathBuf>,
}

impl fmt::Display for Ambiguity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        write!(
            f,
            "soname {} of {} is declared by {} objects: {}",
            self.soname,
            self.old.display(),
            self.candidates.len(),
            names.join(", ")
        )
    }
}

/// Result of matching two versions' objects.
///
/// All lists are sorted by relative path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectMapping {
    /// Mapped pairs, by old path.
    pub pairs: Vec<MappedPair>,
    /// New objects no old object maps to.
    pub added: Vec<ObjectArtifact>,
    /// Old objects that map to nothing.
    pub removed: Vec<ObjectArtifact>,
    /// Soname ambiguities met on the way.
    pub ambiguities: Vec<Ambiguity>,
}

impl ObjectMapping {
    /// Returns the mapped pairs whose sonames changed.
    pub fn soname_changes(&self) -> impl Iterator<Item = &MappedPair> {
        self.pairs.iter().filter(|p| p.soname_changed)
    }

    /// Returns the mapped pairs whose objects were renamed.
    pub fn renames(&self) -> impl Iterator<Item = &MappedPair> {
        self.pairs.iter().filter(|p| p.renamed)
    }
}

/// Matches objects across two versions.
#[derive(Clone, Copy, Debug, Default)]
pub struct ObjectIdentityResolver {
    kernel: bool,
}

impl ObjectIdentityResolver {
    /// Creates a resolver. In kernel mode objects are `.ko` modules.
    pub fn new(kernel: bool) -> Self {
        Self { kernel }
    }

    /// Maps `old` objects onto `new` objects.
    ///
    /// Sonames are taken from the artifacts themselves; an absent soname
    /// simply skips the soname tier for that object.
    pub fn resolve(&self, old: &[ObjectArtifact], new: &[ObjectArtifact]) -> ObjectMapping {
        let mut old_sorted: Vec<&ObjectArtifact> = old.iter().collect();
        let mut new_sorted: Vec<&ObjectArtifact> = new.iter().collect();
        old_sorted.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        new_sorted.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));

        // old index -> (new index, tier)
        let mut claims: BTreeMap<usize, (usize, MatchTier)> = BTreeMap::new();
        let mut claimed_new: BTreeSet<usize> = BTreeSet::new();
        let mut ambiguities = Vec::new();

        self.soname_tier(&old_sorted, &new_sorted, &mut claims, &mut claimed_new, &mut ambiguities);

        let kernel = self.kernel;
        let tiers: [(MatchTier, &dyn Fn(&ObjectArtifact) -> Option<String>); 3] = [
            (MatchTier::ExactPath, &|o: &ObjectArtifact| {
                Some(o.rel_path.to_string_lossy().into_owned())
            }),
            (MatchTier::ShortName, &|o: &ObjectArtifact| {
                non_empty(short_name(o.file_name(), kernel))
            }),
            (MatchTier::SuperShortName, &|o: &ObjectArtifact| {
                non_empty(super_short_name(o.file_name(), kernel))
            }),
        ];
        for (tier, key) in tiers {
            unique_tier(&old_sorted, &new_sorted, tier, key, &mut claims, &mut claimed_new);
        }

        if claims.is_empty() && old_sorted.len() == 1 && new_sorted.len() == 1 {
            claims.insert(0, (0, MatchTier::SingleObject));
            claimed_new.insert(0);
        }

        let pairs = claims
            .iter()
            .map(|(&oi, &(ni, tier))| self.pair(old_sorted[oi], new_sorted[ni], tier))
            .collect();
        let removed = old_sorted
            .iter()
            .enumerate()
            .filter(|(i, _)| !claims.contains_key(i))
            .map(|(_, o)| (*o).clone())
            .collect();
        let added = new_sorted
            .iter()
            .enumerate()
            .filter(|(i, _)| !claimed_new.contains(i))
            .map(|(_, o)| (*o).clone())
            .collect();

        ObjectMapping {
            pairs,
            added,
            removed,
            ambiguities,
        }
    }

    fn soname_tier(
        &self,
        old: &[&ObjectArtifact],
        new: &[&ObjectArtifact],
        claims: &mut BTreeMap<usize, (usize, MatchTier)>,
        claimed_new: &mut BTreeSet<usize>,
        ambiguities: &mut Vec<Ambiguity>,
    ) {
        let mut by_soname: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, obj) in new.iter().enumerate() {
            if let Some(soname) = obj.soname.as_deref() {
                by_soname.entry(soname).or_default().push(i);
            }
        }

        let mut proposals: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (oi, obj) in old.iter().enumerate() {
            let Some(soname) = obj.soname.as_deref() else {
                continue;
            };
            match by_soname.get(soname).map(Vec::as_slice) {
                Some([ni]) => proposals.entry(*ni).or_default().push(oi),
                Some(candidates) if candidates.len() > 1 => {
                    let ambiguity = Ambiguity {
                        old: obj.rel_path.clone(),
                        soname: soname.to_string(),
                        candidates: candidates.iter().map(|&ni| new[ni].rel_path.clone()).collect(),
                    };
                    tracing::debug!(%ambiguity, "soname ambiguity, falling through");
                    ambiguities.push(ambiguity);
                }
                _ => {}
            }
        }
        commit(proposals, MatchTier::Soname, claims, claimed_new);
    }

    fn pair(&self, old: &ObjectArtifact, new: &ObjectArtifact, tier: MatchTier) -> MappedPair {
        let soname_changed = match (old.soname.as_deref(), new.soname.as_deref()) {
            (Some(a), Some(b)) => a != b,
            _ => false,
        };
        let renamed =
            short_name(old.file_name(), self.kernel) != short_name(new.file_name(), self.kernel);
        MappedPair {
            old: old.clone(),
            new: new.clone(),
            tier,
            soname_changed,
            renamed,
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

/// Runs one name-based tier over the unclaimed objects.
fn unique_tier(
    old: &[&ObjectArtifact],
    new: &[&ObjectArtifact],
    tier: MatchTier,
    key: &dyn Fn(&ObjectArtifact) -> Option<String>,
    claims: &mut BTreeMap<usize, (usize, MatchTier)>,
    claimed_new: &mut BTreeSet<usize>,
) {
    let mut by_key: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (ni, obj) in new.iter().enumerate() {
        if claimed_new.contains(&ni) {
            continue;
        }
        if let Some(k) = key(obj) {
            by_key.entry(k).or_default().push(ni);
        }
    }

    let mut proposals: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (oi, obj) in old.iter().enumerate() {
        if claims.contains_key(&oi) {
            continue;
        }
        let Some(k) = key(obj) else { continue };
        if let Some([ni]) = by_key.get(&k).map(Vec::as_slice) {
            proposals.entry(*ni).or_default().push(oi);
        }
    }
    commit(proposals, tier, claims, claimed_new);
}

/// Accepts every proposal that names its new object uniquely.
fn commit(
    proposals: BTreeMap<usize, Vec<usize>>,
    tier: MatchTier,
    claims: &mut BTreeMap<usize, (usize, MatchTier)>,
    claimed_new: &mut BTreeSet<usize>,
) {
    for (ni, olds) in proposals {
        if let [oi] = olds.as_slice() {
            claims.insert(*oi, (ni, tier));
            claimed_new.insert(ni);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn obj(path: &str, soname: Option<&str>) -> ObjectArtifact {
        let o = ObjectArtifact::new(path);
        match soname {
            Some(s) => o.with_soname(s),
            None => o,
        }
    }

    fn mapped(m: &ObjectMapping) -> Vec<(String, String, MatchTier)> {
        m.pairs
            .iter()
            .map(|p| {
                (
                    p.old.rel_path.display().to_string(),
                    p.new.rel_path.display().to_string(),
                    p.tier,
                )
            })
            .collect()
    }

    #[test]
    fn short_name_beats_add_remove() {
        let old = [obj("libfoo.so.1", Some("libfoo.so.1"))];
        let new = [obj("libfoo.so.2", Some("libfoo.so.2"))];
        let m = ObjectIdentityResolver::new(false).resolve(&old, &new);
        assert_eq!(
            mapped(&m),
            vec![("libfoo.so.1".into(), "libfoo.so.2".into(), MatchTier::ShortName)]
        );
        assert!(m.added.is_empty());
        assert!(m.removed.is_empty());
        assert!(m.pairs[0].soname_changed);
        assert!(!m.pairs[0].renamed);
    }

    #[test]
    fn single_object_rename() {
        let old = [obj("libold.so.1", None)];
        let new = [obj("libnew.so.1", None)];
        let m = ObjectIdentityResolver::new(false).resolve(&old, &new);
        assert_eq!(m.pairs.len(), 1);
        assert_eq!(m.pairs[0].tier, MatchTier::SingleObject);
        assert!(m.pairs[0].renamed);
        assert!(m.added.is_empty() && m.removed.is_empty());
    }

    #[test]
    fn no_fallback_with_several_objects() {
        let old = [obj("liba.so.1", None), obj("libb.so.1", None)];
        let new = [obj("libc.so.1", None)];
        let m = ObjectIdentityResolver::new(false).resolve(&old, &new);
        assert!(m.pairs.is_empty());
        assert_eq!(m.removed.len(), 2);
        assert_eq!(m.added.len(), 1);
    }

    #[test]
    fn soname_match_across_paths() {
        let old = [obj("lib/libz.so.1", Some("libz.so.1"))];
        let new = [
            obj("lib64/libzlib.so.1", Some("libz.so.1")),
            obj("lib64/libz.so.9", Some("libz.so.9")),
        ];
        let m = ObjectIdentityResolver::new(false).resolve(&old, &new);
        assert_eq!(m.pairs[0].tier, MatchTier::Soname);
        assert_eq!(m.pairs[0].new.rel_path, Path::new("lib64/libzlib.so.1"));
        assert!(m.pairs[0].renamed);
        assert_eq!(m.added.len(), 1);
    }

    #[test]
    fn soname_ambiguity_falls_through_to_path() {
        let old = [obj("lib/libfoo.so.1", Some("libfoo.so.1"))];
        let new = [
            obj("lib/libfoo.so.1", Some("libfoo.so.1")),
            obj("lib/compat/libfoo-compat.so.1", Some("libfoo.so.1")),
        ];
        let m = ObjectIdentityResolver::new(false).resolve(&old, &new);
        assert_eq!(m.ambiguities.len(), 1);
        assert_eq!(m.ambiguities[0].candidates.len(), 2);
        assert_eq!(m.pairs[0].tier, MatchTier::ExactPath);
        assert_eq!(m.pairs[0].new.rel_path, Path::new("lib/libfoo.so.1"));
        assert!(m.ambiguities[0].to_string().contains("2 objects"));
    }

    #[test]
    fn super_short_name_match() {
        let old = [obj("libfoo-1.2.so", None), obj("libbar.so.1", None)];
        let new = [obj("libfoo-1.3.so", None), obj("libbar.so.2", None)];
        let m = ObjectIdentityResolver::new(false).resolve(&old, &new);
        let tiers: Vec<MatchTier> = m.pairs.iter().map(|p| p.tier).collect();
        assert_eq!(tiers, vec![MatchTier::ShortName, MatchTier::SuperShortName]);
    }

    #[test]
    fn conflicting_claims_fall_through() {
        let old = [obj("a/libfoo.so.1", None), obj("b/libfoo.so.2", None)];
        let new = [obj("c/libfoo.so.3", None)];
        let m = ObjectIdentityResolver::new(false).resolve(&old, &new);
        assert!(m.pairs.is_empty());
        assert_eq!(m.removed.len(), 2);
        assert_eq!(m.added.len(), 1);
    }

    #[test]
    fn order_independent() {
        let old = vec![
            obj("lib/libfoo.so.1", Some("libfoo.so.1")),
            obj("lib/libbar.so.3", Some("libbar.so.3")),
            obj("lib/libbaz-2.so", None),
            obj("lib/libgone.so.1", None),
        ];
        let new = vec![
            obj("lib/libfoo.so.2", Some("libfoo.so.2")),
            obj("lib64/libbar.so.3", Some("libbar.so.3")),
            obj("lib/libbaz-3.so", None),
            obj("lib/libnew.so.1", None),
        ];
        let resolver = ObjectIdentityResolver::new(false);
        let expected = resolver.resolve(&old, &new);

        let mut old_rev = old.clone();
        old_rev.reverse();
        let mut new_rot = new.clone();
        new_rot.rotate_left(2);
        assert_eq!(resolver.resolve(&old_rev, &new_rot), expected);
        assert_eq!(resolver.resolve(&old, &new_rot), expected);
        assert_eq!(expected.pairs.len(), 3);
        assert_eq!(expected.removed[0].rel_path, Path::new("lib/libgone.so.1"));
        assert_eq!(expected.added[0].rel_path, Path::new("lib/libnew.so.1"));
    }

    #[test]
    fn kernel_modules() {
        let old = [obj("drivers/net/e1000e.ko", None), obj("drivers/net/igb.ko", None)];
        let new = [obj("kernel/drivers/net/e1000e.ko", None), obj("drivers/net/igb.ko", None)];
        let m = ObjectIdentityResolver::new(true).resolve(&old, &new);
        assert_eq!(m.pairs.len(), 2);
        assert!(m.added.is_empty());
        assert!(m.renames().next().is_none());
    }

    #[test]
    fn empty_inputs() {
        let m = ObjectIdentityResolver::default().resolve(&[], &[]);
        assert_eq!(m, ObjectMapping::default());
    }
}
