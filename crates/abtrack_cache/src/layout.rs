//! On-disk layout of artifacts under a library cache root.
//!
//! All returned paths are relative to the library cache root so that a cache
//! directory can be moved without invalidating its records.

use std::path::PathBuf;

use abtrack_common::{ObjectKey, VersionId};

/// Top-level directories that hold artifact files.
pub const ARTIFACT_DIRS: &[&str] = &[DUMPS, REPORTS, CHANGELOG, HEADERS_DIFF, PKG_DIFF];

const DUMPS: &str = "abi_dump";
const REPORTS: &str = "compat_report";
const CHANGELOG: &str = "changelog";
const HEADERS_DIFF: &str = "headers_diff";
const PKG_DIFF: &str = "pkg_diff";

/// File name of the timeline written by the graph stage.
pub const TIMELINE_FILE: &str = "timeline.json";

/// File name of an ABI dump inside its [`dump_dir`].
pub const DUMP_FILE: &str = "ABI.dump";

/// File name of an extracted changelog inside its [`changelog_dir`].
pub const CHANGELOG_FILE: &str = "changelog.txt";

/// A single path component for `version`; never `.` or `..`.
fn segment(version: &VersionId) -> String {
    let flat: String = version
        .as_str()
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    match flat.as_str() {
        "." | ".." => flat.replace('.', "_"),
        _ => flat,
    }
}

fn pair_segment(old: &VersionId, new: &VersionId) -> String {
    format!("{}_to_{}", segment(old), segment(new))
}

/// Directory holding the dump of one object.
pub fn dump_dir(version: &VersionId, object: &ObjectKey) -> PathBuf {
    PathBuf::from(DUMPS).join(segment(version)).join(object.as_str())
}

/// Directory holding the comparison report of one object pair.
pub fn report_dir(old: &VersionId, new: &VersionId, pair: &ObjectKey) -> PathBuf {
    PathBuf::from(REPORTS)
        .join(pair_segment(old, new))
        .join(pair.as_str())
}

/// Directory holding the changelog of one version.
pub fn changelog_dir(version: &VersionId) -> PathBuf {
    PathBuf::from(CHANGELOG).join(segment(version))
}

/// Directory holding the header diff of a version pair.
pub fn headers_diff_dir(old: &VersionId, new: &VersionId) -> PathBuf {
    PathBuf::from(HEADERS_DIFF).join(pair_segment(old, new))
}

/// Directory holding the package diff of a version pair.
pub fn pkg_diff_dir(old: &VersionId, new: &VersionId) -> PathBuf {
    PathBuf::from(PKG_DIFF).join(pair_segment(old, new))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn paths_are_relative_and_distinct() {
        let old = VersionId::new("1.0");
        let new = VersionId::new("2.0");
        let obj = ObjectKey::from_rel_path(Path::new("libfoo.so.1"));
        let dump = dump_dir(&new, &obj);
        assert!(dump.is_relative());
        assert!(dump.starts_with("abi_dump/2.0"));
        assert_eq!(headers_diff_dir(&old, &new), PathBuf::from("headers_diff/1.0_to_2.0"));
        assert_ne!(headers_diff_dir(&old, &new), pkg_diff_dir(&old, &new));
    }

    #[test]
    fn separators_in_version_are_flattened() {
        let v = VersionId::new("release/1.0");
        assert_eq!(changelog_dir(&v), PathBuf::from("changelog/release_1.0"));
    }

    #[test]
    fn dot_versions_stay_inside_their_directory() {
        let obj = ObjectKey::from_rel_path(Path::new("libfoo.so.1"));
        assert_eq!(changelog_dir(&VersionId::new("..")), PathBuf::from("changelog/__"));
        assert_eq!(
            dump_dir(&VersionId::new("."), &obj),
            PathBuf::from("abi_dump/_").join(obj.as_str())
        );
        assert_eq!(
            pkg_diff_dir(&VersionId::new(".."), &VersionId::new("1.0")),
            PathBuf::from("pkg_diff/___to_1.0")
        );
    }
}
