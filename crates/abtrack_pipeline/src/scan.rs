//! Discovery of shared objects under an installed tree.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use abtrack_common::ObjectArtifact;
use regex::Regex;

static SHARED_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.so(\.[0-9]+)*$").expect("static pattern compiles"));
static KERNEL_MODULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.ko$").expect("static pattern compiles"));

/// Finds the shared objects under `installed`, sorted by relative path.
///
/// Only regular files count; symlinks (such as `libfoo.so -> libfoo.so.1`)
/// are skipped. Objects whose relative path matches one of `skip` are left
/// out.
pub fn scan_objects(
    installed: &Path,
    kernel: bool,
    skip: &[Regex],
) -> std::io::Result<Vec<ObjectArtifact>> {
    let pattern = if kernel { &*KERNEL_MODULE } else { &*SHARED_OBJECT };
    let mut found = Vec::new();
    walk_dir(installed, installed, pattern, &mut found)?;
    found.retain(|rel| {
        let text = rel_text(rel);
        !skip.iter().any(|re| re.is_match(&text))
    });
    found.sort();
    Ok(found.into_iter().map(ObjectArtifact::new).collect())
}

fn walk_dir(root: &Path, dir: &Path, pattern: &Regex, found: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();
        if file_type.is_dir() {
            walk_dir(root, &path, pattern, found)?;
        } else if file_type.is_file() {
            let name = entry.file_name();
            if pattern.is_match(&name.to_string_lossy()) {
                if let Ok(rel) = path.strip_prefix(root) {
                    found.push(rel.to_path_buf());
                }
            }
        }
    }
    Ok(())
}

/// Relative path with `/` separators, as skip patterns are written.
fn rel_text(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"\x7fELF").unwrap();
    }

    fn names(objects: &[ObjectArtifact]) -> Vec<String> {
        objects.iter().map(|o| rel_text(&o.rel_path)).collect()
    }

    #[test]
    fn finds_versioned_shared_objects() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "lib/libfoo.so.1.2");
        touch(dir.path(), "lib/libbar.so");
        touch(dir.path(), "lib/libbar.a");
        touch(dir.path(), "lib/libfoo.so.1.2.debug");
        touch(dir.path(), "include/foo.h");
        let objects = scan_objects(dir.path(), false, &[]).unwrap();
        assert_eq!(names(&objects), vec!["lib/libbar.so", "lib/libfoo.so.1.2"]);
    }

    #[cfg(unix)]
    #[test]
    fn skips_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "lib/libfoo.so.1");
        std::os::unix::fs::symlink("libfoo.so.1", dir.path().join("lib/libfoo.so")).unwrap();
        let objects = scan_objects(dir.path(), false, &[]).unwrap();
        assert_eq!(names(&objects), vec!["lib/libfoo.so.1"]);
    }

    #[test]
    fn kernel_mode_finds_modules() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "drivers/net/e1000e.ko");
        touch(dir.path(), "lib/libfoo.so.1");
        let objects = scan_objects(dir.path(), true, &[]).unwrap();
        assert_eq!(names(&objects), vec!["drivers/net/e1000e.ko"]);
    }

    #[test]
    fn skip_patterns_match_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "lib/libfoo.so.1");
        touch(dir.path(), "lib/plugins/libplug.so");
        let skip = vec![Regex::new("^lib/plugins/").unwrap()];
        let objects = scan_objects(dir.path(), false, &skip).unwrap();
        assert_eq!(names(&objects), vec!["lib/libfoo.so.1"]);
    }

    #[test]
    fn keys_are_stable() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "lib/libfoo.so.1");
        let a = scan_objects(dir.path(), false, &[]).unwrap();
        let b = scan_objects(dir.path(), false, &[]).unwrap();
        assert_eq!(a[0].key, b[0].key);
    }

    #[test]
    fn missing_root_is_error() {
        assert!(scan_objects(Path::new("/nonexistent/installed"), false, &[]).is_err());
    }
}
