//! Shared binary artifacts found under a version's installed tree.

use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Stable short key derived from a relative path (or a pair of them).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Derives the key of a single object from its relative path.
    pub fn from_rel_path(rel_path: &Path) -> Self {
        Self(ContentHash::from_bytes(normalized(rel_path).as_bytes()).short_hex())
    }

    /// Derives the key of a compared object pair from both relative paths.
    pub fn for_pair(old: &Path, new: &Path) -> Self {
        let joined = format!("{}\n{}", normalized(old), normalized(new));
        Self(ContentHash::from_bytes(joined.as_bytes()).short_hex())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectKey({})", self.0)
    }
}

/// Forward-slash form of a path so keys do not depend on the host separator.
fn normalized(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// One shared object under a version's installed root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectArtifact {
    /// Path relative to the installed root.
    pub rel_path: PathBuf,
    /// Declared shared-object name, if known.
    pub soname: Option<String>,
    /// Cache key derived from `rel_path`.
    pub key: ObjectKey,
}

impl ObjectArtifact {
    /// Creates an artifact with no known soname.
    pub fn new(rel_path: impl Into<PathBuf>) -> Self {
        let rel_path = rel_path.into();
        let key = ObjectKey::from_rel_path(&rel_path);
        Self {
            rel_path,
            soname: None,
            key,
        }
    }

    /// Sets the soname.
    pub fn with_soname(mut self, soname: impl Into<String>) -> Self {
        self.soname = Some(soname.into());
        self
    }

    /// Returns the object's file name, or the empty string for a bare root.
    pub fn file_name(&self) -> &str {
        self.rel_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_stable_and_short() {
        let a = ObjectKey::from_rel_path(Path::new("lib/libfoo.so.1"));
        let b = ObjectKey::from_rel_path(Path::new("lib/libfoo.so.1"));
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 12);
    }

    #[test]
    fn pair_key_depends_on_order() {
        let ab = ObjectKey::for_pair(Path::new("a.so"), Path::new("b.so"));
        let ba = ObjectKey::for_pair(Path::new("b.so"), Path::new("a.so"));
        assert_ne!(ab, ba);
    }

    #[test]
    fn artifact_file_name() {
        let obj = ObjectArtifact::new("lib/x86_64/libfoo.so.1.2").with_soname("libfoo.so.1");
        assert_eq!(obj.file_name(), "libfoo.so.1.2");
        assert_eq!(obj.soname.as_deref(), Some("libfoo.so.1"));
        assert_eq!(obj.key, ObjectKey::from_rel_path(Path::new("lib/x86_64/libfoo.so.1.2")));
    }
}
