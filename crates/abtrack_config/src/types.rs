//! Profile types deserialized from TOML or JSON.

use serde::Deserialize;
use std::time::Duration;

/// Default cache directory, relative to the profile's directory.
pub const DEFAULT_CACHE_DIR: &str = "abtrack-cache";

/// Default per-invocation tool timeout in seconds.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 600;

/// The top-level profile.
#[derive(Debug, Deserialize)]
pub struct Profile {
    /// Library identity and global filters.
    pub library: LibrarySection,
    /// Run settings (cache location, timeouts, parallelism).
    #[serde(default)]
    pub settings: Settings,
    /// Versions, newest first. Order defines adjacency.
    #[serde(default)]
    pub versions: Vec<VersionEntry>,
}

/// Library identity and global flags.
#[derive(Debug, Deserialize)]
pub struct LibrarySection {
    /// Library name; also namespaces the cache.
    pub name: String,
    /// Source control kind of the live checkout.
    #[serde(default)]
    pub scm: ScmKind,
    /// Include private (non-exported) symbols in dumps.
    #[serde(default)]
    pub private_symbols: bool,
    /// Kernel-module mode: track `*.ko` instead of `*.so*`.
    #[serde(default)]
    pub kernel: bool,
    /// Regular expressions; matching object paths are ignored.
    #[serde(default)]
    pub skip_objects: Vec<String>,
    /// Regular expressions; matching headers are excluded from header diffs.
    #[serde(default)]
    pub skip_headers: Vec<String>,
}

/// Source control kind for the `current` version.
#[derive(Debug, Default, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScmKind {
    /// Git working copy.
    Git,
    /// Subversion working copy.
    Svn,
    /// No source control; the live version has no upstream marker.
    #[default]
    None,
}

/// Run settings.
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Cache root, relative to the profile's directory unless absolute.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    /// Timeout for every external tool invocation; `0` disables it.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// Worker threads for dump and compare fan-out; `0` uses all cores.
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

impl Settings {
    /// Per-invocation tool timeout, `None` when disabled.
    pub fn tool_timeout(&self) -> Option<Duration> {
        match self.tool_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            tool_timeout_secs: default_tool_timeout_secs(),
            jobs: default_jobs(),
        }
    }
}

fn default_cache_dir() -> String {
    DEFAULT_CACHE_DIR.to_string()
}

fn default_tool_timeout_secs() -> u64 {
    DEFAULT_TOOL_TIMEOUT_SECS
}

fn default_jobs() -> usize {
    1
}

/// One entry of the profile's version array.
#[derive(Debug, Deserialize)]
pub struct VersionEntry {
    /// Version identifier, or `"current"` for the live checkout.
    pub number: String,
    /// Source archive or working-copy path.
    pub source: String,
    /// Installed tree with the built shared objects.
    #[serde(default)]
    pub installed: Option<String>,
    /// Extract the changelog.
    #[serde(default)]
    pub changelog: bool,
    /// Diff public headers against the previous version.
    #[serde(default)]
    pub headers_diff: bool,
    /// Diff the source package against the previous version.
    #[serde(default)]
    pub pkg_diff: bool,
}
