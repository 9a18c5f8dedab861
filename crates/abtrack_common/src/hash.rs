//! Content hashing for cache keys and change detection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of bytes kept by [`ContentHash::short_hex`] (12 hex digits).
const SHORT_BYTES: usize = 6;

/// A 128-bit content hash computed using XXH3.
///
/// Two inputs with the same `ContentHash` are assumed to be identical. Used to
/// derive stable artifact keys from relative paths and to fingerprint the
/// inputs of derived artifacts (dump files feeding a comparison, records
/// feeding the timeline).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Computes a content hash from a byte slice using XXH3-128.
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = xxhash_rust::xxh3::xxh3_128(data);
        Self(hash.to_le_bytes())
    }

    /// Returns the raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Returns the leading hex digits of the hash.
    ///
    /// Truncation makes collisions possible but they are confined to a single
    /// library's namespace, where a collision only overwrites a cache entry.
    pub fn short_hex(&self) -> String {
        self.0[..SHORT_BYTES]
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}
