//! File hashing and input fingerprints.
//!
//! Dump files are hashed when recorded so that comparisons and the timeline
//! can tell whether the artifacts they were derived from have changed since.

use std::path::Path;

use abtrack_common::ContentHash;

use crate::error::CacheError;

/// Utility for hashing artifact files and combining hashes into fingerprints.
pub struct FileHasher;

impl FileHasher {
    /// Computes the content hash of a single file.
    pub fn hash_file(path: &Path) -> Result<ContentHash, CacheError> {
        let content = std::fs::read(path).map_err(|e| CacheError::io(path, e))?;
        Ok(ContentHash::from_bytes(&content))
    }

    /// Combines an ordered sequence of hashes into one fingerprint.
    ///
    /// `None` entries (inputs without a recorded hash) contribute a fixed
    /// marker so that a missing input never collides with a present one.
    pub fn fingerprint<'a>(parts: impl IntoIterator<Item = Option<&'a ContentHash>>) -> ContentHash {
        let mut buf = Vec::new();
        for part in parts {
            match part {
                Some(hash) => {
                    buf.push(1u8);
                    buf.extend_from_slice(hash.as_bytes());
                }
                None => buf.push(0u8),
            }
        }
        ContentHash::from_bytes(&buf)
    }

    /// Fingerprints a sequence of strings.
    pub fn fingerprint_strs<'a>(parts: impl IntoIterator<Item = &'a str>) -> ContentHash {
        let mut buf = Vec::new();
        for part in parts {
            buf.extend_from_slice(part.as_bytes());
            buf.push(0);
        }
        ContentHash::from_bytes(&buf)
    }
}
