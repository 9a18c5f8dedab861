//! Profile file loading and validation.

use crate::error::ConfigError;
use crate::types::Profile;
use abtrack_common::CURRENT;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;

/// Serialization format of a profile file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProfileFormat {
    /// TOML (the default).
    Toml,
    /// JSON, selected by a `.json` extension.
    Json,
}

impl ProfileFormat {
    /// Picks the format from a file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ProfileFormat::Json,
            _ => ProfileFormat::Toml,
        }
    }
}

/// Loads and validates a profile file.
pub fn load_profile(path: &Path) -> Result<Profile, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_profile_from_str(&content, ProfileFormat::from_path(path))
}

/// Parses and validates a profile from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_profile_from_str(content: &str, format: ProfileFormat) -> Result<Profile, ConfigError> {
    let profile: Profile = match format {
        ProfileFormat::Toml => {
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?
        }
        ProfileFormat::Json => {
            serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?
        }
    };
    validate_profile(&profile)?;
    Ok(profile)
}

/// Validates required fields, version identity, and filter patterns.
fn validate_profile(profile: &Profile) -> Result<(), ConfigError> {
    if profile.library.name.trim().is_empty() {
        return Err(ConfigError::MissingField("library.name".to_string()));
    }
    // The name doubles as the cache namespace directory.
    if profile.library.name.contains(['/', '\\']) || profile.library.name.starts_with('.') {
        return Err(ConfigError::ValidationError(format!(
            "library name '{}' is not usable as a directory name",
            profile.library.name
        )));
    }
    if profile.versions.is_empty() {
        return Err(ConfigError::MissingField("versions".to_string()));
    }

    let mut seen = BTreeSet::new();
    for (index, entry) in profile.versions.iter().enumerate() {
        if entry.number.trim().is_empty() {
            return Err(ConfigError::MissingField(format!("versions[{index}].number")));
        }
        if entry.source.trim().is_empty() {
            return Err(ConfigError::MissingField(format!("versions[{index}].source")));
        }
        // Version numbers name artifact directories.
        if matches!(entry.number.as_str(), "." | "..") {
            return Err(ConfigError::ValidationError(format!(
                "version '{}' is not usable as a directory name",
                entry.number
            )));
        }
        if !seen.insert(entry.number.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "version '{}' is listed more than once",
                entry.number
            )));
        }
        if entry.number == CURRENT && index != 0 {
            return Err(ConfigError::ValidationError(
                "'current' must be the first (newest) version".to_string(),
            ));
        }
    }

    for pattern in profile
        .library
        .skip_objects
        .iter()
        .chain(&profile.library.skip_headers)
    {
        Regex::new(pattern).map_err(|e| {
            ConfigError::ValidationError(format!("invalid skip pattern '{pattern}': {e}"))
        })?;
    }
    Ok(())
}
