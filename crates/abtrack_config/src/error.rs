//! Error types for profile loading and validation.

/// Errors that can occur when loading or validating a profile.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading the profile.
    #[error("failed to read profile: {0}")]
    IoError(#[from] std::io::Error),

    /// The profile content could not be parsed.
    #[error("failed to parse profile: {0}")]
    ParseError(String),

    /// A version named on the command line does not exist in the profile.
    #[error("unknown version '{0}'")]
    UnknownVersion(String),

    /// A required field is missing or empty.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// A profile value failed validation.
    #[error("validation error: {0}")]
    ValidationError(String),
}
