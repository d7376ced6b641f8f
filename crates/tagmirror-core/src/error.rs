//! Error types for tagmirror core operations.
//!
//! Everything in this module is a load-time failure: a run never starts
//! while any of these are outstanding.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`ConfigError`] as the error type.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading and validating a mirroring configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("Failed to read configuration from {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration document is not valid YAML for the expected schema.
    #[error("Failed to parse configuration: {source}")]
    Parse {
        /// Underlying YAML error.
        #[source]
        source: serde_yaml::Error,
    },

    /// A mode string is not one of `highest`, `higher`, `semver`, `all`.
    #[error("Unknown mirroring mode '{mode}' for {scope}")]
    UnknownMode {
        /// Where the mode was configured (`default-mode` or `image '<name>'`).
        scope: String,
        /// The offending mode string.
        mode: String,
    },

    /// An `on-error` value is not one of `tag`, `image`, `run`.
    #[error("Unknown error scope '{value}', expected one of: tag, image, run")]
    UnknownErrorScope {
        /// The offending value.
        value: String,
    },

    /// `pinned-major` is not a non-negative integer.
    #[error("Invalid pinned-major '{value}' for image '{image}': expected a non-negative integer")]
    InvalidPinnedMajor {
        /// Image name.
        image: String,
        /// The offending value.
        value: String,
    },

    /// A required field is missing or empty.
    #[error("Image '{image}' is missing required field '{field}'")]
    MissingField {
        /// Image name.
        image: String,
        /// Field name.
        field: &'static str,
    },

    /// A repository string cannot be parsed.
    #[error("Invalid repository '{repository}': {reason}")]
    InvalidRepository {
        /// The offending repository string.
        repository: String,
        /// Reason it was rejected.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_unknown_mode() {
        let err = ConfigError::UnknownMode {
            scope: "default-mode".to_string(),
            mode: "bogus".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unknown mirroring mode 'bogus' for default-mode"
        );
    }

    #[test]
    fn test_error_display_pinned_major() {
        let err = ConfigError::InvalidPinnedMajor {
            image: "nginx".to_string(),
            value: "-1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid pinned-major '-1' for image 'nginx': expected a non-negative integer"
        );
    }

    #[test]
    fn test_error_display_missing_field() {
        let err = ConfigError::MissingField {
            image: "nginx".to_string(),
            field: "destination",
        };
        assert_eq!(
            err.to_string(),
            "Image 'nginx' is missing required field 'destination'"
        );
    }
}
