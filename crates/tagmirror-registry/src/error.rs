//! Error types for registry operations and credential resolution.

use thiserror::Error;

use crate::auth::ProviderFamily;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Failed to connect to registry.
    #[error("Failed to connect to registry at {url}: {source}")]
    ConnectionFailed {
        /// Registry URL.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// Manifest or repository not found.
    #[error("Not found: {reference}")]
    NotFound {
        /// Reference that was looked up.
        reference: String,
    },

    /// Authentication failed.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        /// Error message.
        message: String,
    },

    /// HTTP error from registry.
    #[error("HTTP error from registry: {status} - {message}")]
    HttpError {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {source}")]
    JsonError {
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Tag listing pagination points back at a page already read.
    #[error("Tag listing for {repository} loops back to {url}")]
    PaginationLoop {
        /// Repository being listed.
        repository: String,
        /// Page URL seen twice.
        url: String,
    },

    /// Invalid URL.
    #[error("Invalid URL: {url}")]
    InvalidUrl {
        /// URL string.
        url: String,
    },

    /// Manifest media type that cannot be mirrored.
    #[error("Unsupported manifest type '{media_type}' for {reference}")]
    UnsupportedManifest {
        /// Reference that was fetched.
        reference: String,
        /// Media type returned by the registry.
        media_type: String,
    },

    /// Manifest body could not be interpreted.
    #[error("Invalid manifest for {reference}: {message}")]
    InvalidManifest {
        /// Reference that was fetched.
        reference: String,
        /// Error message.
        message: String,
    },

    /// Content does not match the digest it was addressed by.
    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        /// Expected digest.
        expected: String,
        /// Computed digest.
        actual: String,
    },

    /// Blob upload failed.
    #[error("Failed to upload blob {digest}: {message}")]
    UploadFailed {
        /// Blob digest.
        digest: String,
        /// Error message.
        message: String,
    },

    /// Manifest push failed.
    #[error("Failed to push manifest for {reference}: {message}")]
    ManifestPushFailed {
        /// Target reference.
        reference: String,
        /// Error message.
        message: String,
    },
}

impl RegistryError {
    /// Returns true for the not-found signal.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::ConnectionFailed {
                url: err
                    .url()
                    .map_or_else(|| "unknown".to_string(), ToString::to_string),
                source: err,
            }
        } else {
            let status = err.status().map_or(0, |s| s.as_u16());
            Self::HttpError {
                status,
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError { source: err }
    }
}

/// Errors that can occur while resolving registry credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// A required environment variable is not set.
    #[error("{provider} credentials require environment variable {variable}")]
    MissingEnvironment {
        /// Provider family.
        provider: ProviderFamily,
        /// Variable name.
        variable: String,
    },

    /// The provider's credential source failed.
    #[error("{provider} credentials unavailable: {message}")]
    Unavailable {
        /// Provider family.
        provider: ProviderFamily,
        /// Error message.
        message: String,
    },

    /// No provider is registered for a family the dispatch rules selected.
    #[error("No credential provider registered for {provider}")]
    NoProvider {
        /// Provider family.
        provider: ProviderFamily,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = RegistryError::NotFound {
            reference: "ghcr.io/org/app:1.2.0".to_string(),
        };
        assert_eq!(err.to_string(), "Not found: ghcr.io/org/app:1.2.0");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_error_display_http() {
        let err = RegistryError::HttpError {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error from registry: 503 - unavailable");
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_credential_error_display() {
        let err = CredentialError::MissingEnvironment {
            provider: ProviderFamily::Azure,
            variable: "AZURE_SP_ID".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "azure credentials require environment variable AZURE_SP_ID"
        );
    }
}
