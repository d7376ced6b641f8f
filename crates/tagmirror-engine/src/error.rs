//! Error types for the engine crate.

use tagmirror_registry::{CredentialError, RegistryError};
use thiserror::Error;

use crate::report::RunReport;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Errors that end a mirroring run.
#[derive(Error, Debug)]
pub enum MirrorError {
    /// Credentials for a registry could not be resolved; nothing was mirrored.
    #[error("cannot resolve credentials for registry '{registry}': {source}")]
    Credential {
        /// Registry host.
        registry: String,
        /// Underlying error.
        #[source]
        source: CredentialError,
    },

    /// A registry failure stopped the run under the `run` error scope.
    #[error("mirror run aborted at image '{image}' tag '{tag}': {source}")]
    Aborted {
        /// Image being processed.
        image: String,
        /// Tag being processed, `-` for image-level failures.
        tag: String,
        /// Underlying error.
        #[source]
        source: RegistryError,
        /// Outcomes recorded up to and including the failure.
        report: Box<RunReport>,
    },
}

impl MirrorError {
    /// Returns the partial report of an aborted run.
    #[must_use]
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            Self::Aborted { report, .. } => Some(report),
            Self::Credential { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagmirror_registry::ProviderFamily;

    #[test]
    fn test_credential_error_display() {
        let err = MirrorError::Credential {
            registry: "example.azurecr.io".to_string(),
            source: CredentialError::MissingEnvironment {
                provider: ProviderFamily::Azure,
                variable: "AZURE_SP_ID".to_string(),
            },
        };
        assert_eq!(
            err.to_string(),
            "cannot resolve credentials for registry 'example.azurecr.io': \
             azure credentials require environment variable AZURE_SP_ID"
        );
        assert!(err.report().is_none());
    }

    #[test]
    fn test_aborted_carries_report() {
        let err = MirrorError::Aborted {
            image: "nginx".to_string(),
            tag: "1.25.3".to_string(),
            source: RegistryError::HttpError {
                status: 503,
                message: "unavailable".to_string(),
            },
            report: Box::new(RunReport::new()),
        };
        assert!(err.to_string().starts_with("mirror run aborted at image 'nginx' tag '1.25.3'"));
        assert!(err.report().is_some());
    }
}
