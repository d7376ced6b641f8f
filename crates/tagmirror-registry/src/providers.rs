//! Credential providers for cloud registries.
//!
//! Each provider reads its secrets from the process environment or a local
//! credential source, never from the mirroring configuration.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_ecr::error::DisplayErrorContext;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use gcp_auth::{CustomServiceAccount, TokenProvider};
use tracing::debug;

use crate::auth::{Credential, ProviderFamily};
use crate::error::CredentialError;

/// Source of credentials for one provider family.
#[async_trait]
pub trait CredentialProvider: Send + Sync + std::fmt::Debug {
    /// Family this provider serves.
    fn family(&self) -> ProviderFamily;

    /// Produces credentials for `host`.
    async fn resolve(&self, host: &str) -> Result<Credential, CredentialError>;
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Username Google registries expect alongside an OAuth access token.
pub const GOOGLE_TOKEN_USERNAME: &str = "oauth2accesstoken";

/// OAuth scope requested for Google registry tokens.
pub const GOOGLE_CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Google Container Registry / Artifact Registry credentials.
///
/// Resolution order:
///
/// 1. An access token in `GOOGLE_OAUTH_ACCESS_TOKEN`
/// 2. A service account key file set with [`GoogleProvider::with_key_file`]
/// 3. Application default credentials: the key file named by
///    `GOOGLE_APPLICATION_CREDENTIALS`, the gcloud default credentials file,
///    the GCE metadata server, then the gcloud CLI
#[derive(Debug, Clone)]
pub struct GoogleProvider {
    token_variable: String,
    key_file: Option<PathBuf>,
    default_chain: bool,
}

impl Default for GoogleProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl GoogleProvider {
    /// Creates a provider using the full resolution order.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token_variable: "GOOGLE_OAUTH_ACCESS_TOKEN".to_string(),
            key_file: None,
            default_chain: true,
        }
    }

    /// Reads the token from a different environment variable.
    #[must_use]
    pub fn with_token_variable(mut self, name: impl Into<String>) -> Self {
        self.token_variable = name.into();
        self
    }

    /// Uses a service account key file instead of application default credentials.
    #[must_use]
    pub fn with_key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_file = Some(path.into());
        self
    }

    /// Disables application default credentials.
    #[must_use]
    pub const fn without_default_chain(mut self) -> Self {
        self.default_chain = false;
        self
    }

    fn unavailable(error: &gcp_auth::Error) -> CredentialError {
        CredentialError::Unavailable {
            provider: ProviderFamily::Google,
            message: error.to_string(),
        }
    }

    async fn token_provider(&self) -> Result<Arc<dyn TokenProvider>, CredentialError> {
        if let Some(path) = &self.key_file {
            debug!(path = %path.display(), "Loading Google service account key");
            let account = CustomServiceAccount::from_file(path)
                .map_err(|e| Self::unavailable(&e))?;
            return Ok(Arc::new(account));
        }

        if !self.default_chain {
            return Err(CredentialError::MissingEnvironment {
                provider: ProviderFamily::Google,
                variable: self.token_variable.clone(),
            });
        }

        debug!("Looking up Google application default credentials");
        gcp_auth::provider().await.map_err(|e| Self::unavailable(&e))
    }
}

#[async_trait]
impl CredentialProvider for GoogleProvider {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Google
    }

    async fn resolve(&self, _host: &str) -> Result<Credential, CredentialError> {
        if let Some(token) = env_var(&self.token_variable) {
            return Ok(Credential::basic(GOOGLE_TOKEN_USERNAME, token));
        }

        let provider = self.token_provider().await?;
        let token = provider
            .token(&[GOOGLE_CLOUD_PLATFORM_SCOPE])
            .await
            .map_err(|e| Self::unavailable(&e))?;
        Ok(Credential::basic(GOOGLE_TOKEN_USERNAME, token.as_str()))
    }
}

/// Amazon ECR credentials from `GetAuthorizationToken`.
///
/// AWS credentials come from the SDK default chain: `AWS_ACCESS_KEY_ID` and
/// `AWS_SECRET_ACCESS_KEY`, shared profiles, web identity or instance
/// metadata. The region is taken from the registry host, else from the chain.
#[derive(Debug, Clone, Default)]
pub struct EcrProvider {
    client_config: Option<aws_sdk_ecr::Config>,
}

impl EcrProvider {
    /// Creates a provider using the SDK default chain.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            client_config: None,
        }
    }

    /// Uses a fixed ECR client configuration instead of the default chain.
    #[must_use]
    pub fn with_client_config(mut self, config: aws_sdk_ecr::Config) -> Self {
        self.client_config = Some(config);
        self
    }

    /// Extracts the region from `<account>.dkr.ecr.<region>.amazonaws.com`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagmirror_registry::EcrProvider;
    ///
    /// assert_eq!(
    ///     EcrProvider::region_from_host("123456789012.dkr.ecr.eu-west-1.amazonaws.com"),
    ///     Some("eu-west-1")
    /// );
    /// assert_eq!(EcrProvider::region_from_host("ghcr.io"), None);
    /// ```
    #[must_use]
    pub fn region_from_host(host: &str) -> Option<&str> {
        let (_, rest) = host.split_once(".dkr.ecr.")?;
        let region = rest.split('.').next()?;
        (!region.is_empty()).then_some(region)
    }

    /// Decodes a base64 `user:password` authorization token.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Unavailable`] if the token is not valid
    /// base64 or has no `:` separator.
    pub fn decode_authorization_token(token: &str) -> Result<Credential, CredentialError> {
        let unavailable = |message: &str| CredentialError::Unavailable {
            provider: ProviderFamily::Ecr,
            message: message.to_string(),
        };

        let decoded = BASE64
            .decode(token.trim())
            .map_err(|_| unavailable("authorization token is not valid base64"))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|_| unavailable("authorization token is not valid UTF-8"))?;
        let (username, password) = decoded
            .split_once(':')
            .ok_or_else(|| unavailable("authorization token has no user:password pair"))?;
        Ok(Credential::basic(username, password))
    }

    async fn client(&self, host: &str) -> Result<aws_sdk_ecr::Client, CredentialError> {
        if let Some(config) = &self.client_config {
            return Ok(aws_sdk_ecr::Client::from_conf(config.clone()));
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = Self::region_from_host(host) {
            loader = loader.region(Region::new(region.to_string()));
        }
        let sdk_config = loader.load().await;
        if sdk_config.region().is_none() {
            return Err(CredentialError::MissingEnvironment {
                provider: ProviderFamily::Ecr,
                variable: "AWS_REGION".to_string(),
            });
        }

        Ok(aws_sdk_ecr::Client::new(&sdk_config))
    }
}

#[async_trait]
impl CredentialProvider for EcrProvider {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Ecr
    }

    async fn resolve(&self, host: &str) -> Result<Credential, CredentialError> {
        let client = self.client(host).await?;
        debug!(host, "Requesting ECR authorization token");

        let output = client
            .get_authorization_token()
            .send()
            .await
            .map_err(|e| CredentialError::Unavailable {
                provider: ProviderFamily::Ecr,
                message: DisplayErrorContext(&e).to_string(),
            })?;

        let token = output
            .authorization_data()
            .iter()
            .find_map(|data| data.authorization_token())
            .ok_or_else(|| CredentialError::Unavailable {
                provider: ProviderFamily::Ecr,
                message: "no authorization data returned".to_string(),
            })?;

        Self::decode_authorization_token(token)
    }
}

/// Azure Container Registry service principal credentials.
#[derive(Debug, Clone)]
pub struct AzureProvider {
    id_variable: String,
    password_variable: String,
}

impl Default for AzureProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl AzureProvider {
    /// Creates a provider reading `AZURE_SP_ID` and `AZURE_SP_PASSWORD`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_variables("AZURE_SP_ID", "AZURE_SP_PASSWORD")
    }

    /// Creates a provider reading the given variables.
    #[must_use]
    pub fn with_variables(id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            id_variable: id.into(),
            password_variable: password.into(),
        }
    }

    fn required(name: &str) -> Result<String, CredentialError> {
        env_var(name).ok_or_else(|| CredentialError::MissingEnvironment {
            provider: ProviderFamily::Azure,
            variable: name.to_string(),
        })
    }
}

#[async_trait]
impl CredentialProvider for AzureProvider {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Azure
    }

    async fn resolve(&self, _host: &str) -> Result<Credential, CredentialError> {
        let username = Self::required(&self.id_variable)?;
        let password = Self::required(&self.password_variable)?;
        Ok(Credential::basic(username, password))
    }
}
