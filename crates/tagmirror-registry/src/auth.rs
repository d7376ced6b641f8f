//! Credential dispatch and caching.
//!
//! Every registry host is mapped to a [`ProviderFamily`] by an ordered list of
//! substring rules; the first rule whose pattern occurs in the host wins. The
//! [`AuthResolver`] asks the family's [`CredentialProvider`] once per run and
//! caches the result.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::CredentialError;
use crate::providers::{AzureProvider, CredentialProvider, EcrProvider, GoogleProvider};

/// Credentials presented to a registry.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Credential {
    /// No credentials.
    #[default]
    Anonymous,

    /// Username and password.
    Basic {
        /// Username.
        username: String,
        /// Password or token.
        password: String,
    },

    /// Pre-issued bearer token.
    Bearer {
        /// Token value.
        token: String,
    },
}

impl Credential {
    /// Creates Basic credentials.
    #[must_use]
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Creates Bearer credentials.
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    /// Returns true for anonymous access.
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

/// Family of credential provider a registry host belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderFamily {
    /// No credentials.
    Anonymous,
    /// Google Container Registry and Artifact Registry.
    Google,
    /// Amazon Elastic Container Registry.
    Ecr,
    /// Azure Container Registry.
    Azure,
}

impl ProviderFamily {
    /// Returns the lowercase family name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Google => "google",
            Self::Ecr => "ecr",
            Self::Azure => "azure",
        }
    }
}

impl fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps hosts containing `pattern` to `family`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRule {
    /// Substring looked for in the registry host.
    pub pattern: String,
    /// Family selected on a match.
    pub family: ProviderFamily,
}

impl DispatchRule {
    /// Creates a rule.
    #[must_use]
    pub fn new(pattern: impl Into<String>, family: ProviderFamily) -> Self {
        Self {
            pattern: pattern.into(),
            family,
        }
    }

    /// Returns true if the rule applies to `host`.
    #[must_use]
    pub fn matches(&self, host: &str) -> bool {
        host.contains(&self.pattern)
    }
}

/// Returns the built-in dispatch rules in evaluation order.
#[must_use]
pub fn default_rules() -> Vec<DispatchRule> {
    vec![
        DispatchRule::new("gcr.io", ProviderFamily::Google),
        DispatchRule::new("pkg.dev", ProviderFamily::Google),
        DispatchRule::new("dkr.ecr", ProviderFamily::Ecr),
        DispatchRule::new("azurecr.io", ProviderFamily::Azure),
    ]
}

/// Resolves and caches credentials for registry hosts.
///
/// Credentials are cached per provider family for the lifetime of the
/// resolver and never refreshed.
///
/// # Examples
///
/// ```
/// use tagmirror_registry::{AuthResolver, ProviderFamily};
///
/// let resolver = AuthResolver::new();
/// assert_eq!(resolver.family_for("eu.gcr.io"), ProviderFamily::Google);
/// assert_eq!(resolver.family_for("ghcr.io"), ProviderFamily::Anonymous);
/// ```
pub struct AuthResolver {
    rules: Vec<DispatchRule>,
    providers: HashMap<ProviderFamily, Arc<dyn CredentialProvider>>,
    cache: Mutex<HashMap<ProviderFamily, Credential>>,
}

impl fmt::Debug for AuthResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthResolver")
            .field("rules", &self.rules)
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Default for AuthResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthResolver {
    /// Creates a resolver with the built-in rules and providers.
    #[must_use]
    pub fn new() -> Self {
        Self::empty()
            .with_provider(Arc::new(GoogleProvider::new()))
            .with_provider(Arc::new(EcrProvider::new()))
            .with_provider(Arc::new(AzureProvider::new()))
    }

    /// Creates a resolver with the built-in rules and no providers.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            rules: default_rules(),
            providers: HashMap::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the dispatch rules.
    #[must_use]
    pub fn with_rules(mut self, rules: Vec<DispatchRule>) -> Self {
        self.rules = rules;
        self
    }

    /// Registers a provider for its family, replacing any previous one.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.providers.insert(provider.family(), provider);
        self
    }

    /// Returns the family the first matching rule selects for `host`.
    #[must_use]
    pub fn family_for(&self, host: &str) -> ProviderFamily {
        self.rules
            .iter()
            .find(|rule| rule.matches(host))
            .map_or(ProviderFamily::Anonymous, |rule| rule.family)
    }

    /// Resolves credentials for `host`.
    ///
    /// The first successful resolution for a family is reused for every
    /// later host of the same family.
    ///
    /// # Errors
    ///
    /// Returns an error if the family's provider is missing or fails.
    pub async fn resolve(&self, host: &str) -> Result<Credential, CredentialError> {
        let family = self.family_for(host);
        if family == ProviderFamily::Anonymous {
            return Ok(Credential::Anonymous);
        }

        // Held across the provider call so concurrent callers resolve once.
        let mut cache = self.cache.lock().await;
        if let Some(credential) = cache.get(&family) {
            return Ok(credential.clone());
        }

        let provider = self
            .providers
            .get(&family)
            .ok_or(CredentialError::NoProvider { provider: family })?;

        debug!(host, provider = %family, "Resolving registry credentials");
        let credential = provider.resolve(host).await?;
        cache.insert(family, credential.clone());
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct CountingProvider {
        family: ProviderFamily,
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingProvider {
        fn new(family: ProviderFamily) -> Arc<Self> {
            Arc::new(Self {
                family,
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing(family: ProviderFamily) -> Arc<Self> {
            Arc::new(Self {
                family,
                calls: AtomicUsize::new(0),
                fail: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CredentialProvider for CountingProvider {
        fn family(&self) -> ProviderFamily {
            self.family
        }

        async fn resolve(&self, host: &str) -> Result<Credential, CredentialError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CredentialError::Unavailable {
                    provider: self.family,
                    message: "boom".to_string(),
                });
            }
            Ok(Credential::basic(format!("{}-{n}", self.family), host))
        }
    }

    #[test]
    fn test_default_dispatch() {
        let resolver = AuthResolver::empty();
        assert_eq!(resolver.family_for("gcr.io"), ProviderFamily::Google);
        assert_eq!(resolver.family_for("eu.gcr.io"), ProviderFamily::Google);
        assert_eq!(
            resolver.family_for("europe-docker.pkg.dev"),
            ProviderFamily::Google
        );
        assert_eq!(
            resolver.family_for("123456789012.dkr.ecr.eu-west-1.amazonaws.com"),
            ProviderFamily::Ecr
        );
        assert_eq!(
            resolver.family_for("myregistry.azurecr.io"),
            ProviderFamily::Azure
        );
        assert_eq!(resolver.family_for("docker.io"), ProviderFamily::Anonymous);
        assert_eq!(
            resolver.family_for("localhost:5000"),
            ProviderFamily::Anonymous
        );
    }

    #[test]
    fn test_first_rule_wins() {
        // Both patterns occur; the earlier rule decides.
        let resolver = AuthResolver::empty();
        assert_eq!(
            resolver.family_for("gcr.io.azurecr.io"),
            ProviderFamily::Google
        );

        let resolver = AuthResolver::empty().with_rules(vec![
            DispatchRule::new("azurecr.io", ProviderFamily::Azure),
            DispatchRule::new("gcr.io", ProviderFamily::Google),
        ]);
        assert_eq!(
            resolver.family_for("gcr.io.azurecr.io"),
            ProviderFamily::Azure
        );
    }

    #[tokio::test]
    async fn test_anonymous_never_calls_provider() {
        let provider = CountingProvider::new(ProviderFamily::Anonymous);
        let resolver = AuthResolver::empty().with_provider(provider.clone());

        let credential = resolver.resolve("ghcr.io").await.unwrap();
        assert!(credential.is_anonymous());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_credentials_cached_per_family() {
        let google = CountingProvider::new(ProviderFamily::Google);
        let resolver = AuthResolver::empty().with_provider(google.clone());

        let first = resolver.resolve("gcr.io").await.unwrap();
        let second = resolver.resolve("europe-docker.pkg.dev").await.unwrap();

        assert_eq!(google.calls(), 1);
        assert_eq!(first, second);
        assert_eq!(first, Credential::basic("google-0", "gcr.io"));
    }

    #[tokio::test]
    async fn test_families_cached_independently() {
        let google = CountingProvider::new(ProviderFamily::Google);
        let azure = CountingProvider::new(ProviderFamily::Azure);
        let resolver = AuthResolver::empty()
            .with_provider(google.clone())
            .with_provider(azure.clone());

        resolver.resolve("gcr.io").await.unwrap();
        resolver.resolve("a.azurecr.io").await.unwrap();
        resolver.resolve("b.azurecr.io").await.unwrap();

        assert_eq!(google.calls(), 1);
        assert_eq!(azure.calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let ecr = CountingProvider::failing(ProviderFamily::Ecr);
        let resolver = AuthResolver::empty().with_provider(ecr.clone());
        let host = "1.dkr.ecr.us-east-1.amazonaws.com";

        assert!(resolver.resolve(host).await.is_err());
        assert!(resolver.resolve(host).await.is_err());
        assert_eq!(ecr.calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_provider() {
        let resolver = AuthResolver::empty();
        let err = resolver.resolve("gcr.io").await.unwrap_err();
        assert!(matches!(
            err,
            CredentialError::NoProvider {
                provider: ProviderFamily::Google
            }
        ));
    }

    #[test]
    fn test_credential_debug_redacts_secrets() {
        let basic = format!("{:?}", Credential::basic("AWS", "hunter2"));
        assert!(basic.contains("AWS"));
        assert!(!basic.contains("hunter2"));

        let bearer = format!("{:?}", Credential::bearer("tok3n"));
        assert!(!bearer.contains("tok3n"));
    }
}
