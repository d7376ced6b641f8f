//! Configuration types for the registry client.

use std::time::Duration;

/// Configuration for the HTTP registry client.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Time allowed to establish a connection.
    pub connect_timeout: Duration,

    /// Longest wait for the next chunk of a response.
    ///
    /// Bounds stalls, not transfers: a large blob may take far longer than
    /// this as long as data keeps arriving.
    pub read_timeout: Duration,

    /// User agent string.
    pub user_agent: String,

    /// Registry hosts reached over plain HTTP.
    pub insecure_registries: Vec<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryConfig {
    /// Creates a configuration with default settings.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use tagmirror_registry::RegistryConfig;
    ///
    /// let config = RegistryConfig::new();
    /// assert_eq!(config.connect_timeout, Duration::from_secs(30));
    /// assert_eq!(config.read_timeout, Duration::from_secs(60));
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            user_agent: format!("tagmirror/{}", env!("CARGO_PKG_VERSION")),
            insecure_registries: Vec::new(),
        }
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the read timeout.
    #[must_use]
    pub const fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Adds registry hosts that are served over plain HTTP.
    #[must_use]
    pub fn with_insecure_registries<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insecure_registries
            .extend(hosts.into_iter().map(Into::into));
        self
    }

    /// Returns true if `host` is reached over plain HTTP.
    ///
    /// Loopback registries always are.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagmirror_registry::RegistryConfig;
    ///
    /// let config = RegistryConfig::new().with_insecure_registries(["mirror.internal:5000"]);
    /// assert!(config.is_insecure("localhost:5000"));
    /// assert!(config.is_insecure("mirror.internal:5000"));
    /// assert!(!config.is_insecure("ghcr.io"));
    /// ```
    #[must_use]
    pub fn is_insecure(&self, host: &str) -> bool {
        let hostname = if host.starts_with('[') {
            host.split_once(']').map_or(host, |(h, _)| h).trim_start_matches('[')
        } else {
            host.split(':').next().unwrap_or(host)
        };

        matches!(hostname, "localhost" | "127.0.0.1" | "::1")
            || self.insecure_registries.iter().any(|h| h == host)
    }

    /// Returns the URL scheme for `host`.
    #[must_use]
    pub fn scheme(&self, host: &str) -> &'static str {
        if self.is_insecure(host) {
            "http"
        } else {
            "https"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new() {
        let config = RegistryConfig::new();
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.read_timeout, Duration::from_secs(60));
        assert!(config.user_agent.starts_with("tagmirror/"));
        assert!(config.insecure_registries.is_empty());
    }

    #[test]
    fn test_config_with_timeouts() {
        let config = RegistryConfig::new()
            .with_connect_timeout(Duration::from_secs(2))
            .with_read_timeout(Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.read_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_loopback_is_insecure() {
        let config = RegistryConfig::new();
        assert!(config.is_insecure("localhost"));
        assert!(config.is_insecure("127.0.0.1:5000"));
        assert!(config.is_insecure("[::1]:5000"));
        assert_eq!(config.scheme("localhost:5000"), "http");
    }

    #[test]
    fn test_listed_host_is_insecure() {
        let config = RegistryConfig::new().with_insecure_registries(["mirror.internal:5000"]);
        assert!(config.is_insecure("mirror.internal:5000"));
        assert!(!config.is_insecure("mirror.internal"));
        assert_eq!(config.scheme("registry.example.com"), "https");
    }
}
