//! Registry authentication challenges and bearer token caching.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Deserialize;

/// A parsed `WWW-Authenticate` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    /// Send Basic credentials directly.
    Basic,

    /// Exchange credentials for a token at `realm`.
    Bearer {
        /// Token endpoint.
        realm: String,
        /// Service name to request the token for.
        service: Option<String>,
        /// Scope the registry asked for.
        scope: Option<String>,
    },
}

impl Challenge {
    /// Parses a `WWW-Authenticate` header value.
    ///
    /// Returns `None` for unknown schemes and Bearer challenges without a realm.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagmirror_registry::Challenge;
    ///
    /// let challenge = Challenge::parse(
    ///     r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/nginx:pull""#,
    /// );
    /// assert!(matches!(challenge, Some(Challenge::Bearer { .. })));
    /// ```
    #[must_use]
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, rest) = header.split_once(' ').unwrap_or((header, ""));

        if scheme.eq_ignore_ascii_case("basic") {
            return Some(Self::Basic);
        }
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let mut params = parse_params(rest);
        let realm = params.remove("realm")?;
        Some(Self::Bearer {
            realm,
            service: params.remove("service"),
            scope: params.remove("scope"),
        })
    }
}

/// Splits `key="value", key=value` pairs; commas inside quotes are kept.
fn parse_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.next_if(|c| *c == ',' || c.is_whitespace()).is_some() {}

        let key: String = std::iter::from_fn(|| chars.next_if(|c| *c != '=' && *c != ','))
            .collect();
        if key.is_empty() {
            break;
        }
        if chars.next_if_eq(&'=').is_none() {
            continue;
        }

        let value: String = if chars.next_if_eq(&'"').is_some() {
            let mut value = String::new();
            while let Some(c) = chars.next() {
                match c {
                    '"' => break,
                    '\\' => value.extend(chars.next()),
                    c => value.push(c),
                }
            }
            value
        } else {
            std::iter::from_fn(|| chars.next_if(|c| *c != ',')).collect()
        };

        params.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    params
}

/// Body returned by a token endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

impl TokenResponse {
    pub(crate) fn into_token(self) -> Option<String> {
        self.token
            .or(self.access_token)
            .filter(|t| !t.is_empty())
    }
}

/// Bearer tokens keyed by registry host and scope, valid for one run.
#[derive(Debug, Default)]
pub struct TokenCache {
    tokens: Mutex<HashMap<(String, String), String>>,
}

impl TokenCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached token for `host` and `scope`.
    #[must_use]
    pub fn get(&self, host: &str, scope: &str) -> Option<String> {
        self.tokens
            .lock()
            .get(&(host.to_string(), scope.to_string()))
            .cloned()
    }

    /// Stores a token.
    pub fn insert(&self, host: &str, scope: &str, token: String) {
        self.tokens
            .lock()
            .insert((host.to_string(), scope.to_string()), token);
    }

    /// Drops a token the registry rejected.
    pub fn invalidate(&self, host: &str, scope: &str) {
        self.tokens
            .lock()
            .remove(&(host.to_string(), scope.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bearer_challenge() {
        let challenge = Challenge::parse(
            r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/nginx:pull""#,
        )
        .unwrap();

        assert_eq!(
            challenge,
            Challenge::Bearer {
                realm: "https://auth.docker.io/token".to_string(),
                service: Some("registry.docker.io".to_string()),
                scope: Some("repository:library/nginx:pull".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_scope_with_commas() {
        let challenge = Challenge::parse(
            r#"Bearer realm="https://ghcr.io/token", scope="repository:org/app:pull,push""#,
        )
        .unwrap();

        let Challenge::Bearer { scope, service, .. } = challenge else {
            panic!("expected bearer challenge");
        };
        assert_eq!(scope.as_deref(), Some("repository:org/app:pull,push"));
        assert!(service.is_none());
    }

    #[test]
    fn test_parse_basic_challenge() {
        assert_eq!(
            Challenge::parse(r#"Basic realm="Registry Realm""#),
            Some(Challenge::Basic)
        );
    }

    #[test]
    fn test_parse_unknown_or_incomplete() {
        assert_eq!(Challenge::parse("Negotiate"), None);
        assert_eq!(Challenge::parse(r#"Bearer service="x""#), None);
    }

    #[test]
    fn test_token_response() {
        let body: TokenResponse = serde_json::from_str(r#"{"token":"abc"}"#).unwrap();
        assert_eq!(body.into_token().as_deref(), Some("abc"));

        let body: TokenResponse = serde_json::from_str(r#"{"access_token":"xyz"}"#).unwrap();
        assert_eq!(body.into_token().as_deref(), Some("xyz"));

        let body: TokenResponse = serde_json::from_str("{}").unwrap();
        assert!(body.into_token().is_none());
    }

    #[test]
    fn test_token_cache() {
        let cache = TokenCache::new();
        assert!(cache.get("ghcr.io", "repository:a:pull").is_none());

        cache.insert("ghcr.io", "repository:a:pull", "t1".to_string());
        assert_eq!(cache.get("ghcr.io", "repository:a:pull").as_deref(), Some("t1"));
        assert!(cache.get("ghcr.io", "repository:b:pull").is_none());

        cache.invalidate("ghcr.io", "repository:a:pull");
        assert!(cache.get("ghcr.io", "repository:a:pull").is_none());
    }
}
