//! Repository and image references.
//!
//! A [`Repository`] names a collection of tags on one registry host; an
//! [`ImageReference`] adds the tag. Docker Hub shorthand is normalised the
//! same way the Docker CLI does it:
//!
//! - `nginx` → `docker.io/library/nginx`
//! - `bitnami/redis` → `docker.io/bitnami/redis`
//! - `ghcr.io/org/app`, `localhost:5000/app` → kept as-is

use std::fmt;

use crate::error::ConfigError;

/// Canonical name of the Docker Hub registry.
pub const DOCKER_HUB: &str = "docker.io";

/// Host serving the Docker Hub registry API.
pub const DOCKER_HUB_API_HOST: &str = "registry-1.docker.io";

/// A repository on a registry host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Repository {
    registry: String,
    path: String,
}

impl Repository {
    /// Parses a repository string.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagmirror_core::Repository;
    ///
    /// let repo = Repository::parse("nginx").unwrap();
    /// assert_eq!(repo.registry(), "docker.io");
    /// assert_eq!(repo.path(), "library/nginx");
    ///
    /// let repo = Repository::parse("europe-docker.pkg.dev/project/mirror/nginx").unwrap();
    /// assert_eq!(repo.registry(), "europe-docker.pkg.dev");
    /// assert_eq!(repo.path(), "project/mirror/nginx");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRepository`] for empty strings, strings
    /// carrying a tag or digest, or invalid path components.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let input = input.trim();
        let invalid = |reason: &str| ConfigError::InvalidRepository {
            repository: input.to_string(),
            reason: reason.to_string(),
        };

        if input.is_empty() {
            return Err(invalid("repository is empty"));
        }
        if input.contains('@') {
            return Err(invalid("repository must not contain a digest"));
        }

        let (registry, path) = match input.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_ascii_lowercase(), rest.to_string())
            }
            _ => (DOCKER_HUB.to_string(), input.to_string()),
        };

        let registry = if registry == "index.docker.io" {
            DOCKER_HUB.to_string()
        } else {
            registry
        };

        let path = if registry == DOCKER_HUB && !path.contains('/') {
            format!("library/{path}")
        } else {
            path
        };

        for component in path.split('/') {
            if component.is_empty() {
                return Err(invalid("empty path component"));
            }
            if component.contains(':') {
                return Err(invalid("repository must not contain a tag"));
            }
            if !component
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'_' | b'-'))
            {
                return Err(invalid(
                    "path components may only contain lowercase letters, digits, '.', '_' and '-'",
                ));
            }
        }

        Ok(Self { registry, path })
    }

    /// Registry host as configured (e.g. `docker.io`, `localhost:5000`).
    #[must_use]
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// Repository path within the registry (e.g. `library/nginx`).
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Host that actually serves the registry API.
    #[must_use]
    pub fn api_host(&self) -> &str {
        if self.registry == DOCKER_HUB {
            DOCKER_HUB_API_HOST
        } else {
            &self.registry
        }
    }

    /// Builds a reference to a tag in this repository.
    #[must_use]
    pub fn tag(&self, tag: impl Into<String>) -> ImageReference {
        ImageReference {
            repository: self.clone(),
            tag: tag.into(),
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.path)
    }
}

/// A tagged image in a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    /// Repository holding the image.
    pub repository: Repository,
    /// Tag naming the image.
    pub tag: String,
}

impl ImageReference {
    /// Registry host of the reference.
    #[must_use]
    pub fn registry(&self) -> &str {
        self.repository.registry()
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}
