//! Mirroring configuration model.
//!
//! The configuration file is deserialized into raw serde structs and then
//! validated into an immutable [`Config`]. Validation resolves every image's
//! effective mode exactly once, so nothing downstream ever sees an unknown
//! mode string or an unparsed `pinned-major`.
//!
//! ```yaml
//! default-mode: highest
//! on-error: image
//! images:
//!   nginx:
//!     source: nginx
//!     destination: registry.example.com/mirror/nginx
//!     mode: higher
//!     pinned-major: 1
//!     compatibility: alpine
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::reference::Repository;
use crate::version::VersionFilter;

/// Which tags of an image get mirrored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MirrorMode {
    /// Only the highest semantic version.
    #[default]
    Highest,
    /// Every semantic version above the highest one already mirrored.
    Higher,
    /// Every semantic version.
    Semver,
    /// Every tag, semantic version or not.
    All,
}

impl MirrorMode {
    /// Returns the configuration spelling of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Highest => "highest",
            Self::Higher => "higher",
            Self::Semver => "semver",
            Self::All => "all",
        }
    }
}

impl FromStr for MirrorMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "highest" => Ok(Self::Highest),
            "higher" => Ok(Self::Higher),
            "semver" => Ok(Self::Semver),
            "all" => Ok(Self::All),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for MirrorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How far a transport failure propagates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ErrorScope {
    /// Record the failure and continue with the next tag.
    #[default]
    Tag,
    /// Record the failure and skip the rest of the image.
    Image,
    /// Record the failure and stop the run.
    Run,
}

impl ErrorScope {
    /// Returns the configuration spelling of the scope.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tag => "tag",
            Self::Image => "image",
            Self::Run => "run",
        }
    }
}

impl FromStr for ErrorScope {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tag" => Ok(Self::Tag),
            "image" => Ok(Self::Image),
            "run" => Ok(Self::Run),
            other => Err(ConfigError::UnknownErrorScope {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ErrorScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated mirroring policy for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMirrorPolicy {
    /// Image name (the key in the `images` mapping).
    pub name: String,
    /// Repository tags are copied from.
    pub source: Repository,
    /// Repository tags are copied to.
    pub destination: Repository,
    /// Effective mode (image mode, else the default mode).
    pub mode: MirrorMode,
    /// Keep prerelease versions.
    pub allow_prerelease: bool,
    /// Overwrite destination tags whose content differs from the source.
    pub replace_tag: bool,
    /// Only consider this major version.
    pub pinned_major: Option<u64>,
    /// Only consider versions with exactly this prerelease label.
    pub compatibility: Option<String>,
}

impl ImageMirrorPolicy {
    /// Returns the version filter described by this policy.
    #[must_use]
    pub fn version_filter(&self) -> VersionFilter {
        VersionFilter {
            allow_prerelease: self.allow_prerelease,
            pinned_major: self.pinned_major,
            compatibility: self.compatibility.clone(),
        }
    }
}

/// Validated, immutable configuration for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    default_mode: MirrorMode,
    on_error: ErrorScope,
    insecure_registries: Vec<String>,
    images: Vec<ImageMirrorPolicy>,
}

impl Config {
    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid YAML, or
    /// fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Parses and validates a configuration document.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagmirror_core::{Config, MirrorMode};
    ///
    /// let config = Config::from_yaml_str(
    ///     "images:\n  nginx:\n    source: nginx\n    destination: localhost:5000/nginx\n",
    /// )
    /// .unwrap();
    /// assert_eq!(config.images()[0].mode, MirrorMode::Highest);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error for malformed YAML, unknown modes or error scopes,
    /// invalid `pinned-major` values, and missing or invalid repositories.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let raw: RawConfig = if contents.trim().is_empty() {
            RawConfig::default()
        } else {
            serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse { source })?
        };
        raw.validate()
    }

    /// Returns a copy of this configuration with a different error scope.
    #[must_use]
    pub fn with_error_scope(mut self, scope: ErrorScope) -> Self {
        self.on_error = scope;
        self
    }

    /// Mode used by images that do not set one.
    #[must_use]
    pub const fn default_mode(&self) -> MirrorMode {
        self.default_mode
    }

    /// Failure propagation scope for the run.
    #[must_use]
    pub const fn on_error(&self) -> ErrorScope {
        self.on_error
    }

    /// Registry hosts that are served over plain HTTP.
    #[must_use]
    pub fn insecure_registries(&self) -> &[String] {
        &self.insecure_registries
    }

    /// Image policies, in configuration order.
    #[must_use]
    pub fn images(&self) -> &[ImageMirrorPolicy] {
        &self.images
    }

    /// Distinct registry hosts referenced by any image, in first-use order.
    #[must_use]
    pub fn registries(&self) -> Vec<&str> {
        let mut hosts: Vec<&str> = Vec::new();
        for image in &self.images {
            for host in [image.source.registry(), image.destination.registry()] {
                if !hosts.contains(&host) {
                    hosts.push(host);
                }
            }
        }
        hosts
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    default_mode: Option<String>,
    #[serde(default)]
    on_error: Option<String>,
    #[serde(default)]
    insecure_registries: Vec<String>,
    #[serde(default)]
    images: IndexMap<String, RawImage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawImage {
    #[serde(default)]
    source: String,
    #[serde(default)]
    destination: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    allow_prerelease: bool,
    #[serde(default)]
    replace_tag: bool,
    #[serde(default)]
    pinned_major: Option<RawPinnedMajor>,
    #[serde(default)]
    compatibility: Option<String>,
}

/// `pinned-major` may be written as `1` or `"1"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPinnedMajor {
    Integer(i64),
    Text(String),
}

impl RawConfig {
    fn validate(self) -> Result<Config> {
        let default_mode = match self.default_mode.as_deref().map(str::trim) {
            None | Some("") => MirrorMode::default(),
            Some(mode) => mode.parse().map_err(|mode| ConfigError::UnknownMode {
                scope: "default-mode".to_string(),
                mode,
            })?,
        };

        let on_error = match self.on_error.as_deref().map(str::trim) {
            None | Some("") => ErrorScope::default(),
            Some(scope) => scope.parse()?,
        };

        let images = self
            .images
            .into_iter()
            .map(|(name, image)| image.validate(name, default_mode))
            .collect::<Result<Vec<_>>>()?;

        Ok(Config {
            default_mode,
            on_error,
            insecure_registries: self.insecure_registries,
            images,
        })
    }
}

impl RawImage {
    fn validate(self, name: String, default_mode: MirrorMode) -> Result<ImageMirrorPolicy> {
        let mode = match self.mode.as_deref().map(str::trim) {
            None | Some("") => default_mode,
            Some(mode) => mode.parse().map_err(|mode| ConfigError::UnknownMode {
                scope: format!("image '{name}'"),
                mode,
            })?,
        };

        let pinned_major = match self.pinned_major {
            None => None,
            Some(RawPinnedMajor::Integer(value)) => Some(u64::try_from(value).map_err(|_| {
                ConfigError::InvalidPinnedMajor {
                    image: name.clone(),
                    value: value.to_string(),
                }
            })?),
            Some(RawPinnedMajor::Text(text)) if text.trim().is_empty() => None,
            Some(RawPinnedMajor::Text(text)) => {
                Some(text.trim().parse::<u64>().map_err(|_| {
                    ConfigError::InvalidPinnedMajor {
                        image: name.clone(),
                        value: text.clone(),
                    }
                })?)
            }
        };

        if self.source.trim().is_empty() {
            return Err(ConfigError::MissingField {
                image: name,
                field: "source",
            });
        }
        if self.destination.trim().is_empty() {
            return Err(ConfigError::MissingField {
                image: name,
                field: "destination",
            });
        }

        Ok(ImageMirrorPolicy {
            source: Repository::parse(&self.source)?,
            destination: Repository::parse(&self.destination)?,
            mode,
            allow_prerelease: self.allow_prerelease,
            replace_tag: self.replace_tag,
            pinned_major,
            compatibility: self.compatibility.filter(|c| !c.is_empty()),
            name,
        })
    }
}
