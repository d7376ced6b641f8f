//! Semantic version parsing, filtering and ordering of registry tags.
//!
//! Tags come straight from a registry listing and are mostly noise from a
//! versioning point of view (`latest`, `stable`, commit hashes, dates). This
//! module turns the ones that look like semantic versions into [`Version`]
//! values, applies a [`VersionFilter`], and returns the survivors in
//! ascending precedence order:
//!
//! - `v1.2.3`, `1.2.3` → `1.2.3`
//! - `1.2` → `1.2.0`, `1` → `1.0.0`
//! - `2.0.0-beta.1+build.5` → prerelease `beta.1`, build `build.5`
//! - `latest`, `1.2.3.4`, `sha-abc` → dropped

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

/// Highest major version still treated as a semantic version.
///
/// Purely numeric tags such as build numbers (`4312`) or dates (`20240131`)
/// parse as a bare major version. Anything above this ceiling is assumed to
/// be one of those and is dropped.
pub const MAX_MAJOR_VERSION: u64 = 1024;

/// A tag that could not be parsed as a semantic version.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{input}' is not a semantic version: {reason}")]
pub struct InvalidVersion {
    /// The rejected input.
    pub input: String,
    /// Why it was rejected.
    pub reason: &'static str,
}

impl InvalidVersion {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

/// One dot-separated prerelease identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    /// Identifier made of digits only, compared numerically.
    Numeric(u64),
    /// Identifier containing letters or hyphens, compared lexically.
    Alphanumeric(String),
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Numeric(a), Self::Numeric(b)) => a.cmp(b),
            (Self::Numeric(_), Self::Alphanumeric(_)) => Ordering::Less,
            (Self::Alphanumeric(_), Self::Numeric(_)) => Ordering::Greater,
            (Self::Alphanumeric(a), Self::Alphanumeric(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Alphanumeric(s) => f.write_str(s),
        }
    }
}

/// A parsed semantic version.
///
/// Equality and ordering follow semantic version precedence, so build
/// metadata is ignored: `1.0.0+a == 1.0.0+b`.
#[derive(Debug, Clone)]
pub struct Version {
    /// Major component.
    pub major: u64,
    /// Minor component.
    pub minor: u64,
    /// Patch component.
    pub patch: u64,
    /// Prerelease identifiers, empty for a release.
    pub pre: Vec<Identifier>,
    /// Build metadata identifiers.
    pub build: Vec<String>,
}

impl Version {
    /// Creates a release version.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: Vec::new(),
            build: Vec::new(),
        }
    }

    /// Parses a tag into a version.
    ///
    /// Accepts an optional leading `v`/`V`, and a missing minor or patch
    /// component is read as zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagmirror_core::Version;
    ///
    /// let version = Version::parse("v1.2.3-rc.1").unwrap();
    /// assert_eq!((version.major, version.minor, version.patch), (1, 2, 3));
    /// assert_eq!(version.prerelease(), "rc.1");
    ///
    /// assert!(Version::parse("latest").is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`InvalidVersion`] if the tag is not a semantic version.
    pub fn parse(input: &str) -> Result<Self, InvalidVersion> {
        let body = input
            .strip_prefix('v')
            .or_else(|| input.strip_prefix('V'))
            .unwrap_or(input);

        if body.is_empty() {
            return Err(InvalidVersion::new(input, "empty version"));
        }

        let (rest, build) = match body.split_once('+') {
            Some((rest, build)) => (rest, Some(build)),
            None => (body, None),
        };
        let (core, pre) = match rest.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (rest, None),
        };

        let numbers: Vec<&str> = core.split('.').collect();
        if numbers.len() > 3 {
            return Err(InvalidVersion::new(input, "more than three numeric components"));
        }

        let mut parsed = [0_u64; 3];
        for (slot, part) in parsed.iter_mut().zip(&numbers) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(InvalidVersion::new(input, "numeric component expected"));
            }
            *slot = part
                .parse()
                .map_err(|_| InvalidVersion::new(input, "numeric component overflows"))?;
        }

        let pre = match pre {
            Some(pre) => parse_prerelease(input, pre)?,
            None => Vec::new(),
        };
        let build = match build {
            Some(build) => parse_build(input, build)?,
            None => Vec::new(),
        };

        Ok(Self {
            major: parsed[0],
            minor: parsed[1],
            patch: parsed[2],
            pre,
            build,
        })
    }

    /// Returns true if this version carries a prerelease label.
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }

    /// Returns the prerelease label (`beta.1`), or an empty string.
    #[must_use]
    pub fn prerelease(&self) -> String {
        self.pre
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

fn parse_prerelease(input: &str, pre: &str) -> Result<Vec<Identifier>, InvalidVersion> {
    pre.split('.')
        .map(|part| {
            if !is_identifier(part) {
                return Err(InvalidVersion::new(input, "invalid prerelease identifier"));
            }
            if part.bytes().all(|b| b.is_ascii_digit()) {
                if part.len() > 1 && part.starts_with('0') {
                    return Err(InvalidVersion::new(
                        input,
                        "numeric prerelease identifier has a leading zero",
                    ));
                }
                part.parse()
                    .map(Identifier::Numeric)
                    .map_err(|_| InvalidVersion::new(input, "numeric component overflows"))
            } else {
                Ok(Identifier::Alphanumeric(part.to_string()))
            }
        })
        .collect()
}

fn parse_build(input: &str, build: &str) -> Result<Vec<String>, InvalidVersion> {
    build
        .split('.')
        .map(|part| {
            if is_identifier(part) {
                Ok(part.to_string())
            } else {
                Err(InvalidVersion::new(input, "invalid build metadata"))
            }
        })
        .collect()
}

impl FromStr for Version {
    type Err = InvalidVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then_with(|| self.minor.cmp(&other.minor))
            .then_with(|| self.patch.cmp(&other.patch))
            .then_with(|| match (self.pre.is_empty(), other.pre.is_empty()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.pre.cmp(&other.pre),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre.is_empty() {
            write!(f, "-{}", self.prerelease())?;
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build.join("."))?;
        }
        Ok(())
    }
}

/// A version together with the raw tag it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedVersion {
    /// Parsed version.
    pub version: Version,
    /// Tag exactly as listed by the registry.
    pub tag: String,
}

/// Why a tag did not survive filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Not a semantic version at all.
    NotSemver,
    /// Major component above [`MAX_MAJOR_VERSION`].
    AboveMajorCeiling,
    /// Prerelease while prereleases are not allowed.
    Prerelease,
    /// Prerelease label differs from the configured compatibility label.
    CompatibilityMismatch,
    /// Major component differs from the pinned major.
    PinnedMajorMismatch,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::NotSemver => "not a semantic version",
            Self::AboveMajorCeiling => "major version above ceiling, probably not a semantic version",
            Self::Prerelease => "prerelease versions not allowed",
            Self::CompatibilityMismatch => "prerelease label does not match compatibility",
            Self::PinnedMajorMismatch => "major version does not match pinned major",
        };
        f.write_str(reason)
    }
}

/// Per-image rules deciding which versions are eligible for mirroring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionFilter {
    /// Keep versions with a prerelease label.
    pub allow_prerelease: bool,
    /// Keep only versions with this major component.
    pub pinned_major: Option<u64>,
    /// Keep only versions whose prerelease label equals this exactly.
    pub compatibility: Option<String>,
}

impl VersionFilter {
    /// Checks a parsed version against the filter.
    ///
    /// # Errors
    ///
    /// Returns the [`DropReason`] for a version that must be dropped.
    pub fn check(&self, version: &Version) -> Result<(), DropReason> {
        if version.major > MAX_MAJOR_VERSION {
            return Err(DropReason::AboveMajorCeiling);
        }

        match &self.compatibility {
            Some(label) => {
                if version.prerelease() != *label {
                    return Err(DropReason::CompatibilityMismatch);
                }
            }
            None => {
                if version.is_prerelease() && !self.allow_prerelease {
                    return Err(DropReason::Prerelease);
                }
            }
        }

        if let Some(major) = self.pinned_major {
            if version.major != major {
                return Err(DropReason::PinnedMajorMismatch);
            }
        }

        Ok(())
    }

    /// Parses, filters and sorts a tag listing.
    ///
    /// Tags that are not semantic versions or fail the filter are dropped
    /// (logged at debug level). The result is in ascending precedence order;
    /// tags of equal precedence keep their listing order.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagmirror_core::VersionFilter;
    ///
    /// let tags = ["1.0.0", "1.1.0", "2.0.0-beta", "bogus"];
    /// let sorted = VersionFilter::default().filter_and_sort(&tags);
    ///
    /// let kept: Vec<&str> = sorted.iter().map(|v| v.tag.as_str()).collect();
    /// assert_eq!(kept, ["1.0.0", "1.1.0"]);
    /// ```
    #[must_use]
    pub fn filter_and_sort(&self, tags: &[impl AsRef<str>]) -> Vec<TaggedVersion> {
        let mut versions: Vec<TaggedVersion> = tags
            .iter()
            .filter_map(|t| {
                let tag = t.as_ref();
                let version = match Version::parse(tag) {
                    Ok(version) => version,
                    Err(_) => {
                        debug!(tag, reason = %DropReason::NotSemver, "Ignoring tag");
                        return None;
                    }
                };
                if let Err(reason) = self.check(&version) {
                    debug!(tag, %reason, "Ignoring tag");
                    return None;
                }
                Some(TaggedVersion {
                    version,
                    tag: tag.to_string(),
                })
            })
            .collect();

        versions.sort_by(|a, b| a.version.cmp(&b.version));
        versions
    }

    /// Returns the highest surviving version of a listing, if any.
    #[must_use]
    pub fn highest(&self, tags: &[impl AsRef<str>]) -> Option<TaggedVersion> {
        self.filter_and_sort(tags).pop()
    }
}
