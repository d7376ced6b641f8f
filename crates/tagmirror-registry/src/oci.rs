//! OCI Distribution Specification types.
//!
//! This module defines the manifest and descriptor types tagmirror reads and
//! writes. Manifests are always pushed with the exact bytes they were fetched
//! with so that their digests survive the copy.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::RegistryError;

/// Manifest media types understood by the registry client.
#[derive(Debug, Clone, Copy)]
pub struct MediaType;

impl MediaType {
    /// OCI image manifest media type.
    pub const OCI_MANIFEST: &'static str = "application/vnd.oci.image.manifest.v1+json";

    /// OCI image index media type.
    pub const OCI_INDEX: &'static str = "application/vnd.oci.image.index.v1+json";

    /// Docker image manifest, schema 2.
    pub const DOCKER_MANIFEST: &'static str =
        "application/vnd.docker.distribution.manifest.v2+json";

    /// Docker manifest list.
    pub const DOCKER_MANIFEST_LIST: &'static str =
        "application/vnd.docker.distribution.manifest.list.v2+json";

    /// Docker image manifest, schema 1.
    pub const DOCKER_SCHEMA1: &'static str = "application/vnd.docker.distribution.manifest.v1+json";

    /// Signed Docker image manifest, schema 1.
    pub const DOCKER_SCHEMA1_SIGNED: &'static str =
        "application/vnd.docker.distribution.manifest.v1+prettyjws";

    /// Accept header value listing every supported manifest type.
    pub const ACCEPT_ALL: &'static str = "application/vnd.oci.image.index.v1+json, \
        application/vnd.docker.distribution.manifest.list.v2+json, \
        application/vnd.oci.image.manifest.v1+json, \
        application/vnd.docker.distribution.manifest.v2+json";

    /// Returns true for index and manifest list types.
    #[must_use]
    pub fn is_index(media_type: &str) -> bool {
        media_type == Self::OCI_INDEX || media_type == Self::DOCKER_MANIFEST_LIST
    }

    /// Returns true for single-image manifest types.
    #[must_use]
    pub fn is_image(media_type: &str) -> bool {
        media_type == Self::OCI_MANIFEST || media_type == Self::DOCKER_MANIFEST
    }

    /// Returns true for the legacy schema 1 types.
    #[must_use]
    pub fn is_schema1(media_type: &str) -> bool {
        media_type == Self::DOCKER_SCHEMA1 || media_type == Self::DOCKER_SCHEMA1_SIGNED
    }
}

/// OCI content descriptor.
///
/// A descriptor describes the disposition of targeted content. It includes
/// the type of the content, a content identifier (digest), and the byte-size
/// of the raw content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content.
    pub media_type: String,

    /// Digest of the targeted content.
    pub digest: String,

    /// Size in bytes of the content.
    pub size: u64,

    /// Optional URLs for alternative locations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,
}

impl Descriptor {
    /// Creates a new descriptor.
    #[must_use]
    pub fn new(media_type: impl Into<String>, digest: impl Into<String>, size: u64) -> Self {
        Self {
            media_type: media_type.into(),
            digest: digest.into(),
            size,
            urls: None,
        }
    }

    /// Returns true for foreign layers that registries do not host.
    #[must_use]
    pub fn is_foreign(&self) -> bool {
        self.urls.as_ref().is_some_and(|urls| !urls.is_empty())
    }
}

/// Single-image manifest (OCI or Docker schema 2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    /// Schema version (always 2).
    pub schema_version: u32,

    /// Media type of this manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    /// Configuration descriptor.
    pub config: Descriptor,

    /// Layers that make up the image.
    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

impl ImageManifest {
    /// Returns the blobs a registry must hold for this manifest, config first.
    pub fn blobs(&self) -> impl Iterator<Item = &Descriptor> {
        std::iter::once(&self.config).chain(self.layers.iter().filter(|l| !l.is_foreign()))
    }
}

/// Multi-platform index (OCI index or Docker manifest list).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    /// Schema version (always 2).
    pub schema_version: u32,

    /// Media type of this index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    /// Child manifests.
    #[serde(default)]
    pub manifests: Vec<Descriptor>,
}

/// A parsed manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Manifest {
    /// Single image.
    Image(ImageManifest),
    /// Multi-platform index.
    Index(ImageIndex),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestProbe {
    #[serde(default)]
    schema_version: Option<u32>,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    manifests: Option<serde_json::Value>,
}

/// A manifest together with the exact bytes it was served as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestPayload {
    /// Media type sent as `Content-Type` when pushing.
    pub media_type: String,

    /// Digest of `bytes`.
    pub digest: String,

    /// Raw manifest body.
    pub bytes: Vec<u8>,

    /// Parsed manifest.
    pub manifest: Manifest,
}

impl ManifestPayload {
    /// Parses a manifest body.
    ///
    /// `content_type` is the media type the registry reported; when absent the
    /// body's own `mediaType` field, then its shape, decide.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnsupportedManifest`] for schema 1 and unknown
    /// types and [`RegistryError::InvalidManifest`] for malformed bodies.
    pub fn from_bytes(
        reference: &str,
        content_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<Self, RegistryError> {
        let invalid = |e: serde_json::Error| RegistryError::InvalidManifest {
            reference: reference.to_string(),
            message: e.to_string(),
        };

        let probe: ManifestProbe = serde_json::from_slice(&bytes).map_err(invalid)?;

        let reported = content_type
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim())
            .filter(|ct| !ct.is_empty() && *ct != "application/json");
        let media_type = match (reported, probe.media_type.as_deref()) {
            (Some(ct), _) | (None, Some(ct)) => ct.to_string(),
            (None, None) if probe.manifests.is_some() => MediaType::OCI_INDEX.to_string(),
            (None, None) => MediaType::OCI_MANIFEST.to_string(),
        };

        if MediaType::is_schema1(&media_type) || probe.schema_version == Some(1) {
            return Err(RegistryError::UnsupportedManifest {
                reference: reference.to_string(),
                media_type,
            });
        }

        let manifest = if MediaType::is_index(&media_type) {
            Manifest::Index(serde_json::from_slice(&bytes).map_err(invalid)?)
        } else if MediaType::is_image(&media_type) {
            Manifest::Image(serde_json::from_slice(&bytes).map_err(invalid)?)
        } else {
            return Err(RegistryError::UnsupportedManifest {
                reference: reference.to_string(),
                media_type,
            });
        };

        Ok(Self {
            media_type,
            digest: compute_digest(&bytes),
            bytes,
            manifest,
        })
    }

    /// Returns true if this is an index.
    #[must_use]
    pub const fn is_index(&self) -> bool {
        matches!(self.manifest, Manifest::Index(_))
    }

    /// Returns the config descriptor of a single-image manifest.
    #[must_use]
    pub const fn config(&self) -> Option<&Descriptor> {
        match &self.manifest {
            Manifest::Image(image) => Some(&image.config),
            Manifest::Index(_) => None,
        }
    }
}

/// Response from the `/v2/<name>/tags/list` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagList {
    /// Repository name.
    pub name: String,

    /// List of tags; some registries send `null` for empty repositories.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Computes the SHA-256 digest of data.
///
/// # Examples
///
/// ```
/// use tagmirror_registry::compute_digest;
///
/// let digest = compute_digest(b"test data");
/// assert!(digest.starts_with("sha256:"));
/// assert_eq!(digest.len(), 7 + 64);
/// ```
#[must_use]
pub fn compute_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    finish_digest(hasher)
}

/// Formats a finished hash as an OCI digest.
pub(crate) fn finish_digest(hasher: Sha256) -> String {
    format!("sha256:{}", hex::encode(hasher.finalize()))
}
