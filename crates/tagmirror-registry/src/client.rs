//! The registry capability the mirroring engine is written against.

use async_trait::async_trait;
use tagmirror_core::{ImageReference, Repository};

use crate::auth::Credential;
use crate::error::RegistryError;
use crate::oci::ManifestPayload;

/// Result of looking up a tag without fetching it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// The tag exists.
    Exists {
        /// Manifest digest, when the registry reported one.
        digest: Option<String>,
    },
    /// The tag does not exist.
    NotFound,
}

impl Probe {
    /// Returns true if the tag exists.
    #[must_use]
    pub const fn exists(&self) -> bool {
        matches!(self, Self::Exists { .. })
    }
}

/// A fetched image: its manifest, the children of an index, and where its
/// blobs can be read from.
#[derive(Debug, Clone)]
pub struct ImageHandle {
    /// Reference the image was fetched from.
    pub source: ImageReference,

    /// Credentials for reading blobs from `source`.
    pub credential: Credential,

    /// Top-level manifest.
    pub manifest: ManifestPayload,

    /// Child manifests of an index, in index order.
    pub children: Vec<ManifestPayload>,
}

impl ImageHandle {
    /// Returns the content identity used to decide whether two images are the
    /// same: the config digest of a single image, the manifest digest of an
    /// index.
    #[must_use]
    pub fn identity(&self) -> &str {
        self.manifest
            .config()
            .map_or(self.manifest.digest.as_str(), |config| config.digest.as_str())
    }
}

/// Operations tagmirror needs from a container registry.
///
/// A single client serves every registry host; the host is taken from the
/// references passed in.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Lists the tags of a repository. A repository that does not exist has
    /// no tags.
    async fn list_tags(
        &self,
        repository: &Repository,
        credential: &Credential,
    ) -> Result<Vec<String>, RegistryError>;

    /// Checks whether a tag exists.
    async fn probe(
        &self,
        reference: &ImageReference,
        credential: &Credential,
    ) -> Result<Probe, RegistryError>;

    /// Fetches an image's manifests.
    async fn fetch_image(
        &self,
        reference: &ImageReference,
        credential: &Credential,
    ) -> Result<ImageHandle, RegistryError>;

    /// Writes `image` under `reference`, copying any blobs the destination
    /// lacks.
    async fn push_image(
        &self,
        reference: &ImageReference,
        image: &ImageHandle,
        credential: &Credential,
    ) -> Result<(), RegistryError>;
}
