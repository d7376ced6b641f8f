//! Deterministic in-process registry.
//!
//! [`InMemoryRegistry`] implements [`RegistryClient`] over a map of
//! repositories. Tests seed it with images, inject failures per operation and
//! inspect the calls the engine made.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tagmirror_core::{ImageReference, Repository};

use tagmirror_registry::{
    compute_digest, Credential, Descriptor, ImageHandle, ImageIndex, ImageManifest, Manifest,
    ManifestPayload, MediaType, Probe, RegistryClient, RegistryError,
};

/// Registry operations, for failure injection and call records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `list_tags`
    ListTags,
    /// `probe`
    Probe,
    /// `fetch_image`
    Fetch,
    /// `push_image`
    Push,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Operation invoked.
    pub operation: Operation,
    /// Repository or image reference, as displayed.
    pub target: String,
}

#[derive(Debug, Default)]
struct StoredRepository {
    tags: BTreeMap<String, String>,
    manifests: HashMap<String, ManifestPayload>,
    blobs: HashMap<String, Vec<u8>>,
}

impl StoredRepository {
    fn put_manifest(&mut self, payload: ManifestPayload) -> String {
        let digest = payload.digest.clone();
        self.manifests.insert(digest.clone(), payload);
        digest
    }

    fn put_blob(&mut self, data: Vec<u8>) -> Descriptor {
        let digest = compute_digest(&data);
        let size = data.len() as u64;
        self.blobs.insert(digest.clone(), data);
        Descriptor::new("application/octet-stream", digest, size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Failure {
    operation: Operation,
    repository: Repository,
    tag: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    repositories: HashMap<Repository, StoredRepository>,
    failures: Vec<Failure>,
    required: HashMap<String, Credential>,
    calls: Vec<Call>,
}

impl State {
    fn check(
        &mut self,
        operation: Operation,
        repository: &Repository,
        tag: Option<&str>,
        credential: &Credential,
    ) -> Result<(), RegistryError> {
        self.calls.push(Call {
            operation,
            target: tag.map_or_else(|| repository.to_string(), |t| format!("{repository}:{t}")),
        });

        if let Some(required) = self.required.get(repository.registry()) {
            if required != credential {
                return Err(RegistryError::AuthenticationFailed {
                    message: format!("{} rejected the credentials", repository.registry()),
                });
            }
        }

        let injected = self.failures.iter().any(|f| {
            f.operation == operation
                && f.repository == *repository
                && f.tag.as_deref().map_or(true, |t| Some(t) == tag)
        });
        if injected {
            return Err(RegistryError::HttpError {
                status: 503,
                message: format!("injected {operation:?} failure"),
            });
        }

        Ok(())
    }
}

/// In-memory [`RegistryClient`].
///
/// # Examples
///
/// ```
/// use tagmirror_core::Repository;
/// use tagmirror_test::InMemoryRegistry;
///
/// let registry = InMemoryRegistry::new();
/// let repo = Repository::parse("localhost:5000/app").unwrap();
/// let identity = registry.insert_image(&repo, "1.0.0", "app 1.0.0");
/// assert_eq!(registry.identity_of(&repo.tag("1.0.0")), Some(identity));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    state: Mutex<State>,
}

impl InMemoryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a single-platform image whose content is derived from
    /// `content` and tags it. Returns the image identity.
    ///
    /// Equal `content` yields equal identities across repositories.
    pub fn insert_image(&self, repository: &Repository, tag: &str, content: &str) -> String {
        let mut state = self.state.lock();
        let stored = state.repositories.entry(repository.clone()).or_default();
        let payload = Self::build_image(stored, content);
        let identity = payload.config().map(|c| c.digest.clone()).unwrap_or_default();
        let digest = stored.put_manifest(payload);
        stored.tags.insert(tag.to_string(), digest);
        identity
    }

    /// Stores a multi-platform index with one child per entry of `platforms`
    /// and tags it. Returns the index identity.
    pub fn insert_index(&self, repository: &Repository, tag: &str, platforms: &[&str]) -> String {
        let mut state = self.state.lock();
        let stored = state.repositories.entry(repository.clone()).or_default();

        let manifests = platforms
            .iter()
            .map(|content| {
                let child = Self::build_image(stored, content);
                let descriptor =
                    Descriptor::new(MediaType::OCI_MANIFEST, &child.digest, child.bytes.len() as u64);
                stored.put_manifest(child);
                descriptor
            })
            .collect::<Vec<_>>();

        let bytes = json!({
            "schemaVersion": 2,
            "mediaType": MediaType::OCI_INDEX,
            "manifests": manifests,
        })
        .to_string()
        .into_bytes();

        let payload = ManifestPayload {
            media_type: MediaType::OCI_INDEX.to_string(),
            digest: compute_digest(&bytes),
            bytes,
            manifest: Manifest::Index(ImageIndex {
                schema_version: 2,
                media_type: Some(MediaType::OCI_INDEX.to_string()),
                manifests,
            }),
        };
        let digest = stored.put_manifest(payload);
        stored.tags.insert(tag.to_string(), digest.clone());
        digest
    }

    fn build_image(stored: &mut StoredRepository, content: &str) -> ManifestPayload {
        let config = stored.put_blob(json!({ "content": content }).to_string().into_bytes());
        let layer = stored.put_blob(format!("layer of {content}").into_bytes());
        let image = ImageManifest {
            schema_version: 2,
            media_type: Some(MediaType::OCI_MANIFEST.to_string()),
            config,
            layers: vec![layer],
        };

        let bytes = json!({
            "schemaVersion": 2,
            "mediaType": MediaType::OCI_MANIFEST,
            "config": image.config,
            "layers": image.layers,
        })
        .to_string()
        .into_bytes();

        ManifestPayload {
            media_type: MediaType::OCI_MANIFEST.to_string(),
            digest: compute_digest(&bytes),
            bytes,
            manifest: Manifest::Image(image),
        }
    }

    /// Makes every `operation` on `repository` fail.
    pub fn fail(&self, operation: Operation, repository: &Repository) {
        self.state.lock().failures.push(Failure {
            operation,
            repository: repository.clone(),
            tag: None,
        });
    }

    /// Makes `operation` fail for one tag.
    pub fn fail_tag(&self, operation: Operation, reference: &ImageReference) {
        self.state.lock().failures.push(Failure {
            operation,
            repository: reference.repository.clone(),
            tag: Some(reference.tag.clone()),
        });
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Rejects calls to `registry` that do not present `credential`.
    pub fn require_credential(&self, registry: &str, credential: Credential) {
        self.state
            .lock()
            .required
            .insert(registry.to_string(), credential);
    }

    /// Returns the tags of a repository in lexical order.
    #[must_use]
    pub fn tags(&self, repository: &Repository) -> Vec<String> {
        self.state
            .lock()
            .repositories
            .get(repository)
            .map(|r| r.tags.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the identity of the image a tag points to.
    #[must_use]
    pub fn identity_of(&self, reference: &ImageReference) -> Option<String> {
        let state = self.state.lock();
        let stored = state.repositories.get(&reference.repository)?;
        let payload = stored.manifests.get(stored.tags.get(&reference.tag)?)?;
        Some(
            payload
                .config()
                .map_or_else(|| payload.digest.clone(), |c| c.digest.clone()),
        )
    }

    /// Returns every recorded call.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Number of calls of one operation.
    #[must_use]
    pub fn count(&self, operation: Operation) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Number of `push_image` calls.
    #[must_use]
    pub fn push_count(&self) -> usize {
        self.count(Operation::Push)
    }

    /// Number of `fetch_image` calls.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.count(Operation::Fetch)
    }

    /// Number of `probe` calls.
    #[must_use]
    pub fn probe_count(&self) -> usize {
        self.count(Operation::Probe)
    }

    /// Number of pushes to one reference.
    #[must_use]
    pub fn pushes_to(&self, reference: &ImageReference) -> usize {
        let target = reference.to_string();
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.operation == Operation::Push && c.target == target)
            .count()
    }
}

#[async_trait]
impl RegistryClient for InMemoryRegistry {
    async fn list_tags(
        &self,
        repository: &Repository,
        credential: &Credential,
    ) -> Result<Vec<String>, RegistryError> {
        let mut state = self.state.lock();
        state.check(Operation::ListTags, repository, None, credential)?;
        Ok(state
            .repositories
            .get(repository)
            .map(|r| r.tags.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn probe(
        &self,
        reference: &ImageReference,
        credential: &Credential,
    ) -> Result<Probe, RegistryError> {
        let mut state = self.state.lock();
        state.check(
            Operation::Probe,
            &reference.repository,
            Some(&reference.tag),
            credential,
        )?;

        let digest = state
            .repositories
            .get(&reference.repository)
            .and_then(|r| r.tags.get(&reference.tag))
            .cloned();
        Ok(digest.map_or(Probe::NotFound, |d| Probe::Exists { digest: Some(d) }))
    }

    async fn fetch_image(
        &self,
        reference: &ImageReference,
        credential: &Credential,
    ) -> Result<ImageHandle, RegistryError> {
        let mut state = self.state.lock();
        state.check(
            Operation::Fetch,
            &reference.repository,
            Some(&reference.tag),
            credential,
        )?;

        let not_found = || RegistryError::NotFound {
            reference: reference.to_string(),
        };
        let stored = state
            .repositories
            .get(&reference.repository)
            .ok_or_else(not_found)?;
        let manifest = stored
            .tags
            .get(&reference.tag)
            .and_then(|digest| stored.manifests.get(digest))
            .cloned()
            .ok_or_else(not_found)?;

        let children = match &manifest.manifest {
            Manifest::Index(index) => index
                .manifests
                .iter()
                .map(|child| stored.manifests.get(&child.digest).cloned().ok_or_else(not_found))
                .collect::<Result<Vec<_>, _>>()?,
            Manifest::Image(_) => Vec::new(),
        };

        Ok(ImageHandle {
            source: reference.clone(),
            credential: credential.clone(),
            manifest,
            children,
        })
    }

    async fn push_image(
        &self,
        reference: &ImageReference,
        image: &ImageHandle,
        credential: &Credential,
    ) -> Result<(), RegistryError> {
        let mut state = self.state.lock();
        state.check(
            Operation::Push,
            &reference.repository,
            Some(&reference.tag),
            credential,
        )?;

        let mut blobs = Vec::new();
        {
            let source = state
                .repositories
                .get(&image.source.repository)
                .ok_or_else(|| RegistryError::NotFound {
                    reference: image.source.to_string(),
                })?;

            for payload in image.children.iter().chain(std::iter::once(&image.manifest)) {
                let Manifest::Image(manifest) = &payload.manifest else {
                    continue;
                };
                for blob in manifest.blobs() {
                    let data = source.blobs.get(&blob.digest).ok_or_else(|| {
                        RegistryError::NotFound {
                            reference: format!("{}@{}", image.source.repository, blob.digest),
                        }
                    })?;
                    blobs.push((blob.digest.clone(), data.clone()));
                }
            }
        }

        let destination = state
            .repositories
            .entry(reference.repository.clone())
            .or_default();
        destination.blobs.extend(blobs);
        for child in &image.children {
            destination.put_manifest(child.clone());
        }
        let digest = destination.put_manifest(image.manifest.clone());
        destination.tags.insert(reference.tag.clone(), digest);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(name: &str) -> Repository {
        Repository::parse(name).unwrap()
    }

    #[tokio::test]
    async fn test_list_missing_repository_is_empty() {
        let registry = InMemoryRegistry::new();
        let tags = registry
            .list_tags(&repo("localhost:5000/none"), &Credential::Anonymous)
            .await
            .unwrap();
        assert!(tags.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_and_push_copies_image() {
        let registry = InMemoryRegistry::new();
        let source = repo("docker.io/org/app");
        let destination = repo("localhost:5000/org/app");
        let identity = registry.insert_image(&source, "1.0.0", "v1");

        let image = registry
            .fetch_image(&source.tag("1.0.0"), &Credential::Anonymous)
            .await
            .unwrap();
        assert_eq!(image.identity(), identity);

        registry
            .push_image(&destination.tag("1.0.0"), &image, &Credential::Anonymous)
            .await
            .unwrap();

        assert_eq!(registry.identity_of(&destination.tag("1.0.0")), Some(identity));
        assert_eq!(registry.tags(&destination), ["1.0.0"]);
        assert_eq!(registry.push_count(), 1);
        assert_eq!(registry.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_index_push_copies_children() {
        let registry = InMemoryRegistry::new();
        let source = repo("ghcr.io/org/multi");
        let destination = repo("localhost:5000/multi");
        let identity = registry.insert_index(&source, "2.0.0", &["amd64", "arm64"]);

        let image = registry
            .fetch_image(&source.tag("2.0.0"), &Credential::Anonymous)
            .await
            .unwrap();
        assert_eq!(image.children.len(), 2);
        assert_eq!(image.identity(), identity);

        registry
            .push_image(&destination.tag("2.0.0"), &image, &Credential::Anonymous)
            .await
            .unwrap();
        assert_eq!(registry.identity_of(&destination.tag("2.0.0")), Some(identity));
    }

    #[tokio::test]
    async fn test_same_content_same_identity() {
        let registry = InMemoryRegistry::new();
        let a = registry.insert_image(&repo("a/app"), "1.0.0", "same");
        let b = registry.insert_image(&repo("b/app"), "1.0.0", "same");
        let c = registry.insert_image(&repo("b/app"), "1.0.1", "different");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_probe() {
        let registry = InMemoryRegistry::new();
        let app = repo("localhost:5000/app");
        registry.insert_image(&app, "1.0.0", "v1");

        let found = registry
            .probe(&app.tag("1.0.0"), &Credential::Anonymous)
            .await
            .unwrap();
        assert!(found.exists());

        let missing = registry
            .probe(&app.tag("2.0.0"), &Credential::Anonymous)
            .await
            .unwrap();
        assert_eq!(missing, Probe::NotFound);
        assert_eq!(registry.probe_count(), 2);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let registry = InMemoryRegistry::new();
        let app = repo("localhost:5000/app");
        registry.insert_image(&app, "1.0.0", "v1");
        registry.insert_image(&app, "1.1.0", "v1.1");
        registry.fail_tag(Operation::Fetch, &app.tag("1.0.0"));

        let err = registry
            .fetch_image(&app.tag("1.0.0"), &Credential::Anonymous)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::HttpError { status: 503, .. }));
        assert!(registry
            .fetch_image(&app.tag("1.1.0"), &Credential::Anonymous)
            .await
            .is_ok());

        registry.fail(Operation::ListTags, &app);
        assert!(registry.list_tags(&app, &Credential::Anonymous).await.is_err());

        registry.clear_failures();
        assert!(registry.list_tags(&app, &Credential::Anonymous).await.is_ok());
    }

    #[tokio::test]
    async fn test_required_credential() {
        let registry = InMemoryRegistry::new();
        let app = repo("eu.gcr.io/project/app");
        let credential = Credential::basic("oauth2accesstoken", "token");
        registry.require_credential("eu.gcr.io", credential.clone());

        let err = registry
            .list_tags(&app, &Credential::Anonymous)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::AuthenticationFailed { .. }));
        assert!(registry.list_tags(&app, &credential).await.is_ok());
    }
}
