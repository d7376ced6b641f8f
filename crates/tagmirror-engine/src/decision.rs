//! Copy, skip or replace one tag.

use tagmirror_core::{ImageMirrorPolicy, MirrorOutcome};
use tagmirror_registry::{Credential, Probe, RegistryClient, RegistryError};
use tracing::debug;

/// Credentials for both sides of an image.
#[derive(Debug, Clone, Default)]
pub struct ImageCredentials {
    /// Credentials for the source registry.
    pub source: Credential,
    /// Credentials for the destination registry.
    pub destination: Credential,
}

/// Mirrors one tag of an image.
///
/// 1. Probe the destination tag.
/// 2. Missing: fetch the source image, push it, `copied`.
/// 3. Present without `replace-tag`: `skipped-exists`.
/// 4. Present with `replace-tag`: fetch both images and compare identities;
///    equal is `skipped-identical`, different pushes the already fetched
///    source image and is `replaced`.
///
/// At most one push happens per call and the source image is fetched at most
/// once. Nothing is pushed unless the destination identity was read.
///
/// # Errors
///
/// Returns the first registry failure; the caller applies the error scope.
pub async fn mirror_tag(
    client: &dyn RegistryClient,
    policy: &ImageMirrorPolicy,
    tag: &str,
    credentials: &ImageCredentials,
) -> Result<MirrorOutcome, RegistryError> {
    let source = policy.source.tag(tag);
    let destination = policy.destination.tag(tag);

    let probe = client.probe(&destination, &credentials.destination).await?;

    match probe {
        Probe::NotFound => {
            let image = client.fetch_image(&source, &credentials.source).await?;
            client
                .push_image(&destination, &image, &credentials.destination)
                .await?;
            Ok(MirrorOutcome::Copied)
        }
        Probe::Exists { .. } if !policy.replace_tag => Ok(MirrorOutcome::SkippedExists),
        Probe::Exists { .. } => {
            let image = client.fetch_image(&source, &credentials.source).await?;
            let existing = client
                .fetch_image(&destination, &credentials.destination)
                .await?;

            if image.identity() == existing.identity() {
                return Ok(MirrorOutcome::SkippedIdentical);
            }

            debug!(
                source_identity = image.identity(),
                destination_identity = existing.identity(),
                "Destination content differs"
            );
            client
                .push_image(&destination, &image, &credentials.destination)
                .await?;
            Ok(MirrorOutcome::Replaced)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagmirror_core::{MirrorMode, Repository};
    use tagmirror_test::{InMemoryRegistry, Operation};

    fn policy(replace_tag: bool) -> ImageMirrorPolicy {
        ImageMirrorPolicy {
            name: "app".to_string(),
            source: Repository::parse("ghcr.io/org/app").unwrap(),
            destination: Repository::parse("localhost:5000/mirror/app").unwrap(),
            mode: MirrorMode::Semver,
            allow_prerelease: false,
            replace_tag,
            pinned_major: None,
            compatibility: None,
        }
    }

    #[tokio::test]
    async fn test_missing_tag_is_copied() {
        let registry = InMemoryRegistry::new();
        let policy = policy(false);
        let identity = registry.insert_image(&policy.source, "1.0.0", "v1");

        let outcome = mirror_tag(&registry, &policy, "1.0.0", &ImageCredentials::default())
            .await
            .unwrap();

        assert_eq!(outcome, MirrorOutcome::Copied);
        assert_eq!(registry.push_count(), 1);
        assert_eq!(
            registry.identity_of(&policy.destination.tag("1.0.0")),
            Some(identity)
        );
    }

    #[tokio::test]
    async fn test_existing_tag_is_skipped_without_fetch() {
        let registry = InMemoryRegistry::new();
        let policy = policy(false);
        registry.insert_image(&policy.source, "1.0.0", "new");
        registry.insert_image(&policy.destination, "1.0.0", "old");

        let outcome = mirror_tag(&registry, &policy, "1.0.0", &ImageCredentials::default())
            .await
            .unwrap();

        assert_eq!(outcome, MirrorOutcome::SkippedExists);
        assert_eq!(registry.fetch_count(), 0);
        assert_eq!(registry.push_count(), 0);
    }

    #[tokio::test]
    async fn test_identical_tag_is_not_pushed() {
        let registry = InMemoryRegistry::new();
        let policy = policy(true);
        registry.insert_image(&policy.source, "1.0.0", "same");
        registry.insert_image(&policy.destination, "1.0.0", "same");

        let outcome = mirror_tag(&registry, &policy, "1.0.0", &ImageCredentials::default())
            .await
            .unwrap();

        assert_eq!(outcome, MirrorOutcome::SkippedIdentical);
        assert_eq!(registry.push_count(), 0);
    }

    #[tokio::test]
    async fn test_different_tag_is_replaced_once() {
        let registry = InMemoryRegistry::new();
        let policy = policy(true);
        let identity = registry.insert_image(&policy.source, "1.0.0", "rebuilt");
        registry.insert_image(&policy.destination, "1.0.0", "stale");

        let outcome = mirror_tag(&registry, &policy, "1.0.0", &ImageCredentials::default())
            .await
            .unwrap();

        assert_eq!(outcome, MirrorOutcome::Replaced);
        assert_eq!(registry.push_count(), 1);
        assert_eq!(registry.fetch_count(), 2);
        assert_eq!(
            registry.identity_of(&policy.destination.tag("1.0.0")),
            Some(identity)
        );
    }

    #[tokio::test]
    async fn test_destination_fetch_failure_never_pushes() {
        let registry = InMemoryRegistry::new();
        let policy = policy(true);
        registry.insert_image(&policy.source, "1.0.0", "rebuilt");
        registry.insert_image(&policy.destination, "1.0.0", "stale");
        registry.fail_tag(Operation::Fetch, &policy.destination.tag("1.0.0"));

        let err = mirror_tag(&registry, &policy, "1.0.0", &ImageCredentials::default())
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::HttpError { status: 503, .. }));
        assert_eq!(registry.push_count(), 0);
    }

    #[tokio::test]
    async fn test_probe_failure_is_surfaced() {
        let registry = InMemoryRegistry::new();
        let policy = policy(false);
        registry.insert_image(&policy.source, "1.0.0", "v1");
        registry.fail(Operation::Probe, &policy.destination);

        let result = mirror_tag(&registry, &policy, "1.0.0", &ImageCredentials::default()).await;

        assert!(result.is_err());
        assert_eq!(registry.probe_count(), 1);
        assert_eq!(registry.fetch_count(), 0);
    }
}
