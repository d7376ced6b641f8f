//! The mirroring run loop.
//!
//! Images are processed one at a time in configuration order and tags one at
//! a time in selection order. Every decision is logged and recorded in the
//! [`RunReport`].

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;

use tagmirror_core::{
    needs_destination_tags, select, Config, ErrorScope, ImageMirrorPolicy, MirrorOutcome,
    Repository, Selection,
};
use tagmirror_registry::{AuthResolver, Credential, RegistryClient, RegistryError};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::decision::{mirror_tag, ImageCredentials};
use crate::error::{MirrorError, Result};
use crate::report::{RunReport, TagRecord, IMAGE_LEVEL_TAG};

/// A failure that stops the run.
struct Stop {
    tag: String,
    error: RegistryError,
}

/// Runs mirroring configurations against a registry client.
pub struct Mirrorer {
    client: Arc<dyn RegistryClient>,
    auth: AuthResolver,
}

impl std::fmt::Debug for Mirrorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mirrorer")
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

impl Mirrorer {
    /// Creates a mirrorer.
    #[must_use]
    pub fn new(client: Arc<dyn RegistryClient>, auth: AuthResolver) -> Self {
        Self { client, auth }
    }

    /// Mirrors every image of `config`.
    ///
    /// Credentials for every registry the configuration names are resolved
    /// before the first registry call. Registry failures are recorded as
    /// `error` outcomes and propagate as far as the configuration's
    /// [`ErrorScope`] says.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Credential`] if any credential cannot be
    /// resolved and [`MirrorError::Aborted`] when a failure stops the run
    /// under [`ErrorScope::Run`].
    pub async fn run(&self, config: &Config) -> Result<RunReport> {
        let mut report = RunReport::new();
        let span = info_span!("mirror_run", run_id = %report.run_id());

        async move {
            let credentials = self.resolve_credentials(config).await?;
            info!(
                images = config.images().len(),
                on_error = %config.on_error(),
                "Starting mirror run"
            );

            for policy in config.images() {
                let flow = self
                    .mirror_image(policy, &credentials, config.on_error(), &mut report)
                    .instrument(info_span!("image", image = %policy.name))
                    .await;

                if let ControlFlow::Break(stop) = flow {
                    report.finish();
                    warn!(image = %policy.name, tag = %stop.tag, "Mirror run aborted");
                    return Err(MirrorError::Aborted {
                        image: policy.name.clone(),
                        tag: stop.tag,
                        source: stop.error,
                        report: Box::new(report),
                    });
                }
            }

            report.finish();
            info!(summary = %report.summary(), "Mirror run finished");
            Ok::<_, MirrorError>(report)
        }
        .instrument(span)
        .await
    }

    /// Resolves credentials for every registry host, failing on the first error.
    async fn resolve_credentials(&self, config: &Config) -> Result<HashMap<String, Credential>> {
        let mut credentials = HashMap::new();
        for registry in config.registries() {
            let credential =
                self.auth
                    .resolve(registry)
                    .await
                    .map_err(|source| MirrorError::Credential {
                        registry: registry.to_string(),
                        source,
                    })?;
            debug!(registry, anonymous = credential.is_anonymous(), "Resolved credentials");
            credentials.insert(registry.to_string(), credential);
        }
        Ok(credentials)
    }

    async fn mirror_image(
        &self,
        policy: &ImageMirrorPolicy,
        credentials: &HashMap<String, Credential>,
        scope: ErrorScope,
        report: &mut RunReport,
    ) -> ControlFlow<Stop> {
        let lookup = |repository: &Repository| {
            credentials
                .get(repository.registry())
                .cloned()
                .unwrap_or_default()
        };
        let credentials = ImageCredentials {
            source: lookup(&policy.source),
            destination: lookup(&policy.destination),
        };

        let source_tags = match self
            .client
            .list_tags(&policy.source, &credentials.source)
            .await
        {
            Ok(tags) => tags,
            Err(error) => return image_failure(policy, scope, error, report),
        };

        let destination_tags = if needs_destination_tags(policy.mode) {
            match self
                .client
                .list_tags(&policy.destination, &credentials.destination)
                .await
            {
                Ok(tags) => tags,
                Err(error) => return image_failure(policy, scope, error, report),
            }
        } else {
            Vec::new()
        };

        let tags = match select(policy, &source_tags, &destination_tags) {
            Selection::NoBaseline => {
                record(report, policy, IMAGE_LEVEL_TAG, MirrorOutcome::NoBaseline, None);
                return ControlFlow::Continue(());
            }
            Selection::Tags(tags) => tags,
        };

        if tags.is_empty() {
            info!(
                source = %policy.source,
                mode = %policy.mode,
                listed = source_tags.len(),
                "No tags selected, nothing to mirror"
            );
            return ControlFlow::Continue(());
        }
        debug!(mode = %policy.mode, selected = ?tags, "Selected tags");

        for tag in tags {
            match mirror_tag(self.client.as_ref(), policy, &tag, &credentials).await {
                Ok(outcome) => record(report, policy, &tag, outcome, None),
                Err(error) => {
                    record(
                        report,
                        policy,
                        &tag,
                        MirrorOutcome::Error,
                        Some(error.to_string()),
                    );
                    match scope {
                        ErrorScope::Tag => {}
                        ErrorScope::Image => return ControlFlow::Continue(()),
                        ErrorScope::Run => return ControlFlow::Break(Stop { tag, error }),
                    }
                }
            }
        }

        ControlFlow::Continue(())
    }
}

/// Records a listing failure; only the `run` scope goes beyond the image.
fn image_failure(
    policy: &ImageMirrorPolicy,
    scope: ErrorScope,
    error: RegistryError,
    report: &mut RunReport,
) -> ControlFlow<Stop> {
    record(
        report,
        policy,
        IMAGE_LEVEL_TAG,
        MirrorOutcome::Error,
        Some(error.to_string()),
    );
    match scope {
        ErrorScope::Run => ControlFlow::Break(Stop {
            tag: IMAGE_LEVEL_TAG.to_string(),
            error,
        }),
        ErrorScope::Tag | ErrorScope::Image => ControlFlow::Continue(()),
    }
}

fn record(
    report: &mut RunReport,
    policy: &ImageMirrorPolicy,
    tag: &str,
    outcome: MirrorOutcome,
    error: Option<String>,
) {
    let record = TagRecord {
        image: policy.name.clone(),
        source: policy.source.to_string(),
        destination: policy.destination.to_string(),
        tag: tag.to_string(),
        outcome,
        error,
    };

    match &record.error {
        Some(error) => warn!(
            image = %record.image,
            source = %record.source,
            destination = %record.destination,
            tag = %record.tag,
            outcome = %record.outcome,
            error = %error,
            "Mirror decision"
        ),
        None => info!(
            image = %record.image,
            source = %record.source,
            destination = %record.destination,
            tag = %record.tag,
            outcome = %record.outcome,
            "Mirror decision"
        ),
    }

    report.record(record);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagmirror_test::{InMemoryRegistry, Operation};

    fn config(yaml: &str) -> Config {
        Config::from_yaml_str(yaml).unwrap()
    }

    #[tokio::test]
    async fn test_empty_config_runs_cleanly() {
        let registry = Arc::new(InMemoryRegistry::new());
        let mirrorer = Mirrorer::new(registry.clone(), AuthResolver::empty());

        let report = mirrorer.run(&config("")).await.unwrap();

        assert!(report.records().is_empty());
        assert!(report.finished_at().is_some());
        assert!(registry.calls().is_empty());
    }

    #[tokio::test]
    async fn test_highest_with_no_candidates_records_nothing() {
        let registry = Arc::new(InMemoryRegistry::new());
        let source = Repository::parse("ghcr.io/org/app").unwrap();
        registry.insert_image(&source, "latest", "x");
        registry.insert_image(&source, "2.0.0-rc.1", "y");
        let mirrorer = Mirrorer::new(registry.clone(), AuthResolver::empty());

        let report = mirrorer
            .run(&config(
                "images:\n  app:\n    source: ghcr.io/org/app\n    destination: localhost:5000/app\n",
            ))
            .await
            .unwrap();

        assert!(report.records().is_empty());
        assert_eq!(registry.probe_count(), 0);
    }

    #[tokio::test]
    async fn test_destination_listing_only_for_higher() {
        let registry = Arc::new(InMemoryRegistry::new());
        let source = Repository::parse("ghcr.io/org/app").unwrap();
        registry.insert_image(&source, "1.0.0", "v1");
        let mirrorer = Mirrorer::new(registry.clone(), AuthResolver::empty());

        mirrorer
            .run(&config(
                "images:\n  app:\n    source: ghcr.io/org/app\n    destination: localhost:5000/app\n    mode: semver\n",
            ))
            .await
            .unwrap();

        assert_eq!(registry.count(Operation::ListTags), 1);
    }

    #[tokio::test]
    async fn test_source_listing_failure_is_image_level() {
        let registry = Arc::new(InMemoryRegistry::new());
        let source = Repository::parse("ghcr.io/org/app").unwrap();
        registry.fail(Operation::ListTags, &source);
        let mirrorer = Mirrorer::new(registry.clone(), AuthResolver::empty());

        let report = mirrorer
            .run(&config(
                "images:\n  app:\n    source: ghcr.io/org/app\n    destination: localhost:5000/app\n",
            ))
            .await
            .unwrap();

        assert_eq!(
            report.outcomes_for("app"),
            [(IMAGE_LEVEL_TAG, MirrorOutcome::Error)]
        );
        assert!(report.has_failures());
    }
}
