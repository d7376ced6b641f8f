//! OCI Distribution API client.
//!
//! Talks the v2 registry protocol to any host named by a [`Repository`]:
//! tag listing with `Link` pagination, manifest probes and fetches, blob copy
//! through monolithic uploads, and manifest pushes. Authentication follows the
//! registry's `WWW-Authenticate` challenge.
//!
//! Blobs are never buffered: each one streams from the source download
//! straight into the destination upload and is digest-checked on the way.

use std::collections::HashSet;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use reqwest::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, LINK, LOCATION, WWW_AUTHENTICATE};
use reqwest::{Body, RequestBuilder, Response, StatusCode};
use sha2::{Digest, Sha256};
use tagmirror_core::{ImageReference, Repository};
use tracing::debug;
use url::Url;

use crate::auth::Credential;
use crate::client::{ImageHandle, Probe, RegistryClient};
use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::oci::{finish_digest, Descriptor, Manifest, ManifestPayload, MediaType, TagList};
use crate::token::{Challenge, TokenCache, TokenResponse};

const PULL: &str = "pull";
const PUSH: &str = "pull,push";

/// Registry client speaking the OCI Distribution API over HTTP.
#[derive(Debug)]
pub struct HttpRegistryClient {
    config: RegistryConfig,
    http: reqwest::Client,
    tokens: TokenCache,
    basic_hosts: Mutex<HashSet<String>>,
}

impl HttpRegistryClient {
    /// Creates a new registry client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tagmirror_registry::{HttpRegistryClient, RegistryConfig};
    ///
    /// let client = HttpRegistryClient::new(RegistryConfig::new())?;
    /// # Ok::<(), tagmirror_registry::RegistryError>(())
    /// ```
    pub fn new(config: RegistryConfig) -> Result<Self, RegistryError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| RegistryError::ConnectionFailed {
                url: "client".to_string(),
                source: e,
            })?;

        Ok(Self {
            config,
            http,
            tokens: TokenCache::new(),
            basic_hosts: Mutex::new(HashSet::new()),
        })
    }

    /// Returns the registry configuration.
    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn origin(&self, repository: &Repository) -> String {
        let host = repository.api_host();
        format!("{}://{host}", self.config.scheme(host))
    }

    fn repository_url(&self, repository: &Repository) -> String {
        format!("{}/v2/{}", self.origin(repository), repository.path())
    }

    fn scope(repository: &Repository, actions: &str) -> String {
        format!("repository:{}:{actions}", repository.path())
    }

    /// Applies whatever authorization is known for `host` and `scope`.
    fn authorize(
        &self,
        request: RequestBuilder,
        host: &str,
        scope: &str,
        credential: &Credential,
    ) -> RequestBuilder {
        if let Credential::Bearer { token } = credential {
            return request.bearer_auth(token);
        }
        if let Some(token) = self.tokens.get(host, scope) {
            return request.bearer_auth(token);
        }
        if let Credential::Basic { username, password } = credential {
            if self.basic_hosts.lock().contains(host) {
                return request.basic_auth(username, Some(password));
            }
        }
        request
    }

    /// Sends a request, answering one authentication challenge if needed.
    async fn send<F>(
        &self,
        repository: &Repository,
        credential: &Credential,
        actions: &str,
        build: F,
    ) -> Result<Response, RegistryError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder + Send + Sync,
    {
        let host = repository.api_host();
        let scope = Self::scope(repository, actions);

        let response = self
            .authorize(build(&self.http), host, &scope, credential)
            .send()
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        if matches!(credential, Credential::Bearer { .. }) {
            return Err(RegistryError::AuthenticationFailed {
                message: format!("{host} rejected the bearer token"),
            });
        }
        self.tokens.invalidate(host, &scope);

        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(Challenge::parse);

        match challenge {
            Some(Challenge::Basic) => {
                if !matches!(credential, Credential::Basic { .. }) {
                    return Err(RegistryError::AuthenticationFailed {
                        message: format!("{host} requires credentials"),
                    });
                }
                self.basic_hosts.lock().insert(host.to_string());
            }
            Some(Challenge::Bearer {
                realm,
                service,
                scope: challenged,
            }) => {
                let requested = challenged.unwrap_or_else(|| scope.clone());
                let token = self
                    .fetch_token(&realm, service.as_deref(), &requested, credential)
                    .await?;
                self.tokens.insert(host, &scope, token);
            }
            None => {
                return Err(RegistryError::AuthenticationFailed {
                    message: format!("{host} returned 401 without a usable challenge"),
                });
            }
        }

        let response = self
            .authorize(build(&self.http), host, &scope, credential)
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(RegistryError::AuthenticationFailed {
                message: format!("{host} rejected the credentials for {scope}"),
            });
        }
        Ok(response)
    }

    /// Exchanges credentials for a bearer token at the challenge realm.
    async fn fetch_token(
        &self,
        realm: &str,
        service: Option<&str>,
        scope: &str,
        credential: &Credential,
    ) -> Result<String, RegistryError> {
        debug!(realm, scope, "Requesting registry token");

        let mut query = vec![("scope", scope)];
        if let Some(service) = service {
            query.push(("service", service));
        }

        let mut request = self.http.get(realm).query(&query);
        if let Credential::Basic { username, password } = credential {
            request = request.basic_auth(username, Some(password));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(RegistryError::AuthenticationFailed {
                message: format!("token endpoint {realm} returned {}", response.status()),
            });
        }

        let body: TokenResponse = response.json().await?;
        body.into_token()
            .ok_or_else(|| RegistryError::AuthenticationFailed {
                message: format!("token endpoint {realm} returned no token"),
            })
    }

    /// Converts an unsuccessful response into an error.
    async fn error_for(response: Response, reference: &str) -> RegistryError {
        let status = response.status();
        match status {
            StatusCode::NOT_FOUND => RegistryError::NotFound {
                reference: reference.to_string(),
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                RegistryError::AuthenticationFailed {
                    message: format!("{status} for {reference}"),
                }
            }
            _ => RegistryError::HttpError {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            },
        }
    }

    /// Fetches a manifest by tag or digest.
    async fn fetch_manifest(
        &self,
        repository: &Repository,
        reference: &str,
        credential: &Credential,
    ) -> Result<ManifestPayload, RegistryError> {
        let url = format!("{}/manifests/{reference}", self.repository_url(repository));
        let display = format!("{repository}:{reference}");

        let response = self
            .send(repository, credential, PULL, |http| {
                http.get(&url).header(ACCEPT, MediaType::ACCEPT_ALL)
            })
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_for(response, &display).await);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let bytes = response.bytes().await?.to_vec();
        let payload = ManifestPayload::from_bytes(&display, content_type.as_deref(), bytes)?;

        if reference.starts_with("sha256:") && payload.digest != reference {
            return Err(RegistryError::DigestMismatch {
                expected: reference.to_string(),
                actual: payload.digest,
            });
        }

        Ok(payload)
    }

    async fn blob_exists(
        &self,
        repository: &Repository,
        digest: &str,
        credential: &Credential,
    ) -> Result<bool, RegistryError> {
        let url = format!("{}/blobs/{digest}", self.repository_url(repository));
        let response = self
            .send(repository, credential, PUSH, |http| http.head(&url))
            .await?;

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::error_for(response, digest).await),
        }
    }

    /// Streams one blob from the source repository into the destination.
    async fn copy_blob(
        &self,
        source: &ImageHandle,
        blob: &Descriptor,
        destination: &Repository,
        credential: &Credential,
    ) -> Result<(), RegistryError> {
        let upload_failed = |message: String| RegistryError::UploadFailed {
            digest: blob.digest.clone(),
            message,
        };

        // Start upload session
        let start_url = format!("{}/blobs/uploads/", self.repository_url(destination));
        let response = self
            .send(destination, credential, PUSH, |http| http.post(&start_url))
            .await?;
        if !response.status().is_success() {
            return Err(upload_failed(format!(
                "failed to start upload: {}",
                response.status()
            )));
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| upload_failed("no upload location returned".to_string()))?;

        let origin = self.origin(destination);
        let mut upload_url = Url::parse(&origin)
            .and_then(|base| base.join(location))
            .map_err(|_| RegistryError::InvalidUrl {
                url: location.to_string(),
            })?;
        upload_url.query_pairs_mut().append_pair("digest", &blob.digest);

        // Open the source blob
        let repository = &source.source.repository;
        let blob_url = format!("{}/blobs/{}", self.repository_url(repository), blob.digest);
        let download = self
            .send(repository, &source.credential, PULL, |http| http.get(&blob_url))
            .await?;
        if !download.status().is_success() {
            return Err(Self::error_for(download, &blob.digest).await);
        }

        // Complete upload with PUT. A streamed body cannot be replayed, so the
        // authorization negotiated for the session start is reused as is.
        let body = Body::wrap_stream(verify_digest(
            download.bytes_stream(),
            blob.digest.clone(),
        ));
        let mut request = self
            .http
            .put(upload_url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body);
        if blob.size > 0 {
            request = request.header(CONTENT_LENGTH, blob.size);
        }

        let host = destination.api_host();
        let response = self
            .authorize(request, host, &Self::scope(destination, PUSH), credential)
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(RegistryError::AuthenticationFailed {
                message: format!("{host} rejected the upload of {}", blob.digest),
            });
        }
        if !response.status().is_success() {
            return Err(upload_failed(format!(
                "{}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        Ok(())
    }

    /// Copies every blob of `manifest` the destination does not hold.
    async fn copy_blobs(
        &self,
        source: &ImageHandle,
        manifest: &ManifestPayload,
        destination: &Repository,
        credential: &Credential,
    ) -> Result<(), RegistryError> {
        let Manifest::Image(image) = &manifest.manifest else {
            return Ok(());
        };

        for blob in image.blobs() {
            if self.blob_exists(destination, &blob.digest, credential).await? {
                debug!(digest = %blob.digest, "Blob already present");
                continue;
            }

            debug!(digest = %blob.digest, size = blob.size, "Copying blob");
            self.copy_blob(source, blob, destination, credential)
                .await?;
        }

        Ok(())
    }

    /// Pushes a manifest under a tag or digest.
    async fn push_manifest(
        &self,
        repository: &Repository,
        reference: &str,
        manifest: &ManifestPayload,
        credential: &Credential,
    ) -> Result<(), RegistryError> {
        let url = format!("{}/manifests/{reference}", self.repository_url(repository));

        let response = self
            .send(repository, credential, PUSH, |http| {
                http.put(&url)
                    .header(CONTENT_TYPE, manifest.media_type.as_str())
                    .body(manifest.bytes.clone())
            })
            .await?;

        if !response.status().is_success() {
            return Err(RegistryError::ManifestPushFailed {
                reference: format!("{repository}:{reference}"),
                message: format!(
                    "{}: {}",
                    response.status(),
                    response.text().await.unwrap_or_default()
                ),
            });
        }

        Ok(())
    }
}

/// Passes a blob download through unchanged, failing at the end of the
/// stream if the content does not hash to `expected`.
fn verify_digest<S, B>(
    stream: S,
    expected: String,
) -> impl Stream<Item = Result<B, RegistryError>> + Send + 'static
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    futures::stream::try_unfold(
        (Box::pin(stream), Sha256::new(), expected),
        |(mut stream, mut hasher, expected)| async move {
            match stream.next().await {
                Some(Ok(chunk)) => {
                    hasher.update(chunk.as_ref());
                    Ok(Some((chunk, (stream, hasher, expected))))
                }
                Some(Err(err)) => Err(RegistryError::from(err)),
                None => {
                    let actual = finish_digest(hasher);
                    if actual == expected {
                        Ok(None)
                    } else {
                        Err(RegistryError::DigestMismatch { expected, actual })
                    }
                }
            }
        },
    )
}

/// Extracts the target of a `rel="next"` link.
fn next_link(header: &str) -> Option<&str> {
    header.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        params
            .contains("rel=\"next\"")
            .then(|| target.trim().trim_start_matches('<').trim_end_matches('>'))
    })
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn list_tags(
        &self,
        repository: &Repository,
        credential: &Credential,
    ) -> Result<Vec<String>, RegistryError> {
        let mut url = format!("{}/tags/list", self.repository_url(repository));
        let mut visited = HashSet::from([url.clone()]);
        let mut tags = Vec::new();

        loop {
            let response = self
                .send(repository, credential, PULL, |http| http.get(&url))
                .await?;

            if response.status() == StatusCode::NOT_FOUND {
                debug!(repository = %repository, "Repository does not exist");
                return Ok(tags);
            }
            if !response.status().is_success() {
                return Err(Self::error_for(response, &repository.to_string()).await);
            }

            let next = response
                .headers()
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(next_link)
                .map(ToString::to_string);

            let page: TagList = response.json().await?;
            tags.extend(page.tags.unwrap_or_default());

            let Some(next) = next else { break };
            url = Url::parse(&url)
                .and_then(|current| current.join(&next))
                .map_err(|_| RegistryError::InvalidUrl { url: next.clone() })?
                .to_string();
            if !visited.insert(url.clone()) {
                return Err(RegistryError::PaginationLoop {
                    repository: repository.to_string(),
                    url,
                });
            }
        }

        debug!(repository = %repository, count = tags.len(), "Listed tags");
        Ok(tags)
    }

    async fn probe(
        &self,
        reference: &ImageReference,
        credential: &Credential,
    ) -> Result<Probe, RegistryError> {
        let repository = &reference.repository;
        let url = format!("{}/manifests/{}", self.repository_url(repository), reference.tag);

        let response = self
            .send(repository, credential, PULL, |http| {
                http.head(&url).header(ACCEPT, MediaType::ACCEPT_ALL)
            })
            .await?;

        match response.status() {
            s if s.is_success() => Ok(Probe::Exists {
                digest: response
                    .headers()
                    .get("docker-content-digest")
                    .and_then(|v| v.to_str().ok())
                    .map(ToString::to_string),
            }),
            StatusCode::NOT_FOUND => Ok(Probe::NotFound),
            _ => Err(Self::error_for(response, &reference.to_string()).await),
        }
    }

    async fn fetch_image(
        &self,
        reference: &ImageReference,
        credential: &Credential,
    ) -> Result<ImageHandle, RegistryError> {
        let repository = &reference.repository;
        let manifest = self
            .fetch_manifest(repository, &reference.tag, credential)
            .await?;

        let mut children = Vec::new();
        if let Manifest::Index(index) = &manifest.manifest {
            for child in &index.manifests {
                let payload = self
                    .fetch_manifest(repository, &child.digest, credential)
                    .await?;
                if payload.is_index() {
                    return Err(RegistryError::UnsupportedManifest {
                        reference: format!("{repository}@{}", child.digest),
                        media_type: payload.media_type,
                    });
                }
                children.push(payload);
            }
        }

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
        let repository = &reference.repository;

        for child in &image.children {
            self.copy_blobs(image, child, repository, credential).await?;
            self.push_manifest(repository, &child.digest, child, credential)
                .await?;
        }

        self.copy_blobs(image, &image.manifest, repository, credential)
            .await?;
        self.push_manifest(repository, &reference.tag, &image.manifest, credential)
            .await?;

        debug!(reference = %reference, digest = %image.manifest.digest, "Pushed manifest");
        Ok(())
    }
}
