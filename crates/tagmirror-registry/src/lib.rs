//! # Tagmirror Registry
//!
//! Container registry access for tagmirror.
//!
//! This crate provides:
//!
//! - [`RegistryClient`] - The capability the mirroring engine needs: list
//!   tags, probe a tag, fetch an image, push an image
//! - [`HttpRegistryClient`] - OCI Distribution API implementation over HTTP
//! - [`AuthResolver`] - Maps registry hosts to credential providers and caches
//!   what they return
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tagmirror_core::Repository;
//! use tagmirror_registry::{AuthResolver, HttpRegistryClient, RegistryClient, RegistryConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HttpRegistryClient::new(RegistryConfig::new())?;
//!     let auth = AuthResolver::new();
//!
//!     let repo = Repository::parse("nginx")?;
//!     let credential = auth.resolve(repo.registry()).await?;
//!     let tags = client.list_tags(&repo, &credential).await?;
//!     println!("{} tags", tags.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     RegistryClient                           │
//! │  ┌──────────────────────┐    ┌─────────────────────────────┐ │
//! │  │  HttpRegistryClient  │    │  tagmirror-test in-memory   │ │
//! │  │  (OCI v2, reqwest)   │    │      (tests)                │ │
//! │  └──────────────────────┘    └─────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//!                               ▲
//!                               │ Credential
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       AuthResolver                           │
//! │   gcr.io, pkg.dev → Google   dkr.ecr → ECR   azurecr.io → Azure│
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod auth;
mod client;
mod config;
mod error;
mod http;
mod oci;
mod providers;
#[cfg(test)]
mod test_server;
mod token;

pub use auth::{default_rules, AuthResolver, Credential, DispatchRule, ProviderFamily};
pub use client::{ImageHandle, Probe, RegistryClient};
pub use config::RegistryConfig;
pub use error::{CredentialError, RegistryError};
pub use http::HttpRegistryClient;
pub use oci::{
    compute_digest, Descriptor, ImageIndex, ImageManifest, Manifest, ManifestPayload, MediaType,
    TagList,
};
pub use providers::{
    AzureProvider, CredentialProvider, EcrProvider, GoogleProvider, GOOGLE_CLOUD_PLATFORM_SCOPE,
    GOOGLE_TOKEN_USERNAME,
};
pub use token::{Challenge, TokenCache};
