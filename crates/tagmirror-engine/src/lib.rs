//! # Tagmirror Engine
//!
//! Runs a mirroring configuration against container registries.
//!
//! For every configured image the engine lists the source (and, in `higher`
//! mode, the destination) repository, selects tags with
//! [`tagmirror_core::select`] and mirrors each selected tag with
//! [`mirror_tag`]:
//!
//! ```text
//! probe destination ──not found──▶ fetch source ─▶ push ─▶ copied
//!        │
//!      found ──replace-tag off──▶ skipped-exists
//!        │
//!   replace-tag on ─▶ fetch both ─▶ same identity ─▶ skipped-identical
//!                                 └▶ different ─────▶ push ─▶ replaced
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use tagmirror_core::{Config, MirrorOutcome, Repository};
//! use tagmirror_engine::Mirrorer;
//! use tagmirror_registry::AuthResolver;
//! use tagmirror_test::InMemoryRegistry;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let registry = Arc::new(InMemoryRegistry::new());
//! let source = Repository::parse("ghcr.io/org/app").unwrap();
//! registry.insert_image(&source, "1.2.0", "app 1.2.0");
//!
//! let config = Config::from_yaml_str(
//!     "images:\n  app:\n    source: ghcr.io/org/app\n    destination: localhost:5000/app\n",
//! )
//! .unwrap();
//!
//! let report = Mirrorer::new(registry, AuthResolver::empty())
//!     .run(&config)
//!     .await
//!     .unwrap();
//! assert_eq!(report.count(MirrorOutcome::Copied), 1);
//! # });
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod decision;
pub mod error;
pub mod report;
pub mod runner;

pub use decision::{mirror_tag, ImageCredentials};
pub use error::{MirrorError, Result};
pub use report::{RunReport, TagRecord, IMAGE_LEVEL_TAG};
pub use runner::Mirrorer;
