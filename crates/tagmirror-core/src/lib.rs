//! # Tagmirror Core
//!
//! Decision logic for mirroring container image tags between registries.
//!
//! This crate is free of network I/O. It provides:
//!
//! - [`Config`] - Validated, immutable per-run mirroring policy
//! - [`VersionFilter`] - Semantic version parsing, filtering and ordering of tags
//! - [`select`] - Which tags a [`MirrorMode`] mirrors, given the registry listings
//! - [`MirrorOutcome`] - What happened to each (image, tag) pair
//! - [`Repository`] / [`ImageReference`] - Registry coordinates
//!
//! ## Example
//!
//! ```rust
//! use tagmirror_core::{select, Config};
//!
//! let config = Config::from_yaml_str(
//!     "images:\n  app:\n    source: app\n    destination: localhost:5000/app\n",
//! )
//! .unwrap();
//!
//! let no_destination: [&str; 0] = [];
//! let selection = select(
//!     &config.images()[0],
//!     &["1.0.0", "1.1.0", "2.0.0-beta", "bogus"],
//!     &no_destination,
//! );
//! assert_eq!(selection.tags(), ["1.1.0"]);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod outcome;
pub mod reference;
pub mod selector;
pub mod version;

#[cfg(test)]
mod proptest_tests;

pub use config::{Config, ErrorScope, ImageMirrorPolicy, MirrorMode};
pub use error::{ConfigError, Result};
pub use outcome::MirrorOutcome;
pub use reference::{ImageReference, Repository};
pub use selector::{needs_destination_tags, select, Selection};
pub use version::{
    DropReason, Identifier, InvalidVersion, TaggedVersion, Version, VersionFilter,
    MAX_MAJOR_VERSION,
};
