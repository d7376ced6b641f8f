//! # Tagmirror Test
//!
//! Test doubles for the tagmirror workspace.
//!
//! - [`InMemoryRegistry`] - A deterministic [`RegistryClient`] that stores
//!   images in memory, records every call and fails on demand
//!
//! ## Example
//!
//! ```rust
//! use tagmirror_core::Repository;
//! use tagmirror_test::{InMemoryRegistry, Operation};
//!
//! let registry = InMemoryRegistry::new();
//! let app = Repository::parse("localhost:5000/app").unwrap();
//! registry.insert_image(&app, "1.0.0", "app 1.0.0");
//! registry.fail_tag(Operation::Fetch, &app.tag("1.0.0"));
//!
//! assert_eq!(registry.tags(&app), ["1.0.0"]);
//! ```
//!
//! [`RegistryClient`]: tagmirror_registry::RegistryClient

mod registry;

pub use registry::{Call, InMemoryRegistry, Operation};
