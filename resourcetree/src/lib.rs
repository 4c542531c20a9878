//! ResourceTree - hierarchical resource repositories
//!
//! This library presents many independently updated, namespace-scoped leaf
//! resource tables as one consistent table. Composite repositories merge
//! their leaves with override semantics (earlier repositories shadow later
//! ones for the same name and configuration), cache the merged slices, and
//! repair them incrementally when a leaf reports a change instead of
//! rebuilding them.
//!
//! # Modules
//!
//! - [`resource`]: namespaces, types, configurations and resource items
//! - [`map`]: the merged multimaps composites cache
//! - [`repository`]: leaves, composites and the [`RepositoryTree`] registry
//! - [`config`]: runtime settings and the user's configuration file
//! - [`manifest`]: JSON description of a tree
//!
//! # Lock ordering
//!
//! A [`RepositoryTree`] is guarded by exactly one lock. Take any lock of
//! your own application *before* calling into the tree, never while a tree
//! callback is running. See [`repository`] for details.
//!
//! [`RepositoryTree`]: repository::RepositoryTree

pub mod config;
pub mod manifest;
pub mod map;
pub mod repository;
pub mod resource;

/// Version of the library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
