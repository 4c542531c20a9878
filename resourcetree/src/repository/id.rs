//! Repository identifiers.

use std::fmt;

/// Opaque id of a repository registered in a [`RepositoryTree`].
///
/// Ids are never reused within one tree. They are what items record as their
/// owning repository and what repositories record as their dependents, so no
/// node holds a reference to another node.
///
/// [`RepositoryTree`]: super::RepositoryTree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepositoryId(u64);

impl RepositoryId {
    /// Build an id from its raw value.
    ///
    /// Ids built this way only refer to a repository if the tree issued the
    /// same raw value; this is mostly useful in tests.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "repo#{}", self.0)
    }
}
