//! Repository error types.

use thiserror::Error;

use super::id::RepositoryId;

/// Result type for repository tree operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Errors returned by structural operations on a repository tree.
///
/// Reads never fail: missing data is an empty result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// No repository with this id is registered.
    #[error("unknown repository {0}")]
    UnknownRepository(RepositoryId),

    /// The operation needs a leaf repository.
    #[error("{0} is not a leaf repository")]
    NotALeaf(RepositoryId),

    /// The operation needs a composite repository.
    #[error("{0} is not a composite repository")]
    NotAComposite(RepositoryId),

    /// A composite was listed among its own children.
    #[error("{0} cannot be a child of itself")]
    SelfChild(RepositoryId),

    /// Adding the child would make the composite its own descendant.
    #[error("adding {child} to {parent} would create a cycle")]
    Cycle {
        parent: RepositoryId,
        child: RepositoryId,
    },

    /// The repository is still a child of a composite.
    #[error("{id} is still a child of {parent}")]
    InUse {
        id: RepositoryId,
        parent: RepositoryId,
    },

    /// An item was handed to a leaf that does not own it.
    #[error("item {item} does not belong to {repository}")]
    ForeignItem {
        item: String,
        repository: RepositoryId,
    },
}

/// Report a broken internal invariant.
///
/// These are programming defects, not runtime conditions: the violation is
/// logged and then raised so that no read ever returns a silently wrong view.
#[track_caller]
pub(crate) fn invariant_violation(message: &str) -> ! {
    tracing::error!(message, "Resource repository invariant violated");
    panic!("resource repository invariant violated: {}", message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RepositoryError::Cycle {
            parent: RepositoryId::from_raw(1),
            child: RepositoryId::from_raw(2),
        };
        assert_eq!(err.to_string(), "adding repo#2 to repo#1 would create a cycle");

        let err = RepositoryError::UnknownRepository(RepositoryId::from_raw(9));
        assert!(err.to_string().contains("repo#9"));
    }

    #[test]
    #[should_panic(expected = "invariant violated")]
    fn test_invariant_violation_panics() {
        invariant_violation("bucket left empty");
    }
}
