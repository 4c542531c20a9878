//! Depth-first traversal over a repository's visible items.

use std::sync::Arc;

use crate::resource::{ResourceItem, ResourceNamespace, ResourceType};

/// Whether a traversal should go on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitResult {
    Continue,
    Abort,
}

/// Visitor for [`Repository::accept`](super::Repository::accept).
///
/// Traversal runs under the tree lock: a visitor must not call back into the
/// tree.
pub trait ResourceVisitor {
    /// Called for every visible item; return [`VisitResult::Abort`] to stop.
    fn visit(&mut self, item: &Arc<ResourceItem>) -> VisitResult;

    fn should_visit_namespace(&mut self, _namespace: &ResourceNamespace) -> bool {
        true
    }

    fn should_visit_resource_type(&mut self, _resource_type: ResourceType) -> bool {
        true
    }
}

impl<F> ResourceVisitor for F
where
    F: FnMut(&Arc<ResourceItem>) -> VisitResult,
{
    fn visit(&mut self, item: &Arc<ResourceItem>) -> VisitResult {
        self(item)
    }
}
