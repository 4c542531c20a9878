//! Locking read surface of a registered repository.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::error::RepositoryResult;
use super::id::RepositoryId;
use super::pending::Executor;
use super::tree::RepositoryTree;
use super::visitor::{ResourceVisitor, VisitResult};
use crate::map::ResourceMultimap;
use crate::resource::{ResourceItem, ResourceNamespace, ResourceType, ResourceVisibility};

/// Read handle for one repository, leaf or composite.
///
/// Every method takes the tree lock for its whole duration. Reads never
/// fail: a namespace or type nobody contributes to, or a repository that
/// has since been disposed, reads as empty.
///
/// Reads of a composite may repair its merged caches in place, which is
/// why they need the exclusive lock even though they look read-only.
#[derive(Debug, Clone)]
pub struct Repository {
    tree: RepositoryTree,
    id: RepositoryId,
}

impl Repository {
    pub(crate) fn new(tree: RepositoryTree, id: RepositoryId) -> Self {
        Self { tree, id }
    }

    pub fn id(&self) -> RepositoryId {
        self.id
    }

    pub fn tree(&self) -> &RepositoryTree {
        &self.tree
    }

    pub fn display_name(&self) -> Option<String> {
        self.tree.lock().display_name(self.id)
    }

    /// Visible items named `name`.
    pub fn resources(
        &self,
        namespace: &ResourceNamespace,
        resource_type: ResourceType,
        name: &str,
    ) -> Vec<Arc<ResourceItem>> {
        self.tree
            .lock()
            .with_map(self.id, namespace, resource_type, |map| {
                map.map(|map| map.get(name)).unwrap_or_default()
            })
    }

    /// Visible items matching `predicate`.
    ///
    /// `predicate` runs under the tree lock and must not call back into the
    /// tree.
    pub fn resources_matching<P>(
        &self,
        namespace: &ResourceNamespace,
        resource_type: ResourceType,
        mut predicate: P,
    ) -> Vec<Arc<ResourceItem>>
    where
        P: FnMut(&ResourceItem) -> bool,
    {
        self.tree
            .lock()
            .with_map(self.id, namespace, resource_type, |map| match map {
                Some(map) => map
                    .values()
                    .filter(|item| predicate(item))
                    .cloned()
                    .collect(),
                None => Vec::new(),
            })
    }

    /// Visible items grouped by name.
    pub fn resources_of_type(
        &self,
        namespace: &ResourceNamespace,
        resource_type: ResourceType,
    ) -> ResourceMultimap {
        self.tree
            .lock()
            .with_map(self.id, namespace, resource_type, |map| {
                map.map(|map| map.to_multimap()).unwrap_or_default()
            })
    }

    /// Visible items declared public.
    pub fn public_resources(
        &self,
        namespace: &ResourceNamespace,
        resource_type: ResourceType,
    ) -> Vec<Arc<ResourceItem>> {
        self.resources_matching(namespace, resource_type, |item| {
            item.visibility() == ResourceVisibility::Public
        })
    }

    pub fn resource_names(
        &self,
        namespace: &ResourceNamespace,
        resource_type: ResourceType,
    ) -> BTreeSet<String> {
        self.tree
            .lock()
            .with_map(self.id, namespace, resource_type, |map| {
                map.map(|map| map.names().cloned().collect())
                    .unwrap_or_default()
            })
    }

    pub fn has_resources(
        &self,
        namespace: &ResourceNamespace,
        resource_type: ResourceType,
        name: &str,
    ) -> bool {
        self.tree
            .lock()
            .with_map(self.id, namespace, resource_type, |map| {
                map.is_some_and(|map| map.contains_name(name))
            })
    }

    pub fn has_resources_of_type(
        &self,
        namespace: &ResourceNamespace,
        resource_type: ResourceType,
    ) -> bool {
        self.tree
            .lock()
            .with_map(self.id, namespace, resource_type, |map| {
                map.is_some_and(|map| !map.is_empty())
            })
    }

    /// Types with at least one visible item in `namespace`.
    pub fn resource_types(&self, namespace: &ResourceNamespace) -> BTreeSet<ResourceType> {
        let mut state = self.tree.lock();
        ResourceType::ALL
            .iter()
            .copied()
            .filter(|&resource_type| {
                state.with_map(self.id, namespace, resource_type, |map| {
                    map.is_some_and(|map| !map.is_empty())
                })
            })
            .collect()
    }

    /// Namespaces served by this repository's leaves.
    pub fn namespaces(&self) -> BTreeSet<ResourceNamespace> {
        self.tree.lock().namespaces(self.id)
    }

    /// Flattened leaf repositories, highest priority first.
    pub fn leaf_repositories(&self) -> Vec<RepositoryId> {
        self.tree.lock().leaf_repositories(self.id)
    }

    /// Walk every visible item by namespace, then type, then name.
    ///
    /// The whole walk happens under one lock acquisition; the visitor must
    /// not call back into the tree.
    pub fn accept(&self, visitor: &mut dyn ResourceVisitor) -> VisitResult {
        let mut state = self.tree.lock();
        for namespace in state.namespaces(self.id) {
            if !visitor.should_visit_namespace(&namespace) {
                continue;
            }
            for resource_type in ResourceType::ALL {
                if !visitor.should_visit_resource_type(resource_type) {
                    continue;
                }
                let result = state.with_map(self.id, &namespace, resource_type, |map| {
                    let Some(map) = map else {
                        return VisitResult::Continue;
                    };
                    for item in map.values() {
                        if visitor.visit(item) == VisitResult::Abort {
                            return VisitResult::Abort;
                        }
                    }
                    VisitResult::Continue
                });
                if result == VisitResult::Abort {
                    return VisitResult::Abort;
                }
            }
        }
        VisitResult::Continue
    }

    pub fn modification_count(&self) -> RepositoryResult<u64> {
        self.tree.modification_count(self.id)
    }

    /// See [`RepositoryTree::invoke_after_pending_updates_finish`].
    pub fn invoke_after_pending_updates_finish<F>(
        &self,
        executor: Arc<dyn Executor>,
        callback: F,
    ) -> RepositoryResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.tree
            .invoke_after_pending_updates_finish(self.id, executor, callback)
    }
}
