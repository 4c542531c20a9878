//! Leaf repositories.
//!
//! A leaf owns the live items of exactly one namespace and is the single
//! source of truth for them. Composites only ever read a leaf's slices.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use super::error::{RepositoryError, RepositoryResult};
use super::id::RepositoryId;
use super::pending::PendingWaiter;
use crate::map::ResourceMultimap;
use crate::resource::{Configuration, ResourceItem, ResourceNamespace, ResourceType};

/// Capability of any table owning the items of one namespace.
pub trait SingleNamespaceRepository {
    fn id(&self) -> RepositoryId;

    fn namespace(&self) -> &ResourceNamespace;

    /// Human-readable name for logging.
    fn display_name(&self) -> &str;

    /// This repository's own slice for `(namespace, resource_type)`; `None`
    /// if it has no items there.
    fn resources(
        &self,
        namespace: &ResourceNamespace,
        resource_type: ResourceType,
    ) -> Option<&ResourceMultimap>;

    /// Monotonically non-decreasing change counter.
    fn modification_count(&self) -> u64;

    /// Register a composite that merges this repository's items.
    fn add_dependent(&mut self, parent: RepositoryId);

    fn remove_dependent(&mut self, parent: RepositoryId);

    fn dependents(&self) -> &BTreeSet<RepositoryId>;
}

/// In-memory leaf table of resource items.
///
/// Obtained through [`RepositoryTree::update_leaf`], which assigns a fresh
/// modification count after every closure that changed something.
///
/// [`RepositoryTree::update_leaf`]: super::RepositoryTree::update_leaf
#[derive(Debug)]
pub struct LeafRepository {
    id: RepositoryId,
    namespace: ResourceNamespace,
    display_name: String,
    maps: HashMap<ResourceType, ResourceMultimap>,
    modification_count: u64,
    dirty_types: HashSet<ResourceType>,
    dependents: BTreeSet<RepositoryId>,
    pending_updates: usize,
    waiters: Vec<PendingWaiter>,
}

impl LeafRepository {
    pub(crate) fn new(
        id: RepositoryId,
        namespace: ResourceNamespace,
        display_name: impl Into<String>,
        modification_count: u64,
    ) -> Self {
        Self {
            id,
            namespace,
            display_name: display_name.into(),
            maps: HashMap::new(),
            modification_count,
            dirty_types: HashSet::new(),
            dependents: BTreeSet::new(),
            pending_updates: 0,
            waiters: Vec::new(),
        }
    }

    /// Build and add an item owned by this leaf.
    pub fn add(
        &mut self,
        resource_type: ResourceType,
        name: impl Into<String>,
        configuration: Configuration,
        value: impl Into<String>,
    ) -> Arc<ResourceItem> {
        let item = Arc::new(ResourceItem::new(
            self.id,
            self.namespace.clone(),
            resource_type,
            name,
            configuration,
            value,
        ));
        self.push(Arc::clone(&item));
        item
    }

    /// Add a prebuilt item. It must name this leaf as its repository and
    /// carry this leaf's namespace.
    pub fn insert(&mut self, item: ResourceItem) -> RepositoryResult<Arc<ResourceItem>> {
        if item.repository() != self.id || item.namespace() != &self.namespace {
            return Err(RepositoryError::ForeignItem {
                item: item.reference(),
                repository: self.id,
            });
        }
        let item = Arc::new(item);
        self.push(Arc::clone(&item));
        Ok(item)
    }

    fn push(&mut self, item: Arc<ResourceItem>) {
        let resource_type = item.resource_type();
        self.maps
            .entry(resource_type)
            .or_default()
            .entry(item.name().to_string())
            .or_default()
            .push(item);
        self.dirty_types.insert(resource_type);
    }

    /// Remove one item by identity. Returns whether it was present.
    pub fn remove_item(&mut self, item: &Arc<ResourceItem>) -> bool {
        let removed = self.retain(item.resource_type(), item.name(), |i| !Arc::ptr_eq(i, item));
        removed > 0
    }

    /// Remove the items of `name` with exactly this configuration.
    pub fn remove(
        &mut self,
        resource_type: ResourceType,
        name: &str,
        configuration: &Configuration,
    ) -> usize {
        self.retain(resource_type, name, |i| i.configuration() != configuration)
    }

    /// Remove every item of `name`.
    pub fn remove_all(&mut self, resource_type: ResourceType, name: &str) -> usize {
        self.retain(resource_type, name, |_| false)
    }

    /// Drop every item of one type.
    pub fn clear_type(&mut self, resource_type: ResourceType) -> usize {
        match self.maps.remove(&resource_type) {
            Some(map) => {
                self.dirty_types.insert(resource_type);
                map.values().map(Vec::len).sum()
            }
            None => 0,
        }
    }

    fn retain<F>(&mut self, resource_type: ResourceType, name: &str, mut keep: F) -> usize
    where
        F: FnMut(&Arc<ResourceItem>) -> bool,
    {
        let Some(map) = self.maps.get_mut(&resource_type) else {
            return 0;
        };
        let Some(items) = map.get_mut(name) else {
            return 0;
        };
        let before = items.len();
        items.retain(|i| keep(i));
        let removed = before - items.len();
        if items.is_empty() {
            map.remove(name);
        }
        if map.is_empty() {
            self.maps.remove(&resource_type);
        }
        if removed > 0 {
            self.dirty_types.insert(resource_type);
        }
        removed
    }

    /// Types this leaf has items of.
    pub fn resource_types(&self) -> BTreeSet<ResourceType> {
        self.maps.keys().copied().collect()
    }

    /// Total item count across all types.
    pub fn item_count(&self) -> usize {
        self.maps
            .values()
            .flat_map(|map| map.values())
            .map(Vec::len)
            .sum()
    }

    pub(crate) fn take_dirty_types(&mut self) -> Vec<ResourceType> {
        let mut types: Vec<ResourceType> = self.dirty_types.drain().collect();
        types.sort();
        types
    }

    pub(crate) fn set_modification_count(&mut self, count: u64) {
        self.modification_count = count;
    }

    pub(crate) fn begin_pending_update(&mut self) {
        self.pending_updates += 1;
    }

    /// Returns the waiters to dispatch once no update is pending any more.
    pub(crate) fn finish_pending_update(&mut self) -> Vec<PendingWaiter> {
        if self.pending_updates == 0 {
            tracing::warn!(
                repository = %self.id,
                name = %self.display_name,
                "Pending update finished without a matching begin"
            );
        }
        self.pending_updates = self.pending_updates.saturating_sub(1);
        if self.pending_updates == 0 {
            std::mem::take(&mut self.waiters)
        } else {
            Vec::new()
        }
    }

    pub fn has_pending_updates(&self) -> bool {
        self.pending_updates > 0
    }

    /// Queue `waiter`, or hand it back if nothing is pending.
    pub(crate) fn wait_for_pending_updates(
        &mut self,
        waiter: PendingWaiter,
    ) -> Option<PendingWaiter> {
        if self.pending_updates == 0 {
            Some(waiter)
        } else {
            self.waiters.push(waiter);
            None
        }
    }

    pub(crate) fn take_waiters(&mut self) -> Vec<PendingWaiter> {
        std::mem::take(&mut self.waiters)
    }
}

impl SingleNamespaceRepository for LeafRepository {
    fn id(&self) -> RepositoryId {
        self.id
    }

    fn namespace(&self) -> &ResourceNamespace {
        &self.namespace
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn resources(
        &self,
        namespace: &ResourceNamespace,
        resource_type: ResourceType,
    ) -> Option<&ResourceMultimap> {
        if namespace != &self.namespace {
            return None;
        }
        self.maps.get(&resource_type)
    }

    fn modification_count(&self) -> u64 {
        self.modification_count
    }

    fn add_dependent(&mut self, parent: RepositoryId) {
        self.dependents.insert(parent);
    }

    fn remove_dependent(&mut self, parent: RepositoryId) {
        self.dependents.remove(&parent);
    }

    fn dependents(&self) -> &BTreeSet<RepositoryId> {
        &self.dependents
    }
}
