//! Composite repositories: merged, lazily reconciled views over leaves.
//!
//! A composite never owns items. For every `(namespace, type)` slice that
//! is read it caches a [`MergedMap`] built from the leaves serving that
//! namespace, and keeps enough bookkeeping to repair the cache one leaf at a
//! time when leaves report changes.
//!
//! # Read path
//!
//! ```text
//! map(ns, type)
//!   ├─ one leaf serves ns ──► that leaf's own slice (no cache)
//!   ├─ cached, nothing stale ──► cached merge
//!   ├─ not cached ──► rebuild from every leaf, in priority order
//!   └─ cached, stale leaves ──► retract + re-add only those leaves
//! ```
//!
//! Reconciling a set of stale leaves produces the same map as a rebuild
//! because both merged map kinds order items by repository priority on
//! insertion, whatever order the items arrive in.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use super::error::invariant_violation;
use super::id::RepositoryId;
use super::leaf::SingleNamespaceRepository;
use super::view::MapRef;
use crate::config::TreeConfig;
use crate::map::{MergedMap, RepositoryPriority};
use crate::resource::{ResourceNamespace, ResourceType};

/// Cache key of one merged slice.
pub(crate) type SliceKey = (ResourceNamespace, ResourceType);

/// Lookup of leaf repositories by id.
pub(crate) trait LeafSource {
    fn leaf(&self, id: RepositoryId) -> Option<&dyn SingleNamespaceRepository>;
}

fn require_leaf<L>(leaves: &L, id: RepositoryId) -> &dyn SingleNamespaceRepository
where
    L: LeafSource + ?Sized,
{
    match leaves.leaf(id) {
        Some(leaf) => leaf,
        None => invariant_violation(&format!(
            "composite references leaf {} which is not registered",
            id
        )),
    }
}

/// State of one composite repository.
#[derive(Debug)]
pub(crate) struct CompositeState {
    id: RepositoryId,
    display_name: String,
    local_children: Vec<RepositoryId>,
    library_children: Vec<RepositoryId>,
    other_children: Vec<RepositoryId>,
    /// Flattened leaves, highest priority first.
    leaves: Vec<RepositoryId>,
    leaves_by_namespace: HashMap<ResourceNamespace, Vec<RepositoryId>>,
    priority: Arc<RepositoryPriority>,
    cache: HashMap<SliceKey, MergedMap>,
    /// Names each leaf put into the cached merge of its namespace, per type.
    contributed_names: HashMap<(RepositoryId, ResourceType), BTreeSet<String>>,
    unreconciled: HashMap<SliceKey, BTreeSet<RepositoryId>>,
    observed_child_counts: Vec<(RepositoryId, u64)>,
    modification_count: u64,
    dependents: BTreeSet<RepositoryId>,
}

impl CompositeState {
    pub(crate) fn new(id: RepositoryId, display_name: impl Into<String>, generation: u64) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            local_children: Vec::new(),
            library_children: Vec::new(),
            other_children: Vec::new(),
            leaves: Vec::new(),
            leaves_by_namespace: HashMap::new(),
            priority: Arc::new(RepositoryPriority::default()),
            cache: HashMap::new(),
            contributed_names: HashMap::new(),
            unreconciled: HashMap::new(),
            observed_child_counts: Vec::new(),
            modification_count: generation,
            dependents: BTreeSet::new(),
        }
    }

    pub(crate) fn id(&self) -> RepositoryId {
        self.id
    }

    pub(crate) fn display_name(&self) -> &str {
        &self.display_name
    }

    pub(crate) fn local_children(&self) -> &[RepositoryId] {
        &self.local_children
    }

    /// Every direct child: local, then library, then other.
    pub(crate) fn children(&self) -> impl Iterator<Item = RepositoryId> + '_ {
        self.local_children
            .iter()
            .chain(&self.library_children)
            .chain(&self.other_children)
            .copied()
    }

    pub(crate) fn has_child(&self, id: RepositoryId) -> bool {
        self.children().any(|child| child == id)
    }

    pub(crate) fn leaves(&self) -> &[RepositoryId] {
        &self.leaves
    }

    pub(crate) fn namespaces(&self) -> impl Iterator<Item = &ResourceNamespace> {
        self.leaves_by_namespace.keys()
    }

    pub(crate) fn own_modification_count(&self) -> u64 {
        self.modification_count
    }

    pub(crate) fn set_modification_count(&mut self, count: u64) {
        self.modification_count = count;
    }

    pub(crate) fn dependents(&self) -> &BTreeSet<RepositoryId> {
        &self.dependents
    }

    pub(crate) fn add_dependent(&mut self, parent: RepositoryId) {
        self.dependents.insert(parent);
    }

    pub(crate) fn remove_dependent(&mut self, parent: RepositoryId) {
        self.dependents.remove(&parent);
    }

    /// Replace the direct child lists. Derived leaf indices are set
    /// separately through [`set_leaves`](Self::set_leaves).
    pub(crate) fn set_children(
        &mut self,
        locals: Vec<RepositoryId>,
        libraries: Vec<RepositoryId>,
        others: Vec<RepositoryId>,
    ) {
        self.local_children = locals;
        self.library_children = libraries;
        self.other_children = others;
    }

    /// Install a new flattened leaf list (with each leaf's namespace) and
    /// drop every derived cache.
    pub(crate) fn set_leaves(&mut self, leaves: Vec<(RepositoryId, ResourceNamespace)>) {
        let mut by_namespace: HashMap<ResourceNamespace, Vec<RepositoryId>> = HashMap::new();
        for (id, namespace) in &leaves {
            by_namespace.entry(namespace.clone()).or_default().push(*id);
        }
        self.leaves = leaves.into_iter().map(|(id, _)| id).collect();
        self.priority = Arc::new(RepositoryPriority::new(&self.leaves));
        self.leaves_by_namespace = by_namespace;
        self.clear_caches();
    }

    /// Drop merged maps and all reconciliation bookkeeping.
    pub(crate) fn clear_caches(&mut self) {
        self.cache.clear();
        self.contributed_names.clear();
        self.unreconciled.clear();
    }

    pub(crate) fn cached_slices(&self) -> usize {
        self.cache.len()
    }

    /// The only leaf serving `namespace`, if there is exactly one.
    fn sole_leaf(&self, namespace: &ResourceNamespace) -> Option<RepositoryId> {
        match self.leaves_by_namespace.get(namespace).map(Vec::as_slice) {
            Some([only]) => Some(*only),
            _ => None,
        }
    }

    // ---------------------------------------------------------------------
    // Modification counting
    // ---------------------------------------------------------------------

    /// Record the local children's counts as seen now.
    pub(crate) fn observe_child_counts(&mut self, counts: Vec<(RepositoryId, u64)>) {
        self.observed_child_counts = counts;
    }

    /// Whether any local child's count differs from the last observation.
    pub(crate) fn child_counts_changed(&self, counts: &[(RepositoryId, u64)]) -> bool {
        self.observed_child_counts.as_slice() != counts
    }

    // ---------------------------------------------------------------------
    // Invalidation
    // ---------------------------------------------------------------------

    /// Mark `leaf` stale in every cached slice of `namespace` among `types`.
    ///
    /// Nothing is recomputed here. Returns whether any slice was marked.
    pub(crate) fn invalidate(
        &mut self,
        leaf: RepositoryId,
        namespace: &ResourceNamespace,
        types: &[ResourceType],
    ) -> bool {
        let mut marked = false;
        for &resource_type in types {
            let key = (namespace.clone(), resource_type);
            if self.cache.contains_key(&key) {
                self.unreconciled.entry(key).or_default().insert(leaf);
                marked = true;
            }
        }
        marked
    }

    // ---------------------------------------------------------------------
    // Read path
    // ---------------------------------------------------------------------

    /// Whether [`prepare`](Self::prepare) has work to do for this slice.
    pub(crate) fn needs_preparation(
        &self,
        namespace: &ResourceNamespace,
        resource_type: ResourceType,
    ) -> bool {
        if self.sole_leaf(namespace).is_some() || !self.leaves_by_namespace.contains_key(namespace)
        {
            return false;
        }
        let key = (namespace.clone(), resource_type);
        !self.cache.contains_key(&key) || self.unreconciled.contains_key(&key)
    }

    /// Bring the cached merge of one slice up to date.
    pub(crate) fn prepare<L>(
        &mut self,
        leaves: &L,
        namespace: &ResourceNamespace,
        resource_type: ResourceType,
        config: &TreeConfig,
    ) where
        L: LeafSource + ?Sized,
    {
        if !self.needs_preparation(namespace, resource_type) {
            return;
        }
        let key = (namespace.clone(), resource_type);
        let stale = self.unreconciled.remove(&key);
        match stale {
            Some(stale) => self.reconcile(leaves, key, stale, config),
            None if self.cache.contains_key(&key) => {}
            None => self.rebuild(leaves, key, config),
        }
    }

    /// The up-to-date map for one slice. Must follow
    /// [`prepare`](Self::prepare) for the same slice.
    pub(crate) fn map<'a, L>(
        &'a self,
        leaves: &'a L,
        namespace: &ResourceNamespace,
        resource_type: ResourceType,
    ) -> Option<MapRef<'a>>
    where
        L: LeafSource + ?Sized,
    {
        if let Some(sole) = self.sole_leaf(namespace) {
            return require_leaf(leaves, sole)
                .resources(namespace, resource_type)
                .map(MapRef::Leaf);
        }
        let key = (namespace.clone(), resource_type);
        if self.unreconciled.contains_key(&key) {
            invariant_violation("merged slice read before its stale leaves were reconciled");
        }
        self.cache.get(&key).map(MapRef::Merged)
    }

    fn rebuild<L>(&mut self, leaves: &L, key: SliceKey, config: &TreeConfig)
    where
        L: LeafSource + ?Sized,
    {
        let started = Instant::now();
        let (namespace, resource_type) = &key;
        let mut merged = MergedMap::for_type(*resource_type, Arc::clone(&self.priority));
        let mut contributors = 0usize;

        if let Some(ids) = self.leaves_by_namespace.get(namespace) {
            for &id in ids {
                self.contributed_names.remove(&(id, *resource_type));
                let Some(items) = require_leaf(leaves, id).resources(namespace, *resource_type)
                else {
                    continue;
                };
                if items.is_empty() {
                    continue;
                }
                merged.put_all_map(items);
                self.contributed_names
                    .insert((id, *resource_type), items.keys().cloned().collect());
                contributors += 1;
            }
        }

        let elapsed = started.elapsed();
        tracing::debug!(
            repository = %self.id,
            namespace = %namespace,
            resource_type = %resource_type,
            contributors,
            items = merged.len(),
            elapsed_us = elapsed.as_micros() as u64,
            "Rebuilt merged slice"
        );
        if elapsed >= config.slow_merge_threshold {
            tracing::warn!(
                repository = %self.id,
                name = %self.display_name,
                namespace = %namespace,
                resource_type = %resource_type,
                elapsed_ms = elapsed.as_millis() as u64,
                "Slow resource merge"
            );
        }

        if contributors > 0 {
            self.cache.insert(key, merged);
        }
    }

    fn reconcile<L>(
        &mut self,
        leaves: &L,
        key: SliceKey,
        stale: BTreeSet<RepositoryId>,
        config: &TreeConfig,
    ) where
        L: LeafSource + ?Sized,
    {
        let started = Instant::now();
        let (namespace, resource_type) = &key;
        let Some(merged) = self.cache.get_mut(&key) else {
            invariant_violation("unreconciled leaves recorded for a slice with no cached merge");
        };

        let mut retracted = 0usize;
        let mut added = 0usize;
        for &id in &stale {
            if let Some(names) = self.contributed_names.remove(&(id, *resource_type)) {
                for name in &names {
                    retracted += merged.remove_if(name, |item| item.repository() == id);
                }
            }

            let contributes = self
                .leaves_by_namespace
                .get(namespace)
                .is_some_and(|ids| ids.contains(&id));
            if !contributes {
                continue;
            }
            let Some(items) = require_leaf(leaves, id).resources(namespace, *resource_type) else {
                continue;
            };
            if items.is_empty() {
                continue;
            }
            merged.put_all_map(items);
            added += items.values().map(Vec::len).sum::<usize>();
            self.contributed_names
                .insert((id, *resource_type), items.keys().cloned().collect());
        }

        debug_assert!(merged.is_consistent());
        let remaining = merged.len();
        if remaining == 0 {
            self.cache.remove(&key);
        }

        let elapsed = started.elapsed();
        if config.trace_updates {
            tracing::info!(
                repository = %self.id,
                namespace = %namespace,
                resource_type = %resource_type,
                leaves = ?stale,
                retracted,
                added,
                remaining,
                "Reconciled merged slice"
            );
        } else {
            tracing::debug!(
                repository = %self.id,
                namespace = %namespace,
                resource_type = %resource_type,
                leaves = stale.len(),
                retracted,
                added,
                remaining,
                "Reconciled merged slice"
            );
        }
        if elapsed >= config.slow_merge_threshold {
            tracing::warn!(
                repository = %self.id,
                name = %self.display_name,
                namespace = %namespace,
                resource_type = %resource_type,
                elapsed_ms = elapsed.as_millis() as u64,
                "Slow resource reconciliation"
            );
        }
    }

    #[cfg(test)]
    fn is_cached(&self, namespace: &ResourceNamespace, resource_type: ResourceType) -> bool {
        self.cache.contains_key(&(namespace.clone(), resource_type))
    }

    #[cfg(test)]
    fn is_stale(&self, namespace: &ResourceNamespace, resource_type: ResourceType) -> bool {
        self.unreconciled
            .contains_key(&(namespace.clone(), resource_type))
    }
}
