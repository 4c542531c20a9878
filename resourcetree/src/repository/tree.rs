//! The repository registry and its single lock.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use super::composite::{CompositeState, LeafSource};
use super::error::{invariant_violation, RepositoryError, RepositoryResult};
use super::handle::Repository;
use super::id::RepositoryId;
use super::leaf::{LeafRepository, SingleNamespaceRepository};
use super::pending::{Executor, PendingWaiter};
use super::view::MapRef;
use crate::config::TreeConfig;
use crate::resource::{ResourceNamespace, ResourceType};

/// Kind of a registered repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryKind {
    Leaf,
    Composite,
}

/// A registered repository.
#[derive(Debug)]
pub(crate) enum Node {
    Leaf(LeafRepository),
    Composite(CompositeState),
}

impl Node {
    fn kind(&self) -> RepositoryKind {
        match self {
            Node::Leaf(_) => RepositoryKind::Leaf,
            Node::Composite(_) => RepositoryKind::Composite,
        }
    }

    fn add_dependent(&mut self, parent: RepositoryId) {
        match self {
            Node::Leaf(leaf) => leaf.add_dependent(parent),
            Node::Composite(composite) => composite.add_dependent(parent),
        }
    }

    fn remove_dependent(&mut self, parent: RepositoryId) {
        match self {
            Node::Leaf(leaf) => leaf.remove_dependent(parent),
            Node::Composite(composite) => composite.remove_dependent(parent),
        }
    }

    fn dependents(&self) -> &BTreeSet<RepositoryId> {
        match self {
            Node::Leaf(leaf) => leaf.dependents(),
            Node::Composite(composite) => composite.dependents(),
        }
    }
}

impl LeafSource for HashMap<RepositoryId, Node> {
    fn leaf(&self, id: RepositoryId) -> Option<&dyn SingleNamespaceRepository> {
        match self.get(&id) {
            Some(Node::Leaf(leaf)) => Some(leaf),
            _ => None,
        }
    }
}

/// Everything guarded by the tree lock.
#[derive(Debug)]
pub(crate) struct TreeState {
    nodes: HashMap<RepositoryId, Node>,
    next_id: u64,
    generation: u64,
    config: TreeConfig,
}

impl TreeState {
    fn new(config: TreeConfig) -> Self {
        Self {
            nodes: HashMap::new(),
            next_id: 1,
            generation: 0,
            config,
        }
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn node(&self, id: RepositoryId) -> RepositoryResult<&Node> {
        self.nodes
            .get(&id)
            .ok_or(RepositoryError::UnknownRepository(id))
    }

    fn leaf_mut(&mut self, id: RepositoryId) -> RepositoryResult<&mut LeafRepository> {
        match self.nodes.get_mut(&id) {
            Some(Node::Leaf(leaf)) => Ok(leaf),
            Some(Node::Composite(_)) => Err(RepositoryError::NotALeaf(id)),
            None => Err(RepositoryError::UnknownRepository(id)),
        }
    }

    fn composite(&self, id: RepositoryId) -> RepositoryResult<&CompositeState> {
        match self.node(id)? {
            Node::Composite(composite) => Ok(composite),
            Node::Leaf(_) => Err(RepositoryError::NotAComposite(id)),
        }
    }

    fn composite_mut(&mut self, id: RepositoryId) -> &mut CompositeState {
        match self.nodes.get_mut(&id) {
            Some(Node::Composite(composite)) => composite,
            _ => invariant_violation(&format!("{} is no longer a registered composite", id)),
        }
    }

    /// Composites listing `id` among their direct children.
    fn structural_parents(&self, id: RepositoryId) -> Vec<RepositoryId> {
        let mut parents: Vec<RepositoryId> = self
            .nodes
            .values()
            .filter_map(|node| match node {
                Node::Composite(composite) if composite.has_child(id) => Some(composite.id()),
                _ => None,
            })
            .collect();
        parents.sort();
        parents
    }

    /// Whether `target` is reachable from `root` through child lists.
    fn reaches(&self, root: RepositoryId, target: RepositoryId) -> bool {
        let mut stack = vec![root];
        let mut seen = BTreeSet::new();
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(Node::Composite(composite)) = self.nodes.get(&id) {
                stack.extend(composite.children());
            }
        }
        false
    }

    /// Leaves under `children` in priority order, first occurrence kept.
    fn flatten(&self, children: &[RepositoryId]) -> Vec<(RepositoryId, ResourceNamespace)> {
        let mut seen = BTreeSet::new();
        let mut leaves = Vec::new();
        let mut push = |id: RepositoryId, leaves: &mut Vec<(RepositoryId, ResourceNamespace)>| {
            if !seen.insert(id) {
                return;
            }
            match self.nodes.get(&id) {
                Some(Node::Leaf(leaf)) => leaves.push((id, leaf.namespace().clone())),
                _ => invariant_violation(&format!("flattened leaf {} is not registered", id)),
            }
        };
        for child in children {
            match self.nodes.get(child) {
                Some(Node::Leaf(_)) => push(*child, &mut leaves),
                Some(Node::Composite(composite)) => {
                    for leaf in composite.leaves() {
                        push(*leaf, &mut leaves);
                    }
                }
                None => invariant_violation(&format!("child {} is not registered", child)),
            }
        }
        leaves
    }

    fn all_children(composite: &CompositeState) -> Vec<RepositoryId> {
        composite.children().collect()
    }

    // ---------------------------------------------------------------------
    // Modification counts
    // ---------------------------------------------------------------------

    /// Current modification count of `id`.
    ///
    /// A composite with exactly one local child reports that child's count.
    /// Otherwise it bumps its own count whenever a local child's count
    /// differs from the last observation.
    pub(crate) fn modification_count(&mut self, id: RepositoryId) -> RepositoryResult<u64> {
        let locals = match self.node(id)? {
            Node::Leaf(leaf) => return Ok(leaf.modification_count()),
            Node::Composite(composite) => composite.local_children().to_vec(),
        };
        if let [only] = locals.as_slice() {
            return self.modification_count(*only);
        }

        let mut counts = Vec::with_capacity(locals.len());
        for child in locals {
            counts.push((child, self.modification_count(child)?));
        }
        let changed = self.composite_mut(id).child_counts_changed(&counts);
        if changed {
            let generation = self.next_generation();
            let composite = self.composite_mut(id);
            composite.observe_child_counts(counts);
            composite.set_modification_count(generation);
        }
        Ok(self.composite_mut(id).own_modification_count())
    }

    /// Move `id`'s reported count to a fresh generation.
    fn raise_to_fresh(&mut self, id: RepositoryId) {
        let generation = self.next_generation();
        match self.nodes.get_mut(&id) {
            Some(Node::Leaf(leaf)) => leaf.set_modification_count(generation),
            Some(Node::Composite(composite)) => {
                if let [only] = composite.local_children() {
                    let only = *only;
                    self.raise_to_fresh(only);
                } else {
                    composite.set_modification_count(generation);
                }
            }
            None => invariant_violation(&format!("cannot raise count of unregistered {}", id)),
        }
    }

    // ---------------------------------------------------------------------
    // Structure
    // ---------------------------------------------------------------------

    fn add_leaf(&mut self, namespace: ResourceNamespace, display_name: String) -> RepositoryId {
        let id = RepositoryId::from_raw(self.next_id);
        self.next_id += 1;
        let generation = self.next_generation();
        tracing::debug!(
            repository = %id,
            namespace = %namespace,
            name = %display_name,
            "Added leaf repository"
        );
        self.nodes.insert(
            id,
            Node::Leaf(LeafRepository::new(id, namespace, display_name, generation)),
        );
        id
    }

    fn add_composite(&mut self, display_name: String) -> RepositoryId {
        let id = RepositoryId::from_raw(self.next_id);
        self.next_id += 1;
        let generation = self.next_generation();
        tracing::debug!(repository = %id, name = %display_name, "Added composite repository");
        self.nodes.insert(
            id,
            Node::Composite(CompositeState::new(id, display_name, generation)),
        );
        id
    }

    fn validate_children(
        &self,
        composite: RepositoryId,
        children: &[RepositoryId],
    ) -> RepositoryResult<()> {
        self.composite(composite)?;
        for &child in children {
            if child == composite {
                return Err(RepositoryError::SelfChild(composite));
            }
            if let Node::Composite(_) = self.node(child)? {
                if self.reaches(child, composite) {
                    return Err(RepositoryError::Cycle {
                        parent: composite,
                        child,
                    });
                }
            }
        }
        Ok(())
    }

    fn set_children(
        &mut self,
        id: RepositoryId,
        locals: Vec<RepositoryId>,
        libraries: Vec<RepositoryId>,
        others: Vec<RepositoryId>,
    ) -> RepositoryResult<()> {
        let all: Vec<RepositoryId> = locals
            .iter()
            .chain(&libraries)
            .chain(&others)
            .copied()
            .collect();
        self.validate_children(id, &all)?;

        let previous_count = self.modification_count(id)?;

        let old_locals = self.composite_mut(id).local_children().to_vec();
        for child in old_locals {
            if let Some(node) = self.nodes.get_mut(&child) {
                node.remove_dependent(id);
            }
        }

        let leaves = self.flatten(&all);
        let leaf_count = leaves.len();
        let mut counts = Vec::with_capacity(locals.len());
        for &child in &locals {
            counts.push((child, self.modification_count(child)?));
        }
        for &child in &locals {
            if let Some(node) = self.nodes.get_mut(&child) {
                node.add_dependent(id);
            }
        }

        let generation = self.next_generation();
        let single_local = match locals.as_slice() {
            [only] => Some(*only),
            _ => None,
        };
        let (local_count, library_count, other_count) =
            (locals.len(), libraries.len(), others.len());
        let composite = self.composite_mut(id);
        composite.set_children(locals, libraries, others);
        composite.set_leaves(leaves);
        composite.observe_child_counts(counts);
        composite.set_modification_count(generation);
        let name = composite.display_name().to_string();

        if let Some(only) = single_local {
            if self.modification_count(only)? <= previous_count {
                self.raise_to_fresh(only);
            }
        }

        tracing::info!(
            repository = %id,
            name = %name,
            locals = local_count,
            libraries = library_count,
            others = other_count,
            leaves = leaf_count,
            "Replaced composite children"
        );

        self.propagate_children_reset(id);
        Ok(())
    }

    /// Recompute the flattened leaves of every composite above `id`,
    /// descendants before ancestors.
    fn propagate_children_reset(&mut self, id: RepositoryId) {
        let mut ancestors = BTreeSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            for parent in self.structural_parents(current) {
                if ancestors.insert(parent) {
                    stack.push(parent);
                }
            }
        }

        let mut ordered = Vec::with_capacity(ancestors.len());
        let mut done = BTreeSet::new();
        for &ancestor in &ancestors {
            self.post_order(ancestor, &ancestors, &mut done, &mut ordered);
        }

        for ancestor in ordered {
            let children = Self::all_children(self.composite_mut(ancestor));
            let leaves = self.flatten(&children);
            let generation = self.next_generation();
            let composite = self.composite_mut(ancestor);
            composite.set_leaves(leaves);
            composite.set_modification_count(generation);
            tracing::debug!(
                repository = %ancestor,
                changed = %id,
                "Descendant children replaced, dropped merged slices"
            );
        }
    }

    fn post_order(
        &self,
        id: RepositoryId,
        within: &BTreeSet<RepositoryId>,
        done: &mut BTreeSet<RepositoryId>,
        ordered: &mut Vec<RepositoryId>,
    ) {
        if !done.insert(id) {
            return;
        }
        if let Some(Node::Composite(composite)) = self.nodes.get(&id) {
            for child in composite.children() {
                if within.contains(&child) {
                    self.post_order(child, within, done, ordered);
                }
            }
        }
        ordered.push(id);
    }

    fn dispose(&mut self, id: RepositoryId) -> RepositoryResult<Vec<PendingWaiter>> {
        self.node(id)?;
        if let Some(&parent) = self.structural_parents(id).first() {
            return Err(RepositoryError::InUse { id, parent });
        }

        let waiters = match self.nodes.remove(&id) {
            Some(Node::Leaf(mut leaf)) => leaf.take_waiters(),
            Some(Node::Composite(composite)) => {
                for child in composite.local_children() {
                    if let Some(node) = self.nodes.get_mut(child) {
                        node.remove_dependent(id);
                    }
                }
                Vec::new()
            }
            None => Vec::new(),
        };
        tracing::debug!(repository = %id, "Disposed repository");
        Ok(waiters)
    }

    // ---------------------------------------------------------------------
    // Invalidation
    // ---------------------------------------------------------------------

    /// Mark `leaf` stale in `start` and in every composite above it.
    fn invalidate_upward(
        &mut self,
        start: Vec<RepositoryId>,
        leaf: RepositoryId,
        namespace: &ResourceNamespace,
        types: &[ResourceType],
    ) {
        let trace = self.config.trace_updates;
        let mut queue: VecDeque<RepositoryId> = start.into();
        let mut visited = BTreeSet::new();
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            let generation = self.generation + 1;
            let Some(Node::Composite(composite)) = self.nodes.get_mut(&id) else {
                continue;
            };
            let marked = composite.invalidate(leaf, namespace, types);
            if marked {
                composite.set_modification_count(generation);
                self.generation = generation;
            }
            if trace {
                tracing::info!(
                    repository = %id,
                    leaf = %leaf,
                    namespace = %namespace,
                    types = ?types,
                    marked,
                    "Invalidated merged slices"
                );
            } else {
                tracing::trace!(
                    repository = %id,
                    leaf = %leaf,
                    marked,
                    "Invalidated merged slices"
                );
            }
            if let Some(node) = self.nodes.get(&id) {
                queue.extend(node.dependents().iter().copied());
            }
        }
    }

    fn leaf_namespace(&self, leaf: RepositoryId) -> RepositoryResult<ResourceNamespace> {
        match self.node(leaf)? {
            Node::Leaf(leaf) => Ok(leaf.namespace().clone()),
            Node::Composite(_) => Err(RepositoryError::NotALeaf(leaf)),
        }
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Run `f` over the up-to-date map of one slice of `id`.
    pub(crate) fn with_map<R>(
        &mut self,
        id: RepositoryId,
        namespace: &ResourceNamespace,
        resource_type: ResourceType,
        f: impl FnOnce(Option<MapRef<'_>>) -> R,
    ) -> R {
        self.prepare(id, namespace, resource_type);
        f(self.map(id, namespace, resource_type))
    }

    fn prepare(
        &mut self,
        id: RepositoryId,
        namespace: &ResourceNamespace,
        resource_type: ResourceType,
    ) {
        let needed = match self.nodes.get(&id) {
            Some(Node::Composite(composite)) => composite.needs_preparation(namespace, resource_type),
            _ => false,
        };
        if !needed {
            return;
        }
        // Out of the arena while it reads its leaves. It goes back in even if
        // the merge unwinds, with its caches dropped.
        if let Some(Node::Composite(mut composite)) = self.nodes.remove(&id) {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                composite.prepare(&self.nodes, namespace, resource_type, &self.config)
            }));
            if result.is_err() {
                composite.clear_caches();
            }
            self.nodes.insert(id, Node::Composite(composite));
            if let Err(payload) = result {
                panic::resume_unwind(payload);
            }
        }
    }

    fn map(
        &self,
        id: RepositoryId,
        namespace: &ResourceNamespace,
        resource_type: ResourceType,
    ) -> Option<MapRef<'_>> {
        match self.nodes.get(&id)? {
            Node::Leaf(leaf) => leaf.resources(namespace, resource_type).map(MapRef::Leaf),
            Node::Composite(composite) => composite.map(&self.nodes, namespace, resource_type),
        }
    }

    /// Namespaces served by `id`, in order.
    pub(crate) fn namespaces(&self, id: RepositoryId) -> BTreeSet<ResourceNamespace> {
        match self.nodes.get(&id) {
            Some(Node::Leaf(leaf)) => BTreeSet::from([leaf.namespace().clone()]),
            Some(Node::Composite(composite)) => composite.namespaces().cloned().collect(),
            None => BTreeSet::new(),
        }
    }

    /// Flattened leaves of `id`, highest priority first.
    pub(crate) fn leaf_repositories(&self, id: RepositoryId) -> Vec<RepositoryId> {
        match self.nodes.get(&id) {
            Some(Node::Leaf(_)) => vec![id],
            Some(Node::Composite(composite)) => composite.leaves().to_vec(),
            None => Vec::new(),
        }
    }

    pub(crate) fn display_name(&self, id: RepositoryId) -> Option<String> {
        match self.nodes.get(&id)? {
            Node::Leaf(leaf) => Some(leaf.display_name().to_string()),
            Node::Composite(composite) => Some(composite.display_name().to_string()),
        }
    }

    // ---------------------------------------------------------------------
    // Pending updates
    // ---------------------------------------------------------------------

    /// Attach `waiter` to every leaf under `id` reachable through local
    /// children; waiters that can run now go to `ready`.
    fn collect_waiter(
        &mut self,
        id: RepositoryId,
        waiter: PendingWaiter,
        ready: &mut Vec<PendingWaiter>,
    ) {
        let locals = match self.nodes.get_mut(&id) {
            Some(Node::Leaf(leaf)) => {
                if let Some(waiter) = leaf.wait_for_pending_updates(waiter) {
                    ready.push(waiter);
                }
                return;
            }
            Some(Node::Composite(composite)) => composite.local_children().to_vec(),
            None => invariant_violation(&format!("waiter attached to unregistered {}", id)),
        };
        if locals.is_empty() {
            ready.push(waiter);
            return;
        }
        let parts = waiter.fan_in(locals.len());
        for (child, part) in locals.into_iter().zip(parts) {
            self.collect_waiter(child, part, ready);
        }
    }

    fn low_memory(&mut self) -> usize {
        let mut dropped = 0;
        for node in self.nodes.values_mut() {
            if let Node::Composite(composite) = node {
                dropped += composite.cached_slices();
                composite.clear_caches();
            }
        }
        dropped
    }
}

/// Registry of leaf and composite repositories sharing one lock.
///
/// Every node lives in an id-keyed arena behind a single mutex, so every
/// read and every mutation anywhere in the tree is totally ordered. Cloning
/// a tree clones a handle to the same arena.
///
/// # Lock ordering
///
/// Acquire this lock only *after* any lock the host already holds on the
/// calling thread (an application-wide read/write lock, say), never the
/// other way round. The tree cannot check this. Callbacks passed to
/// [`update_leaf`](Self::update_leaf) run under the lock and must not call
/// back into the tree.
///
/// # Example
///
/// ```
/// use resourcetree::repository::RepositoryTree;
/// use resourcetree::resource::{Configuration, ResourceNamespace, ResourceType};
///
/// let tree = RepositoryTree::new();
/// let app = tree.add_leaf(ResourceNamespace::Res, "app");
/// let lib = tree.add_leaf(ResourceNamespace::Res, "lib");
/// let root = tree.add_composite("module");
/// tree.set_children(root, &[app, lib], &[], &[]).unwrap();
///
/// tree.update_leaf_and_invalidate(lib, |leaf| {
///     leaf.add(ResourceType::String, "title", Configuration::default(), "Library");
/// })
/// .unwrap();
/// tree.update_leaf_and_invalidate(app, |leaf| {
///     leaf.add(ResourceType::String, "title", Configuration::default(), "App");
/// })
/// .unwrap();
///
/// let repo = tree.repository(root).unwrap();
/// let title = repo.resources(&ResourceNamespace::Res, ResourceType::String, "title");
/// assert_eq!(title[0].value(), "App");
/// ```
#[derive(Debug, Clone)]
pub struct RepositoryTree {
    state: Arc<Mutex<TreeState>>,
}

impl Default for RepositoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RepositoryTree {
    pub fn new() -> Self {
        Self::with_config(TreeConfig::default())
    }

    pub fn with_config(config: TreeConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(TreeState::new(config))),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, TreeState> {
        self.state.lock()
    }

    pub fn config(&self) -> TreeConfig {
        self.lock().config.clone()
    }

    /// Number of registered repositories.
    pub fn len(&self) -> usize {
        self.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self, id: RepositoryId) -> Option<RepositoryKind> {
        self.lock().nodes.get(&id).map(Node::kind)
    }

    /// Register an empty leaf for `namespace`.
    pub fn add_leaf(
        &self,
        namespace: ResourceNamespace,
        display_name: impl Into<String>,
    ) -> RepositoryId {
        self.lock().add_leaf(namespace, display_name.into())
    }

    /// Register a composite with no children.
    pub fn add_composite(&self, display_name: impl Into<String>) -> RepositoryId {
        self.lock().add_composite(display_name.into())
    }

    /// Replace a composite's children wholesale.
    ///
    /// Priority follows list order: locals, then libraries, then others.
    /// Drops every merged slice of the composite and of every composite
    /// above it. Only local children are subscribed to for invalidation;
    /// library and other children are treated as snapshots.
    pub fn set_children(
        &self,
        composite: RepositoryId,
        locals: &[RepositoryId],
        libraries: &[RepositoryId],
        others: &[RepositoryId],
    ) -> RepositoryResult<()> {
        self.lock().set_children(
            composite,
            locals.to_vec(),
            libraries.to_vec(),
            others.to_vec(),
        )
    }

    /// Mutate a leaf's items.
    ///
    /// The leaf gets a fresh modification count if anything changed, but no
    /// composite is told: follow up with
    /// [`invalidate_parent_caches`](Self::invalidate_parent_caches), or use
    /// [`update_leaf_and_invalidate`](Self::update_leaf_and_invalidate).
    pub fn update_leaf<R>(
        &self,
        leaf: RepositoryId,
        f: impl FnOnce(&mut LeafRepository) -> R,
    ) -> RepositoryResult<R> {
        let mut state = self.lock();
        let (result, _) = Self::mutate_leaf(&mut state, leaf, f)?;
        Ok(result)
    }

    /// Mutate a leaf's items and invalidate its dependents for every type
    /// that changed.
    pub fn update_leaf_and_invalidate<R>(
        &self,
        leaf: RepositoryId,
        f: impl FnOnce(&mut LeafRepository) -> R,
    ) -> RepositoryResult<R> {
        let mut state = self.lock();
        let (result, changed) = Self::mutate_leaf(&mut state, leaf, f)?;
        if !changed.is_empty() {
            let namespace = state.leaf_namespace(leaf)?;
            let dependents = state.node(leaf)?.dependents().iter().copied().collect();
            state.invalidate_upward(dependents, leaf, &namespace, &changed);
        }
        Ok(result)
    }

    fn mutate_leaf<R>(
        state: &mut TreeState,
        id: RepositoryId,
        f: impl FnOnce(&mut LeafRepository) -> R,
    ) -> RepositoryResult<(R, Vec<ResourceType>)> {
        let generation = state.generation + 1;
        let leaf = state.leaf_mut(id)?;
        let result = f(leaf);
        let changed = leaf.take_dirty_types();
        if !changed.is_empty() {
            leaf.set_modification_count(generation);
            state.generation = generation;
        }
        Ok((result, changed))
    }

    /// Leaf entry point: tell every composite depending on `leaf` that its
    /// items of `types` changed.
    pub fn invalidate_parent_caches(
        &self,
        leaf: RepositoryId,
        types: &[ResourceType],
    ) -> RepositoryResult<()> {
        let mut state = self.lock();
        let namespace = state.leaf_namespace(leaf)?;
        let dependents = state.node(leaf)?.dependents().iter().copied().collect();
        state.invalidate_upward(dependents, leaf, &namespace, types);
        Ok(())
    }

    /// Mark `leaf` stale in `composite`'s cached slices of `types`, then
    /// forward to every composite depending on `composite`.
    ///
    /// Nothing is recomputed until the next read.
    pub fn invalidate_cache(
        &self,
        composite: RepositoryId,
        leaf: RepositoryId,
        types: &[ResourceType],
    ) -> RepositoryResult<()> {
        let mut state = self.lock();
        state.composite(composite)?;
        let namespace = state.leaf_namespace(leaf)?;
        state.invalidate_upward(vec![composite], leaf, &namespace, types);
        Ok(())
    }

    /// Read handle for `id`.
    pub fn repository(&self, id: RepositoryId) -> RepositoryResult<Repository> {
        self.lock().node(id)?;
        Ok(Repository::new(self.clone(), id))
    }

    pub fn modification_count(&self, id: RepositoryId) -> RepositoryResult<u64> {
        self.lock().modification_count(id)
    }

    /// Remove a repository that no composite lists as a child.
    ///
    /// Callbacks still waiting on a disposed leaf are run.
    pub fn dispose(&self, id: RepositoryId) -> RepositoryResult<()> {
        let waiters = self.lock().dispose(id)?;
        for waiter in waiters {
            waiter.dispatch();
        }
        Ok(())
    }

    /// Drop every merged slice and all reconciliation bookkeeping. Reads
    /// rebuild from the leaves afterwards.
    pub fn on_low_memory(&self) {
        let dropped = self.lock().low_memory();
        tracing::info!(dropped_slices = dropped, "Low memory, dropped merged resource caches");
    }

    /// A background refresh of `leaf` started.
    pub fn begin_pending_update(&self, leaf: RepositoryId) -> RepositoryResult<()> {
        self.lock().leaf_mut(leaf)?.begin_pending_update();
        Ok(())
    }

    /// A background refresh of `leaf` ended. Runs waiters if it was the last.
    pub fn finish_pending_update(&self, leaf: RepositoryId) -> RepositoryResult<()> {
        let waiters = self.lock().leaf_mut(leaf)?.finish_pending_update();
        for waiter in waiters {
            waiter.dispatch();
        }
        Ok(())
    }

    /// Run `callback` on `executor` once no leaf reachable from `id` through
    /// local children has a pending update.
    pub fn invoke_after_pending_updates_finish<F>(
        &self,
        id: RepositoryId,
        executor: Arc<dyn Executor>,
        callback: F,
    ) -> RepositoryResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut ready = Vec::new();
        {
            let mut state = self.lock();
            state.node(id)?;
            let waiter = PendingWaiter::new(executor, Box::new(callback));
            state.collect_waiter(id, waiter, &mut ready);
        }
        for waiter in ready {
            waiter.dispatch();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Configuration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::repository::DirectExecutor;

    fn string(tree: &RepositoryTree, leaf: RepositoryId, name: &str, value: &str) {
        tree.update_leaf_and_invalidate(leaf, |l| {
            l.add(ResourceType::String, name, Configuration::default(), value);
        })
        .unwrap();
    }

    mod structure {
        use super::*;

        #[test]
        fn test_unknown_and_wrong_kind() {
            let tree = RepositoryTree::new();
            let leaf = tree.add_leaf(ResourceNamespace::Res, "a");
            let missing = RepositoryId::from_raw(999);

            assert_eq!(
                tree.set_children(leaf, &[], &[], &[]),
                Err(RepositoryError::NotAComposite(leaf))
            );
            assert_eq!(
                tree.modification_count(missing),
                Err(RepositoryError::UnknownRepository(missing))
            );
            let composite = tree.add_composite("c");
            assert_eq!(
                tree.update_leaf(composite, |_| ()),
                Err(RepositoryError::NotALeaf(composite))
            );
            assert_eq!(
                tree.set_children(composite, &[missing], &[], &[]),
                Err(RepositoryError::UnknownRepository(missing))
            );
        }

        #[test]
        fn test_self_child_and_cycle() {
            let tree = RepositoryTree::new();
            let outer = tree.add_composite("outer");
            let inner = tree.add_composite("inner");
            assert_eq!(
                tree.set_children(outer, &[outer], &[], &[]),
                Err(RepositoryError::SelfChild(outer))
            );

            tree.set_children(outer, &[inner], &[], &[]).unwrap();
            assert_eq!(
                tree.set_children(inner, &[], &[outer], &[]),
                Err(RepositoryError::Cycle {
                    parent: inner,
                    child: outer
                })
            );
        }

        #[test]
        fn test_dependents_follow_local_children() {
            let tree = RepositoryTree::new();
            let a = tree.add_leaf(ResourceNamespace::Res, "a");
            let b = tree.add_leaf(ResourceNamespace::Res, "b");
            let root = tree.add_composite("root");

            tree.set_children(root, &[a], &[b], &[]).unwrap();
            {
                let state = tree.lock();
                assert!(state.nodes[&a].dependents().contains(&root));
                assert!(state.nodes[&b].dependents().is_empty());
            }

            tree.set_children(root, &[b], &[], &[]).unwrap();
            let state = tree.lock();
            assert!(state.nodes[&a].dependents().is_empty());
            assert!(state.nodes[&b].dependents().contains(&root));
        }

        #[test]
        fn test_flattened_leaves_are_deduplicated() {
            let tree = RepositoryTree::new();
            let a = tree.add_leaf(ResourceNamespace::Res, "a");
            let b = tree.add_leaf(ResourceNamespace::Res, "b");
            let inner = tree.add_composite("inner");
            let root = tree.add_composite("root");
            tree.set_children(inner, &[b, a], &[], &[]).unwrap();
            tree.set_children(root, &[a, inner], &[b], &[]).unwrap();

            let repo = tree.repository(root).unwrap();
            assert_eq!(repo.leaf_repositories(), vec![a, b]);
        }

        #[test]
        fn test_dispose() {
            let tree = RepositoryTree::new();
            let a = tree.add_leaf(ResourceNamespace::Res, "a");
            let root = tree.add_composite("root");
            tree.set_children(root, &[], &[], &[a]).unwrap();

            assert_eq!(
                tree.dispose(a),
                Err(RepositoryError::InUse { id: a, parent: root })
            );
            tree.dispose(root).unwrap();
            tree.dispose(a).unwrap();
            assert!(tree.is_empty());
            assert_eq!(tree.dispose(a), Err(RepositoryError::UnknownRepository(a)));
        }

        #[test]
        fn test_composite_survives_failed_merge() {
            let tree = RepositoryTree::new();
            let a = tree.add_leaf(ResourceNamespace::Res, "a");
            let b = tree.add_leaf(ResourceNamespace::Res, "b");
            let root = tree.add_composite("root");
            tree.set_children(root, &[a, b], &[], &[]).unwrap();
            string(&tree, a, "x", "from a");
            string(&tree, b, "y", "from b");
            let repo = tree.repository(root).unwrap();

            let detached = tree.lock().nodes.remove(&b).unwrap();
            let read = panic::catch_unwind(AssertUnwindSafe(|| {
                repo.resources_of_type(&ResourceNamespace::Res, ResourceType::String)
            }));
            assert!(read.is_err());
            assert_eq!(tree.kind(root), Some(RepositoryKind::Composite));
            assert_eq!(tree.lock().composite(root).unwrap().cached_slices(), 0);

            tree.lock().nodes.insert(b, detached);
            let names = repo.resource_names(&ResourceNamespace::Res, ResourceType::String);
            assert_eq!(names.len(), 2);
        }
    }

    mod counts {
        use super::*;

        #[test]
        fn test_single_child_forwards_count() {
            let tree = RepositoryTree::new();
            let a = tree.add_leaf(ResourceNamespace::Res, "a");
            let root = tree.add_composite("root");
            tree.set_children(root, &[a], &[], &[]).unwrap();

            string(&tree, a, "x", "1");
            assert_eq!(
                tree.modification_count(root).unwrap(),
                tree.modification_count(a).unwrap()
            );
        }

        #[test]
        fn test_multi_child_bumps_on_change() {
            let tree = RepositoryTree::new();
            let a = tree.add_leaf(ResourceNamespace::Res, "a");
            let b = tree.add_leaf(ResourceNamespace::Res, "b");
            let root = tree.add_composite("root");
            tree.set_children(root, &[a, b], &[], &[]).unwrap();

            let before = tree.modification_count(root).unwrap();
            assert_eq!(tree.modification_count(root).unwrap(), before);
            tree.update_leaf(b, |l| {
                l.add(ResourceType::Id, "x", Configuration::default(), "");
            })
            .unwrap();
            assert!(tree.modification_count(root).unwrap() > before);
        }

        #[test]
        fn test_unchanged_leaf_keeps_count() {
            let tree = RepositoryTree::new();
            let a = tree.add_leaf(ResourceNamespace::Res, "a");
            let before = tree.modification_count(a).unwrap();
            tree.update_leaf(a, |l| l.remove_all(ResourceType::Id, "nothing"))
                .unwrap();
            assert_eq!(tree.modification_count(a).unwrap(), before);
        }

        #[test]
        fn test_switching_single_child_never_decreases() {
            let tree = RepositoryTree::new();
            let old = tree.add_leaf(ResourceNamespace::Res, "old");
            let new = tree.add_leaf(ResourceNamespace::Res, "new");
            let root = tree.add_composite("root");
            tree.set_children(root, &[new], &[], &[]).unwrap();
            tree.set_children(root, &[old], &[], &[]).unwrap();
            string(&tree, old, "x", "1");

            let before = tree.modification_count(root).unwrap();
            tree.set_children(root, &[new], &[], &[]).unwrap();
            let after = tree.modification_count(root).unwrap();
            assert!(after > before);
            assert_eq!(after, tree.modification_count(new).unwrap());
        }
    }

    mod pending {
        use super::*;

        fn counter_callback(counter: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
            let counter = Arc::clone(counter);
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }

        #[test]
        fn test_runs_immediately_without_pending_updates() {
            let tree = RepositoryTree::new();
            let a = tree.add_leaf(ResourceNamespace::Res, "a");
            let root = tree.add_composite("root");
            tree.set_children(root, &[a], &[], &[]).unwrap();

            let counter = Arc::new(AtomicUsize::new(0));
            tree.invoke_after_pending_updates_finish(
                root,
                Arc::new(DirectExecutor),
                counter_callback(&counter),
            )
            .unwrap();
            assert_eq!(counter.load(Ordering::SeqCst), 1);
        }

        #[test]
        fn test_waits_for_every_local_child() {
            let tree = RepositoryTree::new();
            let a = tree.add_leaf(ResourceNamespace::Res, "a");
            let b = tree.add_leaf(ResourceNamespace::Res, "b");
            let root = tree.add_composite("root");
            tree.set_children(root, &[a, b], &[], &[]).unwrap();

            tree.begin_pending_update(a).unwrap();
            tree.begin_pending_update(b).unwrap();
            tree.begin_pending_update(b).unwrap();

            let counter = Arc::new(AtomicUsize::new(0));
            tree.invoke_after_pending_updates_finish(
                root,
                Arc::new(DirectExecutor),
                counter_callback(&counter),
            )
            .unwrap();

            tree.finish_pending_update(a).unwrap();
            tree.finish_pending_update(b).unwrap();
            assert_eq!(counter.load(Ordering::SeqCst), 0);
            tree.finish_pending_update(b).unwrap();
            assert_eq!(counter.load(Ordering::SeqCst), 1);
        }

        #[test]
        fn test_callback_may_read_the_tree() {
            let tree = RepositoryTree::new();
            let a = tree.add_leaf(ResourceNamespace::Res, "a");
            tree.begin_pending_update(a).unwrap();

            let seen = Arc::new(AtomicUsize::new(0));
            let reader = tree.clone();
            let seen_in_callback = Arc::clone(&seen);
            tree.invoke_after_pending_updates_finish(a, Arc::new(DirectExecutor), move || {
                seen_in_callback.store(reader.len(), Ordering::SeqCst);
            })
            .unwrap();

            tree.finish_pending_update(a).unwrap();
            assert_eq!(seen.load(Ordering::SeqCst), 1);
        }

        #[test]
        fn test_dispose_runs_waiters() {
            let tree = RepositoryTree::new();
            let a = tree.add_leaf(ResourceNamespace::Res, "a");
            tree.begin_pending_update(a).unwrap();

            let counter = Arc::new(AtomicUsize::new(0));
            tree.invoke_after_pending_updates_finish(
                a,
                Arc::new(DirectExecutor),
                counter_callback(&counter),
            )
            .unwrap();
            tree.dispose(a).unwrap();
            assert_eq!(counter.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_low_memory_drops_merged_slices() {
        let tree = RepositoryTree::new();
        let a = tree.add_leaf(ResourceNamespace::Res, "a");
        let b = tree.add_leaf(ResourceNamespace::Res, "b");
        let root = tree.add_composite("root");
        tree.set_children(root, &[a, b], &[], &[]).unwrap();
        string(&tree, a, "x", "from a");
        string(&tree, b, "x", "from b");

        let repo = tree.repository(root).unwrap();
        let before = repo.resources_of_type(&ResourceNamespace::Res, ResourceType::String);
        assert_eq!(tree.lock().composite(root).unwrap().cached_slices(), 1);

        tree.on_low_memory();
        assert_eq!(tree.lock().composite(root).unwrap().cached_slices(), 0);
        assert_eq!(
            repo.resources_of_type(&ResourceNamespace::Res, ResourceType::String),
            before
        );
    }
}
