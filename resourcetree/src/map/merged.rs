//! Cached merge of one `(namespace, type)` slice.

use std::sync::Arc;

use super::duplicates::DuplicateMap;
use super::per_config::PerConfigMap;
use super::priority::RepositoryPriority;
use super::ResourceMultimap;
use crate::resource::{ResourceItem, ResourceType};

/// A composite repository's merged view of one slice.
///
/// Override-collapsing for every type except `id` and `styleable`, which
/// keep all contributed items.
#[derive(Debug, Clone)]
pub enum MergedMap {
    PerConfig(PerConfigMap),
    Duplicates(DuplicateMap),
}

impl MergedMap {
    /// Create the right kind of map for `resource_type`.
    pub fn for_type(resource_type: ResourceType, priority: Arc<RepositoryPriority>) -> Self {
        if resource_type.allows_duplicates() {
            MergedMap::Duplicates(DuplicateMap::new(priority))
        } else {
            MergedMap::PerConfig(PerConfigMap::new(priority))
        }
    }

    /// Stored item count, shadowed items included.
    pub fn len(&self) -> usize {
        match self {
            MergedMap::PerConfig(map) => map.len(),
            MergedMap::Duplicates(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_name(&self, name: &str) -> bool {
        match self {
            MergedMap::PerConfig(map) => map.contains_name(name),
            MergedMap::Duplicates(map) => map.contains_name(name),
        }
    }

    pub fn names(&self) -> Box<dyn Iterator<Item = &String> + '_> {
        match self {
            MergedMap::PerConfig(map) => Box::new(map.names()),
            MergedMap::Duplicates(map) => Box::new(map.names()),
        }
    }

    /// Visible items for `name`.
    pub fn get(&self, name: &str) -> Vec<Arc<ResourceItem>> {
        match self {
            MergedMap::PerConfig(map) => map.get(name),
            MergedMap::Duplicates(map) => map.get(name),
        }
    }

    /// Every visible item.
    pub fn values(&self) -> Box<dyn Iterator<Item = &Arc<ResourceItem>> + '_> {
        match self {
            MergedMap::PerConfig(map) => Box::new(map.values()),
            MergedMap::Duplicates(map) => Box::new(map.values()),
        }
    }

    pub fn to_multimap(&self) -> ResourceMultimap {
        match self {
            MergedMap::PerConfig(map) => map.to_multimap(),
            MergedMap::Duplicates(map) => map.to_multimap(),
        }
    }

    pub fn put_all_map(&mut self, items: &ResourceMultimap) {
        match self {
            MergedMap::PerConfig(map) => map.put_all_map(items),
            MergedMap::Duplicates(map) => map.put_all_map(items),
        }
    }

    pub fn remove_if<P>(&mut self, name: &str, predicate: P) -> usize
    where
        P: FnMut(&ResourceItem) -> bool,
    {
        match self {
            MergedMap::PerConfig(map) => map.remove_if(name, predicate),
            MergedMap::Duplicates(map) => map.remove_if(name, predicate),
        }
    }

    pub fn is_consistent(&self) -> bool {
        match self {
            MergedMap::PerConfig(map) => map.is_consistent(),
            MergedMap::Duplicates(map) => map.is_consistent(),
        }
    }
}
