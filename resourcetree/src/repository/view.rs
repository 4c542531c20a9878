//! Borrowed views of one `(namespace, type)` slice.

use std::sync::Arc;

use crate::map::{MergedMap, ResourceMultimap};
use crate::resource::ResourceItem;

/// Either a leaf's own slice or a composite's cached merge.
///
/// Only valid while the tree lock is held.
#[derive(Debug, Clone, Copy)]
pub(crate) enum MapRef<'a> {
    Leaf(&'a ResourceMultimap),
    Merged(&'a MergedMap),
}

impl<'a> MapRef<'a> {
    pub(crate) fn is_empty(&self) -> bool {
        match self {
            MapRef::Leaf(map) => map.values().all(Vec::is_empty),
            MapRef::Merged(map) => map.is_empty(),
        }
    }

    pub(crate) fn contains_name(&self, name: &str) -> bool {
        match self {
            MapRef::Leaf(map) => map.get(name).is_some_and(|items| !items.is_empty()),
            MapRef::Merged(map) => map.contains_name(name),
        }
    }

    pub(crate) fn names(&self) -> Box<dyn Iterator<Item = &'a String> + 'a> {
        match *self {
            MapRef::Leaf(map) => Box::new(map.keys()),
            MapRef::Merged(map) => map.names(),
        }
    }

    /// Visible items for `name`.
    pub(crate) fn get(&self, name: &str) -> Vec<Arc<ResourceItem>> {
        match self {
            MapRef::Leaf(map) => map.get(name).cloned().unwrap_or_default(),
            MapRef::Merged(map) => map.get(name),
        }
    }

    /// Every visible item, by name.
    pub(crate) fn values(&self) -> Box<dyn Iterator<Item = &'a Arc<ResourceItem>> + 'a> {
        match *self {
            MapRef::Leaf(map) => Box::new(map.values().flatten()),
            MapRef::Merged(map) => map.values(),
        }
    }

    pub(crate) fn to_multimap(&self) -> ResourceMultimap {
        match self {
            MapRef::Leaf(map) => (*map).clone(),
            MapRef::Merged(map) => map.to_multimap(),
        }
    }
}
