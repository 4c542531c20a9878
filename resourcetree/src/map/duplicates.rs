//! Non-collapsing multimap for `id` and `styleable` resources.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::priority::RepositoryPriority;
use super::ResourceMultimap;
use crate::resource::ResourceItem;

/// Multimap keeping every contributed item visible.
///
/// Items of one name are kept in repository priority order, and in arrival
/// order within one repository. That is the order a full merge produces by
/// appending leaves one after another, so re-inserting one repository's
/// items during reconciliation lands them exactly where a rebuild would.
#[derive(Debug, Clone)]
pub struct DuplicateMap {
    names: BTreeMap<String, Vec<Arc<ResourceItem>>>,
    size: usize,
    priority: Arc<RepositoryPriority>,
}

impl DuplicateMap {
    pub fn new(priority: Arc<RepositoryPriority>) -> Self {
        Self {
            names: BTreeMap::new(),
            size: 0,
            priority,
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.names.keys()
    }

    pub fn get(&self, name: &str) -> Vec<Arc<ResourceItem>> {
        self.names.get(name).cloned().unwrap_or_default()
    }

    pub fn values(&self) -> impl Iterator<Item = &Arc<ResourceItem>> {
        self.names.values().flatten()
    }

    pub fn to_multimap(&self) -> ResourceMultimap {
        self.names.clone()
    }

    pub fn put(&mut self, item: Arc<ResourceItem>) {
        let items = self.names.entry(item.name().to_string()).or_default();
        let index = self.priority.insertion_point(items, &item);
        items.insert(index, item);
        self.size += 1;
    }

    pub fn put_all(&mut self, name: &str, items: &[Arc<ResourceItem>]) {
        debug_assert!(items.iter().all(|i| i.name() == name));
        for item in items {
            self.put(Arc::clone(item));
        }
    }

    pub fn put_all_map(&mut self, map: &ResourceMultimap) {
        for (name, items) in map {
            self.put_all(name, items);
        }
    }

    pub fn remove(&mut self, item: &Arc<ResourceItem>) -> bool {
        let Some(items) = self.names.get_mut(item.name()) else {
            return false;
        };
        let Some(position) = items.iter().position(|i| Arc::ptr_eq(i, item)) else {
            return false;
        };
        items.remove(position);
        if items.is_empty() {
            self.names.remove(item.name());
        }
        self.size -= 1;
        true
    }

    pub fn remove_if<P>(&mut self, name: &str, mut predicate: P) -> usize
    where
        P: FnMut(&ResourceItem) -> bool,
    {
        let Some(items) = self.names.get_mut(name) else {
            return 0;
        };
        let before = items.len();
        items.retain(|item| !predicate(item));
        let removed = before - items.len();
        if items.is_empty() {
            self.names.remove(name);
        }
        self.size -= removed;
        removed
    }

    pub fn is_consistent(&self) -> bool {
        let mut count = 0;
        for items in self.names.values() {
            if items.is_empty() {
                return false;
            }
            for pair in items.windows(2) {
                if self.priority.item_rank(&pair[0]) > self.priority.item_rank(&pair[1]) {
                    return false;
                }
            }
            count += items.len();
        }
        count == self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryId;
    use crate::resource::{Configuration, ResourceNamespace, ResourceType};

    fn item(repository: u64, name: &str) -> Arc<ResourceItem> {
        Arc::new(ResourceItem::new(
            RepositoryId::from_raw(repository),
            ResourceNamespace::Res,
            ResourceType::Id,
            name,
            Configuration::default(),
            "",
        ))
    }

    fn priority() -> Arc<RepositoryPriority> {
        Arc::new(RepositoryPriority::new(&[
            RepositoryId::from_raw(0),
            RepositoryId::from_raw(1),
        ]))
    }

    #[test]
    fn test_same_configuration_items_all_visible() {
        let mut map = DuplicateMap::new(priority());
        map.put(item(0, "button"));
        map.put(item(1, "button"));
        assert_eq!(map.get("button").len(), 2);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_reinsertion_restores_priority_order() {
        let mut map = DuplicateMap::new(priority());
        let high = item(0, "button");
        let low = item(1, "button");
        map.put(Arc::clone(&high));
        map.put(Arc::clone(&low));

        map.remove_if("button", |i| i.repository() == RepositoryId::from_raw(0));
        map.put(Arc::clone(&high));

        let items = map.get("button");
        assert!(Arc::ptr_eq(&items[0], &high));
        assert!(Arc::ptr_eq(&items[1], &low));
        assert!(map.is_consistent());
    }

    #[test]
    fn test_remove_prunes_name() {
        let mut map = DuplicateMap::new(priority());
        let only = item(1, "button");
        map.put(Arc::clone(&only));
        assert!(map.remove(&only));
        assert!(!map.remove(&only));
        assert!(!map.contains_name("button"));
        assert!(map.is_empty());
    }
}
