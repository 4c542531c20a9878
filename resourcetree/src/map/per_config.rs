//! Override-collapsing multimap for one `(namespace, type)` slice.
//!
//! [`PerConfigMap`] may store several items for the same name and
//! configuration (one per contributing repository), but exposes only the
//! highest-priority one. Shadowed items stay stored so that retracting the
//! winner makes the next one visible without consulting the leaves again.
//!
//! # Layout
//!
//! ```text
//! "app_name" ──► [ bucket(default): [A, B] ]   visible: A
//!                [ bucket(fr):      [B]    ]   visible: B
//! ```
//!
//! Each name maps to buckets sorted by [`Configuration`] order; each bucket
//! holds items of one configuration sorted highest priority first. Reads
//! only ever see bucket heads.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::priority::RepositoryPriority;
use super::ResourceMultimap;
use crate::resource::{Configuration, ResourceItem};

/// Same-configuration items, highest priority first. Never empty.
#[derive(Debug, Clone)]
struct Bucket {
    items: Vec<Arc<ResourceItem>>,
}

impl Bucket {
    fn new(item: Arc<ResourceItem>) -> Self {
        Self { items: vec![item] }
    }

    fn configuration(&self) -> &Configuration {
        self.head().configuration()
    }

    fn head(&self) -> &Arc<ResourceItem> {
        &self.items[0]
    }

    fn insert(&mut self, item: Arc<ResourceItem>, priority: &RepositoryPriority) {
        let index = priority.insertion_point(&self.items, &item);
        self.items.insert(index, item);
    }
}

/// Multimap keyed by resource name exposing at most one visible item per
/// `(name, configuration)`.
///
/// [`len`](Self::len) counts every stored item, shadowed ones included.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use resourcetree::map::{PerConfigMap, RepositoryPriority};
/// use resourcetree::repository::RepositoryId;
/// use resourcetree::resource::{Configuration, ResourceItem, ResourceNamespace, ResourceType};
///
/// let (a, b) = (RepositoryId::from_raw(1), RepositoryId::from_raw(2));
/// let priority = Arc::new(RepositoryPriority::new(&[a, b]));
/// let make = |repo, value: &str| {
///     Arc::new(ResourceItem::new(
///         repo,
///         ResourceNamespace::Res,
///         ResourceType::String,
///         "app_name",
///         Configuration::default(),
///         value,
///     ))
/// };
///
/// let mut map = PerConfigMap::new(priority);
/// map.put(make(b, "from b"));
/// map.put(make(a, "from a"));
///
/// assert_eq!(map.len(), 2);
/// assert_eq!(map.get("app_name")[0].value(), "from a");
/// ```
#[derive(Debug, Clone)]
pub struct PerConfigMap {
    names: BTreeMap<String, Vec<Bucket>>,
    size: usize,
    priority: Arc<RepositoryPriority>,
}

impl PerConfigMap {
    /// Create an empty map ordering same-configuration items by `priority`.
    pub fn new(priority: Arc<RepositoryPriority>) -> Self {
        Self {
            names: BTreeMap::new(),
            size: 0,
            priority,
        }
    }

    /// Number of stored items, including shadowed ones.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of visible items.
    pub fn visible_len(&self) -> usize {
        self.names.values().map(Vec::len).sum()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Names with at least one stored item, in order.
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.names.keys()
    }

    /// Visible items for `name`, in configuration order.
    pub fn get(&self, name: &str) -> Vec<Arc<ResourceItem>> {
        self.names
            .get(name)
            .map(|buckets| buckets.iter().map(|b| Arc::clone(b.head())).collect())
            .unwrap_or_default()
    }

    /// Every stored item for `name`, shadowed ones included, grouped by
    /// configuration and highest priority first within a configuration.
    pub fn get_all(&self, name: &str) -> Vec<Arc<ResourceItem>> {
        self.names
            .get(name)
            .map(|buckets| buckets.iter().flat_map(|b| b.items.iter().cloned()).collect())
            .unwrap_or_default()
    }

    /// Visible items of every name, by name then configuration.
    pub fn values(&self) -> impl Iterator<Item = &Arc<ResourceItem>> {
        self.names.values().flat_map(|buckets| buckets.iter().map(Bucket::head))
    }

    /// Visible items grouped by name.
    pub fn to_multimap(&self) -> ResourceMultimap {
        self.names
            .iter()
            .map(|(name, buckets)| {
                (name.clone(), buckets.iter().map(|b| Arc::clone(b.head())).collect())
            })
            .collect()
    }

    /// Insert one item under its own name.
    pub fn put(&mut self, item: Arc<ResourceItem>) {
        let buckets = self.names.entry(item.name().to_string()).or_default();
        Self::insert_from(buckets, 0, item, &self.priority);
        self.size += 1;
    }

    /// Insert a batch of items that share one name.
    ///
    /// Produces the same state as calling [`put`](Self::put) for each item.
    /// The batch is sorted by configuration first so each binary search can
    /// start at the previous insertion point.
    pub fn put_all(&mut self, name: &str, items: &[Arc<ResourceItem>]) {
        if items.is_empty() {
            return;
        }
        debug_assert!(items.iter().all(|i| i.name() == name));

        let mut sorted: Vec<Arc<ResourceItem>> = items.to_vec();
        // Stable: same-configuration items keep their relative order.
        sorted.sort_by(|a, b| a.configuration().cmp(b.configuration()));

        let buckets = self.names.entry(name.to_string()).or_default();
        let mut start = 0;
        for item in sorted {
            start = Self::insert_from(buckets, start, item, &self.priority);
        }
        self.size += items.len();
    }

    /// Insert every item of a name-keyed multimap.
    pub fn put_all_map(&mut self, map: &ResourceMultimap) {
        for (name, items) in map {
            self.put_all(name, items);
        }
    }

    /// Remove one item by identity. Returns whether it was stored.
    pub fn remove(&mut self, item: &Arc<ResourceItem>) -> bool {
        let Some(buckets) = self.names.get_mut(item.name()) else {
            return false;
        };
        let Ok(index) = buckets.binary_search_by(|b| b.configuration().cmp(item.configuration()))
        else {
            return false;
        };
        let bucket = &mut buckets[index];
        let Some(position) = bucket.items.iter().position(|i| Arc::ptr_eq(i, item)) else {
            return false;
        };

        bucket.items.remove(position);
        if bucket.items.is_empty() {
            buckets.remove(index);
        }
        if buckets.is_empty() {
            self.names.remove(item.name());
        }
        self.size -= 1;
        true
    }

    /// Remove every item stored under `name` that matches `predicate`.
    /// Returns the number of items removed.
    pub fn remove_if<P>(&mut self, name: &str, mut predicate: P) -> usize
    where
        P: FnMut(&ResourceItem) -> bool,
    {
        let Some(buckets) = self.names.get_mut(name) else {
            return 0;
        };

        let mut removed = 0;
        buckets.retain_mut(|bucket| {
            let before = bucket.items.len();
            bucket.items.retain(|item| !predicate(item));
            removed += before - bucket.items.len();
            !bucket.items.is_empty()
        });
        if buckets.is_empty() {
            self.names.remove(name);
        }
        self.size -= removed;
        removed
    }

    /// Insert into `buckets[start..]`; returns the index of the bucket the
    /// item landed in.
    fn insert_from(
        buckets: &mut Vec<Bucket>,
        start: usize,
        item: Arc<ResourceItem>,
        priority: &RepositoryPriority,
    ) -> usize {
        match buckets[start..].binary_search_by(|b| b.configuration().cmp(item.configuration())) {
            Ok(offset) => {
                buckets[start + offset].insert(item, priority);
                start + offset
            }
            Err(offset) => {
                buckets.insert(start + offset, Bucket::new(item));
                start + offset
            }
        }
    }

    /// Check the structural invariants: no empty bucket or name entry,
    /// buckets strictly sorted by configuration, items within a bucket in
    /// priority order, and `len()` equal to the stored item count.
    pub fn is_consistent(&self) -> bool {
        let mut count = 0;
        for buckets in self.names.values() {
            if buckets.is_empty() {
                return false;
            }
            for pair in buckets.windows(2) {
                if pair[0].configuration() >= pair[1].configuration() {
                    return false;
                }
            }
            for bucket in buckets {
                if bucket.items.is_empty() {
                    return false;
                }
                let config = bucket.configuration();
                if bucket.items.iter().any(|i| i.configuration() != config) {
                    return false;
                }
                for pair in bucket.items.windows(2) {
                    if self.priority.item_rank(&pair[0]) > self.priority.item_rank(&pair[1]) {
                        return false;
                    }
                }
                count += bucket.items.len();
            }
        }
        count == self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryId;
    use crate::resource::{ResourceNamespace, ResourceType};
    use proptest::prelude::*;

    fn repo(raw: u64) -> RepositoryId {
        RepositoryId::from_raw(raw)
    }

    fn priority(count: u64) -> Arc<RepositoryPriority> {
        let ids: Vec<RepositoryId> = (0..count).map(repo).collect();
        Arc::new(RepositoryPriority::new(&ids))
    }

    fn item(repository: u64, name: &str, config: &str) -> Arc<ResourceItem> {
        Arc::new(ResourceItem::new(
            repo(repository),
            ResourceNamespace::Res,
            ResourceType::String,
            name,
            config.parse().unwrap(),
            format!("{}:{}:{}", repository, name, config),
        ))
    }

    mod put {
        use super::*;

        #[test]
        fn test_higher_priority_shadows_lower() {
            let mut map = PerConfigMap::new(priority(2));
            let low = item(1, "title", "default");
            let high = item(0, "title", "default");
            map.put(Arc::clone(&low));
            map.put(Arc::clone(&high));

            let visible = map.get("title");
            assert_eq!(visible.len(), 1);
            assert!(Arc::ptr_eq(&visible[0], &high));
            assert_eq!(map.len(), 2);
            assert_eq!(map.visible_len(), 1);
        }

        #[test]
        fn test_distinct_configurations_are_all_visible() {
            let mut map = PerConfigMap::new(priority(2));
            map.put(item(1, "title", "fr"));
            map.put(item(0, "title", "default"));
            map.put(item(1, "title", "de"));

            let configs: Vec<String> = map
                .get("title")
                .iter()
                .map(|i| i.configuration().to_string())
                .collect();
            assert_eq!(configs, vec!["default", "de", "fr"]);
        }

        #[test]
        fn test_equal_priority_keeps_insertion_order() {
            let mut map = PerConfigMap::new(priority(1));
            let first = item(0, "title", "default");
            let second = item(0, "title", "default");
            map.put(Arc::clone(&first));
            map.put(Arc::clone(&second));
            let all = map.get_all("title");
            assert!(Arc::ptr_eq(&all[0], &first));
            assert!(Arc::ptr_eq(&all[1], &second));
        }

        #[test]
        fn test_put_all_sorts_batch() {
            let mut map = PerConfigMap::new(priority(2));
            let batch = vec![
                item(1, "title", "land"),
                item(1, "title", "default"),
                item(0, "title", "land"),
                item(1, "title", "fr"),
            ];
            map.put_all("title", &batch);

            assert_eq!(map.len(), 4);
            assert!(map.is_consistent());
            let visible = map.get("title");
            assert_eq!(visible.len(), 3);
            assert_eq!(visible[0].configuration().to_string(), "default");
            assert_eq!(visible[1].configuration().to_string(), "land");
            assert_eq!(visible[1].repository(), repo(0));
            assert_eq!(visible[2].configuration().to_string(), "fr");
        }

        #[test]
        fn test_put_all_map() {
            let mut source = ResourceMultimap::new();
            source.insert("a".to_string(), vec![item(0, "a", "default")]);
            source.insert("b".to_string(), vec![item(0, "b", "default"), item(0, "b", "fr")]);

            let mut map = PerConfigMap::new(priority(1));
            map.put_all_map(&source);
            assert_eq!(map.len(), 3);
            assert_eq!(map.names().count(), 2);
            assert_eq!(map.to_multimap(), source);
        }
    }

    mod remove {
        use super::*;

        #[test]
        fn test_remove_winner_reveals_shadowed_item() {
            let mut map = PerConfigMap::new(priority(2));
            let high = item(0, "title", "default");
            let low = item(1, "title", "default");
            map.put(Arc::clone(&high));
            map.put(Arc::clone(&low));

            assert!(map.remove(&high));
            let visible = map.get("title");
            assert!(Arc::ptr_eq(&visible[0], &low));
            assert_eq!(map.len(), 1);
        }

        #[test]
        fn test_remove_is_by_identity() {
            let mut map = PerConfigMap::new(priority(1));
            map.put(item(0, "title", "default"));
            let lookalike = item(0, "title", "default");
            assert!(!map.remove(&lookalike));
            assert_eq!(map.len(), 1);
        }

        #[test]
        fn test_remove_prunes_empty_entries() {
            let mut map = PerConfigMap::new(priority(1));
            let only = item(0, "title", "fr");
            map.put(Arc::clone(&only));
            assert!(map.remove(&only));
            assert!(map.is_empty());
            assert!(!map.contains_name("title"));
            assert!(map.is_consistent());
        }

        #[test]
        fn test_remove_if_by_repository() {
            let mut map = PerConfigMap::new(priority(2));
            map.put(item(0, "title", "default"));
            map.put(item(1, "title", "default"));
            map.put(item(1, "title", "fr"));

            let removed = map.remove_if("title", |i| i.repository() == repo(1));
            assert_eq!(removed, 2);
            assert_eq!(map.len(), 1);
            assert_eq!(map.get("title").len(), 1);
            assert!(map.is_consistent());

            assert_eq!(map.remove_if("missing", |_| true), 0);
        }
    }

    fn arb_item() -> impl Strategy<Value = (u64, usize, usize)> {
        (0u64..4, 0usize..3, 0usize..4)
    }

    const NAMES: [&str; 3] = ["a", "b", "c"];
    const CONFIGS: [&str; 4] = ["default", "fr", "land", "fr-land"];

    proptest! {
        /// Size equals puts minus successful removals, shadowed items included.
        #[test]
        fn prop_size_counts_all_stored_items(
            specs in prop::collection::vec(arb_item(), 0..40),
            removals in prop::collection::vec(any::<prop::sample::Index>(), 0..20),
        ) {
            let mut map = PerConfigMap::new(priority(4));
            let items: Vec<_> = specs
                .iter()
                .map(|(r, n, c)| item(*r, NAMES[*n], CONFIGS[*c]))
                .collect();
            for i in &items {
                map.put(Arc::clone(i));
            }
            let mut expected = items.len();
            if !items.is_empty() {
                for index in removals {
                    if map.remove(&items[index.index(items.len())]) {
                        expected -= 1;
                    }
                }
            }
            prop_assert_eq!(map.len(), expected);
            prop_assert!(map.is_consistent());
        }

        /// Batched insertion ends in the same state as repeated `put`.
        #[test]
        fn prop_put_all_equals_repeated_put(
            specs in prop::collection::vec((0u64..4, 0usize..4), 0..30),
        ) {
            let items: Vec<_> = specs
                .iter()
                .map(|(r, c)| item(*r, "title", CONFIGS[*c]))
                .collect();

            let mut one_by_one = PerConfigMap::new(priority(4));
            for i in &items {
                one_by_one.put(Arc::clone(i));
            }
            let mut batched = PerConfigMap::new(priority(4));
            batched.put_all("title", &items);

            let a = one_by_one.get_all("title");
            let b = batched.get_all("title");
            prop_assert_eq!(a.len(), b.len());
            for (x, y) in a.iter().zip(b.iter()) {
                prop_assert!(Arc::ptr_eq(x, y));
            }
            prop_assert_eq!(one_by_one.len(), batched.len());
        }

        /// The visible item of every bucket is the highest-priority one.
        #[test]
        fn prop_visible_item_has_best_priority(
            specs in prop::collection::vec((0u64..4, 0usize..4), 1..30),
        ) {
            let items: Vec<_> = specs
                .iter()
                .map(|(r, c)| item(*r, "title", CONFIGS[*c]))
                .collect();
            let mut map = PerConfigMap::new(priority(4));
            map.put_all("title", &items);

            for visible in map.get("title") {
                let best = items
                    .iter()
                    .filter(|i| i.configuration() == visible.configuration())
                    .map(|i| i.repository())
                    .min()
                    .unwrap();
                prop_assert_eq!(visible.repository(), best);
            }
        }
    }
}
