//! Repository priority comparator.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::repository::RepositoryId;
use crate::resource::ResourceItem;

/// Override priority of leaf repositories, derived from their position in a
/// composite's flattened leaf list: rank 0 is the highest priority.
///
/// Items owned by a repository that is not ranked sort after every ranked
/// item.
#[derive(Debug, Clone, Default)]
pub struct RepositoryPriority {
    ranks: HashMap<RepositoryId, usize>,
}

impl RepositoryPriority {
    /// Rank repositories in the given order (first = highest priority).
    pub fn new(ordered: &[RepositoryId]) -> Self {
        let mut ranks = HashMap::with_capacity(ordered.len());
        for (rank, id) in ordered.iter().enumerate() {
            ranks.entry(*id).or_insert(rank);
        }
        Self { ranks }
    }

    /// Rank of a repository (lower is higher priority).
    pub fn rank(&self, repository: RepositoryId) -> usize {
        self.ranks.get(&repository).copied().unwrap_or(usize::MAX)
    }

    /// Rank of the repository owning `item`.
    pub fn item_rank(&self, item: &ResourceItem) -> usize {
        self.rank(item.repository())
    }

    /// Compare two items by owning-repository priority; `Less` means `a`
    /// takes precedence over `b`.
    pub fn compare(&self, a: &ResourceItem, b: &ResourceItem) -> Ordering {
        self.item_rank(a).cmp(&self.item_rank(b))
    }

    /// Index at which `item` goes in `items` (sorted highest priority first)
    /// so that it follows every item of equal or higher priority.
    pub(crate) fn insertion_point(
        &self,
        items: &[Arc<ResourceItem>],
        item: &ResourceItem,
    ) -> usize {
        let rank = self.item_rank(item);
        items.partition_point(|existing| self.item_rank(existing) <= rank)
    }
}
