//! Resource maps.
//!
//! - [`ResourceMultimap`]: plain name-keyed multimap, the shape leaves hand out
//!   and reads return
//! - [`PerConfigMap`]: override-collapsing merge (one visible item per
//!   name and configuration)
//! - [`DuplicateMap`]: non-collapsing merge for `id` and `styleable`
//! - [`MergedMap`]: either of the two, as cached by composite repositories
//! - [`RepositoryPriority`]: the comparator both merges order items by

mod duplicates;
mod merged;
mod per_config;
mod priority;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::resource::ResourceItem;

pub use duplicates::DuplicateMap;
pub use merged::MergedMap;
pub use per_config::PerConfigMap;
pub use priority::RepositoryPriority;

/// Items grouped by resource name.
pub type ResourceMultimap = BTreeMap<String, Vec<Arc<ResourceItem>>>;
