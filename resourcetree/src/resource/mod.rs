//! Resource value types.
//!
//! These are the leaf data of the repository tree: namespaces, types,
//! configurations and the immutable [`ResourceItem`] values that leaf
//! repositories own and composite repositories merge.

mod configuration;
mod item;
mod namespace;
mod types;

pub use configuration::{
    Configuration, ConfigurationError, Density, LayoutDirection, Locale, NightMode, Orientation,
    DEFAULT_QUALIFIER,
};
pub use item::ResourceItem;
pub use namespace::{NamespaceParseError, ResourceNamespace};
pub use types::{ResourceType, ResourceTypeParseError, ResourceVisibility};
