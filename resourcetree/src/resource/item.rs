//! Resource items.

use std::fmt;
use std::sync::Arc;

use super::configuration::Configuration;
use super::namespace::ResourceNamespace;
use super::types::{ResourceType, ResourceVisibility};
use crate::repository::RepositoryId;

/// One occurrence of a resource in one leaf repository.
///
/// Items are immutable once built and are shared as [`Arc<ResourceItem>`].
/// Merged views hold clones of the `Arc`, never copies of the item, so two
/// items are "the same item" only if [`ResourceItem::same_item`] holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceItem {
    namespace: ResourceNamespace,
    resource_type: ResourceType,
    name: String,
    configuration: Configuration,
    repository: RepositoryId,
    visibility: ResourceVisibility,
    value: String,
}

impl ResourceItem {
    /// Create an item owned by `repository`.
    pub fn new(
        repository: RepositoryId,
        namespace: ResourceNamespace,
        resource_type: ResourceType,
        name: impl Into<String>,
        configuration: Configuration,
        value: impl Into<String>,
    ) -> Self {
        Self {
            namespace,
            resource_type,
            name: name.into(),
            configuration,
            repository,
            visibility: ResourceVisibility::Undefined,
            value: value.into(),
        }
    }

    /// Set the visibility.
    pub fn with_visibility(mut self, visibility: ResourceVisibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn namespace(&self) -> &ResourceNamespace {
        &self.namespace
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// The leaf repository that owns this item.
    pub fn repository(&self) -> RepositoryId {
        self.repository
    }

    pub fn visibility(&self) -> ResourceVisibility {
        self.visibility
    }

    /// Raw, unparsed value text.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Resource URL, e.g. `@string/app_name` or `@com.lib:string/title`.
    pub fn reference(&self) -> String {
        match &self.namespace {
            ResourceNamespace::Res => format!("@{}/{}", self.resource_type, self.name),
            namespace => format!("@{}:{}/{}", namespace, self.resource_type, self.name),
        }
    }

    /// Pointer identity of two shared items.
    pub fn same_item(a: &Arc<ResourceItem>, b: &Arc<ResourceItem>) -> bool {
        Arc::ptr_eq(a, b)
    }
}

impl fmt::Display for ResourceItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} = {:?}",
            self.reference(),
            self.configuration,
            self.repository,
            self.value
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(namespace: ResourceNamespace) -> ResourceItem {
        ResourceItem::new(
            RepositoryId::from_raw(7),
            namespace,
            ResourceType::String,
            "app_name",
            "fr".parse().unwrap(),
            "Mon App",
        )
    }

    #[test]
    fn test_reference() {
        assert_eq!(item(ResourceNamespace::Res).reference(), "@string/app_name");
        assert_eq!(
            item(ResourceNamespace::package("com.lib")).reference(),
            "@com.lib:string/app_name"
        );
    }

    #[test]
    fn test_same_item_is_identity_not_equality() {
        let a = Arc::new(item(ResourceNamespace::Res));
        let b = Arc::new(item(ResourceNamespace::Res));
        assert_eq!(a, b);
        assert!(!ResourceItem::same_item(&a, &b));
        assert!(ResourceItem::same_item(&a, &Arc::clone(&a)));
    }

    #[test]
    fn test_display() {
        let display = item(ResourceNamespace::Res).to_string();
        assert!(display.contains("@string/app_name"));
        assert!(display.contains("[fr]"));
        assert!(display.contains("Mon App"));
    }
}
