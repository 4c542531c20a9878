//! JSON description of a repository tree.
//!
//! A manifest lists leaves with their items and composites with their
//! children, referring to each other by label. It is how the CLI loads a
//! tree, and a compact way to set one up in tests.
//!
//! ```json
//! {
//!   "leaves": [
//!     { "label": "app", "namespace": "res-auto", "items": [
//!       { "type": "string", "name": "app_name", "value": "My App" },
//!       { "type": "string", "name": "app_name", "configuration": "fr", "value": "Mon App" }
//!     ] },
//!     { "label": "framework", "namespace": "android", "items": [] }
//!   ],
//!   "composites": [
//!     { "label": "module", "locals": ["app"], "libraries": ["framework"] }
//!   ]
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::repository::{RepositoryError, RepositoryId, RepositoryTree};
use crate::resource::{
    Configuration, ConfigurationError, NamespaceParseError, ResourceItem, ResourceNamespace,
    ResourceType, ResourceTypeParseError, ResourceVisibility,
};

/// Errors from reading or applying a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("label '{0}' is defined more than once")]
    DuplicateLabel(String),

    #[error("composite '{composite}' refers to unknown label '{label}'")]
    UnknownLabel { composite: String, label: String },

    #[error("leaf '{label}': {source}")]
    Namespace {
        label: String,
        #[source]
        source: NamespaceParseError,
    },

    #[error("leaf '{label}', item '{name}': {source}")]
    ResourceType {
        label: String,
        name: String,
        #[source]
        source: ResourceTypeParseError,
    },

    #[error("leaf '{label}', item '{name}': {source}")]
    Configuration {
        label: String,
        name: String,
        #[source]
        source: ConfigurationError,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// One resource item of a leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSpec {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    /// Qualifier string; empty or absent for the default configuration.
    #[serde(default)]
    pub configuration: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub visibility: ResourceVisibility,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafSpec {
    pub label: String,
    /// `res-auto`, `android` or a package name.
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub items: Vec<ItemSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeSpec {
    pub label: String,
    #[serde(default)]
    pub locals: Vec<String>,
    #[serde(default)]
    pub libraries: Vec<String>,
    #[serde(default)]
    pub others: Vec<String>,
}

/// A whole tree description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub leaves: Vec<LeafSpec>,
    #[serde(default)]
    pub composites: Vec<CompositeSpec>,
}

impl Manifest {
    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let json = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Label of the composite no other composite lists as a child, if there
    /// is exactly one.
    pub fn root_label(&self) -> Option<&str> {
        let referenced: HashSet<&str> = self
            .composites
            .iter()
            .flat_map(|c| c.locals.iter().chain(&c.libraries).chain(&c.others))
            .map(String::as_str)
            .collect();
        let mut roots = self
            .composites
            .iter()
            .map(|c| c.label.as_str())
            .filter(|label| !referenced.contains(label));
        match (roots.next(), roots.next()) {
            (Some(root), None) => Some(root),
            _ => None,
        }
    }

    /// Register every leaf and composite in `tree`.
    ///
    /// Everything is validated before anything is registered, except child
    /// structure errors (cycles), which `set_children` reports.
    pub fn build(
        &self,
        tree: &RepositoryTree,
    ) -> Result<HashMap<String, RepositoryId>, ManifestError> {
        let leaves = self.parse_leaves()?;
        self.check_labels()?;

        let mut ids = HashMap::new();
        for leaf in leaves {
            let id = tree.add_leaf(leaf.namespace.clone(), leaf.spec.label.clone());
            tree.update_leaf(id, |repository| {
                for item in leaf.items {
                    let resource = ResourceItem::new(
                        id,
                        leaf.namespace.clone(),
                        item.resource_type,
                        item.spec.name.clone(),
                        item.configuration,
                        item.spec.value.clone(),
                    )
                    .with_visibility(item.spec.visibility);
                    repository.insert(resource)?;
                }
                Ok::<(), RepositoryError>(())
            })??;
            ids.insert(leaf.spec.label.clone(), id);
        }
        for composite in &self.composites {
            ids.insert(composite.label.clone(), tree.add_composite(composite.label.clone()));
        }

        for composite in &self.composites {
            let resolve = |labels: &[String]| -> Result<Vec<RepositoryId>, ManifestError> {
                labels
                    .iter()
                    .map(|label| {
                        ids.get(label).copied().ok_or_else(|| ManifestError::UnknownLabel {
                            composite: composite.label.clone(),
                            label: label.clone(),
                        })
                    })
                    .collect()
            };
            tree.set_children(
                ids[&composite.label],
                &resolve(&composite.locals)?,
                &resolve(&composite.libraries)?,
                &resolve(&composite.others)?,
            )?;
        }

        tracing::debug!(
            leaves = self.leaves.len(),
            composites = self.composites.len(),
            "Built repository tree from manifest"
        );
        Ok(ids)
    }

    fn check_labels(&self) -> Result<(), ManifestError> {
        let mut seen = HashSet::new();
        let labels = self
            .leaves
            .iter()
            .map(|l| &l.label)
            .chain(self.composites.iter().map(|c| &c.label));
        for label in labels {
            if !seen.insert(label.as_str()) {
                return Err(ManifestError::DuplicateLabel(label.clone()));
            }
        }
        for composite in &self.composites {
            for label in composite
                .locals
                .iter()
                .chain(&composite.libraries)
                .chain(&composite.others)
            {
                if !seen.contains(label.as_str()) {
                    return Err(ManifestError::UnknownLabel {
                        composite: composite.label.clone(),
                        label: label.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn parse_leaves(&self) -> Result<Vec<ParsedLeaf<'_>>, ManifestError> {
        self.leaves
            .iter()
            .map(|spec| {
                let namespace: ResourceNamespace =
                    spec.namespace.parse().map_err(|source| ManifestError::Namespace {
                        label: spec.label.clone(),
                        source,
                    })?;
                let items = spec
                    .items
                    .iter()
                    .map(|item| parse_item(&spec.label, item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ParsedLeaf {
                    spec,
                    namespace,
                    items,
                })
            })
            .collect()
    }
}

struct ParsedItem<'a> {
    spec: &'a ItemSpec,
    resource_type: ResourceType,
    configuration: Configuration,
}

struct ParsedLeaf<'a> {
    spec: &'a LeafSpec,
    namespace: ResourceNamespace,
    items: Vec<ParsedItem<'a>>,
}

fn parse_item<'a>(label: &str, spec: &'a ItemSpec) -> Result<ParsedItem<'a>, ManifestError> {
    let resource_type: ResourceType = spec
        .resource_type
        .parse()
        .map_err(|source| ManifestError::ResourceType {
            label: label.to_string(),
            name: spec.name.clone(),
            source,
        })?;
    let configuration: Configuration = spec
        .configuration
        .parse()
        .map_err(|source| ManifestError::Configuration {
            label: label.to_string(),
            name: spec.name.clone(),
            source,
        })?;
    Ok(ParsedItem {
        spec,
        resource_type,
        configuration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "leaves": [
            { "label": "a", "namespace": "res-auto", "items": [
                { "type": "string", "name": "app_name", "value": "A" },
                { "type": "id", "name": "button", "visibility": "public" }
            ] },
            { "label": "b", "namespace": "res-auto", "items": [
                { "type": "string", "name": "app_name", "value": "B" },
                { "type": "string", "name": "app_name", "configuration": "fr", "value": "B fr" }
            ] }
        ],
        "composites": [
            { "label": "root", "locals": ["a", "b"] }
        ]
    }"#;

    #[test]
    fn test_build_sample() {
        let manifest = Manifest::from_json(SAMPLE).unwrap();
        assert_eq!(manifest.root_label(), Some("root"));

        let tree = RepositoryTree::new();
        let ids = manifest.build(&tree).unwrap();
        assert_eq!(ids.len(), 3);

        let repo = tree.repository(ids["root"]).unwrap();
        let names = repo.resources(&ResourceNamespace::Res, ResourceType::String, "app_name");
        let values: Vec<&str> = names.iter().map(|i| i.value()).collect();
        assert_eq!(values, vec!["A", "B fr"]);

        let public = repo.public_resources(&ResourceNamespace::Res, ResourceType::Id);
        assert_eq!(public.len(), 1);
    }

    #[test]
    fn test_unknown_label() {
        let manifest = Manifest::from_json(
            r#"{ "composites": [ { "label": "root", "locals": ["ghost"] } ] }"#,
        )
        .unwrap();
        let tree = RepositoryTree::new();
        assert!(matches!(
            manifest.build(&tree),
            Err(ManifestError::UnknownLabel { .. })
        ));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_duplicate_label() {
        let manifest = Manifest::from_json(
            r#"{ "leaves": [ { "label": "x" } ], "composites": [ { "label": "x" } ] }"#,
        )
        .unwrap();
        assert!(matches!(
            manifest.build(&RepositoryTree::new()),
            Err(ManifestError::DuplicateLabel(label)) if label == "x"
        ));
    }

    #[test]
    fn test_bad_item_fields() {
        let bad_type = Manifest::from_json(
            r#"{ "leaves": [ { "label": "a", "items": [ { "type": "strings", "name": "x" } ] } ] }"#,
        )
        .unwrap();
        assert!(matches!(
            bad_type.build(&RepositoryTree::new()),
            Err(ManifestError::ResourceType { .. })
        ));

        let bad_config = Manifest::from_json(
            r#"{ "leaves": [ { "label": "a", "items": [
                { "type": "string", "name": "x", "configuration": "land-fr" }
            ] } ] }"#,
        )
        .unwrap();
        assert!(matches!(
            bad_config.build(&RepositoryTree::new()),
            Err(ManifestError::Configuration { .. })
        ));
    }

    #[test]
    fn test_cycle_is_reported() {
        let manifest = Manifest::from_json(
            r#"{ "composites": [
                { "label": "x", "locals": ["y"] },
                { "label": "y", "locals": ["x"] }
            ] }"#,
        )
        .unwrap();
        assert!(manifest.root_label().is_none());
        assert!(matches!(
            manifest.build(&RepositoryTree::new()),
            Err(ManifestError::Repository(RepositoryError::Cycle { .. }))
        ));
    }
}
