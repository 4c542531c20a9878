//! Common types and utilities shared across CLI commands.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::Args;
use resourcetree::config::ConfigFile;
use resourcetree::manifest::Manifest;
use resourcetree::repository::{Repository, RepositoryId, RepositoryTree};
use resourcetree::resource::{ResourceNamespace, ResourceType};

use crate::error::CliError;

/// Manifest selection shared by the query commands.
#[derive(Debug, Clone, Args)]
pub struct ManifestArgs {
    /// Path to the JSON manifest describing the tree
    pub manifest: PathBuf,

    /// Label of the repository to query (defaults to the manifest's root composite)
    #[arg(long)]
    pub root: Option<String>,
}

/// A tree built from a manifest, with the repository being queried.
pub struct LoadedTree {
    pub root: Repository,
    labels: HashMap<RepositoryId, String>,
}

impl LoadedTree {
    /// Manifest label of a repository, falling back to its id.
    pub fn label(&self, id: RepositoryId) -> String {
        self.labels
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }
}

/// Load the manifest and build its tree with the user's tree settings.
pub fn load_tree(args: &ManifestArgs, config: &ConfigFile) -> Result<LoadedTree, CliError> {
    load_tree_from(&args.manifest, args.root.as_deref(), config)
}

fn load_tree_from(
    path: &Path,
    root: Option<&str>,
    config: &ConfigFile,
) -> Result<LoadedTree, CliError> {
    let manifest = Manifest::load(path)?;
    let root_label = root
        .or_else(|| manifest.root_label())
        .ok_or(CliError::NoRoot)?
        .to_string();

    let tree = RepositoryTree::with_config(config.to_tree_config());
    let ids = manifest.build(&tree)?;
    let root_id = *ids
        .get(&root_label)
        .ok_or_else(|| CliError::UnknownRoot(root_label.clone()))?;

    tracing::debug!(
        manifest = %path.display(),
        root = %root_label,
        repositories = tree.len(),
        "Loaded manifest"
    );

    Ok(LoadedTree {
        root: tree.repository(root_id)?,
        labels: ids.into_iter().map(|(label, id)| (id, label)).collect(),
    })
}

pub fn parse_namespace(s: &str) -> Result<ResourceNamespace, CliError> {
    s.parse::<ResourceNamespace>()
        .map_err(|e| CliError::InvalidArgument(e.to_string()))
}

pub fn parse_resource_type(s: &str) -> Result<ResourceType, CliError> {
    s.parse().map_err(|_| {
        CliError::InvalidArgument(format!(
            "Unknown resource type '{}'. Use 'resourcetree types <manifest>' to see the types in a tree.",
            s
        ))
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) const SAMPLE: &str = r##"{
        "leaves": [
            { "label": "app", "items": [
                { "type": "string", "name": "app_name", "value": "App" },
                { "type": "string", "name": "app_name", "configuration": "fr", "value": "App fr" },
                { "type": "id", "name": "button", "visibility": "public" }
            ] },
            { "label": "lib", "items": [
                { "type": "string", "name": "app_name", "value": "Lib" },
                { "type": "string", "name": "lib_only", "value": "Only" }
            ] },
            { "label": "sdk", "namespace": "android", "items": [
                { "type": "color", "name": "black", "value": "#000000" }
            ] }
        ],
        "composites": [
            { "label": "module", "locals": ["app", "lib"], "libraries": ["sdk"] }
        ]
    }"##;

    pub(crate) fn sample_manifest() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        file
    }

    pub(crate) fn load_sample(root: Option<&str>) -> LoadedTree {
        let file = sample_manifest();
        load_tree_from(file.path(), root, &ConfigFile::default()).unwrap()
    }

    #[test]
    fn test_root_defaults_to_manifest_root() {
        let loaded = load_sample(None);
        assert_eq!(loaded.root.display_name().as_deref(), Some("module"));
        assert_eq!(loaded.label(loaded.root.id()), "module");
    }

    #[test]
    fn test_explicit_root_may_be_a_leaf() {
        let loaded = load_sample(Some("lib"));
        let names = loaded
            .root
            .resource_names(&ResourceNamespace::Res, ResourceType::String);
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn test_sample_keeps_hash_values() {
        let loaded = load_sample(None);
        let black = loaded
            .root
            .resources(&ResourceNamespace::Android, ResourceType::Color, "black");
        assert_eq!(black.len(), 1);
        assert_eq!(black[0].value(), "#000000");
    }

    #[test]
    fn test_unknown_root() {
        let file = sample_manifest();
        let result = load_tree_from(file.path(), Some("nope"), &ConfigFile::default());
        assert!(matches!(result, Err(CliError::UnknownRoot(label)) if label == "nope"));
    }

    #[test]
    fn test_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_tree_from(&dir.path().join("missing.json"), None, &ConfigFile::default());
        assert!(matches!(result, Err(CliError::Manifest(_))));
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(parse_namespace("android").unwrap(), ResourceNamespace::Android);
        assert!(parse_namespace("not a namespace").is_err());
        assert_eq!(parse_resource_type("string").unwrap(), ResourceType::String);
        assert!(matches!(
            parse_resource_type("strings"),
            Err(CliError::InvalidArgument(_))
        ));
    }
}
