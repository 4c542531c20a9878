//! `resolve`: print the visible items for one resource name.

use std::io::{self, Write};

use clap::Args;
use resourcetree::config::ConfigFile;
use resourcetree::resource::{ResourceNamespace, ResourceType};

use super::common::{load_tree, parse_namespace, parse_resource_type, LoadedTree, ManifestArgs};
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// Resource type (e.g., string, drawable, id)
    pub resource_type: String,

    /// Resource name
    pub name: String,

    /// Namespace: res-auto, android or a package name
    #[arg(long, default_value = "res-auto")]
    pub namespace: String,
}

pub fn run(args: ResolveArgs, config: &ConfigFile) -> Result<(), CliError> {
    let namespace = parse_namespace(&args.namespace)?;
    let resource_type = parse_resource_type(&args.resource_type)?;
    let loaded = load_tree(&args.manifest, config)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let found = write_resolved(&loaded, &namespace, resource_type, &args.name, &mut out)?;
    out.flush()?;

    if found == 0 {
        return Err(CliError::NotFound {
            namespace: namespace.to_string(),
            resource_type: resource_type.to_string(),
            name: args.name,
        });
    }
    Ok(())
}

/// Write one line per visible item and return how many there were.
fn write_resolved(
    loaded: &LoadedTree,
    namespace: &ResourceNamespace,
    resource_type: ResourceType,
    name: &str,
    out: &mut impl Write,
) -> io::Result<usize> {
    let items = loaded.root.resources(namespace, resource_type, name);
    for item in &items {
        writeln!(
            out,
            "{:<16} {:?}  ({}, {})",
            item.configuration().to_string(),
            item.value(),
            loaded.label(item.repository()),
            item.visibility()
        )?;
    }
    Ok(items.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::common::tests::load_sample;

    #[test]
    fn test_resolve_lists_each_configuration() {
        let loaded = load_sample(None);
        let mut out = Vec::new();
        let found = write_resolved(
            &loaded,
            &ResourceNamespace::Res,
            ResourceType::String,
            "app_name",
            &mut out,
        )
        .unwrap();
        assert_eq!(found, 2);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("default"));
        assert!(lines[0].contains("\"App\""));
        assert!(lines[1].starts_with("fr"));
    }

    #[test]
    fn test_resolve_respects_namespace() {
        let loaded = load_sample(None);
        let mut out = Vec::new();
        let found = write_resolved(
            &loaded,
            &ResourceNamespace::Res,
            ResourceType::Color,
            "black",
            &mut out,
        )
        .unwrap();
        assert_eq!(found, 0);
        assert!(out.is_empty());

        let found = write_resolved(
            &loaded,
            &ResourceNamespace::Android,
            ResourceType::Color,
            "black",
            &mut out,
        )
        .unwrap();
        assert_eq!(found, 1);
    }
}
