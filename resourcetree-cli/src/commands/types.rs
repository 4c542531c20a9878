//! `types`: list the resource types a repository has items for.

use std::io::{self, Write};

use clap::Args;
use resourcetree::config::ConfigFile;
use resourcetree::repository::Repository;
use resourcetree::resource::ResourceNamespace;

use super::common::{load_tree, parse_namespace, ManifestArgs};
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct TypesArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// Only this namespace (default: every namespace in the tree)
    #[arg(long)]
    pub namespace: Option<String>,
}

pub fn run(args: TypesArgs, config: &ConfigFile) -> Result<(), CliError> {
    let namespace = args
        .namespace
        .as_deref()
        .map(parse_namespace)
        .transpose()?;
    let loaded = load_tree(&args.manifest, config)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_types(&loaded.root, namespace.as_ref(), &mut out)?;
    out.flush()?;
    Ok(())
}

fn write_types(
    repository: &Repository,
    only: Option<&ResourceNamespace>,
    out: &mut impl Write,
) -> io::Result<()> {
    let namespaces = match only {
        Some(namespace) => vec![namespace.clone()],
        None => repository.namespaces().into_iter().collect(),
    };
    for namespace in namespaces {
        writeln!(out, "[{}]", namespace)?;
        for resource_type in repository.resource_types(&namespace) {
            let names = repository.resource_names(&namespace, resource_type);
            writeln!(out, "  {:<20} {} names", resource_type.name(), names.len())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::common::tests::load_sample;

    fn types(only: Option<&ResourceNamespace>) -> String {
        let loaded = load_sample(None);
        let mut out = Vec::new();
        write_types(&loaded.root, only, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_all_namespaces() {
        let text = types(None);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "[res-auto]");
        assert!(lines
            .iter()
            .any(|l| l.trim_start().starts_with("string ") && l.ends_with("2 names")));
        assert!(lines.contains(&"[android]"));
    }

    #[test]
    fn test_unknown_namespace_is_empty() {
        let text = types(Some(&ResourceNamespace::package("com.example.none")));
        assert_eq!(text, "[com.example.none]\n");
    }
}
