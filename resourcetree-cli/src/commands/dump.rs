//! `dump`: print every visible item of a repository.

use std::io::{self, Write};
use std::sync::Arc;

use clap::Args;
use resourcetree::config::ConfigFile;
use resourcetree::repository::VisitResult;
use resourcetree::resource::{ResourceItem, ResourceVisibility};

use super::common::{load_tree, LoadedTree, ManifestArgs};
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct DumpArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// Only print items declared public
    #[arg(long)]
    pub public: bool,
}

pub fn run(args: DumpArgs, config: &ConfigFile) -> Result<(), CliError> {
    let loaded = load_tree(&args.manifest, config)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_dump(&loaded, args.public, &mut out)?;
    out.flush()?;
    Ok(())
}

/// Items grouped by namespace, then type, then name, followed by a summary.
fn write_dump(loaded: &LoadedTree, public_only: bool, out: &mut impl Write) -> io::Result<()> {
    let repository = &loaded.root;
    for namespace in repository.namespaces() {
        writeln!(out, "[{}]", namespace)?;
        for resource_type in repository.resource_types(&namespace) {
            let slice = repository.resources_of_type(&namespace, resource_type);
            let mut wrote_header = false;
            for (name, items) in &slice {
                let items: Vec<&Arc<ResourceItem>> = items
                    .iter()
                    .filter(|item| !public_only || is_public(item))
                    .collect();
                if items.is_empty() {
                    continue;
                }
                if !wrote_header {
                    writeln!(out, "  {}", resource_type)?;
                    wrote_header = true;
                }
                writeln!(out, "    {}", name)?;
                for item in items {
                    writeln!(
                        out,
                        "      {:<16} {:?}  ({})",
                        item.configuration().to_string(),
                        item.value(),
                        loaded.label(item.repository())
                    )?;
                }
            }
        }
    }

    let mut total = 0usize;
    let mut public = 0usize;
    repository.accept(&mut |item: &Arc<ResourceItem>| {
        total += 1;
        if is_public(item) {
            public += 1;
        }
        VisitResult::Continue
    });
    writeln!(out)?;
    writeln!(out, "{} visible items ({} public)", total, public)
}

fn is_public(item: &ResourceItem) -> bool {
    item.visibility() == ResourceVisibility::Public
}
