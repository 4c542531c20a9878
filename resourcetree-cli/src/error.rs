//! CLI error type.

use resourcetree::config::ConfigError;
use resourcetree::manifest::ManifestError;
use resourcetree::repository::RepositoryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    ConfigFile(#[from] ConfigError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("manifest has no single root composite; choose one with --root")]
    NoRoot,

    #[error("no repository labelled '{0}' in the manifest")]
    UnknownRoot(String),

    #[error("no {resource_type} resources named '{name}' in namespace {namespace}")]
    NotFound {
        namespace: String,
        resource_type: String,
        name: String,
    },

    #[error("failed to set up logging: {0}")]
    Logging(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
