//! ResourceTree CLI - Command-line interface
//!
//! Loads a repository tree from a JSON manifest and queries its merged view.

mod commands;
mod error;
mod logging;

use clap::{ArgAction, Parser, Subcommand};
use resourcetree::config::ConfigFile;

use commands::{config::ConfigCommands, dump::DumpArgs, resolve::ResolveArgs, types::TypesArgs};
use error::CliError;

#[derive(Debug, Parser)]
#[command(
    name = "resourcetree",
    version,
    about = "Query merged, prioritized resource repository trees"
)]
struct Cli {
    /// Increase logging (-vv reaches trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print every visible item of a repository
    Dump(DumpArgs),

    /// Print the visible items for one resource name
    Resolve(ResolveArgs),

    /// List the resource types a repository has items for
    Types(TypesArgs),

    /// View or change configuration settings
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn main() {
    let cli = Cli::parse();

    let config = ConfigFile::load().unwrap_or_else(|e| {
        eprintln!("Warning: ignoring configuration file: {}", e);
        ConfigFile::default()
    });

    let _log_guard = match logging::init(&config.logging, cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli.command, &config) {
        tracing::debug!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands, config: &ConfigFile) -> Result<(), CliError> {
    match command {
        Commands::Dump(args) => commands::dump::run(args, config),
        Commands::Resolve(args) => commands::resolve::run(args, config),
        Commands::Types(args) => commands::types::run(args, config),
        Commands::Config(command) => commands::config::run(command),
    }
}
