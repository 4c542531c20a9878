//! CLI subcommands.

pub mod common;
pub mod config;
pub mod dump;
pub mod resolve;
pub mod types;
