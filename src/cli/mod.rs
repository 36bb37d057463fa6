//! CLI command definitions for expconf
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod compose;
pub mod groups;

use clap::{Parser, Subcommand};
use compose::ComposeArgs;
use groups::GroupsArgs;

/// Compose experiment configurations from a config directory
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compose, resolve and print a run configuration
    Compose(ComposeArgs),

    /// List config groups and their presets
    Groups(GroupsArgs),
}
