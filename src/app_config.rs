//! Command-line interface definition
//!
//! Global flags apply to every subcommand.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line interface definition for GameHub
#[derive(Debug, Parser)]
#[command(name = "gamehub")]
#[command(version, about = "Casual game hub backend: hearts economy, purchases and wagering matches")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file; defaults to config/<GAMEHUB_ENV>.toml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve,

    /// Load and validate configuration, then exit
    CheckConfig,

    /// Print the effective configuration as TOML
    PrintConfig,
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.unwrap_or(Commands::Serve)
    }
}

impl Commands {
    /// Get the command name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Serve => "serve",
            Commands::CheckConfig => "check-config",
            Commands::PrintConfig => "print-config",
        }
    }
}
