//! CLI - Command-line argument parsing
//!
//! Keeps argument parsing separate from execution logic.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Ecomap CLI
#[derive(Parser, Debug)]
#[command(name = "ecomapctl")]
#[command(about = "Ecomap - service inventory, health checks and port-forward remediation", long_about = None)]
#[command(version = env!("ECOMAP_VERSION"))]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Config file (default: ./ecomap.yaml, then ~/.config/ecomap/config.yaml)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Increase diagnostic output (-v info, -vv debug)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Discover repositories, services and health, then print a summary
    Scan {
        /// Print the full snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run health checks only (exit 2 when any fails)
    Check,

    /// Write the markdown architecture report
    Report {
        /// Destination (default: report.output_path from config)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Start port-forwards for allow-listed services and verify them
    Fix,
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Scan { .. } => "scan",
            Commands::Check => "check",
            Commands::Report { .. } => "report",
            Commands::Fix => "fix",
        }
    }
}
