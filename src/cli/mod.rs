//! CLI interface for Powermeter

pub mod commands;
mod output;

pub use output::*;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "powermeter")]
#[command(version)]
#[command(about = "Authenticated HTTP API for live power meter readings", long_about = None)]
pub struct Cli {
    /// Path to powermeter.toml (searched upward from the current directory by default)
    #[arg(short, long, global = true, env = "POWERMETER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default powermeter.toml in the current directory
    Init,

    /// Start the HTTP API server and the meter polling loop
    Serve {
        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List the configured user accounts and their permissions
    Users {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Probe the meter once and print the reading
    Check {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}
