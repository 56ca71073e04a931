//! CLI interface for Foreman
//!
//! This module provides the command-line interface using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Foreman supervisor service
///
/// Coordinates a planning LLM with an autonomous worker agent: relays
/// settled progress to the planner and the planner's instructions back to
/// the worker, one conversation at a time.
#[derive(Parser, Debug)]
#[command(name = "foreman")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API and conversation runtime
    Serve {
        /// Override the bind address from config
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Validate configuration and report effective settings
    Check,
}
