// Copyright 2025 Cowboy AI, LLC.

//! Command-line arguments for `realm-server`

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments
///
/// Flags override the matching settings from the configuration file.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    ///
    /// A missing file is not an error; the built-in defaults are used.
    #[arg(short, long, default_value = "realm.toml")]
    pub config: PathBuf,

    /// HTTP bind address, e.g. "0.0.0.0:8080"
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Seed conversations of every configured tenant from this directory
    #[arg(long)]
    pub seed_conversations: Option<PathBuf>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: PathBuf::from("realm.toml"),
            bind: None,
            debug: false,
            json_logs: false,
            seed_conversations: None,
        }
    }
}
