//! CLI parse: clap types for capes. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// capes - resolve and cache player capes across providers
#[derive(Parser, Debug)]
#[command(name = "capes")]
#[command(about = "Resolve, cache and inspect player capes")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Root directory for storage and config/ lookup
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Configuration file path (overrides layered config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (when output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve a player's cape; all types when none is given
    Resolve {
        /// Player name or id (dashed or undashed)
        player: String,
        /// Cape type, e.g. optifine
        cape_type: Option<String>,
    },
    /// List a player's recorded capes, newest first
    History {
        player: String,
        cape_type: Option<String>,
    },
    /// Show a single record by id
    Get { record_id: String },
    /// Write a stored image (or one of its variants) to a file
    Image {
        /// Content hash
        hash: String,
        /// Transform or variant name (front, back, still, animated, ...)
        transform: Option<String>,
        /// Output file
        #[arg(long)]
        out: PathBuf,
    },
    /// List configured cape types
    Types,
    /// Show record statistics
    Stats {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Print the effective configuration
    Config,
}
