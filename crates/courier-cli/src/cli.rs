use clap::{Args, Parser, Subcommand};
use courier_routing::Tier;
use std::path::PathBuf;

/// Routes requests across tiered backends with retries and fallover.
#[derive(Debug, Parser)]
#[command(name = "courier", version, about)]
pub struct Cli {
    /// Configuration file [default: ~/.courier/config.toml]
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Answer from scripted mock transports instead of the network
    #[arg(long, global = true)]
    pub mock: bool,

    /// Persist sessions and health in this directory
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Dispatch one request
    Send(SendArgs),
    /// Show how a request would be classified
    Classify {
        /// Request text
        text: String,
    },
    /// Show backend health
    Health,
    /// Show the history of a session
    History {
        /// Session key
        #[arg(long)]
        session: String,
    },
    /// Remove sessions idle for longer than the given age
    Cleanup {
        /// Maximum idle time in seconds [default: from configuration]
        #[arg(long)]
        max_age_seconds: Option<u64>,
    },
    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Request text
    pub text: String,

    /// Session key [default: a new random key]
    #[arg(long)]
    pub session: Option<String>,

    /// Use this tier's primary backend instead of classifying
    #[arg(long, conflicts_with = "backend")]
    pub tier: Option<Tier>,

    /// Use this backend as the primary
    #[arg(long)]
    pub backend: Option<String>,

    /// Overall deadline in milliseconds
    #[arg(long)]
    pub deadline_ms: Option<u64>,
}
