use clap::{ArgAction, Parser, Subcommand};
use relay_core::{DEFAULT_RANK_LIMIT, ModelMetric, PowerTier, ProviderFilter};
use std::path::PathBuf;

/// Relay: chat with hosted LLMs and turn build requests into project files.
/// Starts an interactive session when no command is given.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase message verbosity.
    ///
    /// Specify multiple times for more verbose output:
    ///  -v:  INFO level
    ///  -vv: DEBUG level
    ///  -vvv: TRACE level (most verbose)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to Relay.toml. Defaults to the nearest one in this or a parent directory.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Owner id used for settings, history and the artifact sandbox.
    #[arg(short, long, default_value = "local", global = true)]
    pub owner: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one chat message and print the reply.
    Chat {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Ask the active model for project files and write them to disk.
    Build {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Rank catalog models by a metric.
    Rank {
        #[arg(short, long, default_value = "balanced")]
        metric: ModelMetric,
        /// A provider id, or "all".
        #[arg(short, long, default_value = "all")]
        provider: ProviderFilter,
        #[arg(short, long)]
        tier: Option<PowerTier>,
        #[arg(short, long, default_value_t = DEFAULT_RANK_LIMIT)]
        limit: usize,
    },
    /// Check that every provider answers its model listing.
    Health,
}
