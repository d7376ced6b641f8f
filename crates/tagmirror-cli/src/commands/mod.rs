//! CLI commands and argument parsing.

pub mod run;
pub mod validate;

use clap::{Parser, Subcommand};

/// Tagmirror - Mirror container image tags between registries
#[derive(Parser)]
#[command(name = "tagmirror")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true, env = "TAGMIRROR_VERBOSE")]
    pub verbose: bool,

    /// Emit logs as JSON and print the run report as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Mirror every configured image
    Run(run::RunArgs),

    /// Validate a configuration file without contacting any registry
    Validate(validate::ValidateArgs),

    /// Print version information
    Version,
}
