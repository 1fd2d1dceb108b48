//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for the OfSM orchestrator.

use clap::{Parser, Subcommand};

/// OfSM Orchestrator - persona-driven text generation on a GPU worker pool
///
/// Generates posts and persona-voiced comments by scheduling jobs across one
/// model server per GPU, and manages the persona registry.
#[derive(Parser, Debug)]
#[command(name = "ofsm-orchestrator")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "OFSM_CONFIG", global = true)]
    pub config: Option<String>,

    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate posts or comments
    Generate {
        #[command(subcommand)]
        subcommand: GenerateSubcommand,
    },

    /// Persona registry management
    Persona {
        #[command(subcommand)]
        subcommand: PersonaSubcommand,
    },

    /// Check every device backend
    Health,

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Generation subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum GenerateSubcommand {
    /// Generate posts about a topic
    Posts {
        /// Topic to write about
        topic: String,

        /// Number of posts (defaults to generation.posts_per_generation_request)
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Print the full batch report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate one comment per persona on a post
    Comments {
        /// Content of the post being replied to
        content: String,

        /// Only these personas, by name (defaults to all)
        #[arg(short, long = "persona", value_name = "NAME")]
        personas: Vec<String>,

        /// Print the full batch report as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Persona subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum PersonaSubcommand {
    /// List personas with their indices
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a persona
    Add { name: String, style: String },

    /// Replace the persona at an index
    Update {
        index: usize,
        name: String,
        style: String,
    },

    /// Delete the persona at an index
    Delete { index: usize },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the current configuration
    Show,

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the configuration
    Validate,
}
