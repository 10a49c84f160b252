//! Shardline CLI Library
//!
//! Command-line host for the sharding core.
//!
//! - **Routing**: show which shard a composite key lands on (`shardline route`)
//! - **Load runs**: generate users, partition them and execute batched DML
//!   against every shard in parallel (`shardline load`)
//!
//! Runs use the in-memory sink by default. The Postgres backend connects one
//! pool per shard from `SHARDLINE_SHARD_URLS`.

pub mod commands;
pub mod config;
pub mod error;
pub mod output;
pub mod postgres;
pub mod records;

// Re-export commonly used types
pub use error::{CliError, Result};

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fmt;

/// Shardline - shard routing and parallel batch loading
#[derive(Parser, Debug)]
#[command(name = "shardline")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print the command reference as Markdown
    #[arg(long, hide = true)]
    pub markdown_help: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the shard each key routes to
    Route {
        /// Composite keys, parts separated by --separator (e.g. "7,User7")
        #[arg(required = true)]
        keys: Vec<String>,

        /// Number of shards (defaults to SHARDLINE_SHARD_COUNT)
        #[arg(short, long)]
        shards: Option<i64>,

        /// Separator between the parts of a composite key
        #[arg(long, default_value = ",")]
        separator: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Generate users and load them into every shard in parallel
    Load(LoadArgs),
}

/// Options of `shardline load`
///
/// Unset sharding options fall back to the `SHARDLINE_*` environment.
#[derive(Args, Debug, Clone)]
pub struct LoadArgs {
    /// Number of synthetic users to generate
    #[arg(short = 'n', long, default_value_t = 100_000)]
    pub records: u64,

    /// Number of shards
    #[arg(short, long)]
    pub shards: Option<i64>,

    /// Records per chunk (one transaction each)
    #[arg(short, long)]
    pub chunk_size: Option<usize>,

    /// Maximum shards loading at once (defaults to the shard count)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Stop waiting for shards after this many milliseconds
    #[arg(long)]
    pub deadline_ms: Option<u64>,

    /// Storage backend
    #[arg(short, long, value_enum, default_value_t = Backend::Memory)]
    pub backend: Backend,

    /// DML operation applied to each chunk
    #[arg(short, long, value_enum, default_value_t = Operation::Insert)]
    pub operation: Operation,

    /// Shard whose chunk should fail (memory backend only)
    #[arg(long, requires = "fail_chunk")]
    pub fail_shard: Option<u32>,

    /// Zero-based chunk that fails on --fail-shard
    #[arg(long, requires = "fail_shard")]
    pub fail_chunk: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

/// Where load runs write to
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// In-process sink, nothing leaves the process
    Memory,
    /// One Postgres database per shard
    Postgres,
}

/// Batched DML statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}
