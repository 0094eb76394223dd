//! QuoteSync CLI
//!
//! Offline-first quote generator with a simulated sync server.
//!
//! # Commands
//!
//! - `list` - List local quotes
//! - `categories` - List categories
//! - `random` - Show a random quote
//! - `add` - Add a quote locally
//! - `sync` - Run one sync cycle against the server
//! - `watch` - Sync periodically until interrupted
//! - `remote` - Inspect or edit the simulated server

mod commands;
mod local;
mod prompt;
mod server;

use clap::{Parser, Subcommand};
use commands::remote::RemoteAction;
use quotesync_engine::{RetryConfig, SyncConfig};
use quotesync_protocol::Strategy;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Offline-first quote generator.
#[derive(Parser)]
#[command(name = "quotesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the local quote store
    #[arg(global = true, short, long, default_value = "quotes.json")]
    store: PathBuf,

    /// Path to the simulated server file
    #[arg(global = true, short, long, default_value = "server.json")]
    remote: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List local quotes
    List {
        /// Only show this category
        #[arg(short, long)]
        category: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List categories with quote counts
    Categories,

    /// Show a random quote
    Random {
        /// Pick from this category
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Add a quote to the local store
    Add {
        /// Quote text
        text: String,

        /// Category
        #[arg(short, long)]
        category: String,

        /// Author
        #[arg(short, long)]
        author: Option<String>,
    },

    /// Run one sync cycle
    Sync {
        #[command(flatten)]
        options: SyncOptions,
    },

    /// Sync periodically until Ctrl-C
    Watch {
        /// Seconds between cycles
        #[arg(short, long, default_value = "30")]
        interval_secs: u64,

        #[command(flatten)]
        options: SyncOptions,
    },

    /// Inspect or edit the simulated server
    Remote {
        #[command(subcommand)]
        action: RemoteAction,
    },

    /// Show version information
    Version,
}

#[derive(clap::Args)]
struct SyncOptions {
    /// Conflict strategy (server-wins, local-wins, merge, ask-user)
    #[arg(long, default_value = "server-wins")]
    strategy: Strategy,

    /// Fetch timeout in seconds
    #[arg(long, default_value = "10")]
    timeout_secs: u64,

    /// Total fetch attempts per cycle
    #[arg(long, default_value = "3")]
    attempts: u32,
}

impl SyncOptions {
    fn config(&self) -> SyncConfig {
        SyncConfig::default()
            .with_strategy(self.strategy)
            .with_fetch_timeout(Duration::from_secs(self.timeout_secs))
            .with_retry(RetryConfig::new(self.attempts))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::List { category, format } => {
            commands::list::run(&cli.store, category.as_deref(), &format)?;
        }
        Commands::Categories => {
            commands::categories::run(&cli.store)?;
        }
        Commands::Random { category } => {
            commands::random::run(&cli.store, category.as_deref())?;
        }
        Commands::Add {
            text,
            category,
            author,
        } => {
            commands::add::run(&cli.store, &text, &category, author.as_deref())?;
        }
        Commands::Sync { options } => {
            commands::sync::run(&cli.store, &cli.remote, options.config())?;
        }
        Commands::Watch {
            interval_secs,
            options,
        } => {
            let config = options
                .config()
                .with_sync_interval(Duration::from_secs(interval_secs));
            commands::watch::run(&cli.store, &cli.remote, config)?;
        }
        Commands::Remote { action } => {
            commands::remote::run(&cli.remote, action)?;
        }
        Commands::Version => {
            println!("QuoteSync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
