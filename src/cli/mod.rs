pub mod commands;

use clap::{Parser, Subcommand};
use crate::config::{Config, LoggingConfig};
use crate::error::Result;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hpa-myths")]
#[command(about = "Incrementally harvest the HPA myth-busting articles into a CSV file")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one synchronization: seed an empty store or append new articles
    Run {
        /// Articles to take from the first listing page on a seed run
        #[arg(long)]
        initial_n: Option<usize>,

        /// Maximum listing pages to scan on an incremental run
        #[arg(long)]
        max_pages: Option<usize>,

        /// CSV store path
        #[arg(short, long)]
        store: Option<PathBuf>,
    },

    /// Show what the store currently holds
    Status {
        /// CSV store path
        #[arg(short, long)]
        store: Option<PathBuf>,

        /// Number of latest articles to list
        #[arg(short, long, default_value_t = 5)]
        limit: usize,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a default configuration file
    Init {
        /// Replace an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Run { initial_n, max_pages, store } => {
                let mut config = Config::resolve(self.config.as_deref())?;
                let _guard = commands::init_logging(&config.logging, self.debug, self.verbose)?;

                if let Some(n) = initial_n {
                    config.crawler.initial_n = n;
                }
                if let Some(pages) = max_pages {
                    config.crawler.max_pages = pages;
                }
                if let Some(path) = store {
                    config.store.path = path;
                }
                config.validate()?;

                commands::run_sync(&config).await.map(|_| ())
            }
            Commands::Status { store, limit, json } => {
                let mut config = Config::resolve(self.config.as_deref())?;
                let _guard = commands::init_logging(&config.logging, self.debug, self.verbose)?;

                if let Some(path) = store {
                    config.store.path = path;
                }

                commands::status(&config.store.path, limit, json).await
            }
            Commands::Init { force } => {
                let _guard = commands::init_logging(&LoggingConfig::default(), self.debug, self.verbose)?;
                commands::init(self.config, force).await.map(|_| ())
            }
            Commands::Completions { shell } => {
                commands::generate_completions(shell);
                Ok(())
            }
        }
    }
}
