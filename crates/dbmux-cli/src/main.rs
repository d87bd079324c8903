//! dbmux - operator tooling for the host-wide instance registry.
//!
//! Lists, cleans up, and stops the processes serving multiplexed databases,
//! and previews port allocation. Output goes to stdout; logs go to stderr.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dbmux_core::InstanceRegistry;
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "dbmux")]
#[command(about = "Inspect and manage dbmux database instances")]
struct Args {
    /// Registry file (defaults to the platform config directory)
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered instances and whether their process is alive
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Remove entries whose process is gone
    Cleanup,
    /// Show which port would be used for a data directory
    Allocate {
        data_dir: String,
        /// Preferred port in the reserved range
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Stop the process serving a data directory and unregister it
    Stop { data_dir: String },
    /// Stop every registered instance
    StopAll,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::WARN };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let registry = match args.registry {
        Some(path) => InstanceRegistry::open_at(path),
        None => InstanceRegistry::open_default()?,
    };
    debug!("Using registry at {}", registry.path().display());

    let mut out = std::io::stdout().lock();
    match args.command {
        Command::List { json } => commands::list::run(&registry, json, &mut out),
        Command::Cleanup => commands::cleanup::run(&registry, &mut out),
        Command::Allocate { data_dir, port } => {
            commands::allocate::run(registry, &data_dir, port, &mut out).await
        }
        Command::Stop { data_dir } => commands::stop::run(&registry, &data_dir, &mut out),
        Command::StopAll => commands::stop::run_all(&registry, &mut out),
    }
}
