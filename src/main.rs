//! Talkbook CLI - Managed Audio Store
//!
//! Command-line interface for the talkbook provider store.

use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use talkbook::cli::{commands, Cli, Commands};
use talkbook::config::EngineConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides the default level
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    debug!("Talkbook v{}", env!("CARGO_PKG_VERSION"));

    let config = EngineConfig::load_or_default(cli.config.as_deref())?;
    handle_command(cli.command, &config)
}

fn handle_command(cmd: Commands, config: &EngineConfig) -> Result<()> {
    match cmd {
        Commands::Inspect { files } => commands::inspect(&files),
        Commands::Import { store, files } => commands::import(&store, &files, config),
        Commands::List { store, checksum } => commands::list(&store, checksum, config),
        Commands::Concat {
            store,
            output,
            split_at,
            tail,
            files,
        } => {
            let split = split_at.zip(tail.as_deref());
            commands::concat(&store, &files, &output, split, config)
        }
        Commands::Relocate { store, to, copy } => commands::relocate(&store, &to, copy, config),
        Commands::Sweep { store } => commands::sweep(&store, config),
    }
}
