//! CLI Module
//!
//! Command-line interface over a provider store and WAVE files.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Talkbook - managed PCM audio store for talking book authoring
#[derive(Parser, Debug)]
#[command(name = "talkbook")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Engine configuration file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the format and duration of WAVE files
    #[command(name = "inspect")]
    Inspect {
        /// WAVE files to inspect
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Copy WAVE files into a store as providers
    #[command(name = "import")]
    Import {
        /// Store directory
        #[arg(short, long)]
        store: PathBuf,

        /// WAVE files to import
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List the providers of a store
    #[command(name = "list")]
    List {
        /// Store directory
        #[arg(short, long)]
        store: PathBuf,

        /// Also compute SHA-256 checksums
        #[arg(long)]
        checksum: bool,
    },

    /// Join WAVE files into one, optionally splitting the result in two
    #[command(name = "concat")]
    Concat {
        /// Working store directory
        #[arg(short, long)]
        store: PathBuf,

        /// Output WAVE file
        #[arg(short, long)]
        output: PathBuf,

        /// Split point in milliseconds; audio after it goes to --tail
        #[arg(long, requires = "tail")]
        split_at: Option<f64>,

        /// Output WAVE file for the audio after --split-at
        #[arg(long)]
        tail: Option<PathBuf>,

        /// WAVE files to join, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Move a store to a new directory
    #[command(name = "relocate")]
    Relocate {
        /// Current store directory
        #[arg(short, long)]
        store: PathBuf,

        /// New store directory
        #[arg(short, long)]
        to: PathBuf,

        /// Copy files instead of moving them
        #[arg(long)]
        copy: bool,
    },

    /// Delete files in a store that no provider owns
    #[command(name = "sweep")]
    Sweep {
        /// Store directory
        #[arg(short, long)]
        store: PathBuf,
    },
}
