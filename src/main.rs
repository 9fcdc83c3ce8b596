//! Main entry point for the marker_fingerprint application.
//!
//! Streams large nucleotide FASTA databases and either extracts the records
//! annotated as marker genes or turns each record into a fixed-width vector
//! of k-mer counts. Database retrieval and merging are separate subcommands.

// Modules defined within the project
mod bio;
mod cli;
mod config;
mod database;
mod error;
mod io;
mod pipeline;
mod utils;
use cli::{run_cli, Cli};

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::error;

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(e) = run_cli(cli) {
        error!("{:#}", e);
        return Err(e);
    }

    Ok(())
}
