//! Isko CLI - Command-line interface for IskoMarket listing sync
//!
//! Watch the public catalog live, take one-shot listings, and inspect the
//! visibility diagnostics from the terminal.

mod cli;
mod commands;
mod error;

use clap::Parser;
use tracing_subscriber::filter::Directive;

use crate::cli::{Cli, Commands};
use crate::commands::counts::run_counts;
use crate::commands::demo::run_demo;
use crate::commands::list::run_list;
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "isko=info".parse::<Directive>() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch {
            category,
            search,
            limit,
        } => run_watch(category, search, limit).await?,
        Commands::List {
            category,
            search,
            limit,
            json,
        } => run_list(category, search, limit, json).await?,
        Commands::Counts { json } => run_counts(json).await?,
        Commands::Demo => run_demo().await,
    }

    Ok(())
}
