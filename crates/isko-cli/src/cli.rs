use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "isko")]
#[command(about = "Keep an eye on the IskoMarket listing catalog")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Follow the catalog live until interrupted
    Watch {
        /// Only show listings in this category
        #[arg(long)]
        category: Option<String>,
        /// Case-insensitive title search
        #[arg(long)]
        search: Option<String>,
        /// Maximum number of listings to keep
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Print the current catalog once
    List {
        /// Only show listings in this category
        #[arg(long)]
        category: Option<String>,
        /// Case-insensitive title search
        #[arg(long)]
        search: Option<String>,
        /// Number of listings to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compare primary, broad, and raw listing counts
    Counts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the sync engine against a scripted in-memory catalog
    Demo,
}
