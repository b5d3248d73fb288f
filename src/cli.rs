use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "listing-harvester")]
#[command(about = "Incremental listing harvester with local image copies", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file, defaults to the user config directory
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Harvest, merge, enrich new records and save the snapshot
    Run {
        /// Raw candidate dump to read instead of the configured one
        #[arg(long)]
        source: Option<PathBuf>,

        /// Records enriched concurrently per chunk
        #[arg(long)]
        concurrency: Option<usize>,

        /// Skip the CSV export after saving
        #[arg(long)]
        no_csv: bool,
    },
    /// Write the CSV projection of the current snapshot
    ExportCsv {
        /// Output file instead of the configured one
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Re-attach extra images found in the local image store
    Relink,
    /// Print the effective configuration as JSON
    PrintConfig,
}
