use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reelforge")]
#[command(author, version, about = "Transcode an upload into every configured resolution and format")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transcode a file into the configured matrix and record the job
    Submit {
        /// Input media file
        #[arg(required = true)]
        file: PathBuf,
    },

    /// Show the manifest of a recorded job
    Lookup {
        /// Job identifier printed by `submit`
        #[arg(required = true)]
        job_id: String,
    },

    /// List recorded jobs, newest first
    List {
        /// Maximum number of jobs to show
        #[arg(long, default_value = "20")]
        limit: i64,

        /// Number of jobs to skip
        #[arg(long, default_value = "0")]
        offset: i64,
    },

    /// Check that the external encoder is available
    CheckTools {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration and any warnings
    Config,
}
