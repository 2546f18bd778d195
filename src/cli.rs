use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "transboxer")]
#[command(author, version, about = "Remux live WebM (H.264) into fragmented MP4")]
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
    /// Remux a WebM file (or `-` for stdin) into fragmented MP4
    Convert {
        /// Input WebM stream
        #[arg(required = true)]
        input: PathBuf,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Read size in bytes
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Track timescale in ticks per second
        #[arg(long)]
        timescale: Option<u32>,

        /// Guess instead of failing on unrecognized NALU framing
        #[arg(long)]
        lenient: bool,
    },

    /// Show the element tree or a summary of a WebM stream
    Inspect {
        /// File to inspect (`-` for stdin)
        #[arg(required = true)]
        file: PathBuf,

        /// Print every element instead of a summary
        #[arg(long)]
        tags: bool,

        /// Output the summary as JSON
        #[arg(long, conflicts_with = "tags")]
        json: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
