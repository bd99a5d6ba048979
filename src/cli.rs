use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vidstitch")]
#[command(about = "Merge video files with ffmpeg", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Debug logging, including every ffmpeg command line
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// ffmpeg executable (overrides config)
    #[arg(long, global = true, value_name = "PATH")]
    pub ffmpeg: Option<PathBuf>,

    /// ffprobe executable (overrides config)
    #[arg(long, global = true, value_name = "PATH")]
    pub ffprobe: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check if ffmpeg and ffprobe are installed
    CheckFfmpeg,

    /// List hardware encoders detected in the local ffmpeg build
    Encoders,

    /// List video files under a directory (defaults to current directory)
    Scan { directory: Option<PathBuf> },

    /// Probe video files and report whether they can be merged without re-encoding
    Probe {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Merge video files in the given order
    Merge {
        /// Input files, in output order (at least two)
        #[arg(required = true, num_args = 2..)]
        files: Vec<PathBuf>,

        /// Output file (defaults to merged-<timestamp>.<ext> next to the first input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Use a hardware encoder if re-encoding is needed (overrides config)
        #[arg(long, conflicts_with = "no_hw")]
        hw: bool,

        /// Never use a hardware encoder (overrides config)
        #[arg(long, conflicts_with = "hw")]
        no_hw: bool,

        /// Print progress events as JSON lines on stdout
        #[arg(long)]
        json_events: bool,
    },

    /// Show config status and location, or create default config if missing
    InitConfig,
}

impl Commands {
    /// Hardware preference override from `--hw`/`--no-hw`
    pub fn hardware_override(hw: bool, no_hw: bool) -> Option<bool> {
        if hw {
            Some(true)
        } else if no_hw {
            Some(false)
        } else {
            None // Use config default
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}
