use clap::{ArgAction, Parser};
use std::path::PathBuf;
use tracing::Level;

/// Top-level CLI parser for the `gds` binary.
///
/// `-h` prints the sample script, so clap's own help flag is long-only.
#[derive(Debug, Parser)]
#[command(
    name = "gds",
    version,
    about = "Build GLM design matrices (G/preG files) from gds scripts",
    disable_help_flag = true
)]
pub struct Cli {
    /// gds script to run
    pub script: Option<PathBuf>,

    /// Check the script without writing any file
    #[arg(short = 'v', long)]
    pub validate: bool,

    /// Print a sample script
    #[arg(short = 'h', long)]
    pub sample: bool,

    /// Write a sample script to FILE
    #[arg(short = 'x', long = "write-sample", value_name = "FILE")]
    pub write_sample: Option<PathBuf>,

    /// Engine configuration file (defaults to ./gds.toml when present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Debug logging
    #[arg(long)]
    pub verbose: bool,

    /// Log in JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    pub help: Option<bool>,
}

impl Cli {
    pub fn log_level(&self) -> Level {
        if self.quiet {
            Level::ERROR
        } else if self.verbose {
            Level::DEBUG
        } else {
            Level::WARN
        }
    }
}
