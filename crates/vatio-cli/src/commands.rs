//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Vatio: automated energy measurement for web media playback
#[derive(Parser, Debug)]
#[command(name = "vatio")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run measurement trials
    Run(RunArgs),

    /// List the built-in experiment configurations
    List(ListArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Run a single named configuration (default: all of them)
    #[arg(long)]
    pub config: Option<String>,

    /// Trials per configuration (default: 30)
    #[arg(long)]
    pub runs: Option<usize>,

    /// Launch the browser and drive playback but skip the energy
    /// sampler (validates the automation without sudo/energibridge)
    #[arg(long)]
    pub dry_run: bool,

    /// Directory trial records and sampler output are written into
    #[arg(long, default_value = "results")]
    pub output_dir: PathBuf,
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Include episode URLs in the listing
    #[arg(long)]
    pub urls: bool,
}

/// Color argument from the command line
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum ColorArg {
    /// Detect terminal support
    #[default]
    Auto,
    /// Force colors on
    Always,
    /// Force colors off
    Never,
}
