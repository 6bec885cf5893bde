//! Vatio CLI: energy measurement for web media playback
//!
//! ## Usage
//!
//! ```bash
//! vatio list                          # Show built-in configurations
//! vatio run                           # Full experiment, all configurations
//! vatio run --config chrome_apple_1x  # One configuration
//! vatio run --runs 3 --dry-run        # Validate wiring without measuring
//! ```

use clap::Parser;
use std::process::ExitCode;
use vatio_cli::{
    init_tracing, Cli, CliConfig, CliResult, ColorChoice, Commands, Verbosity,
};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    config.color.apply();
    init_tracing(config.verbosity);

    match cli.command {
        Commands::Run(args) => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(vatio_cli::run_experiment(&config, &args))
        }
        Commands::List(args) => {
            vatio_cli::list_configs(&args);
            Ok(())
        }
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = if cli.quiet {
        Verbosity::Quiet
    } else {
        match cli.verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Debug,
        }
    };
    let color: ColorChoice = cli.color.into();
    CliConfig::new().with_verbosity(verbosity).with_color(color)
}
