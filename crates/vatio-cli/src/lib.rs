//! Vatio CLI Library
//!
//! Command-line interface for the Vatio energy measurement experiments.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // Error types are self-documenting

mod commands;
mod config;
mod error;
mod output;
mod runner;

pub use commands::{Cli, ColorArg, Commands, ListArgs, RunArgs};
pub use config::{init_tracing, CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use runner::{list_configs, run_experiment};
