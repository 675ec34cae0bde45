use clap::{CommandFactory, Parser, Subcommand, ValueEnum, ValueHint};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Aligned plain-text table
    #[default]
    Text,
    /// Single JSON document (pipe-friendly)
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the state-vector layout of a system
    Layout {
        /// System description (TOML)
        #[arg(value_hint = ValueHint::FilePath)]
        system: PathBuf,
        /// Solve mode to lay out (local, powerflow, dae, dynalg, dyndiff)
        #[arg(long, default_value = "dae")]
        mode: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Initialize a system and report the steady state it settles on
    Init {
        /// System description (TOML)
        #[arg(value_hint = ValueHint::FilePath)]
        system: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Run the reference implicit-Euler integrator over a system
    Simulate {
        /// System description (TOML)
        #[arg(value_hint = ValueHint::FilePath)]
        system: PathBuf,
        /// Override the configured stop time (s)
        #[arg(long)]
        stop: Option<f64>,
        /// Override the configured linear solver (gauss, faer)
        #[arg(long)]
        solver: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}
