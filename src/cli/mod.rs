//! Command line interface for Lorax.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Lorax - vaporizer communication engine
#[derive(Parser, Debug)]
#[command(
    name = "lorax",
    author,
    version,
    about = "Device communication engine for Lorax and legacy firmware",
    long_about = r#"
Lorax talks to a vaporizer over Bluetooth Low Energy:

  - Negotiates the firmware family (Lorax or legacy)
  - Unlocks access with the seed/key handshake
  - Keeps a normalized state snapshot current via watches or polls
  - Opens high-frequency watches while the device is heating

QUICK START:
  Demo:    lorax demo --seconds 20
  Legacy:  lorax demo --legacy
  Config:  lorax config --example
"#
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a session against a simulated device
    Demo(DemoArgs),

    /// Show effective or example configuration
    Config(ConfigArgs),
}

/// Demo command arguments
#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Simulate legacy firmware
    #[arg(long, conflicts_with = "pup")]
    pub legacy: bool,

    /// Simulate Lorax firmware with the Pup sub-service
    #[arg(long)]
    pub pup: bool,

    /// How long to run, in seconds
    #[arg(short, long, default_value = "15")]
    pub seconds: u64,

    /// Leave the simulated device idle instead of driving a heat cycle
    #[arg(long)]
    pub no_heat: bool,

    /// Switch to this profile after connecting
    #[arg(long)]
    pub profile: Option<usize>,
}

/// Config command arguments
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Print the example configuration instead of the effective one
    #[arg(long)]
    pub example: bool,

    /// Output path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
