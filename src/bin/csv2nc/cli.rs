//! Command line interface definitions
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use stationnc::container::OutputFormat;

/// Convert station CSV data into a CF/ACDD timeSeries netCDF file.
#[derive(Debug, Parser)]
pub(crate) struct Cli {
    #[clap(subcommand)]
    pub(crate) command: Commands,

    /// Also write the log to this file. The file always receives at least
    /// debug-level messages, including every value replaced by a fill value.
    #[clap(long, global = true)]
    pub(crate) log_file: Option<PathBuf>,

    #[command(flatten)]
    pub(crate) verbosity: Verbosity<InfoLevel>,
}

#[derive(Debug, Clone, Subcommand)]
pub(crate) enum Commands {
    /// Generate one output file from a station configuration and CSV input
    Generate(GenerateCli),
    /// Create an example station configuration file
    Template(TemplateCli),
    /// Validate a station configuration and print its variable table
    Check(CheckCli),
}

#[derive(Debug, Clone, Args)]
pub(crate) struct GenerateCli {
    /// Path to the TOML station configuration.
    pub(crate) config: PathBuf,

    /// CSV file to read, overriding `input` in the configuration.
    #[clap(short = 'i', long)]
    pub(crate) input: Option<PathBuf>,

    /// File to write, overriding `output` in the configuration. Its stem
    /// becomes the file's `id` attribute.
    #[clap(short = 'o', long)]
    pub(crate) output: Option<PathBuf>,

    /// Output format, overriding `format` in the configuration.
    #[clap(short = 'f', long, value_enum)]
    pub(crate) format: Option<OutputFormat>,

    /// Do not show a progress bar.
    #[clap(long)]
    pub(crate) no_progress: bool,
}

#[derive(Debug, Clone, Args)]
pub(crate) struct TemplateCli {
    /// Path to write the template to
    pub(crate) template_file: PathBuf,
}

/// Validate a configuration without reading any input. This checks the
/// station position, that every fill value lies outside its valid range,
/// that variable names are unique, and that every instrument reference
/// resolves.
#[derive(Debug, Clone, Args)]
pub(crate) struct CheckCli {
    /// Path to the TOML station configuration.
    pub(crate) config: PathBuf,
}
