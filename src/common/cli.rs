//! CLI argument parsing for the CTP tools
//!
//! Common arguments are shared via composition: each binary has its own
//! Args struct that embeds [`CommonArgs`]. Command-line values override the
//! configuration file.

use clap::Parser;

/// Common arguments shared across all binaries
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    /// Path to configuration file
    #[arg(short = 'f', long = "config", default_value = "config.toml")]
    pub config_file: String,
}

/// Arguments for the decoder
#[derive(Parser, Debug, Clone)]
pub struct DecoderArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Raw timeframe file to decode
    #[arg(short = 'i', long = "input")]
    pub input: String,

    /// Output file for JSON lines (stdout when absent)
    #[arg(short = 'o', long = "output")]
    pub output: Option<String>,

    /// Number of timeframes averaged for luminosity
    #[arg(long = "window-size")]
    pub window_size: Option<usize>,

    /// Log a luminosity summary every timeframe
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Do not produce digits
    #[arg(long = "no-digits")]
    pub no_digits: bool,

    /// Do not produce luminosity
    #[arg(long = "no-lumi")]
    pub no_lumi: bool,

    /// Read a file without footer, keeping every readable timeframe
    #[arg(long)]
    pub salvage: bool,
}

/// Arguments for the raw data emulator
#[derive(Parser, Debug, Clone)]
pub struct EmulatorArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Output raw timeframe file
    #[arg(short = 'o', long = "output")]
    pub output: String,

    /// Number of timeframes to generate
    #[arg(short = 'n', long = "n-timeframes")]
    pub n_timeframes: Option<u32>,

    /// Orbits per timeframe
    #[arg(long = "orbits-per-tf")]
    pub orbits_per_tf: Option<u32>,

    /// Mean triggered bunch crossings per orbit
    #[arg(long)]
    pub rate: Option<f64>,

    /// Replace every n-th timeframe with a placeholder
    #[arg(long = "dead-beef-every")]
    pub dead_beef_every: Option<u32>,

    /// RNG seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Run number stored in the file header
    #[arg(long = "run-number", default_value = "0")]
    pub run_number: u32,
}
