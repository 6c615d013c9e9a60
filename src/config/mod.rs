//! Configuration module for the CTP decoder
//!
//! Settings are read from a TOML file with two optional sections:
//!
//! ```toml
//! [decoder]
//! window_size = 90        # timeframes averaged for luminosity
//! verbose = false         # per-timeframe luminosity summary
//! digits = true           # produce digits
//! lumi = true             # produce luminosity
//! max_warn_dead_beef = 10 # placeholder warnings before going quiet
//! lumi_input = 3          # one-based CTP input counted for luminosity
//!
//! [emulator]
//! n_timeframes = 100
//! orbits_per_tf = 32
//! first_orbit = 0
//! mean_triggers_per_orbit = 20.0
//! dead_beef_every = 0
//! seed = 12345
//! ```
//!
//! Every key has a default, so an empty file is a valid configuration.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::decoder::dummy::DEFAULT_MAX_WARN_DEAD_BEEF;
use crate::decoder::lumi::{DEFAULT_LUMI_INPUT, DEFAULT_WINDOW_SIZE};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub decoder: DecoderFileConfig,
    #[serde(default)]
    pub emulator: EmulatorFileConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}

/// `[decoder]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecoderFileConfig {
    /// Number of timeframes averaged for luminosity
    pub window_size: usize,
    /// Verbose luminosity logging
    pub verbose: bool,
    /// Produce the digit list
    pub digits: bool,
    /// Produce the luminosity record
    pub lumi: bool,
    /// Placeholder warnings emitted before suppression
    pub max_warn_dead_beef: usize,
    /// One-based CTP input counted for luminosity (3 = TVX)
    pub lumi_input: u32,
}

impl Default for DecoderFileConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            verbose: false,
            digits: true,
            lumi: true,
            max_warn_dead_beef: DEFAULT_MAX_WARN_DEAD_BEEF,
            lumi_input: DEFAULT_LUMI_INPUT,
        }
    }
}

/// `[emulator]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmulatorFileConfig {
    /// Timeframes to generate
    pub n_timeframes: u32,
    /// Orbits (heartbeat frames) per timeframe
    pub orbits_per_tf: u32,
    /// Orbit of the first timeframe
    pub first_orbit: u32,
    /// Mean number of triggered bunch crossings per orbit
    pub mean_triggers_per_orbit: f64,
    /// Replace every n-th timeframe with a placeholder (0 = never)
    pub dead_beef_every: u32,
    /// RNG seed; random when absent
    pub seed: Option<u64>,
}

impl Default for EmulatorFileConfig {
    fn default() -> Self {
        Self {
            n_timeframes: 100,
            orbits_per_tf: 32,
            first_orbit: 0,
            mean_triggers_per_orbit: 20.0,
            dead_beef_every: 0,
            seed: None,
        }
    }
}
