//! Emulator data source - generates CTP raw timeframes for testing
//!
//! Each orbit gets a Poisson-distributed number of triggered bunch crossings
//! at distinct BCs. Every triggered crossing carries a few random inputs and,
//! most of the time, some fired classes. Digits are encoded with
//! [`crate::encoder::encode_orbit`], so the generated truth can be compared
//! with what the decoder reconstructs.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Poisson};
use thiserror::Error;
use tracing::{debug, info};

use crate::common::lhc::MAX_BUNCHES;
use crate::common::{CtpDigit, InteractionRecord, RawFrame, Timeframe, CTP_NCLASSES, CTP_NINPUTS};
use crate::config::Config;
use crate::encoder::encode_orbit;

/// Emulator configuration
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    pub n_timeframes: u32,
    pub orbits_per_tf: u32,
    pub first_orbit: u32,
    /// Mean number of triggered bunch crossings per orbit
    pub mean_triggers_per_orbit: f64,
    /// Replace every n-th timeframe with a placeholder (0 = never)
    pub dead_beef_every: u32,
    pub seed: Option<u64>,
    /// One-based input fired on a fraction of the crossings
    pub lumi_input: u32,
    /// Probability that a crossing fires `lumi_input`
    pub lumi_fraction: f64,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            n_timeframes: 100,
            orbits_per_tf: 32,
            first_orbit: 0,
            mean_triggers_per_orbit: 20.0,
            dead_beef_every: 0,
            seed: None,
            lumi_input: crate::decoder::lumi::DEFAULT_LUMI_INPUT,
            lumi_fraction: 0.5,
        }
    }
}

impl EmulatorConfig {
    pub fn from_config(config: &Config) -> Self {
        let e = &config.emulator;
        Self {
            n_timeframes: e.n_timeframes,
            orbits_per_tf: e.orbits_per_tf,
            first_orbit: e.first_orbit,
            mean_triggers_per_orbit: e.mean_triggers_per_orbit,
            dead_beef_every: e.dead_beef_every,
            seed: e.seed,
            lumi_input: config.decoder.lumi_input,
            ..Default::default()
        }
    }
}

/// Emulator errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmulatorError {
    #[error("Invalid trigger rate {0}: must be finite and not negative")]
    InvalidRate(f64),

    #[error("orbits_per_tf must be at least 1")]
    NoOrbits,

    #[error("lumi_input {0} outside 1..=48")]
    InvalidInput(u32),
}

/// One generated timeframe together with the digits it encodes
#[derive(Debug, Clone)]
pub struct GeneratedTimeframe {
    pub timeframe: Timeframe,
    /// Truth digits, empty for placeholder timeframes
    pub digits: Vec<CtpDigit>,
    pub is_placeholder: bool,
}

impl GeneratedTimeframe {
    /// Crossings in this timeframe that fired the given one-based input
    pub fn count_input(&self, input: u32) -> u64 {
        let bit = 1u64 << (input - 1);
        self.digits
            .iter()
            .filter(|d| d.input_mask & bit != 0)
            .count() as u64
    }
}

/// Generates raw CTP timeframes
pub struct TimeframeEmulator {
    config: EmulatorConfig,
    rng: StdRng,
    poisson: Option<Poisson<f64>>,
    tf_counter: u32,
    next_orbit: u32,
}

impl TimeframeEmulator {
    pub fn new(config: EmulatorConfig) -> Result<Self, EmulatorError> {
        let rate = config.mean_triggers_per_orbit;
        if !rate.is_finite() || rate < 0.0 {
            return Err(EmulatorError::InvalidRate(rate));
        }
        if config.orbits_per_tf == 0 {
            return Err(EmulatorError::NoOrbits);
        }
        if !(1..=CTP_NINPUTS).contains(&config.lumi_input) {
            return Err(EmulatorError::InvalidInput(config.lumi_input));
        }
        let poisson = if rate > 0.0 {
            Some(Poisson::new(rate).map_err(|_| EmulatorError::InvalidRate(rate))?)
        } else {
            None
        };
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        info!(
            seed = ?config.seed,
            rate,
            orbits_per_tf = config.orbits_per_tf,
            "Emulator created"
        );
        Ok(Self {
            next_orbit: config.first_orbit,
            config,
            rng,
            poisson,
            tf_counter: 0,
        })
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    /// Timeframes generated so far
    pub fn tf_counter(&self) -> u32 {
        self.tf_counter
    }

    /// Generate the next timeframe
    pub fn next_timeframe(&mut self) -> GeneratedTimeframe {
        let tf_counter = self.tf_counter;
        let first_orbit = self.next_orbit;
        self.tf_counter += 1;
        self.next_orbit = first_orbit.wrapping_add(self.config.orbits_per_tf);

        let every = self.config.dead_beef_every;
        if every > 0 && (tf_counter + 1) % every == 0 {
            debug!(tf_counter, "Emitting placeholder timeframe");
            let mut timeframe = Timeframe::new(tf_counter, first_orbit);
            timeframe.push(RawFrame::dead_beef());
            return GeneratedTimeframe {
                timeframe,
                digits: Vec::new(),
                is_placeholder: true,
            };
        }

        let mut timeframe = Timeframe::new(tf_counter, first_orbit);
        let mut digits = Vec::new();
        for i in 0..self.config.orbits_per_tf {
            let orbit = first_orbit.wrapping_add(i);
            let orbit_digits = self.generate_orbit(orbit);
            for frame in encode_orbit(&orbit_digits, orbit) {
                timeframe.push(frame);
            }
            digits.extend(orbit_digits);
        }
        debug!(
            tf_counter,
            first_orbit,
            n_digits = digits.len(),
            bytes = timeframe.payload_bytes(),
            "Generated timeframe"
        );
        GeneratedTimeframe {
            timeframe,
            digits,
            is_placeholder: false,
        }
    }

    /// Generate the configured number of timeframes
    pub fn generate_all(&mut self) -> Vec<GeneratedTimeframe> {
        (0..self.config.n_timeframes)
            .map(|_| self.next_timeframe())
            .collect()
    }

    /// Random digits of one orbit, sorted by BC
    fn generate_orbit(&mut self, orbit: u32) -> Vec<CtpDigit> {
        let n = match &self.poisson {
            Some(poisson) => poisson.sample(&mut self.rng) as usize,
            None => 0,
        };
        let n = n.min(MAX_BUNCHES as usize);
        let mut bcs = index::sample(&mut self.rng, MAX_BUNCHES as usize, n).into_vec();
        bcs.sort_unstable();

        let lumi_bit = 1u64 << (self.config.lumi_input - 1);
        bcs.into_iter()
            .map(|bc| {
                let mut digit = CtpDigit::new(InteractionRecord::new(orbit, bc as u16));
                let mut inputs = 1u64 << self.rng.gen_range(0..CTP_NINPUTS);
                if self.rng.gen_bool(self.config.lumi_fraction) {
                    inputs |= lumi_bit;
                }
                if self.rng.gen_bool(0.3) {
                    inputs |= 1u64 << self.rng.gen_range(0..CTP_NINPUTS);
                }
                digit.set_input_mask(inputs);

                // most crossings fire at least one class
                if self.rng.gen_bool(0.9) {
                    let mut classes = 1u64 << self.rng.gen_range(0..CTP_NCLASSES);
                    if self.rng.gen_bool(0.2) {
                        classes |= 1u64 << self.rng.gen_range(0..CTP_NCLASSES);
                    }
                    digit.set_class_mask(classes);
                }
                digit
            })
            .collect()
    }
}
