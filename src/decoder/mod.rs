//! CTP raw decoder
//!
//! Converts the raw pages of one timeframe into trigger digits and updates
//! the sliding-window luminosity estimate.
//!
//! Per frame: the FEE id selects the link ([`link`]), the payload bytes are
//! reassembled into GBT words ([`gbt::GbtWordAssembler`]), each word is
//! unpacked into diglets ([`gbt::unpack_gbt_word`]), and diglets feed the
//! [`digits::DigitAggregator`] and the [`lumi::LumiCounter`].
//!
//! # Example
//! ```ignore
//! let mut decoder = RawDecoder::new(DecoderConfig::default())?;
//! let output = decoder.run(&timeframe);
//! ```

pub mod digits;
pub mod dummy;
pub mod gbt;
pub mod link;
pub mod lumi;

pub use digits::{AddOutcome, DigitAggregator};
pub use dummy::DummyIntervalGuard;
pub use gbt::{GbtWord, GbtWordAssembler, ReassemblyState, NGBT};
pub use link::{classify_link, PayloadKind};
pub use lumi::{LumiCounter, LumiSample, LumiWindow};

use tracing::{debug, error, info};

use crate::common::{CtpDigit, DecoderError, DecoderResult, DecoderStats, LumiInfo, Timeframe};

/// Decoder configuration
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Produce the digit list
    pub do_digits: bool,
    /// Produce the luminosity record
    pub do_lumi: bool,
    /// Number of timeframes averaged for luminosity
    pub window_size: usize,
    /// Log a luminosity summary every timeframe
    pub verbose: bool,
    /// Consecutive placeholder timeframes reported before going quiet
    pub max_warn_dead_beef: usize,
    /// One-based CTP input counted for luminosity
    pub lumi_input: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            do_digits: true,
            do_lumi: true,
            window_size: lumi::DEFAULT_WINDOW_SIZE,
            verbose: false,
            max_warn_dead_beef: dummy::DEFAULT_MAX_WARN_DEAD_BEEF,
            lumi_input: lumi::DEFAULT_LUMI_INPUT,
        }
    }
}

impl DecoderConfig {
    /// Check that the configuration can produce something useful
    pub fn validate(&self) -> DecoderResult<()> {
        if !self.do_digits && !self.do_lumi {
            return Err(DecoderError::NoOutputs);
        }
        if self.window_size == 0 {
            return Err(DecoderError::config("window_size must be at least 1"));
        }
        if !(1..=crate::common::CTP_NINPUTS).contains(&self.lumi_input) {
            return Err(DecoderError::config(format!(
                "lumi_input {} outside 1..={}",
                self.lumi_input,
                crate::common::CTP_NINPUTS
            )));
        }
        Ok(())
    }

    /// Build from the file configuration
    pub fn from_config(config: &crate::config::Config) -> Self {
        let d = &config.decoder;
        Self {
            do_digits: d.digits,
            do_lumi: d.lumi,
            window_size: d.window_size,
            verbose: d.verbose,
            max_warn_dead_beef: d.max_warn_dead_beef,
            lumi_input: d.lumi_input,
        }
    }
}

/// Outputs of one timeframe; `None` for disabled outputs
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderOutput {
    pub tf_counter: u32,
    pub digits: Option<Vec<CtpDigit>>,
    pub lumi: Option<LumiInfo>,
}

/// Long-lived decoder
///
/// Owns the state that survives between timeframes: one reassembly state per
/// link, the luminosity window, the placeholder streak and statistics.
/// Timeframes must be fed in order; one instance per independent stream.
#[derive(Debug)]
pub struct RawDecoder {
    config: DecoderConfig,
    reassembly: [ReassemblyState; 2],
    last_orbit: Option<u32>,
    window: LumiWindow,
    guard: DummyIntervalGuard,
    stats: DecoderStats,
}

impl RawDecoder {
    /// Create a decoder; fails when no output is requested
    pub fn new(config: DecoderConfig) -> DecoderResult<Self> {
        config.validate()?;
        info!(
            digits = config.do_digits,
            lumi = config.do_lumi,
            window_size = config.window_size,
            lumi_input = config.lumi_input,
            "CTP raw decoder configured"
        );
        Ok(Self {
            window: LumiWindow::new(config.window_size),
            guard: DummyIntervalGuard::new(config.max_warn_dead_beef),
            config,
            reassembly: [ReassemblyState::new(); 2],
            last_orbit: None,
            stats: DecoderStats::default(),
        })
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn stats(&self) -> &DecoderStats {
        &self.stats
    }

    pub fn lumi_window(&self) -> &LumiWindow {
        &self.window
    }

    pub fn reassembly_state(&self, kind: PayloadKind) -> &ReassemblyState {
        &self.reassembly[kind.index()]
    }

    /// Consecutive placeholder timeframes seen so far
    pub fn dummy_streak(&self) -> usize {
        self.guard.streak()
    }

    /// Decode one timeframe
    pub fn run(&mut self, tf: &Timeframe) -> DecoderOutput {
        self.stats.timeframes += 1;

        if self.guard.check(tf) {
            self.stats.dummy_timeframes += 1;
            return self.placeholder_output(tf.tf_counter);
        }

        let do_digits = self.config.do_digits;
        let do_lumi = self.config.do_lumi;
        let mut digits = DigitAggregator::new();
        let mut counter = LumiCounter::new(self.config.lumi_input);
        let mut tf_last_orbit: Option<u32> = None;
        let mut diglets: Vec<GbtWord> = Vec::new();

        for frame in &tf.frames {
            let kind = match classify_link(frame.fee_id) {
                Ok(kind) => kind,
                Err(e) => {
                    error!(error = %e, orbit = frame.orbit, "Skipping frame");
                    self.stats.frames_skipped += 1;
                    continue;
                }
            };
            if kind == PayloadKind::ClassRecord && !do_digits {
                continue;
            }
            debug!(
                fee_id = frame.fee_id,
                link = kind.link_id(),
                orbit = frame.orbit,
                bytes = frame.payload.len(),
                "RDH"
            );

            // payloads never straddle an orbit boundary
            if self.last_orbit != Some(frame.orbit) {
                for state in self.reassembly.iter_mut() {
                    state.reset();
                }
                self.last_orbit = Some(frame.orbit);
            }
            tf_last_orbit = Some(frame.orbit);

            let count_lumi = do_lumi && kind == PayloadKind::InteractionRecord;
            if count_lumi {
                counter.observe_orbit(frame.orbit);
            }

            self.stats.frames += 1;
            self.stats.bytes += frame.payload.len() as u64;

            let npld = kind.payload_bits();
            let mut assembler = GbtWordAssembler::new();
            for &byte in &frame.payload {
                let Some(word) = assembler.push_byte(byte) else {
                    continue;
                };
                self.stats.gbt_words += 1;
                diglets.clear();
                gbt::unpack_gbt_word(word, &mut self.reassembly[kind.index()], npld, &mut diglets);
                self.stats.diglets += diglets.len() as u64;

                for &diglet in &diglets {
                    if count_lumi {
                        counter.count(diglet);
                    }
                    if !do_digits {
                        continue;
                    }
                    if let Err(e) = digits.add(diglet, kind, frame.orbit) {
                        error!(error = %e, "Dropping conflicting payload");
                        self.stats.collisions += 1;
                    }
                }
            }
        }

        let digits = do_digits.then(|| {
            let digits = digits.into_digits();
            debug!(n_digits = digits.len(), "Writing digits");
            self.stats.digits += digits.len() as u64;
            digits
        });

        let lumi = do_lumi.then(|| {
            let samples = counter.finish(tf_last_orbit.unwrap_or(0));
            let info = self.window.push(&samples);
            if self.config.verbose {
                info!(
                    "Orbit {}: {} counts in {} HBFs -> lumi = {:.3e}+-{:.3e}",
                    info.orbit,
                    info.counts,
                    info.n_hbf_counted,
                    info.lumi(),
                    info.lumi_error()
                );
            }
            info
        });

        DecoderOutput {
            tf_counter: tf.tf_counter,
            digits,
            lumi,
        }
    }

    /// Empty digits and the unchanged luminosity record
    fn placeholder_output(&self, tf_counter: u32) -> DecoderOutput {
        DecoderOutput {
            tf_counter,
            digits: self.config.do_digits.then(Vec::new),
            lumi: self.config.do_lumi.then(|| self.window.info()),
        }
    }
}
