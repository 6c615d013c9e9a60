//! Luminosity integration
//!
//! [`LumiCounter`] counts trigger-of-interest hits per orbit within one
//! timeframe. [`LumiWindow`] keeps the per-timeframe totals of the last
//! `window_size` timeframes and produces the running [`LumiInfo`].

use std::collections::VecDeque;

use super::gbt::GbtWord;
use super::link::BC_BITS;
use crate::common::{LumiInfo, CTP_NINPUTS};

/// Default number of timeframes averaged
pub const DEFAULT_WINDOW_SIZE: usize = 90;

/// Default trigger-of-interest input (one-based): TVX
pub const DEFAULT_LUMI_INPUT: u32 = 3;

/// Counts of one orbit (heartbeat frame)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LumiSample {
    pub orbit: u32,
    /// Reserved secondary counter, always 0
    pub secondary_count: u32,
    pub counts: u64,
}

impl LumiSample {
    pub fn new(orbit: u32, counts: u64) -> Self {
        Self {
            orbit,
            secondary_count: 0,
            counts,
        }
    }
}

/// Per-orbit counter of trigger-of-interest diglets within one timeframe
#[derive(Debug, Clone)]
pub struct LumiCounter {
    mask: GbtWord,
    orbit: Option<u32>,
    counts: u64,
    samples: Vec<LumiSample>,
}

impl LumiCounter {
    /// `input` is the one-based CTP input number to count
    pub fn new(input: u32) -> Self {
        debug_assert!((1..=CTP_NINPUTS).contains(&input));
        Self {
            mask: 1 << (BC_BITS + input - 1),
            orbit: None,
            counts: 0,
            samples: Vec::new(),
        }
    }

    /// Diglet mask selecting the trigger of interest
    pub fn mask(&self) -> GbtWord {
        self.mask
    }

    /// Note the orbit of an interaction-record frame; an orbit change flushes
    /// the counts of the previous orbit into a sample
    pub fn observe_orbit(&mut self, orbit: u32) {
        match self.orbit {
            Some(prev) if prev != orbit => {
                self.samples.push(LumiSample::new(prev, self.counts));
                self.counts = 0;
                self.orbit = Some(orbit);
            }
            Some(_) => {}
            None => self.orbit = Some(orbit),
        }
    }

    /// Count a diglet if it carries the trigger of interest
    pub fn count(&mut self, diglet: GbtWord) {
        if diglet & self.mask != 0 {
            self.counts += 1;
        }
    }

    /// Counts accumulated for the current orbit so far
    pub fn pending(&self) -> u64 {
        self.counts
    }

    /// Close the timeframe: flush the last orbit unconditionally and return
    /// all samples. `fallback_orbit` is used when no interaction-record frame
    /// was seen.
    pub fn finish(&mut self, fallback_orbit: u32) -> Vec<LumiSample> {
        let orbit = self.orbit.take().unwrap_or(fallback_orbit);
        self.samples.push(LumiSample::new(orbit, self.counts));
        self.counts = 0;
        std::mem::take(&mut self.samples)
    }
}

/// Sliding window over per-timeframe trigger counts
///
/// The integrated heartbeat-frame count grows only while the window fills;
/// once full, every push evicts the oldest total and the frame count stays
/// fixed. The emitted orbit is only refreshed while that count is non-zero.
#[derive(Debug, Clone)]
pub struct LumiWindow {
    window_size: usize,
    history: VecDeque<u64>,
    counts: u64,
    n_hbf_integrated: u32,
    info: LumiInfo,
}

impl LumiWindow {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size,
            history: VecDeque::with_capacity(window_size + 1),
            counts: 0,
            n_hbf_integrated: 0,
            info: LumiInfo::default(),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Running sum of all totals in the window
    pub fn sum(&self) -> u64 {
        self.counts
    }

    pub fn n_hbf_integrated(&self) -> u32 {
        self.n_hbf_integrated
    }

    /// Per-timeframe totals, oldest first
    pub fn history(&self) -> impl Iterator<Item = &u64> {
        self.history.iter()
    }

    /// Last emitted luminosity record
    pub fn info(&self) -> LumiInfo {
        self.info
    }

    /// Add one timeframe's samples and return the updated record
    pub fn push(&mut self, samples: &[LumiSample]) -> LumiInfo {
        let tf_counts: u64 = samples.iter().map(|s| s.counts).sum();
        self.history.push_back(tf_counts);
        self.counts += tf_counts;
        if self.history.len() <= self.window_size {
            self.n_hbf_integrated += samples.len() as u32;
        } else if let Some(oldest) = self.history.pop_front() {
            self.counts -= oldest;
        }

        if self.n_hbf_integrated != 0 {
            if let Some(first) = samples.first() {
                self.info.orbit = first.orbit;
            }
        }
        self.info.counts = self.counts;
        self.info.n_hbf_counted = self.n_hbf_integrated;
        self.info
    }
}

impl Default for LumiWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}
