//! Common data types shared across components
//!
//! This module defines the raw input containers delivered by the readout
//! (frames grouped into timeframes) and the trigger records produced by
//! the decoder.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub mod cli;
pub mod error;
pub mod metrics;

pub use error::{DecoderError, DecoderResult};
pub use metrics::DecoderStats;

/// LHC machine constants used for luminosity normalisation
pub mod lhc {
    /// RF frequency in Hz
    pub const RF_FREQ_HZ: f64 = 400.789e6;
    /// Number of bunch slots per orbit
    pub const MAX_BUNCHES: u16 = 3564;
    /// Bunch spacing is 10 RF buckets
    pub const BUNCH_SPACING_NS: f64 = 10.0 / RF_FREQ_HZ * 1e9;
    /// Orbit duration in microseconds
    pub const ORBIT_US: f64 = MAX_BUNCHES as f64 * BUNCH_SPACING_NS * 1e-3;
}

/// Number of CTP trigger inputs carried in an interaction record
pub const CTP_NINPUTS: u32 = 48;

/// Number of CTP trigger classes carried in a class record
pub const CTP_NCLASSES: u32 = 64;

/// Subspecification tag of the "no data in this timeframe" placeholder input
pub const DEAD_BEEF_SUBSPEC: u32 = 0xDEAD_BEEF;

/// Timestamp of a bunch crossing: orbit counter plus 12-bit bunch-crossing id
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub orbit: u32,
    pub bc: u16,
}

impl InteractionRecord {
    pub fn new(orbit: u32, bc: u16) -> Self {
        Self { orbit, bc }
    }
}

impl Ord for InteractionRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.orbit, self.bc).cmp(&(other.orbit, other.bc))
    }
}

impl PartialOrd for InteractionRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for InteractionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.orbit, self.bc)
    }
}

/// Per-bunch-crossing trigger record
///
/// A mask counts as set once it is non-zero. Zero-valued payloads are never
/// stored, so an unset mask and an empty mask are the same thing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CtpDigit {
    pub ir: InteractionRecord,
    /// Trigger inputs, lower `CTP_NINPUTS` bits used
    pub input_mask: u64,
    /// Fired trigger classes
    pub class_mask: u64,
}

impl CtpDigit {
    pub fn new(ir: InteractionRecord) -> Self {
        Self {
            ir,
            ..Default::default()
        }
    }

    pub fn has_inputs(&self) -> bool {
        self.input_mask != 0
    }

    pub fn has_classes(&self) -> bool {
        self.class_mask != 0
    }

    pub fn set_input_mask(&mut self, mask: u64) {
        self.input_mask = mask & ((1u64 << CTP_NINPUTS) - 1);
    }

    pub fn set_class_mask(&mut self, mask: u64) {
        self.class_mask = mask;
    }
}

impl std::fmt::Display for CtpDigit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "IR:{:>10}/{:<4} inputs:0x{:012x} classes:0x{:016x}",
            self.ir.orbit, self.ir.bc, self.input_mask, self.class_mask
        )
    }
}

/// Luminosity estimate accumulated over the integration window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LumiInfo {
    /// Orbit of the first readout interval contributing to the last update
    pub orbit: u32,
    /// Reserved secondary counter, always 0 for this detector
    pub secondary_count: u32,
    /// Trigger counts summed over the window
    pub counts: u64,
    /// Number of heartbeat frames (orbits) integrated
    pub n_hbf_counted: u32,
}

impl LumiInfo {
    fn integration_time_s(&self) -> f64 {
        self.n_hbf_counted as f64 * lhc::ORBIT_US * 1e-6
    }

    /// Trigger rate in Hz, 0 when nothing has been integrated
    pub fn lumi(&self) -> f64 {
        if self.n_hbf_counted == 0 {
            return 0.0;
        }
        self.counts as f64 / self.integration_time_s()
    }

    /// Poisson error on [`lumi`](Self::lumi)
    pub fn lumi_error(&self) -> f64 {
        if self.n_hbf_counted == 0 {
            return 0.0;
        }
        (self.counts as f64).sqrt() / self.integration_time_s()
    }

    pub fn to_record(&self) -> LumiRecord {
        LumiRecord {
            orbit: self.orbit,
            secondary_count: self.secondary_count,
            counts: self.counts,
            n_hbf_counted: self.n_hbf_counted,
            rate_hz: self.lumi(),
            rate_error_hz: self.lumi_error(),
        }
    }
}

/// Flat luminosity record with derived rate, as written to output files
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LumiRecord {
    pub orbit: u32,
    pub secondary_count: u32,
    pub counts: u64,
    pub n_hbf_counted: u32,
    pub rate_hz: f64,
    pub rate_error_hz: f64,
}

/// One readout page as delivered by the frame parser
///
/// The payload is already stripped of the page header; it still carries the
/// 16-byte envelope in which only the first 10 bytes hold GBT word bits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFrame {
    /// Data subspecification of the input this frame arrived on
    pub subspec: u32,
    /// Front-end equipment id; bits 8..11 select the GBT link
    pub fee_id: u16,
    /// Trigger orbit from the page header
    pub orbit: u32,
    pub payload: Vec<u8>,
}

impl RawFrame {
    pub fn new(fee_id: u16, orbit: u32, payload: Vec<u8>) -> Self {
        Self {
            subspec: 0,
            fee_id,
            orbit,
            payload,
        }
    }

    /// Zero-length placeholder emitted upstream when a timeframe has no data
    pub fn dead_beef() -> Self {
        Self {
            subspec: DEAD_BEEF_SUBSPEC,
            fee_id: 0,
            orbit: 0,
            payload: Vec::new(),
        }
    }

    pub fn is_dead_beef(&self) -> bool {
        self.subspec == DEAD_BEEF_SUBSPEC
    }
}

/// Ordered frames of one readout interval (timeframe)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeframe {
    /// Monotonic timeframe counter
    pub tf_counter: u32,
    /// First orbit covered by this timeframe
    pub first_orbit: u32,
    pub frames: Vec<RawFrame>,
}

impl Timeframe {
    pub fn new(tf_counter: u32, first_orbit: u32) -> Self {
        Self {
            tf_counter,
            first_orbit,
            frames: Vec::new(),
        }
    }

    pub fn push(&mut self, frame: RawFrame) {
        self.frames.push(frame);
    }

    pub fn payload_bytes(&self) -> usize {
        self.frames.iter().map(|f| f.payload.len()).sum()
    }

    /// Serialize to MessagePack
    pub fn to_msgpack(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    /// Deserialize from MessagePack
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}
