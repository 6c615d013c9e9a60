//! Decoder statistics
//!
//! Plain counters: the decoder runs single-threaded and owns its stats, so
//! no atomics are needed. A snapshot is a copy of the struct.

use serde::Serialize;

/// Running totals over the decoder lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecoderStats {
    /// Timeframes passed to `run`
    pub timeframes: u64,
    /// Timeframes short-circuited by the dead-beef placeholder
    pub dummy_timeframes: u64,
    /// Frames decoded
    pub frames: u64,
    /// Frames dropped because of an unknown link
    pub frames_skipped: u64,
    /// Payload bytes consumed
    pub bytes: u64,
    /// Complete GBT words reassembled
    pub gbt_words: u64,
    /// Diglets unpacked from GBT words
    pub diglets: u64,
    /// Digits emitted
    pub digits: u64,
    /// Conflicting writes dropped by the aggregator
    pub collisions: u64,
}

impl DecoderStats {
    /// Total recovered per-frame errors
    pub fn errors(&self) -> u64 {
        self.frames_skipped + self.collisions
    }

    /// Counts accumulated since an earlier snapshot
    pub fn since(&self, prev: &DecoderStats) -> DecoderStats {
        DecoderStats {
            timeframes: self.timeframes.saturating_sub(prev.timeframes),
            dummy_timeframes: self.dummy_timeframes.saturating_sub(prev.dummy_timeframes),
            frames: self.frames.saturating_sub(prev.frames),
            frames_skipped: self.frames_skipped.saturating_sub(prev.frames_skipped),
            bytes: self.bytes.saturating_sub(prev.bytes),
            gbt_words: self.gbt_words.saturating_sub(prev.gbt_words),
            diglets: self.diglets.saturating_sub(prev.diglets),
            digits: self.digits.saturating_sub(prev.digits),
            collisions: self.collisions.saturating_sub(prev.collisions),
        }
    }
}
