//! Raw encoder: digits to CTP readout frames
//!
//! Inverse of the decoder path. Payloads are packed edge-to-edge into
//! 80-bit GBT words, and each word is laid into the 16-byte envelope with
//! 10 live bytes. Used by the emulator and by tests.

use crate::common::{CtpDigit, RawFrame};
use crate::decoder::gbt::{low_bits, GbtWord, GBT_LIVE_BYTES, GBT_MASK, GBT_PADDED_BYTES, NGBT};
use crate::decoder::link::{PayloadKind, BC_BITS};

/// Packs fixed-width payloads into a GBT word stream
#[derive(Debug, Clone)]
pub struct GbtPacker {
    npld: u32,
    word: GbtWord,
    size_gbt: u32,
}

impl GbtPacker {
    pub fn new(npld: u32) -> Self {
        debug_assert!(npld > 0 && npld <= NGBT);
        Self {
            npld,
            word: 0,
            size_gbt: 0,
        }
    }

    /// Append one payload, returning a GBT word whenever one fills up
    pub fn push(&mut self, payload: GbtWord) -> Option<GbtWord> {
        let payload = payload & low_bits(self.npld);
        if self.size_gbt + self.npld < NGBT {
            self.word |= payload << self.size_gbt;
            self.size_gbt += self.npld;
            None
        } else {
            let full = (self.word | (payload << self.size_gbt)) & GBT_MASK;
            self.word = payload >> (NGBT - self.size_gbt);
            self.size_gbt = self.size_gbt + self.npld - NGBT;
            Some(full)
        }
    }

    /// Flush the partially filled word, zero padded
    pub fn finish(&mut self) -> Option<GbtWord> {
        if self.size_gbt == 0 {
            return None;
        }
        let word = self.word;
        self.word = 0;
        self.size_gbt = 0;
        Some(word)
    }
}

/// Pack a sequence of payloads into GBT words
pub fn pack_diglets(payloads: &[GbtWord], npld: u32) -> Vec<GbtWord> {
    let mut packer = GbtPacker::new(npld);
    let mut words: Vec<GbtWord> = payloads.iter().filter_map(|&p| packer.push(p)).collect();
    words.extend(packer.finish());
    words
}

/// Lay GBT words into the 16-byte readout envelope
pub fn frame_payload(words: &[GbtWord]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(words.len() * GBT_PADDED_BYTES);
    for word in words {
        payload.extend_from_slice(&word.to_le_bytes()[..GBT_LIVE_BYTES]);
        payload.extend_from_slice(&[0u8; GBT_PADDED_BYTES - GBT_LIVE_BYTES]);
    }
    payload
}

/// Build the payload word of one digit for the given link
pub fn digit_payload(digit: &CtpDigit, kind: PayloadKind) -> GbtWord {
    let mask = match kind {
        PayloadKind::InteractionRecord => digit.input_mask,
        PayloadKind::ClassRecord => digit.class_mask,
    };
    ((mask as GbtWord & low_bits(kind.mask_bits())) << BC_BITS) | (digit.ir.bc as GbtWord & 0xfff)
}

/// Encode one link's frame for a single orbit
///
/// Digits whose mask for this link is empty are not transmitted.
pub fn encode_link(digits: &[CtpDigit], orbit: u32, kind: PayloadKind) -> RawFrame {
    let payloads: Vec<GbtWord> = digits
        .iter()
        .filter(|d| d.ir.orbit == orbit)
        .map(|d| digit_payload(d, kind))
        .filter(|&p| p >> BC_BITS != 0)
        .collect();
    let words = pack_diglets(&payloads, kind.payload_bits());
    RawFrame::new(kind.fee_id(), orbit, frame_payload(&words))
}

/// Encode both links for a single orbit: interaction records first
pub fn encode_orbit(digits: &[CtpDigit], orbit: u32) -> Vec<RawFrame> {
    PayloadKind::ALL
        .iter()
        .map(|&kind| encode_link(digits, orbit, kind))
        .collect()
}
