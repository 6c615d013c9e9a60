//! GBT word reassembly and payload unpacking
//!
//! The CTP front end ships 80-bit GBT words in a 16-byte envelope of which
//! only the first 10 bytes are live. Trigger payloads (interaction records
//! and class records) are packed edge-to-edge into the word stream, so a
//! payload regularly straddles two words. [`unpack_gbt_word`] undoes the
//! packing with a remainder carried in [`ReassemblyState`].

/// An 80-bit GBT word stored in the low bits of a `u128`
pub type GbtWord = u128;

/// GBT word width in bits
pub const NGBT: u32 = 80;

/// Live bytes per GBT word
pub const GBT_LIVE_BYTES: usize = 10;

/// Envelope period in bytes (live bytes plus padding)
pub const GBT_PADDED_BYTES: usize = 16;

/// Mask of all bits of a GBT word
pub const GBT_MASK: GbtWord = (1u128 << NGBT) - 1;

/// Mask with the lowest `n` bits set
#[inline]
pub fn low_bits(n: u32) -> GbtWord {
    if n == 0 {
        0
    } else if n >= 128 {
        u128::MAX
    } else {
        (1u128 << n) - 1
    }
}

/// Rebuilds GBT words from the byte stream of one frame
///
/// Slots 0..=9 of each 16-byte block are packed little-endian into the word;
/// the word is handed out when slot 9 arrives. Slots 10..=15 are padding.
#[derive(Debug, Clone, Default)]
pub struct GbtWordAssembler {
    word: GbtWord,
    word_count: usize,
}

impl GbtWordAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position within the current 16-byte block
    pub fn word_count(&self) -> usize {
        self.word_count
    }

    /// Feed one byte, returning a word when it is complete
    pub fn push_byte(&mut self, byte: u8) -> Option<GbtWord> {
        match self.word_count {
            c if c == GBT_PADDED_BYTES - 1 => {
                self.word_count = 0;
                None
            }
            c if c >= GBT_LIVE_BYTES => {
                self.word_count += 1;
                None
            }
            c => {
                self.word |= (byte as GbtWord) << (8 * c);
                self.word_count += 1;
                if c == GBT_LIVE_BYTES - 1 {
                    Some(std::mem::take(&mut self.word))
                } else {
                    None
                }
            }
        }
    }
}

/// Reassemble all complete GBT words of a frame payload
///
/// A trailing partial word is dropped.
pub fn gbt_words(payload: &[u8]) -> Vec<GbtWord> {
    let mut assembler = GbtWordAssembler::new();
    let mut words = Vec::with_capacity(payload.len() / GBT_PADDED_BYTES + 1);
    for &byte in payload {
        if let Some(word) = assembler.push_byte(byte) {
            words.push(word);
        }
    }
    words
}

/// Payload bits carried over from one GBT word to the next
///
/// `size_gbt` low bits of `remnant` are valid. After every call to
/// [`unpack_gbt_word`] `size_gbt < npld` holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblyState {
    remnant: GbtWord,
    size_gbt: u32,
}

impl ReassemblyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remnant(&self) -> GbtWord {
        self.remnant
    }

    pub fn size_gbt(&self) -> u32 {
        self.size_gbt
    }

    pub fn is_empty(&self) -> bool {
        self.size_gbt == 0
    }

    /// Drop any carried bits (used at orbit boundaries)
    pub fn reset(&mut self) {
        self.remnant = 0;
        self.size_gbt = 0;
    }
}

/// Split one GBT word into `npld`-bit diglets
///
/// The first diglet is completed from the carried remnant; every further
/// complete payload in the word is emitted; leftover high bits become the
/// new remnant. Diglets are appended to `diglets` in stream order.
pub fn unpack_gbt_word(
    word: GbtWord,
    state: &mut ReassemblyState,
    npld: u32,
    diglets: &mut Vec<GbtWord>,
) {
    debug_assert!(npld > 0 && npld <= NGBT, "payload width {npld} out of range");
    debug_assert!(state.size_gbt < npld);

    let mut word = word & GBT_MASK;
    let mut diglet = state.remnant;
    let mut consumed = 0u32;
    loop {
        let take = npld - state.size_gbt;
        if NGBT - consumed < take {
            break;
        }
        diglet |= (word & low_bits(take)) << state.size_gbt;
        diglets.push(diglet);
        diglet = 0;
        word >>= take;
        consumed += take;
        state.size_gbt = 0;
    }
    state.remnant = word;
    state.size_gbt = NGBT - consumed;
}

/// Extract the bunch-crossing id (bits 0..12) of a diglet
#[inline]
pub fn diglet_bc(diglet: GbtWord) -> u16 {
    (diglet & 0xfff) as u16
}

/// Extract the `width`-bit mask stored above the bunch-crossing id
#[inline]
pub fn diglet_mask(diglet: GbtWord, width: u32) -> u64 {
    ((diglet >> 12) & low_bits(width)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{frame_payload, pack_diglets};

    fn unpack_all(words: &[GbtWord], npld: u32) -> (Vec<GbtWord>, ReassemblyState) {
        let mut state = ReassemblyState::new();
        let mut out = Vec::new();
        for &w in words {
            unpack_gbt_word(w, &mut state, npld, &mut out);
        }
        (out, state)
    }

    #[test]
    fn test_low_bits() {
        assert_eq!(low_bits(0), 0);
        assert_eq!(low_bits(1), 1);
        assert_eq!(low_bits(12), 0xfff);
        assert_eq!(low_bits(80), GBT_MASK);
        assert_eq!(low_bits(128), u128::MAX);
    }

    #[test]
    fn test_assembler_envelope() {
        let mut payload = Vec::new();
        for block in 0..3u8 {
            for i in 0..GBT_LIVE_BYTES as u8 {
                payload.push(block * 16 + i);
            }
            // padding must be ignored whatever its content
            payload.extend_from_slice(&[0xff; GBT_PADDED_BYTES - GBT_LIVE_BYTES]);
        }
        let words = gbt_words(&payload);
        assert_eq!(words.len(), 3);
        for (block, word) in words.iter().enumerate() {
            let bytes = word.to_le_bytes();
            for i in 0..GBT_LIVE_BYTES {
                assert_eq!(bytes[i] as usize, block * 16 + i);
            }
            assert_eq!(word & !GBT_MASK, 0);
        }
    }

    #[test]
    fn test_assembler_word_count_wraps() {
        let mut asm = GbtWordAssembler::new();
        for i in 0..GBT_PADDED_BYTES {
            let out = asm.push_byte(0xaa);
            assert_eq!(out.is_some(), i == GBT_LIVE_BYTES - 1);
        }
        assert_eq!(asm.word_count(), 0);
    }

    #[test]
    fn test_assembler_drops_partial_word() {
        let words = gbt_words(&[1, 2, 3, 4, 5]);
        assert!(words.is_empty());
    }

    #[test]
    fn test_assembler_word_without_trailing_padding() {
        let words = gbt_words(&[1, 0, 0, 0, 0, 0, 0, 0, 0, 0x80]);
        assert_eq!(words, vec![1 | (0x80u128 << 72)]);
    }

    #[test]
    fn test_unpack_twelve_bit_scenario() {
        // values 1..=6 packed back to back fill 72 bits of the first word
        let mut word: GbtWord = 0;
        for (i, v) in (1..=6u128).enumerate() {
            word |= v << (12 * i);
        }
        let mut state = ReassemblyState::new();
        let mut out = Vec::new();
        unpack_gbt_word(word, &mut state, 12, &mut out);
        assert_eq!(out, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(state.size_gbt(), 8);
        assert_eq!(state.remnant(), 0);
    }

    #[test]
    fn test_unpack_carries_remnant_across_words() {
        let values: Vec<GbtWord> = (1..=20).collect();
        let words = pack_diglets(&values, 12);
        // 20 * 12 = 240 bits = exactly 3 words
        assert_eq!(words.len(), 3);
        let (out, state) = unpack_all(&words, 12);
        assert_eq!(out, values);
        assert!(state.is_empty());
    }

    #[test]
    fn test_unpack_full_remnant_is_emitted() {
        // 80 = 6 * 12 + 8: a 4-bit carry leaves exactly 12 bits after the
        // sixth diglet; they must come out immediately
        let mut state = ReassemblyState {
            remnant: 0x5,
            size_gbt: 4,
        };
        let mut out = Vec::new();
        unpack_gbt_word(GBT_MASK, &mut state, 12, &mut out);
        assert_eq!(out.len(), 7);
        assert_eq!(out[0], 0x5 | (0xff << 4));
        assert!(out[1..].iter().all(|&d| d == 0xfff));
        assert_eq!(state.size_gbt(), 0);
    }

    #[test]
    fn test_remainder_invariant_holds() {
        for npld in [12u32, 60, 76] {
            let mut state = ReassemblyState::new();
            let mut out = Vec::new();
            let mut word: GbtWord = 0x1234_5678_9abc_def0_1357;
            for _ in 0..100 {
                unpack_gbt_word(word, &mut state, npld, &mut out);
                assert!(state.size_gbt() < npld, "npld {npld}");
                assert_eq!(state.remnant() & !low_bits(state.size_gbt()), 0);
                word = (word.rotate_left(7) ^ 0x9e37) & GBT_MASK;
            }
        }
    }

    #[test]
    fn test_roundtrip_through_envelope() {
        let values: Vec<GbtWord> = (0..37u128)
            .map(|i| ((i * 0x1f3d_5b79) & low_bits(60)) | 1)
            .collect();
        let words = pack_diglets(&values, 60);
        let payload = frame_payload(&words);
        assert_eq!(payload.len(), words.len() * GBT_PADDED_BYTES);
        let (out, _) = unpack_all(&gbt_words(&payload), 60);
        assert_eq!(&out[..values.len()], &values[..]);
        assert!(out[values.len()..].iter().all(|&d| d == 0));
    }

    #[test]
    fn test_reset_clears_state() {
        let mut state = ReassemblyState::new();
        let mut out = Vec::new();
        unpack_gbt_word(GBT_MASK, &mut state, 76, &mut out);
        assert_eq!(state.size_gbt(), 4);
        state.reset();
        assert!(state.is_empty());
        assert_eq!(state.remnant(), 0);
    }

    #[test]
    fn test_diglet_fields() {
        let diglet: GbtWord = (0xabcu128 << 12) | 0x123;
        assert_eq!(diglet_bc(diglet), 0x123);
        assert_eq!(diglet_mask(diglet, 48), 0xabc);
        assert_eq!(diglet_mask(diglet, 4), 0xc);
    }
}
