//! Per-timestamp digit aggregation
//!
//! Interaction records and class records for the same bunch crossing arrive
//! on different links; they are merged into one [`CtpDigit`] keyed by
//! [`InteractionRecord`]. The first non-zero value for a mask wins; later
//! writers for the same mask are rejected.

use std::collections::BTreeMap;

use super::gbt::{diglet_bc, diglet_mask, GbtWord};
use super::link::PayloadKind;
use crate::common::{CtpDigit, DecoderError, DecoderResult, InteractionRecord};

/// Outcome of feeding one diglet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Mask was zero, nothing stored
    Empty,
    /// A new digit was created
    Created,
    /// An existing digit received its missing mask
    Merged,
}

/// Digit map for one timeframe
#[derive(Debug, Default)]
pub struct DigitAggregator {
    digits: BTreeMap<InteractionRecord, CtpDigit>,
}

impl DigitAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.digits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }

    pub fn get(&self, ir: &InteractionRecord) -> Option<&CtpDigit> {
        self.digits.get(ir)
    }

    /// Merge one diglet of the given kind observed in `orbit`
    ///
    /// Returns `DuplicateTimestamp` when the mask for this timestamp is
    /// already set; the stored digit is left untouched.
    pub fn add(
        &mut self,
        diglet: GbtWord,
        kind: PayloadKind,
        orbit: u32,
    ) -> DecoderResult<AddOutcome> {
        let mask = diglet_mask(diglet, kind.mask_bits());
        if mask == 0 {
            return Ok(AddOutcome::Empty);
        }
        let ir = InteractionRecord::new(orbit, diglet_bc(diglet));

        match self.digits.get_mut(&ir) {
            None => {
                let mut digit = CtpDigit::new(ir);
                set_mask(&mut digit, kind, mask);
                self.digits.insert(ir, digit);
                Ok(AddOutcome::Created)
            }
            Some(digit) => {
                let already_set = match kind {
                    PayloadKind::InteractionRecord => digit.has_inputs(),
                    PayloadKind::ClassRecord => digit.has_classes(),
                };
                if already_set {
                    return Err(DecoderError::DuplicateTimestamp {
                        ir,
                        what: match kind {
                            PayloadKind::InteractionRecord => "IRs",
                            PayloadKind::ClassRecord => "class masks",
                        },
                    });
                }
                set_mask(digit, kind, mask);
                Ok(AddOutcome::Merged)
            }
        }
    }

    /// Drain into a vector ordered by (orbit, bc)
    pub fn into_digits(self) -> Vec<CtpDigit> {
        self.digits.into_values().collect()
    }
}

fn set_mask(digit: &mut CtpDigit, kind: PayloadKind, mask: u64) {
    match kind {
        PayloadKind::InteractionRecord => digit.set_input_mask(mask),
        PayloadKind::ClassRecord => digit.set_class_mask(mask),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diglet(mask: u64, bc: u16) -> GbtWord {
        ((mask as GbtWord) << 12) | bc as GbtWord
    }

    #[test]
    fn test_zero_mask_is_ignored() {
        let mut agg = DigitAggregator::new();
        assert_eq!(
            agg.add(diglet(0, 100), PayloadKind::InteractionRecord, 1),
            Ok(AddOutcome::Empty)
        );
        assert!(agg.is_empty());
    }

    #[test]
    fn test_zero_mask_does_not_touch_existing() {
        let mut agg = DigitAggregator::new();
        agg.add(diglet(0x3, 100), PayloadKind::InteractionRecord, 1)
            .unwrap();
        agg.add(diglet(0, 100), PayloadKind::InteractionRecord, 1)
            .unwrap();
        let d = agg.get(&InteractionRecord::new(1, 100)).unwrap();
        assert_eq!(d.input_mask, 0x3);
    }

    #[test]
    fn test_input_and_class_merge() {
        let mut agg = DigitAggregator::new();
        assert_eq!(
            agg.add(diglet(0x4, 7), PayloadKind::InteractionRecord, 10),
            Ok(AddOutcome::Created)
        );
        assert_eq!(
            agg.add(diglet(0x1, 7), PayloadKind::ClassRecord, 10),
            Ok(AddOutcome::Merged)
        );
        let digits = agg.into_digits();
        assert_eq!(digits.len(), 1);
        assert_eq!(digits[0].ir, InteractionRecord::new(10, 7));
        assert_eq!(digits[0].input_mask, 0x4);
        assert_eq!(digits[0].class_mask, 0x1);
    }

    #[test]
    fn test_first_writer_wins() {
        let mut agg = DigitAggregator::new();
        agg.add(diglet(0x1, 5), PayloadKind::InteractionRecord, 3)
            .unwrap();
        let err = agg
            .add(diglet(0x2, 5), PayloadKind::InteractionRecord, 3)
            .unwrap_err();
        assert!(matches!(err, DecoderError::DuplicateTimestamp { .. }));
        assert_eq!(agg.len(), 1);
        assert_eq!(
            agg.get(&InteractionRecord::new(3, 5)).unwrap().input_mask,
            0x1
        );
    }

    #[test]
    fn test_class_collision() {
        let mut agg = DigitAggregator::new();
        agg.add(diglet(0x10, 5), PayloadKind::ClassRecord, 3).unwrap();
        assert!(agg.add(diglet(0x20, 5), PayloadKind::ClassRecord, 3).is_err());
        assert_eq!(
            agg.get(&InteractionRecord::new(3, 5)).unwrap().class_mask,
            0x10
        );
    }

    #[test]
    fn test_same_bc_different_orbit_is_distinct() {
        let mut agg = DigitAggregator::new();
        agg.add(diglet(0x1, 5), PayloadKind::InteractionRecord, 3)
            .unwrap();
        agg.add(diglet(0x1, 5), PayloadKind::InteractionRecord, 4)
            .unwrap();
        assert_eq!(agg.len(), 2);
    }

    #[test]
    fn test_into_digits_sorted() {
        let mut agg = DigitAggregator::new();
        agg.add(diglet(0x1, 9), PayloadKind::InteractionRecord, 2)
            .unwrap();
        agg.add(diglet(0x1, 3), PayloadKind::InteractionRecord, 2)
            .unwrap();
        agg.add(diglet(0x1, 4000), PayloadKind::InteractionRecord, 1)
            .unwrap();
        let irs: Vec<_> = agg.into_digits().iter().map(|d| d.ir).collect();
        assert_eq!(
            irs,
            vec![
                InteractionRecord::new(1, 4000),
                InteractionRecord::new(2, 3),
                InteractionRecord::new(2, 9),
            ]
        );
    }

    #[test]
    fn test_class_mask_uses_full_width() {
        let mut agg = DigitAggregator::new();
        agg.add(diglet(u64::MAX, 1), PayloadKind::ClassRecord, 1)
            .unwrap();
        assert_eq!(
            agg.get(&InteractionRecord::new(1, 1)).unwrap().class_mask,
            u64::MAX
        );
    }
}
