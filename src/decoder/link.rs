//! GBT link classification
//!
//! The CTP readout uses two CRU links: one carries interaction records
//! (trigger inputs), the other carries class records (fired classes).

use crate::common::{DecoderError, DecoderResult, CTP_NCLASSES, CTP_NINPUTS};

/// Link id carrying interaction records
pub const GBT_LINK_ID_INT_REC: u16 = 0;

/// Link id carrying class records
pub const GBT_LINK_ID_CLASS_REC: u16 = 1;

/// Width of the bunch-crossing id at the bottom of each payload
pub const BC_BITS: u32 = 12;

/// Interaction-record payload width (inputs + bc)
pub const N_INT_REC_PAYLOAD: u32 = CTP_NINPUTS + BC_BITS;

/// Class-record payload width (classes + bc)
pub const N_CLASS_PAYLOAD: u32 = CTP_NCLASSES + BC_BITS;

const LINK_SHIFT: u32 = 8;
const LINK_MASK: u16 = 0xf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    InteractionRecord,
    ClassRecord,
}

impl PayloadKind {
    pub const ALL: [PayloadKind; 2] = [PayloadKind::InteractionRecord, PayloadKind::ClassRecord];

    /// Total payload width in bits, bunch-crossing id included
    pub fn payload_bits(self) -> u32 {
        match self {
            Self::InteractionRecord => N_INT_REC_PAYLOAD,
            Self::ClassRecord => N_CLASS_PAYLOAD,
        }
    }

    /// Width of the mask above the bunch-crossing id
    pub fn mask_bits(self) -> u32 {
        self.payload_bits() - BC_BITS
    }

    pub fn link_id(self) -> u16 {
        match self {
            Self::InteractionRecord => GBT_LINK_ID_INT_REC,
            Self::ClassRecord => GBT_LINK_ID_CLASS_REC,
        }
    }

    /// FEE id carrying this link in bits 8..11
    pub fn fee_id(self) -> u16 {
        self.link_id() << LINK_SHIFT
    }

    /// Dense index for per-kind state arrays
    pub fn index(self) -> usize {
        match self {
            Self::InteractionRecord => 0,
            Self::ClassRecord => 1,
        }
    }
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InteractionRecord => write!(f, "IR"),
            Self::ClassRecord => write!(f, "TCR"),
        }
    }
}

/// CRU link number encoded in a FEE id
#[inline]
pub fn link_of(fee_id: u16) -> u16 {
    (fee_id >> LINK_SHIFT) & LINK_MASK
}

/// Map a frame's FEE id to the payload it carries
pub fn classify_link(fee_id: u16) -> DecoderResult<PayloadKind> {
    match link_of(fee_id) {
        GBT_LINK_ID_INT_REC => Ok(PayloadKind::InteractionRecord),
        GBT_LINK_ID_CLASS_REC => Ok(PayloadKind::ClassRecord),
        link => Err(DecoderError::UnknownLink { link, fee_id }),
    }
}
