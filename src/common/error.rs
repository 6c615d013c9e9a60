//! Error types for the CTP decoder
//!
//! Only configuration errors are fatal. Link and timestamp errors are
//! reported per frame and the decoder carries on with the next one.

use thiserror::Error;

use super::InteractionRecord;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecoderError {
    /// GBT link id is neither the interaction-record nor the class-record link
    #[error("Unexpected CTP CRU link {link} (FEE id 0x{fee_id:04x})")]
    UnknownLink { link: u16, fee_id: u16 },

    /// A mask was already set for this bunch crossing
    #[error("Two CTP {what} for the same timestamp {ir}")]
    DuplicateTimestamp {
        ir: InteractionRecord,
        what: &'static str,
    },

    /// Both digit and luminosity outputs are disabled
    #[error("All outputs were disabled")]
    NoOutputs,

    /// Configuration value out of range
    #[error("Configuration error: {0}")]
    InvalidConfig(String),
}

impl DecoderError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

pub type DecoderResult<T> = Result<T, DecoderError>;
