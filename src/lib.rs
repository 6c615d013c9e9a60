//! ctp-decoder: raw-to-digit decoding for the Central Trigger Processor
//!
//! This crate unpacks CTP readout pages (GBT words carrying interaction and
//! class records) into per-bunch-crossing trigger digits and integrates a
//! sliding-window luminosity estimate.

pub mod common;
pub mod config;
pub mod data_source_emulator;
pub mod decoder;
pub mod encoder;
pub mod recorder;
