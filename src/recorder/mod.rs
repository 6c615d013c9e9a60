//! Recorder - raw timeframe files and decoded output streams
//!
//! Raw input is stored in timeframe files (see [`format`]):
//! - Header: Magic "CTPRAW01" + length (4 bytes) + MsgPack metadata
//! - Timeframe blocks: length (4 bytes LE) + MsgPack timeframe (repeated)
//! - Footer: Fixed 40 bytes with magic "CTPEND01", checksum, completion flag
//!
//! Decoded output is written as JSON lines, one [`OutputRecord`] per line.
//!
//! File naming: run{XXXX}_{YYYY}.ctpraw
//!   - XXXX: Run number (4 digits, zero-padded)
//!   - YYYY: File sequence within run (4 digits)

mod format;

pub use format::{
    ChecksumCalculator, FileFooter, FileFormatError, FileHeader, TimeframeFileReader,
    TimeframeFileWriter, TimeframeIter, FILE_MAGIC, FOOTER_SIZE, FORMAT_VERSION,
};

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::common::{CtpDigit, LumiRecord};
use crate::decoder::DecoderOutput;

/// File extension for raw timeframe files
pub const RAW_FILE_EXTENSION: &str = "ctpraw";

/// Recorder errors
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("File format error: {0}")]
    Format(#[from] FileFormatError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw file name for a run and sequence number
pub fn raw_file_name(dir: &Path, run_number: u32, sequence: u32) -> PathBuf {
    dir.join(format!(
        "run{:04}_{:04}.{}",
        run_number, sequence, RAW_FILE_EXTENSION
    ))
}

/// Create a raw timeframe file and write its header
pub fn create_raw_file(
    path: &Path,
    header: &FileHeader,
) -> Result<TimeframeFileWriter<BufWriter<File>>, RecorderError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    debug!(path = %path.display(), run = header.run_number, "Opened raw file");
    Ok(TimeframeFileWriter::new(BufWriter::new(file), header)?)
}

/// Open a raw timeframe file for reading
pub fn open_raw_file(path: &Path) -> Result<TimeframeFileReader<BufReader<File>>, RecorderError> {
    let file = File::open(path)?;
    Ok(TimeframeFileReader::new(BufReader::new(file))?)
}

/// One line of decoded output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputRecord {
    Digits {
        tf_counter: u32,
        digits: Vec<CtpDigit>,
    },
    Lumi {
        tf_counter: u32,
        #[serde(flatten)]
        lumi: LumiRecord,
    },
}

impl OutputRecord {
    /// Records for one decoder output: digits first, then luminosity
    pub fn from_output(output: &DecoderOutput) -> Vec<OutputRecord> {
        let mut records = Vec::with_capacity(2);
        if let Some(digits) = &output.digits {
            records.push(OutputRecord::Digits {
                tf_counter: output.tf_counter,
                digits: digits.clone(),
            });
        }
        if let Some(lumi) = &output.lumi {
            records.push(OutputRecord::Lumi {
                tf_counter: output.tf_counter,
                lumi: lumi.to_record(),
            });
        }
        records
    }
}

/// Writes decoder outputs as JSON lines
pub struct OutputWriter<W: Write> {
    writer: W,
    records: u64,
}

impl<W: Write> OutputWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, records: 0 }
    }

    pub fn write_record(&mut self, record: &OutputRecord) -> Result<(), RecorderError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.records += 1;
        Ok(())
    }

    pub fn write_output(&mut self, output: &DecoderOutput) -> Result<(), RecorderError> {
        for record in OutputRecord::from_output(output) {
            self.write_record(&record)?;
        }
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.records
    }

    pub fn finish(mut self) -> Result<W, RecorderError> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}
