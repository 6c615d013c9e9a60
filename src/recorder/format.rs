//! File format for recorded CTP raw timeframes
//!
//! File structure:
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Header (length-prefixed MsgPack)        │
//! │  - Magic, Version, Metadata             │
//! ├─────────────────────────────────────────┤
//! │  Timeframe 1                            │
//! │  - Length prefix (u32 LE)               │
//! │  - MsgPack serialized Timeframe         │
//! ├─────────────────────────────────────────┤
//! │  ...                                    │
//! ├─────────────────────────────────────────┤
//! │  Footer (fixed 40 bytes)                │
//! │  - Magic, checksum, completion flag     │
//! └─────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};
use xxhash_rust::xxh64::xxh64;

use crate::common::Timeframe;

/// Magic bytes for CTP raw files
pub const FILE_MAGIC: [u8; 8] = *b"CTPRAW01";

/// Current file format version
pub const FORMAT_VERSION: u32 = 1;

/// Footer magic bytes (different from header to detect truncation)
pub const FOOTER_MAGIC: [u8; 8] = *b"CTPEND01";

/// Fixed footer size in bytes
pub const FOOTER_SIZE: usize = 40;

/// Upper bound on a single timeframe block
const MAX_BLOCK_SIZE: usize = 256 * 1024 * 1024;

/// Upper bound on the serialized header
const MAX_HEADER_SIZE: usize = 1024 * 1024;

/// Timeframes preallocated by `read_all`; the footer count is not trusted
const PREALLOC_TIMEFRAMES: u64 = 1024;

/// File format errors
#[derive(Debug, thiserror::Error)]
pub enum FileFormatError {
    #[error("Data too short to contain valid structure")]
    TooShort,

    #[error("Invalid file magic bytes")]
    InvalidMagic,

    #[error("Invalid footer magic bytes")]
    InvalidFooterMagic,

    #[error("Invalid block length {0}")]
    InvalidBlockLength(usize),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checksum mismatch: expected {expected:016x}, got {actual:016x}")]
    ChecksumMismatch { expected: u64, actual: u64 },

    #[error("Incomplete file (footer indicates crash during write)")]
    IncompleteFile,
}

/// File header describing the recorded run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHeader {
    pub version: u32,
    pub run_number: u32,
    /// File creation time (Unix timestamp in nanoseconds)
    pub file_start_time_ns: u64,
    /// Orbits per timeframe used by the producer
    pub orbits_per_tf: u32,
    pub comment: String,
    /// Additional key-value metadata
    pub metadata: HashMap<String, String>,
}

impl FileHeader {
    pub fn new(run_number: u32, orbits_per_tf: u32) -> Self {
        Self {
            version: FORMAT_VERSION,
            run_number,
            file_start_time_ns: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as u64,
            orbits_per_tf,
            comment: String::new(),
            metadata: HashMap::new(),
        }
    }

    /// Serialize header to bytes (with magic prefix)
    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        let mut buf = Vec::with_capacity(128);
        buf.extend_from_slice(&FILE_MAGIC);
        let header_bytes = rmp_serde::to_vec(self)?;
        buf.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(&header_bytes);
        Ok(buf)
    }

    /// Read header from a reader
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, FileFormatError> {
        Self::read_limited(reader, MAX_HEADER_SIZE)
    }

    /// Read header, rejecting a length prefix above `max_len`
    fn read_limited<R: Read>(reader: &mut R, max_len: usize) -> Result<Self, FileFormatError> {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if magic != FILE_MAGIC {
            return Err(FileFormatError::InvalidMagic);
        }

        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        if len > max_len.min(MAX_HEADER_SIZE) {
            return Err(FileFormatError::InvalidBlockLength(len));
        }

        let mut data = vec![0u8; len];
        reader.read_exact(&mut data)?;
        rmp_serde::from_slice(&data).map_err(FileFormatError::Deserialization)
    }
}

/// Fixed-size file footer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFooter {
    /// Combined xxHash64 of all timeframe blocks
    pub data_checksum: u64,
    /// Number of timeframes written
    pub n_timeframes: u64,
    /// Bytes of timeframe blocks, length prefixes included
    pub data_bytes: u64,
    /// 1 = complete, 0 = crashed during write
    pub write_complete: u8,
}

impl Default for FileFooter {
    fn default() -> Self {
        Self::new()
    }
}

impl FileFooter {
    pub fn new() -> Self {
        Self {
            data_checksum: 0,
            n_timeframes: 0,
            data_bytes: 0,
            write_complete: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.write_complete == 1
    }

    pub fn to_bytes(&self) -> [u8; FOOTER_SIZE] {
        let mut buf = [0u8; FOOTER_SIZE];
        buf[0..8].copy_from_slice(&FOOTER_MAGIC);
        buf[8..16].copy_from_slice(&self.data_checksum.to_le_bytes());
        buf[16..24].copy_from_slice(&self.n_timeframes.to_le_bytes());
        buf[24..32].copy_from_slice(&self.data_bytes.to_le_bytes());
        buf[32] = self.write_complete;
        // 33..40 reserved
        buf
    }

    pub fn from_bytes(data: &[u8; FOOTER_SIZE]) -> Result<Self, FileFormatError> {
        if data[0..8] != FOOTER_MAGIC {
            return Err(FileFormatError::InvalidFooterMagic);
        }
        let u64_at = |offset: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&data[offset..offset + 8]);
            u64::from_le_bytes(b)
        };
        Ok(Self {
            data_checksum: u64_at(8),
            n_timeframes: u64_at(16),
            data_bytes: u64_at(24),
            write_complete: data[32],
        })
    }
}

/// Incremental checksum over data blocks using xxHash64
#[derive(Debug, Clone, Default)]
pub struct ChecksumCalculator {
    state: u64,
    bytes_processed: u64,
}

impl ChecksumCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one block into the checksum
    pub fn update(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let block_hash = xxh64(data, 0);
        self.state = self.state.rotate_left(5) ^ block_hash;
        self.bytes_processed += data.len() as u64;
    }

    pub fn finalize(&self) -> u64 {
        self.state ^ self.bytes_processed
    }

    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed
    }
}

/// Writes timeframes into a raw file
pub struct TimeframeFileWriter<W: Write> {
    writer: W,
    checksum: ChecksumCalculator,
    footer: FileFooter,
}

impl<W: Write> TimeframeFileWriter<W> {
    /// Write the header and return a writer positioned at the first block
    pub fn new(mut writer: W, header: &FileHeader) -> Result<Self, FileFormatError> {
        writer.write_all(&header.to_bytes()?)?;
        Ok(Self {
            writer,
            checksum: ChecksumCalculator::new(),
            footer: FileFooter::new(),
        })
    }

    /// Append one timeframe block
    pub fn write_timeframe(&mut self, tf: &Timeframe) -> Result<(), FileFormatError> {
        let data = tf.to_msgpack()?;
        let len = (data.len() as u32).to_le_bytes();
        self.writer.write_all(&len)?;
        self.writer.write_all(&data)?;
        self.checksum.update(&data);
        self.footer.n_timeframes += 1;
        self.footer.data_bytes += (len.len() + data.len()) as u64;
        Ok(())
    }

    pub fn timeframes_written(&self) -> u64 {
        self.footer.n_timeframes
    }

    /// Write the footer, flush, and hand back the inner writer
    pub fn finish(mut self) -> Result<(W, FileFooter), FileFormatError> {
        self.footer.data_checksum = self.checksum.finalize();
        self.footer.write_complete = 1;
        self.writer.write_all(&self.footer.to_bytes())?;
        self.writer.flush()?;
        Ok((self.writer, self.footer))
    }
}

/// Reads timeframes back from a raw file
pub struct TimeframeFileReader<R> {
    reader: R,
    header: FileHeader,
    header_size: u64,
    file_size: u64,
}

impl<R: Read + Seek> TimeframeFileReader<R> {
    pub fn new(mut reader: R) -> Result<Self, FileFormatError> {
        let file_size = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        // magic and length prefix precede the header bytes
        let max_len = file_size.saturating_sub(FILE_MAGIC.len() as u64 + 4);
        let max_len = usize::try_from(max_len).unwrap_or(usize::MAX);
        let header = FileHeader::read_limited(&mut reader, max_len)?;
        let header_size = reader.stream_position()?;
        Ok(Self {
            reader,
            header,
            header_size,
            file_size,
        })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Read the footer at the end of the file
    pub fn read_footer(&mut self) -> Result<FileFooter, FileFormatError> {
        if self.file_size < self.header_size + FOOTER_SIZE as u64 {
            return Err(FileFormatError::TooShort);
        }
        self.reader.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut buf = [0u8; FOOTER_SIZE];
        self.reader.read_exact(&mut buf)?;
        FileFooter::from_bytes(&buf)
    }

    /// Read all timeframes, verifying the footer checksum
    pub fn read_all(&mut self) -> Result<Vec<Timeframe>, FileFormatError> {
        let footer = self.read_footer()?;
        if !footer.is_complete() {
            return Err(FileFormatError::IncompleteFile);
        }
        let mut checksum = ChecksumCalculator::new();
        let mut timeframes =
            Vec::with_capacity(footer.n_timeframes.min(PREALLOC_TIMEFRAMES) as usize);
        self.reader.seek(SeekFrom::Start(self.header_size))?;
        let data_end = self.file_size - FOOTER_SIZE as u64;
        while let Some(data) = self.next_block(data_end)? {
            checksum.update(&data);
            timeframes.push(Timeframe::from_msgpack(&data)?);
        }
        let actual = checksum.finalize();
        if actual != footer.data_checksum {
            return Err(FileFormatError::ChecksumMismatch {
                expected: footer.data_checksum,
                actual,
            });
        }
        Ok(timeframes)
    }

    /// Iterate over timeframes without requiring a footer
    ///
    /// Useful to salvage files whose writer crashed. Iteration stops at the
    /// first truncated or undecodable block.
    pub fn timeframes(&mut self) -> TimeframeIter<'_, R> {
        let data_end = match self.read_footer() {
            Ok(_) => self.file_size - FOOTER_SIZE as u64,
            Err(_) => self.file_size,
        };
        let positioned = self.reader.seek(SeekFrom::Start(self.header_size)).is_ok();
        TimeframeIter {
            file: self,
            data_end,
            done: !positioned,
        }
    }

    fn next_block(&mut self, data_end: u64) -> Result<Option<Vec<u8>>, FileFormatError> {
        let pos = self.reader.stream_position()?;
        if pos >= data_end {
            return Ok(None);
        }
        if pos + 4 > data_end {
            return Err(FileFormatError::TooShort);
        }
        let mut len_bytes = [0u8; 4];
        self.reader.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        if len == 0 || len > MAX_BLOCK_SIZE {
            return Err(FileFormatError::InvalidBlockLength(len));
        }
        if pos + 4 + len as u64 > data_end {
            return Err(FileFormatError::TooShort);
        }
        let mut data = vec![0u8; len];
        self.reader.read_exact(&mut data)?;
        Ok(Some(data))
    }
}

/// Iterator over timeframe blocks
pub struct TimeframeIter<'a, R> {
    file: &'a mut TimeframeFileReader<R>,
    data_end: u64,
    done: bool,
}

impl<R: Read + Seek> Iterator for TimeframeIter<'_, R> {
    type Item = Result<Timeframe, FileFormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self
            .file
            .next_block(self.data_end)
            .and_then(|block| match block {
                Some(data) => Timeframe::from_msgpack(&data)
                    .map(Some)
                    .map_err(FileFormatError::from),
                None => Ok(None),
            });
        match result {
            Ok(Some(tf)) => Some(Ok(tf)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::RawFrame;
    use std::io::Cursor;

    #[test]
    fn test_header_roundtrip() {
        let mut header = FileHeader::new(42, 128);
        header.comment = "cosmics".to_string();
        let bytes = header.to_bytes().unwrap();
        assert_eq!(&bytes[0..8], &FILE_MAGIC);
        let back = FileHeader::read_from(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(back, header);
    }

    #[test]
    fn test_header_bad_magic() {
        let mut bytes = FileHeader::new(1, 32).to_bytes().unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            FileHeader::read_from(&mut Cursor::new(bytes)),
            Err(FileFormatError::InvalidMagic)
        ));
    }

    #[test]
    fn test_footer_roundtrip() {
        let footer = FileFooter {
            data_checksum: 0xdead_beef_cafe_babe,
            n_timeframes: 12,
            data_bytes: 3456,
            write_complete: 1,
        };
        let bytes = footer.to_bytes();
        assert_eq!(FileFooter::from_bytes(&bytes).unwrap(), footer);
        assert!(footer.is_complete());
    }

    #[test]
    fn test_footer_bad_magic() {
        let bytes = [0u8; FOOTER_SIZE];
        assert!(matches!(
            FileFooter::from_bytes(&bytes),
            Err(FileFormatError::InvalidFooterMagic)
        ));
    }

    #[test]
    fn test_checksum_depends_on_order() {
        let mut a = ChecksumCalculator::new();
        a.update(b"one");
        a.update(b"two");
        let mut b = ChecksumCalculator::new();
        b.update(b"two");
        b.update(b"one");
        assert_ne!(a.finalize(), b.finalize());
        assert_eq!(a.bytes_processed(), 6);
    }

    fn sample_tf(counter: u32) -> Timeframe {
        let mut tf = Timeframe::new(counter, counter * 32);
        tf.push(RawFrame::new(0x000, counter * 32, vec![counter as u8; 32]));
        tf.push(RawFrame::new(0x100, counter * 32, vec![]));
        tf
    }

    fn write_file(n: u32) -> Vec<u8> {
        let mut writer =
            TimeframeFileWriter::new(Vec::new(), &FileHeader::new(7, 32)).unwrap();
        for i in 0..n {
            writer.write_timeframe(&sample_tf(i)).unwrap();
        }
        assert_eq!(writer.timeframes_written(), n as u64);
        writer.finish().unwrap().0
    }

    #[test]
    fn test_write_read_all() {
        let bytes = write_file(4);
        let mut reader = TimeframeFileReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.header().run_number, 7);
        let footer = reader.read_footer().unwrap();
        assert_eq!(footer.n_timeframes, 4);
        let tfs = reader.read_all().unwrap();
        assert_eq!(tfs, (0..4).map(sample_tf).collect::<Vec<_>>());
    }

    #[test]
    fn test_corruption_detected() {
        let mut bytes = write_file(2);
        // flip a byte inside the last frame payload (just before the footer)
        let idx = bytes.len() - FOOTER_SIZE - 3;
        bytes[idx] ^= 0xff;
        let mut reader = TimeframeFileReader::new(Cursor::new(bytes)).unwrap();
        assert!(reader.read_all().is_err());
    }

    #[test]
    fn test_salvage_truncated_file() {
        let bytes = write_file(3);
        // drop the footer and half of the last block
        let truncated = bytes[..bytes.len() - FOOTER_SIZE - 10].to_vec();
        let mut reader = TimeframeFileReader::new(Cursor::new(truncated)).unwrap();
        assert!(reader.read_all().is_err());
        let recovered: Vec<_> = reader.timeframes().collect();
        assert_eq!(recovered.len(), 3);
        assert!(recovered[0].is_ok());
        assert!(recovered[1].is_ok());
        assert!(recovered[2].is_err());
    }

    #[test]
    fn test_huge_footer_count_is_not_trusted() {
        let mut bytes = write_file(2);
        let start = bytes.len() - FOOTER_SIZE;
        bytes[start + 16..start + 24].copy_from_slice(&u64::MAX.to_le_bytes());
        let mut reader = TimeframeFileReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.read_footer().unwrap().n_timeframes, u64::MAX);
        // blocks are still bounded by the file, checksum still verified
        assert_eq!(reader.read_all().unwrap().len(), 2);
    }

    #[test]
    fn test_header_length_beyond_file_is_rejected() {
        let mut bytes = write_file(1);
        bytes[8..12].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            TimeframeFileReader::new(Cursor::new(bytes.clone())),
            Err(FileFormatError::InvalidBlockLength(len)) if len == u32::MAX as usize
        ));
        assert!(matches!(
            FileHeader::read_from(&mut Cursor::new(bytes)),
            Err(FileFormatError::InvalidBlockLength(_))
        ));
    }

    #[test]
    fn test_header_length_just_past_end_is_rejected() {
        let header = FileHeader::new(3, 32).to_bytes().unwrap();
        let mut bytes = header.clone();
        let too_long = (header.len() - 12 + 1) as u32;
        bytes[8..12].copy_from_slice(&too_long.to_le_bytes());
        assert!(matches!(
            TimeframeFileReader::new(Cursor::new(bytes)),
            Err(FileFormatError::InvalidBlockLength(_))
        ));
    }

    #[test]
    fn test_empty_file_has_no_timeframes() {
        let bytes = write_file(0);
        let mut reader = TimeframeFileReader::new(Cursor::new(bytes)).unwrap();
        assert!(reader.read_all().unwrap().is_empty());
        assert_eq!(reader.timeframes().count(), 0);
    }
}
