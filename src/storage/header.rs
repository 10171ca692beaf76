use byteorder::{ByteOrder, LittleEndian};

use crate::pipeline::serialize::{DataVersion, SerializeError};

pub const HEADER_SIZE: usize = 24;
pub const PATTERN_MAGIC: u32 = 0xDEAD_BEEF;

/// First 24 bytes of every pattern slot.
///
/// ```text
/// 0  magic          u32
/// 4  version        u16
/// 6  pattern_index  u8
/// 7  reserved       u8
/// 8  checksum       u32   crc32 of the payload
/// 12 data_size      u32   payload bytes following the header
/// 16 reserved       [u32; 2]
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatternHeader {
    pub magic: u32,
    pub version: u16,
    pub pattern_index: u8,
    pub checksum: u32,
    pub data_size: u32,
}

/// Why a slot's contents were treated as absent.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("bad magic {0:#010x}")]
    BadMagic(u32),

    #[error("unsupported data version {0}")]
    UnsupportedVersion(u16),

    #[error("header belongs to slot {found}, not {expected}")]
    WrongIndex { expected: usize, found: u8 },

    #[error("payload size {size} exceeds capacity {capacity}")]
    Oversized { size: usize, capacity: usize },

    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("payload does not parse: {0}")]
    Malformed(#[from] SerializeError),
}

impl PatternHeader {
    pub fn new(slot: usize, checksum: u32, data_size: u32) -> Self {
        Self {
            magic: PATTERN_MAGIC,
            version: DataVersion::LATEST.as_u16(),
            pattern_index: slot as u8,
            checksum,
            data_size,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        LittleEndian::write_u32(&mut out[0..4], self.magic);
        LittleEndian::write_u16(&mut out[4..6], self.version);
        out[6] = self.pattern_index;
        LittleEndian::write_u32(&mut out[8..12], self.checksum);
        LittleEndian::write_u32(&mut out[12..16], self.data_size);
        out
    }

    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self {
            magic: LittleEndian::read_u32(&bytes[0..4]),
            version: LittleEndian::read_u16(&bytes[4..6]),
            pattern_index: bytes[6],
            checksum: LittleEndian::read_u32(&bytes[8..12]),
            data_size: LittleEndian::read_u32(&bytes[12..16]),
        }
    }

    /// Validates everything that can be checked before the payload is read.
    pub fn check(&self, slot: usize, capacity: usize) -> Result<DataVersion, Rejection> {
        if self.magic != PATTERN_MAGIC {
            return Err(Rejection::BadMagic(self.magic));
        }
        let version = DataVersion::from_u16(self.version)
            .ok_or(Rejection::UnsupportedVersion(self.version))?;
        if usize::from(self.pattern_index) != slot {
            return Err(Rejection::WrongIndex {
                expected: slot,
                found: self.pattern_index,
            });
        }
        let size = self.data_size as usize;
        if size > capacity {
            return Err(Rejection::Oversized { size, capacity });
        }
        Ok(version)
    }
}
