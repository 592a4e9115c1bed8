//! Primary store header.
//!
//! Binary format (little-endian):
//! - crc: 4 bytes (u32), CRC-32 of the record region only
//! - magic: 2 bytes (u16)
//! - write_count: 2 bytes (u16)

use crate::error::Corruption;

/// Size of the encoded header
pub const HEADER_SIZE: usize = 8;

/// Offset of the `write_count` field. A flush drains the medium from here on,
/// so every batch in secondary storage starts with its own record count.
pub const COUNT_OFFSET: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHeader {
    pub crc: u32,
    pub magic: u16,
    pub write_count: u16,
}

impl StoreHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.crc.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.magic.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.write_count.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self {
            crc: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            magic: u16::from_le_bytes([bytes[4], bytes[5]]),
            write_count: u16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }

    /// Structural checks that do not need the record region.
    ///
    /// `capacity` is the number of records the medium can hold.
    pub fn check(&self, magic: u16, capacity: usize) -> Result<(), Corruption> {
        if self.magic != magic {
            return Err(Corruption::MagicMismatch);
        }
        if self.write_count == 0 || self.write_count as usize > capacity {
            return Err(Corruption::CountOutOfRange);
        }
        Ok(())
    }
}
