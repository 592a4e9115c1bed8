//! Primary storage medium: small, byte addressable, survives power loss
//! (on-chip EEPROM on the flight computer).

use thiserror_no_std::Error;

/// Random access non-volatile memory.
pub trait PrimaryStorage {
    type Error: core::fmt::Debug;

    /// Total size of the medium in bytes
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill `buf` from `offset`
    fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Write all of `bytes` at `offset`
    fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<(), Self::Error>;
}

impl<T: PrimaryStorage + ?Sized> PrimaryStorage for &mut T {
    type Error = T::Error;

    fn len(&self) -> usize {
        (**self).len()
    }

    fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), Self::Error> {
        (**self).read_at(offset, buf)
    }

    fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<(), Self::Error> {
        (**self).write_at(offset, bytes)
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    #[error("access of {len} bytes at offset {offset} is out of bounds")]
    OutOfBounds { offset: usize, len: usize },
}

/// RAM-backed medium of `N` bytes, used for host tests and as a shadow copy.
#[derive(Debug, Clone)]
pub struct MemoryStorage<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> MemoryStorage<N> {
    /// A medium with every byte set to `fill` (0xFF mimics erased EEPROM)
    pub const fn filled_with(fill: u8) -> Self {
        Self { bytes: [fill; N] }
    }

    pub const fn from_bytes(bytes: [u8; N]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8; N] {
        &mut self.bytes
    }

    fn range(offset: usize, len: usize) -> Result<core::ops::Range<usize>, MemoryError> {
        match offset.checked_add(len) {
            Some(end) if end <= N => Ok(offset..end),
            _ => Err(MemoryError::OutOfBounds { offset, len }),
        }
    }
}

impl<const N: usize> Default for MemoryStorage<N> {
    fn default() -> Self {
        Self::filled_with(0)
    }
}

impl<const N: usize> PrimaryStorage for MemoryStorage<N> {
    type Error = MemoryError;

    fn len(&self) -> usize {
        N
    }

    fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), MemoryError> {
        let range = Self::range(offset, buf.len())?;
        buf.copy_from_slice(&self.bytes[range]);
        Ok(())
    }

    fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<(), MemoryError> {
        let range = Self::range(offset, bytes.len())?;
        self.bytes[range].copy_from_slice(bytes);
        Ok(())
    }
}
