//! Crash-safe persistent state.
//!
//! A [`PersistentStore`] keeps the latest committed state on a small primary
//! medium (EEPROM) as a checksummed, append-only log of fixed-size records and
//! drains full logs to an append-only secondary medium (SD card).

pub mod codec;
pub mod crc;
pub mod header;
pub mod manager;
pub mod primary;

pub use codec::{PostcardCodec, RawCodec, RecordCodec};
pub use crc::{Crc32, crc32};
pub use header::{HEADER_SIZE, StoreHeader};
pub use manager::{BootOutcome, PersistentStore};
pub use primary::{MemoryError, MemoryStorage, PrimaryStorage};
