//! Flight computer core: telemetry frame decoding with per-event dispatch, and
//! crash-safe persistent state with overflow to secondary storage.
//!
//! Everything here is hardware independent. Firmware supplies a UART, a
//! millisecond timer, an EEPROM and an SD card file through the traits in
//! [`io`] and [`store::PrimaryStorage`].

#![no_std]

extern crate alloc;

pub mod config;
pub mod error;
pub mod io;
pub mod store;
pub mod telemetry;

pub use error::{CodecError, Corruption, FrameError, StoreError};
