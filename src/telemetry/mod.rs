//! Telemetry ingestion: frame decoding and flight event dispatch.

pub mod decoder;
pub mod dispatch;
pub mod event;
pub mod reading;

pub use decoder::{DecoderStats, FIELD_CAPACITY, FrameDecoder, PartialFrame};
pub use dispatch::{EventDispatcher, Handler};
pub use event::{EVENT_CODES, FlightEvent};
pub use reading::{NUM_FIELDS, Reading};
