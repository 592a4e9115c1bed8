//! Silence-delimited telemetry frame decoder.
//!
//! Frames carry no terminator. A frame ends when the line has been quiet for
//! longer than the silence threshold; a frame whose bytes stop arriving for
//! longer than the stale threshold is thrown away. Every frame boundary, good
//! or bad, resets the scratch state, so one corrupt frame never leaks into the
//! next.
//!
//! ```rust,ignore
//! let mut decoder = FrameDecoder::new(SerialSource::new(uart), clock);
//! decoder
//!     .dispatcher_mut()
//!     .register(FlightEvent::Apogee, |_| deploy_drogue());
//!
//! loop {
//!     decoder.poll();
//!     // ... at least once every ~40 ms
//! }
//! ```

use embassy_time::Duration;
use heapless::Vec;
use log::{debug, trace, warn};

use super::dispatch::EventDispatcher;
use super::event::FlightEvent;
use super::reading::{ELAPSED_FIELD, FieldKind, NUM_FIELDS, Reading};
use crate::config::DecoderConfig;
use crate::error::FrameError;
use crate::io::{ByteSource, Clock, elapsed_ms};

/// Most characters a single field may hold
pub const FIELD_CAPACITY: usize = 16;

const SEPARATOR: u8 = b',';
const DECIMAL_POINT: u8 = b'.';

/// Scratch state of the frame currently being received.
///
/// Reset at every frame boundary, whether the frame was accepted or not.
#[derive(Debug, Clone, Default)]
pub struct PartialFrame {
    /// Wire index of the field being accumulated
    field: usize,
    buffer: Vec<u8, FIELD_CAPACITY>,
    /// The current field ran past `FIELD_CAPACITY`
    overrun: bool,
    /// At least one byte of this frame has arrived
    started: bool,
    reading: Reading,
    /// First reason this frame is unusable
    corruption: Option<FrameError>,
}

impl PartialFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once any byte of the frame has been received
    pub fn in_progress(&self) -> bool {
        self.started
    }

    pub fn field(&self) -> usize {
        self.field
    }

    pub fn corruption(&self) -> Option<FrameError> {
        self.corruption
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Feed one received byte
    pub fn push(&mut self, byte: u8) {
        self.started = true;

        if byte == SEPARATOR {
            self.finish_field();
            self.field = self.field.saturating_add(1);
            return;
        }

        if byte == DECIMAL_POINT && self.field != ELAPSED_FIELD {
            return;
        }

        if self.buffer.push(byte).is_err() {
            self.overrun = true;
            self.fail(FrameError::BufferOverrun);
        }
    }

    /// Close the frame and hand back the reading if every field was valid.
    ///
    /// The scratch state is reset before returning.
    pub fn finalize(&mut self) -> Result<Reading, FrameError> {
        self.finish_field();

        let result = match self.corruption {
            Some(reason) => Err(reason),
            None if self.field + 1 != NUM_FIELDS => Err(FrameError::FieldCountMismatch),
            None => Ok(self.reading),
        };

        self.reset();
        result
    }

    fn fail(&mut self, reason: FrameError) {
        if self.corruption.is_none() {
            self.corruption = Some(reason);
        }
    }

    fn finish_field(&mut self) {
        let kind = FieldKind::of(self.field);

        if kind == FieldKind::Extra {
            self.fail(FrameError::FieldCountMismatch);
        } else if !self.overrun {
            match kind {
                FieldKind::Event => match self.buffer.as_slice() {
                    [code] => match FlightEvent::from_code(*code) {
                        Some(event) => self.reading.event = event,
                        None => self.fail(FrameError::UnknownEventCode),
                    },
                    _ => self.fail(FrameError::UnknownEventCode),
                },
                FieldKind::Micro(n) => {
                    let value = parse_micro(&self.buffer);
                    if let Some(slot) = self.reading.micro_mut(n) {
                        *slot = value;
                    }
                }
                FieldKind::Flag(n) => {
                    let value = match self.buffer.as_slice() {
                        b"1" => Some(true),
                        b"0" => Some(false),
                        _ => None,
                    };
                    match (value, self.reading.flag_mut(n)) {
                        (Some(value), Some(slot)) => *slot = value,
                        _ => self.fail(FrameError::InvalidBooleanToken),
                    }
                }
                FieldKind::Extra => {}
            }
        }

        self.buffer.clear();
        self.overrun = false;
    }
}

/// Integer conversion with C `atol` semantics.
///
/// Leading whitespace and one sign are accepted, conversion stops at the
/// first non-digit (so `"1234.5"` is `1234`), an empty field is `0`, and
/// values beyond `i64` saturate.
pub fn parse_micro(field: &[u8]) -> i64 {
    let mut rest = field;
    while let [first, tail @ ..] = rest {
        if first.is_ascii_whitespace() {
            rest = tail;
        } else {
            break;
        }
    }

    let negative = match rest {
        [b'-', tail @ ..] => {
            rest = tail;
            true
        }
        [b'+', tail @ ..] => {
            rest = tail;
            false
        }
        _ => false,
    };

    let mut value: i64 = 0;
    for &byte in rest.iter().take_while(|b| b.is_ascii_digit()) {
        let digit = (byte - b'0') as i64;
        value = if negative {
            value.saturating_mul(10).saturating_sub(digit)
        } else {
            value.saturating_mul(10).saturating_add(digit)
        };
    }
    value
}

/// Frame counters since boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecoderStats {
    /// Frames accepted and dispatched
    pub frames_decoded: u32,
    /// Frames dropped at the silence boundary because a field was bad
    pub frames_corrupted: u32,
    /// Frames abandoned because the line stalled mid-frame
    pub frames_stale: u32,
}

/// Turns a raw telemetry byte stream into [`Reading`]s and fires flight
/// event callbacks.
///
/// `poll()` must not be called re-entrantly; taking `&mut self` enforces that.
pub struct FrameDecoder<'a, B, C> {
    source: B,
    clock: C,
    config: DecoderConfig,
    dispatcher: EventDispatcher<'a>,
    frame: PartialFrame,
    last_reading: Reading,
    /// Clock value when the most recent byte arrived
    last_byte_ms: u32,
    stats: DecoderStats,
    /// Why the most recent frame was dropped
    last_error: Option<FrameError>,
}

impl<'a, B, C> FrameDecoder<'a, B, C>
where
    B: ByteSource,
    C: Clock,
{
    pub fn new(source: B, clock: C) -> Self {
        Self::with_config(source, clock, DecoderConfig::default())
    }

    pub fn with_config(source: B, clock: C, config: DecoderConfig) -> Self {
        let last_byte_ms = clock.now_ms();
        Self {
            source,
            clock,
            config,
            dispatcher: EventDispatcher::new(),
            frame: PartialFrame::new(),
            last_reading: Reading::default(),
            last_byte_ms,
            stats: DecoderStats::default(),
            last_error: None,
        }
    }

    /// Drain the byte source and advance the framing state machine.
    ///
    /// Returns the reading confirmed during this call, if any. Its event has
    /// already been dispatched when this returns.
    pub fn poll(&mut self) -> Option<Reading> {
        let now = self.clock.now_ms();
        let quiet = Duration::from_millis(elapsed_ms(now, self.last_byte_ms) as u64);

        let Some(first) = self.source.read_byte() else {
            if self.frame.in_progress() && quiet > self.config.silence_after() {
                return self.finish_frame();
            }
            return None;
        };

        if self.frame.in_progress() && quiet > self.config.stale_after() {
            self.abandon_frame(FrameError::Stale, quiet);
        }

        let mut next = Some(first);
        while let Some(byte) = next {
            self.frame.push(byte);
            next = self.source.read_byte();
        }
        self.last_byte_ms = now;

        None
    }

    fn finish_frame(&mut self) -> Option<Reading> {
        match self.frame.finalize() {
            Ok(reading) => {
                self.stats.frames_decoded = self.stats.frames_decoded.saturating_add(1);
                self.last_reading = reading;
                let handlers = self.dispatcher.dispatch(&reading);
                trace!("frame confirmed: {} ({} handlers)", reading.event, handlers);
                Some(reading)
            }
            Err(reason) => {
                self.stats.frames_corrupted = self.stats.frames_corrupted.saturating_add(1);
                self.last_error = Some(reason);
                debug!("dropping telemetry frame: {}", reason);
                None
            }
        }
    }

    /// Drop the partial frame without a silence boundary
    fn abandon_frame(&mut self, reason: FrameError, quiet: Duration) {
        warn!(
            "dropping telemetry frame after {} ms mid-frame gap: {}",
            quiet.as_millis(),
            reason
        );
        self.stats.frames_stale = self.stats.frames_stale.saturating_add(1);
        self.last_error = Some(reason);
        self.frame.reset();
    }

    /// Most recently confirmed reading. Never reflects a partial frame.
    pub fn last_reading(&self) -> &Reading {
        &self.last_reading
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Reason the most recently dropped frame was rejected, if any was
    pub fn last_error(&self) -> Option<FrameError> {
        self.last_error
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn dispatcher_mut(&mut self) -> &mut EventDispatcher<'a> {
        &mut self.dispatcher
    }

    pub fn source_mut(&mut self) -> &mut B {
        &mut self.source
    }

    /// Scratch state of the frame in progress
    pub fn partial_frame(&self) -> &PartialFrame {
        &self.frame
    }
}
