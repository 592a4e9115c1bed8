//! Collaborator seams: byte streams, append-only sinks and the millisecond clock.
//!
//! The decoder and the store never touch hardware directly. Firmware hands
//! them a UART, an SD card file and a timer through these traits, host tests
//! hand them fakes.

use embedded_io::{Read, ReadReady, Write};

/// Non-blocking source of telemetry bytes.
pub trait ByteSource {
    /// Read one byte, or `None` when nothing is buffered right now.
    fn read_byte(&mut self) -> Option<u8>;
}

/// Append-only byte sink, used as secondary (overflow) storage.
pub trait ByteSink {
    type Error: core::fmt::Debug;

    /// Append all of `bytes`. A partial append is reported as an error.
    fn append(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
}

/// Free-running millisecond counter. It is allowed to wrap.
pub trait Clock {
    fn now_ms(&self) -> u32;
}

/// Milliseconds elapsed from `earlier` to `now` on a wrapping counter.
#[inline]
pub const fn elapsed_ms(now: u32, earlier: u32) -> u32 {
    now.wrapping_sub(earlier)
}

impl<T: ByteSource + ?Sized> ByteSource for &mut T {
    fn read_byte(&mut self) -> Option<u8> {
        (**self).read_byte()
    }
}

impl<T: ByteSink + ?Sized> ByteSink for &mut T {
    type Error = T::Error;

    fn append(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        (**self).append(bytes)
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }
}

/// Adapts a serial peripheral implementing `embedded_io` into a [`ByteSource`].
///
/// `read_ready` is checked before every read so a blocking UART driver never
/// stalls the control loop. Read errors are logged and treated as "no data".
pub struct SerialSource<U> {
    uart: U,
}

impl<U> SerialSource<U>
where
    U: Read + ReadReady,
{
    pub fn new(uart: U) -> Self {
        Self { uart }
    }

    pub fn into_inner(self) -> U {
        self.uart
    }
}

impl<U> ByteSource for SerialSource<U>
where
    U: Read + ReadReady,
{
    fn read_byte(&mut self) -> Option<u8> {
        match self.uart.read_ready() {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                log::warn!("serial read_ready failed: {:?}", e);
                return None;
            }
        }

        let mut byte = [0u8; 1];
        match self.uart.read(&mut byte) {
            Ok(1) => Some(byte[0]),
            Ok(_) => None,
            Err(e) => {
                log::warn!("serial read failed: {:?}", e);
                None
            }
        }
    }
}

/// Adapts any `embedded_io::Write` (an open SD card file, a debug UART, a
/// `Vec<u8>`) into a [`ByteSink`].
pub struct WriteSink<W> {
    writer: W,
}

impl<W: Write> WriteSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ByteSink for WriteSink<W> {
    type Error = W::Error;

    fn append(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.writer.write_all(bytes)?;
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use core::convert::Infallible;

    /// UART double that only reports data as ready every other call.
    struct FlakyUart {
        data: Vec<u8>,
        pos: usize,
        ready_toggle: bool,
    }

    impl embedded_io::ErrorType for FlakyUart {
        type Error = Infallible;
    }

    impl ReadReady for FlakyUart {
        fn read_ready(&mut self) -> Result<bool, Self::Error> {
            self.ready_toggle = !self.ready_toggle;
            Ok(self.ready_toggle && self.pos < self.data.len())
        }
    }

    impl Read for FlakyUart {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            if self.pos >= self.data.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.data[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    #[test]
    fn test_elapsed_handles_wraparound() {
        assert_eq!(elapsed_ms(10, 5), 5);
        assert_eq!(elapsed_ms(3, u32::MAX - 1), 5);
        assert_eq!(elapsed_ms(0, 0), 0);
    }

    #[test]
    fn test_serial_source_respects_read_ready() {
        let mut source = SerialSource::new(FlakyUart {
            data: b"AB".to_vec(),
            pos: 0,
            ready_toggle: false,
        });

        assert_eq!(source.read_byte(), Some(b'A'));
        assert_eq!(source.read_byte(), None);
        assert_eq!(source.read_byte(), Some(b'B'));
        assert_eq!(source.read_byte(), None);
        assert_eq!(source.read_byte(), None);
    }

    #[test]
    fn test_write_sink_appends() {
        let mut sink = WriteSink::new(Vec::<u8>::new());
        sink.append(b"abc").unwrap();
        sink.append(b"de").unwrap();
        assert_eq!(sink.into_inner(), b"abcde".to_vec());
    }
}
