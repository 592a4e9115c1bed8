use embassy_time::Duration;
use serde::{Deserialize, Serialize};

/// Longest gap between bytes of one frame before the frame is abandoned.
pub const STALE_AFTER: Duration = Duration::from_millis(75);

/// Quiet time on the line that marks the end of a frame.
pub const SILENCE_AFTER: Duration = Duration::from_millis(2);

/// Header sentinel written at offset 4 of the primary store.
pub const STORE_MAGIC: u16 = 0x451B;

/// Timing thresholds of the silence-delimited framing.
///
/// The defaults assume `poll()` runs at least every ~40 ms.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Milliseconds of silence, with bytes pending, after which the in-progress frame is dropped
    pub stale_after_ms: u32,
    /// Milliseconds of silence, with nothing pending, after which a frame is complete
    pub silence_after_ms: u32,
}

impl DecoderConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms as u64)
    }

    pub fn silence_after(&self) -> Duration {
        Duration::from_millis(self.silence_after_ms as u64)
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            stale_after_ms: STALE_AFTER.as_millis() as u32,
            silence_after_ms: SILENCE_AFTER.as_millis() as u32,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Sentinel identifying a formatted primary medium
    pub magic: u16,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { magic: STORE_MAGIC }
    }
}
