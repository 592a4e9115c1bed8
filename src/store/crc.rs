//! Reflected CRC-32 (polynomial 0xEDB88320), computed a nibble at a time.
//!
//! The 16-entry table keeps flash usage tiny on small MCUs at the cost of two
//! table lookups per byte.

const CRC_TABLE: [u32; 16] = [
    0x0000_0000, 0x1db7_1064, 0x3b6e_20c8, 0x26d9_30ac,
    0x76dc_4190, 0x6b6b_51f4, 0x4db2_6158, 0x5005_713c,
    0xedb8_8320, 0xf00f_9344, 0xd6d6_a3e8, 0xcb61_b38c,
    0x9b64_c2b0, 0x86d3_d2d4, 0xa00a_e278, 0xbdbd_f21c,
];

/// Streaming CRC-32 state.
///
/// Cheap to copy, so a writer can fold a candidate record into a copy and
/// only keep it once the record is on the medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc32 {
    state: u32,
}

impl Crc32 {
    pub const fn new() -> Self {
        Self { state: !0 }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            let mut crc = self.state;
            crc = CRC_TABLE[((crc ^ byte as u32) & 0x0f) as usize] ^ (crc >> 4);
            crc = CRC_TABLE[((crc ^ (byte >> 4) as u32) & 0x0f) as usize] ^ (crc >> 4);
            self.state = crc;
        }
    }

    pub const fn finish(&self) -> u32 {
        !self.state
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

/// CRC-32 of a complete buffer
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    crc.update(bytes);
    crc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(crc32(&[]), 0);
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let data = b"flight computer state record";
        let mut crc = Crc32::new();
        for chunk in data.chunks(5) {
            crc.update(chunk);
        }
        assert_eq!(crc.finish(), crc32(data));
    }

    #[test]
    fn test_single_bit_flip_detected() {
        let mut data = [0x5Au8; 32];
        let before = crc32(&data);
        data[17] ^= 0x04;
        assert_ne!(crc32(&data), before);
    }
}
