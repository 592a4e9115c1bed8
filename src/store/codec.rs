//! Record codecs: how a state payload becomes exactly `RECORD_SIZE` bytes.
//!
//! Record size and byte order are part of the on-medium contract, so they are
//! fixed by the codec rather than by the in-memory layout of the state type.

use core::marker::PhantomData;

use serde::{Serialize, de::DeserializeOwned};

use crate::error::CodecError;

/// Serializes one state payload into a fixed-size record and back.
pub trait RecordCodec {
    /// Payload persisted by the store
    type State: Clone;

    /// Exact size of every record on the medium
    const RECORD_SIZE: usize;

    /// Fill `out` (exactly `RECORD_SIZE` bytes) with the encoded state
    fn encode(&self, state: &Self::State, out: &mut [u8]) -> Result<(), CodecError>;

    /// Decode a record of exactly `RECORD_SIZE` bytes
    fn decode(&self, bytes: &[u8]) -> Result<Self::State, CodecError>;
}

/// Opaque byte-array payloads stored verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec<const N: usize>;

impl<const N: usize> RecordCodec for RawCodec<N> {
    type State = [u8; N];
    const RECORD_SIZE: usize = N;

    fn encode(&self, state: &[u8; N], out: &mut [u8]) -> Result<(), CodecError> {
        if out.len() != N {
            return Err(CodecError::Encode);
        }
        out.copy_from_slice(state);
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<[u8; N], CodecError> {
        bytes.try_into().map_err(|_| CodecError::Decode)
    }
}

/// Any serde type, encoded with postcard and zero padded to `N` bytes.
///
/// Postcard uses varints by default, so size `N` for the largest value the
/// state can take (or mark integer fields with `postcard::fixint::le`).
pub struct PostcardCodec<S, const N: usize> {
    _state: PhantomData<fn() -> S>,
}

impl<S, const N: usize> PostcardCodec<S, N> {
    pub const fn new() -> Self {
        Self {
            _state: PhantomData,
        }
    }
}

impl<S, const N: usize> Default for PostcardCodec<S, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, const N: usize> RecordCodec for PostcardCodec<S, N>
where
    S: Serialize + DeserializeOwned + Clone,
{
    type State = S;
    const RECORD_SIZE: usize = N;

    fn encode(&self, state: &S, out: &mut [u8]) -> Result<(), CodecError> {
        if out.len() != N {
            return Err(CodecError::Encode);
        }
        let used = match postcard::to_slice(state, out) {
            Ok(used) => used.len(),
            Err(postcard::Error::SerializeBufferFull) => {
                return Err(CodecError::Oversized { max: N });
            }
            Err(_) => return Err(CodecError::Encode),
        };
        out[used..].fill(0);
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<S, CodecError> {
        postcard::from_bytes(bytes).map_err(|_| CodecError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::FlightEvent;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    struct Mission {
        phase: FlightEvent,
        armed: bool,
        #[serde(with = "postcard::fixint::le")]
        boots: u32,
    }

    #[test]
    fn test_postcard_record_is_padded() {
        let codec = PostcardCodec::<Mission, 12>::new();
        let mut out = [0xFFu8; 12];
        let state = Mission {
            phase: FlightEvent::Apogee,
            armed: true,
            boots: 3,
        };

        codec.encode(&state, &mut out).unwrap();
        // variant index, bool, fixed-width u32, then padding
        assert_eq!(out, [7, 1, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(codec.decode(&out).unwrap(), state);
    }

    #[test]
    fn test_postcard_oversized() {
        let codec = PostcardCodec::<Mission, 4>::new();
        let mut out = [0u8; 4];
        let state = Mission {
            phase: FlightEvent::None,
            armed: false,
            boots: 0,
        };
        assert_eq!(
            codec.encode(&state, &mut out),
            Err(CodecError::Oversized { max: 4 })
        );
    }

    #[test]
    fn test_postcard_rejects_garbage() {
        let codec = PostcardCodec::<Mission, 8>::new();
        // 0x7F is not a valid FlightEvent variant
        assert_eq!(codec.decode(&[0x7F; 8]), Err(CodecError::Decode));
    }

    #[test]
    fn test_raw_codec_length_checks() {
        let codec = RawCodec::<2>;
        let mut short = [0u8; 1];
        assert_eq!(codec.encode(&[1, 2], &mut short), Err(CodecError::Encode));
        assert_eq!(codec.decode(&[1, 2, 3]), Err(CodecError::Decode));
        assert_eq!(codec.decode(&[1, 2]), Ok([1, 2]));
    }
}
