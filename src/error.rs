//! Error kinds for the telemetry decoder and the persistent store

use thiserror_no_std::Error;

/// Why a telemetry frame was dropped.
///
/// Frame errors never reach the caller of `poll()`. They are logged, counted
/// and the decoder resynchronises at the next silence boundary.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// A field held more characters than the scratch buffer can take
    #[error("field exceeded the scratch buffer capacity")]
    BufferOverrun,

    /// The frame did not contain exactly the expected number of fields
    #[error("frame did not contain the expected number of fields")]
    FieldCountMismatch,

    /// Field 0 was not a single known flight event code
    #[error("unknown flight event code")]
    UnknownEventCode,

    /// A flag field was something other than `0` or `1`
    #[error("invalid boolean token")]
    InvalidBooleanToken,

    /// The byte stream went quiet for too long in the middle of a frame
    #[error("frame went stale before completion")]
    Stale,
}

/// Reason the primary store contents were rejected at boot.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Corruption {
    /// The stored checksum does not match the record region
    #[error("body checksum mismatch")]
    CrcMismatch,

    /// The header sentinel is missing (blank or foreign medium)
    #[error("header magic mismatch")]
    MagicMismatch,

    /// The record count is zero or larger than the medium can hold
    #[error("record count out of range")]
    CountOutOfRange,

    /// The newest record could not be decoded
    #[error("last record is torn")]
    TornRecord,
}

/// Errors produced while turning a state payload into a record and back.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("failed to encode state record")]
    Encode,

    #[error("failed to decode state record")]
    Decode,

    /// The encoded payload does not fit in the fixed record size
    #[error("encoded state needs more than {max} bytes")]
    Oversized {
        /// Fixed record size of the codec
        max: usize,
    },
}

/// Errors surfaced by [`PersistentStore`](crate::store::PersistentStore).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// `initialize` has not completed successfully yet
    #[error("store is not initialized")]
    NotInitialized,

    /// The store is full and draining it to secondary storage failed
    #[error("store is full and the flush to secondary storage failed")]
    Exhausted,

    /// Reading or writing the primary medium failed
    #[error("primary storage access failed")]
    Primary,

    /// Appending to secondary storage failed
    #[error("secondary storage append failed")]
    Secondary,

    /// The state payload could not be serialized or deserialized
    #[error("record codec error: {0}")]
    Codec(#[from] CodecError),

    /// The primary medium cannot hold the header plus a single record
    #[error("primary storage too small: need at least {needed} bytes")]
    TooSmall {
        /// Minimum medium size for this record codec
        needed: usize,
    },
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
