//! Crash-safe persistent state store.
//!
//! The primary medium holds a bounded append-only log of state records behind
//! a checksummed header. Every `set_state` appends one record and only then
//! rewrites the header, so losing power mid-write leaves the previous header
//! (and therefore the previous state) authoritative. When the log is full it
//! is drained to secondary storage and restarted from offset zero.
//!
//! ## Layout
//!
//! ```text
//! 0      4      6      8
//! | crc  | magic| count| record 0 | record 1 | ... | record count-1 |
//! ```

extern crate alloc;
use alloc::vec;
use alloc::vec::Vec;

use log::{debug, error, info, warn};

use super::codec::RecordCodec;
use super::crc::Crc32;
use super::header::{COUNT_OFFSET, HEADER_SIZE, StoreHeader};
use super::primary::PrimaryStorage;
use crate::config::StoreConfig;
use crate::error::{Corruption, StoreError, StoreResult};
use crate::io::ByteSink;

/// How `initialize` established the active state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// The last committed record was loaded from the primary medium
    Restored { write_count: u16 },
    /// The medium was rejected and the fallback state was committed instead
    Fallback(Corruption),
}

/// Bounded, checksummed state log on a primary medium `P`, overflowing to the
/// append-only sink `W`.
///
/// `P` is owned (or exclusively borrowed) by the store; nothing else may
/// write to it.
pub struct PersistentStore<C, P, W>
where
    C: RecordCodec,
{
    codec: C,
    primary: P,
    secondary: W,
    config: StoreConfig,
    /// Records the primary medium can hold
    capacity: usize,
    /// Active state; `None` until `initialize` succeeds
    state: Option<C::State>,
    write_count: u16,
    /// CRC state over the committed records
    body_crc: Crc32,
    /// Scratch buffer of exactly one record
    record: Vec<u8>,
}

impl<C, P, W> PersistentStore<C, P, W>
where
    C: RecordCodec,
    P: PrimaryStorage,
    W: ByteSink,
{
    pub fn new(codec: C, primary: P, secondary: W) -> StoreResult<Self> {
        Self::with_config(codec, primary, secondary, StoreConfig::default())
    }

    /// Fails if the medium cannot hold the header and at least one record.
    pub fn with_config(
        codec: C,
        primary: P,
        secondary: W,
        config: StoreConfig,
    ) -> StoreResult<Self> {
        let needed = HEADER_SIZE + C::RECORD_SIZE;
        if C::RECORD_SIZE == 0 || primary.len() < needed {
            return Err(StoreError::TooSmall { needed });
        }
        let capacity = ((primary.len() - HEADER_SIZE) / C::RECORD_SIZE).min(u16::MAX as usize);

        Ok(Self {
            codec,
            primary,
            secondary,
            config,
            capacity,
            state: None,
            write_count: 0,
            body_crc: Crc32::new(),
            record: vec![0; C::RECORD_SIZE],
        })
    }

    /// Load the last committed state, or commit `fallback` if the medium
    /// does not hold a valid log.
    ///
    /// Corruption is never an error here; only failing to write the
    /// fallback state is.
    pub fn initialize(&mut self, fallback: C::State) -> StoreResult<BootOutcome> {
        match self.recover()? {
            Ok(state) => {
                info!("restored state record {} from primary store", self.write_count);
                self.state = Some(state);
                Ok(BootOutcome::Restored {
                    write_count: self.write_count,
                })
            }
            Err(reason) => {
                warn!("primary store rejected: {}, committing fallback state", reason);
                // recover() already trimmed a torn trailing record
                let (index, base) = match reason {
                    Corruption::TornRecord => (self.write_count, self.body_crc),
                    _ => (0, Crc32::new()),
                };
                self.append(index, base, &fallback)?;
                self.state = Some(fallback);
                Ok(BootOutcome::Fallback(reason))
            }
        }
    }

    /// Validate the header and record region.
    ///
    /// On success `write_count` and `body_crc` describe the medium. The outer
    /// error is an I/O failure, the inner one a rejected medium.
    fn recover(&mut self) -> StoreResult<Result<C::State, Corruption>> {
        let mut raw = [0u8; HEADER_SIZE];
        self.primary.read_at(0, &mut raw).map_err(primary_error)?;
        let header = StoreHeader::from_bytes(&raw);

        if let Err(reason) = header.check(self.config.magic, self.capacity) {
            return Ok(Err(reason));
        }

        // count >= 1 after the header check; the newest record is read last
        let count = header.write_count as usize;
        let mut before_last = Crc32::new();
        for index in 0..count - 1 {
            self.primary
                .read_at(record_offset::<C>(index), &mut self.record)
                .map_err(primary_error)?;
            before_last.update(&self.record);
        }
        self.primary
            .read_at(record_offset::<C>(count - 1), &mut self.record)
            .map_err(primary_error)?;
        let mut crc = before_last;
        crc.update(&self.record);

        if crc.finish() != header.crc {
            return Ok(Err(Corruption::CrcMismatch));
        }

        // `self.record` now holds the newest record
        match self.codec.decode(&self.record) {
            Ok(state) => {
                self.write_count = header.write_count;
                self.body_crc = crc;
                Ok(Ok(state))
            }
            Err(e) => {
                warn!("newest state record does not decode: {}", e);
                self.write_count = header.write_count - 1;
                self.body_crc = before_last;
                Ok(Err(Corruption::TornRecord))
            }
        }
    }

    /// Active state
    pub fn state(&self) -> StoreResult<&C::State> {
        self.state.as_ref().ok_or(StoreError::NotInitialized)
    }

    /// Number of records currently in the primary log
    pub fn write_count(&self) -> StoreResult<u16> {
        match self.state {
            Some(_) => Ok(self.write_count),
            None => Err(StoreError::NotInitialized),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Records the primary medium can hold
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True when one more record would not fit on the primary medium
    pub fn filled(&self) -> bool {
        self.write_count as usize >= self.capacity
    }

    /// Commit `state` as the new active state.
    ///
    /// A full log is drained to secondary storage first; if that fails the
    /// call fails with [`StoreError::Exhausted`] and nothing changes. Once the
    /// drain succeeded the log counts as empty, even if the new record then
    /// fails to land. On any other failure the in-memory state is unchanged.
    pub fn set_state(&mut self, state: C::State) -> StoreResult<()> {
        if self.state.is_none() {
            return Err(StoreError::NotInitialized);
        }

        if self.filled() {
            self.drain().map_err(|e| {
                error!("store full and flush failed: {}", e);
                StoreError::Exhausted
            })?;
        }

        self.append(self.write_count, self.body_crc, &state)?;
        self.state = Some(state);
        Ok(())
    }

    /// Drain the log to secondary storage on demand.
    ///
    /// The active state is re-committed as record 0 so the primary medium
    /// never sits without a valid record.
    pub fn flush(&mut self) -> StoreResult<()> {
        let Some(state) = self.state.clone() else {
            return Err(StoreError::NotInitialized);
        };
        self.drain()?;
        self.append(self.write_count, self.body_crc, &state)
    }

    /// Copy the count field and every committed record to secondary storage,
    /// then restart the log from record 0.
    ///
    /// The header on the medium is only rewritten by the next append.
    fn drain(&mut self) -> StoreResult<()> {
        let end = record_offset::<C>(self.write_count as usize);
        let mut body = vec![0u8; end - COUNT_OFFSET];
        self.primary
            .read_at(COUNT_OFFSET, &mut body)
            .map_err(primary_error)?;

        self.secondary.append(&body).map_err(|e| {
            error!("secondary storage append failed: {:?}", e);
            StoreError::Secondary
        })?;

        info!(
            "flushed {} state records ({} bytes) to secondary storage",
            self.write_count,
            body.len()
        );
        self.write_count = 0;
        self.body_crc = Crc32::new();
        Ok(())
    }

    /// Write `state` as record `index`, then the header covering records
    /// `0..=index`. `base` is the CRC state over records `0..index`.
    ///
    /// In-memory bookkeeping only moves once both writes succeeded.
    fn append(&mut self, index: u16, base: Crc32, state: &C::State) -> StoreResult<()> {
        self.codec.encode(state, &mut self.record)?;

        let mut crc = base;
        crc.update(&self.record);
        let header = StoreHeader {
            crc: crc.finish(),
            magic: self.config.magic,
            write_count: index + 1,
        };

        self.primary
            .write_at(record_offset::<C>(index as usize), &self.record)
            .map_err(primary_error)?;
        self.primary
            .write_at(0, &header.to_bytes())
            .map_err(primary_error)?;

        debug!("committed state record {}", header.write_count);
        self.write_count = header.write_count;
        self.body_crc = crc;
        Ok(())
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn secondary(&self) -> &W {
        &self.secondary
    }

    pub fn into_parts(self) -> (P, W) {
        (self.primary, self.secondary)
    }
}

/// Byte offset of record `index`
fn record_offset<C: RecordCodec>(index: usize) -> usize {
    HEADER_SIZE + C::RECORD_SIZE * index
}

fn primary_error<E: core::fmt::Debug>(e: E) -> StoreError {
    error!("primary storage access failed: {:?}", e);
    StoreError::Primary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use crate::io::WriteSink;
    use crate::store::codec::{PostcardCodec, RawCodec};
    use crate::store::crc::crc32;
    use crate::store::primary::MemoryStorage;
    use crate::telemetry::FlightEvent;
    use core::cell::Cell;
    use serde::{Deserialize, Serialize};

    type Eeprom = MemoryStorage<255>;
    type Secondary = WriteSink<Vec<u8>>;
    type ByteStore<'a> = PersistentStore<RawCodec<1>, &'a mut Eeprom, &'a mut Secondary>;

    fn byte_store<'a>(eeprom: &'a mut Eeprom, secondary: &'a mut Secondary) -> ByteStore<'a> {
        PersistentStore::new(RawCodec::<1>, eeprom, secondary).unwrap()
    }

    fn sink() -> Secondary {
        WriteSink::new(Vec::new())
    }

    /// Sink whose appends always fail
    struct BrokenCard;

    impl ByteSink for BrokenCard {
        type Error = ();

        fn append(&mut self, _bytes: &[u8]) -> Result<(), ()> {
            Err(())
        }
    }

    /// Medium that fails every write once its write budget is spent
    struct BrownoutEeprom<'a> {
        inner: &'a mut Eeprom,
        writes_left: &'a Cell<usize>,
    }

    impl PrimaryStorage for BrownoutEeprom<'_> {
        type Error = &'static str;

        fn len(&self) -> usize {
            self.inner.len()
        }

        fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), Self::Error> {
            self.inner.read_at(offset, buf).map_err(|_| "read")
        }

        fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<(), Self::Error> {
            if self.writes_left.get() == 0 {
                return Err("brownout");
            }
            self.writes_left.set(self.writes_left.get() - 1);
            self.inner.write_at(offset, bytes).map_err(|_| "write")
        }
    }

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    struct Mission {
        phase: FlightEvent,
        armed: bool,
    }

    #[test]
    fn test_uninitialized_store_refuses_access() {
        let mut eeprom = Eeprom::default();
        let mut secondary = sink();
        let mut store = byte_store(&mut eeprom, &mut secondary);

        assert_eq!(store.state(), Err(StoreError::NotInitialized));
        assert_eq!(store.write_count(), Err(StoreError::NotInitialized));
        assert_eq!(store.set_state([1]), Err(StoreError::NotInitialized));
        assert_eq!(store.flush(), Err(StoreError::NotInitialized));
    }

    #[test]
    fn test_zeroed_medium_falls_back() {
        let mut eeprom = Eeprom::filled_with(0);
        let mut secondary = sink();
        let mut store = byte_store(&mut eeprom, &mut secondary);

        let outcome = store.initialize([123]).unwrap();
        assert_eq!(outcome, BootOutcome::Fallback(Corruption::MagicMismatch));
        assert_eq!(store.state(), Ok(&[123]));
        assert_eq!(store.write_count(), Ok(1));
    }

    #[test]
    fn test_garbage_medium_falls_back() {
        let mut eeprom = Eeprom::filled_with(42);
        let mut secondary = sink();
        let mut store = byte_store(&mut eeprom, &mut secondary);

        assert!(matches!(
            store.initialize([123]),
            Ok(BootOutcome::Fallback(_))
        ));
        assert_eq!(store.state(), Ok(&[123]));
    }

    #[test]
    fn test_bad_count_falls_back() {
        let mut eeprom = Eeprom::filled_with(42);
        let header = StoreHeader {
            crc: 0,
            magic: 0x451B,
            write_count: 0,
        };
        eeprom.write_at(0, &header.to_bytes()).unwrap();
        let mut secondary = sink();
        let mut store = byte_store(&mut eeprom, &mut secondary);

        assert_eq!(
            store.initialize([9]).unwrap(),
            BootOutcome::Fallback(Corruption::CountOutOfRange)
        );
    }

    #[test]
    fn test_wrong_crc_falls_back() {
        let mut eeprom = Eeprom::filled_with(42);
        let header = StoreHeader {
            crc: 0xDEAD_BEEF,
            magic: 0x451B,
            write_count: 14,
        };
        eeprom.write_at(0, &header.to_bytes()).unwrap();
        let mut secondary = sink();
        let mut store = byte_store(&mut eeprom, &mut secondary);

        assert_eq!(
            store.initialize([9]).unwrap(),
            BootOutcome::Fallback(Corruption::CrcMismatch)
        );
        assert_eq!(store.state(), Ok(&[9]));
    }

    #[test]
    fn test_set_then_get() {
        let mut eeprom = Eeprom::default();
        let mut secondary = sink();
        let mut store = byte_store(&mut eeprom, &mut secondary);
        store.initialize([0]).unwrap();

        for value in [1u8, 200, 0, 255] {
            store.set_state([value]).unwrap();
            assert_eq!(store.state(), Ok(&[value]));
        }
    }

    #[test]
    fn test_fresh_instance_restores_last_commit() {
        let mut eeprom = Eeprom::default();
        let mut secondary = sink();

        {
            let mut store = byte_store(&mut eeprom, &mut secondary);
            store.initialize([0]).unwrap();
        }

        // runs through several flushes of the 247-record log
        for i in 0..1_000u32 {
            let value = (i * 3 % 256) as u8;
            {
                let mut store = byte_store(&mut eeprom, &mut secondary);
                assert!(matches!(
                    store.initialize([0]),
                    Ok(BootOutcome::Restored { .. })
                ));
                store.set_state([value]).unwrap();
            }

            let mut store = byte_store(&mut eeprom, &mut secondary);
            assert!(matches!(
                store.initialize([0]),
                Ok(BootOutcome::Restored { .. })
            ));
            assert_eq!(store.state(), Ok(&[value]));
        }
    }

    #[test]
    fn test_fills_up_and_flushes() {
        let mut eeprom = Eeprom::default();
        let mut secondary = sink();

        {
            let mut store = byte_store(&mut eeprom, &mut secondary);
            assert_eq!(store.capacity(), 255 - HEADER_SIZE);
            store.initialize([0]).unwrap();

            // 255 - 8 - 1 records in total, counting the fallback record
            for i in 1..(255 - HEADER_SIZE - 1) {
                store.set_state([i as u8]).unwrap();
                assert!(!store.filled());
            }
            assert_eq!(store.write_count(), Ok(246));

            // the last free slot
            store.set_state([42]).unwrap();
            assert!(store.filled());
            assert_eq!(store.write_count(), Ok(247));

            // full: this one drains the log first
            store.set_state([43]).unwrap();
            assert!(!store.filled());
            assert_eq!(store.write_count(), Ok(1));
            assert_eq!(store.state(), Ok(&[43]));
        }

        let drained = secondary.into_inner();
        assert_eq!(drained.len(), 2 + 247);
        assert_eq!(u16::from_le_bytes([drained[0], drained[1]]), 247);
        assert_eq!(drained[2], 0);
        assert_eq!(drained[3], 1);
        assert_eq!(drained[drained.len() - 1], 42);
    }

    #[test]
    fn test_flush_failure_leaves_store_unchanged() {
        let mut eeprom = Eeprom::default();
        let mut card = BrokenCard;
        let mut store = PersistentStore::new(RawCodec::<1>, &mut eeprom, &mut card).unwrap();
        store.initialize([0]).unwrap();
        while !store.filled() {
            store.set_state([7]).unwrap();
        }

        assert_eq!(store.set_state([8]), Err(StoreError::Exhausted));
        assert_eq!(store.write_count(), Ok(247));
        assert_eq!(store.state(), Ok(&[7]));
        assert_eq!(store.flush(), Err(StoreError::Secondary));
    }

    #[test]
    fn test_manual_flush_keeps_state_recoverable() {
        let mut eeprom = Eeprom::default();
        let mut secondary = sink();

        {
            let mut store = byte_store(&mut eeprom, &mut secondary);
            store.initialize([0]).unwrap();
            store.set_state([5]).unwrap();
            store.set_state([6]).unwrap();
            store.flush().unwrap();
            assert_eq!(store.write_count(), Ok(1));
        }
        assert_eq!(secondary.get_ref().as_slice(), &[3, 0, 0, 5, 6]);

        let mut store = byte_store(&mut eeprom, &mut secondary);
        assert_eq!(
            store.initialize([0]).unwrap(),
            BootOutcome::Restored { write_count: 1 }
        );
        assert_eq!(store.state(), Ok(&[6]));
    }

    #[test]
    fn test_record_without_header_is_ignored() {
        let mut eeprom = Eeprom::default();
        let mut secondary = sink();
        {
            let mut store = byte_store(&mut eeprom, &mut secondary);
            store.initialize([0]).unwrap();
            store.set_state([10]).unwrap();
        }

        // power lost after the record write, before the header write
        eeprom.write_at(HEADER_SIZE + 2, &[99]).unwrap();

        let mut store = byte_store(&mut eeprom, &mut secondary);
        assert_eq!(
            store.initialize([0]).unwrap(),
            BootOutcome::Restored { write_count: 2 }
        );
        assert_eq!(store.state(), Ok(&[10]));
    }

    #[test]
    fn test_torn_header_is_detected() {
        let mut eeprom = Eeprom::default();
        let mut secondary = sink();
        {
            let mut store = byte_store(&mut eeprom, &mut secondary);
            store.initialize([0]).unwrap();
            store.set_state([10]).unwrap();
        }

        // new count landed, new crc did not
        eeprom.write_at(6, &3u16.to_le_bytes()).unwrap();
        eeprom.write_at(HEADER_SIZE + 2, &[99]).unwrap();

        let mut store = byte_store(&mut eeprom, &mut secondary);
        assert_eq!(
            store.initialize([1]).unwrap(),
            BootOutcome::Fallback(Corruption::CrcMismatch)
        );
        assert_eq!(store.state(), Ok(&[1]));
    }

    #[test]
    fn test_failed_header_write_keeps_previous_state() {
        let mut eeprom = Eeprom::default();
        let mut secondary = sink();
        {
            let mut store = byte_store(&mut eeprom, &mut secondary);
            store.initialize([0]).unwrap();
            store.set_state([10]).unwrap();
        }

        {
            // one full commit, then the record of the next one
            let budget = Cell::new(3);
            let flaky = BrownoutEeprom {
                inner: &mut eeprom,
                writes_left: &budget,
            };
            let mut store = PersistentStore::new(RawCodec::<1>, flaky, &mut secondary).unwrap();
            assert!(matches!(
                store.initialize([0]),
                Ok(BootOutcome::Restored { write_count: 2 })
            ));
            assert_eq!(store.set_state([11]), Ok(()));
            assert_eq!(store.set_state([12]), Err(StoreError::Primary));
            assert_eq!(store.state(), Ok(&[11]));
            assert_eq!(store.write_count(), Ok(3));
        }

        let mut store = byte_store(&mut eeprom, &mut secondary);
        store.initialize([0]).unwrap();
        assert_eq!(store.state(), Ok(&[11]));
    }

    #[test]
    fn test_failed_write_after_drain_restarts_log() {
        let mut eeprom = Eeprom::default();
        let mut secondary = sink();
        {
            let mut store = byte_store(&mut eeprom, &mut secondary);
            store.initialize([0]).unwrap();
            while !store.filled() {
                store.set_state([7]).unwrap();
            }
        }

        {
            // record 0 of the next commit lands, its header does not
            let budget = Cell::new(1);
            let flaky = BrownoutEeprom {
                inner: &mut eeprom,
                writes_left: &budget,
            };
            let mut store = PersistentStore::new(RawCodec::<1>, flaky, &mut secondary).unwrap();
            assert!(matches!(
                store.initialize([0]),
                Ok(BootOutcome::Restored { write_count: 247 })
            ));

            assert_eq!(store.set_state([8]), Err(StoreError::Primary));
            assert_eq!(store.write_count(), Ok(0));
            assert!(!store.filled());
            assert_eq!(store.state(), Ok(&[7]));

            // the retry appends to the fresh log instead of draining again
            budget.set(usize::MAX);
            store.set_state([9]).unwrap();
            assert_eq!(store.write_count(), Ok(1));
        }
        assert_eq!(secondary.get_ref().len(), 2 + 247);

        let mut store = byte_store(&mut eeprom, &mut secondary);
        assert_eq!(
            store.initialize([0]).unwrap(),
            BootOutcome::Restored { write_count: 1 }
        );
        assert_eq!(store.state(), Ok(&[9]));
    }

    #[test]
    fn test_undecodable_newest_record_is_trimmed() {
        const N: usize = 4;
        let codec = PostcardCodec::<Mission, N>::new();
        let mut eeprom = Eeprom::default();

        let mut good = [0u8; N];
        codec
            .encode(
                &Mission {
                    phase: FlightEvent::Liftoff,
                    armed: true,
                },
                &mut good,
            )
            .unwrap();
        let torn = [0x7Fu8; N];
        assert_eq!(codec.decode(&torn), Err(CodecError::Decode));

        let mut body = [0u8; 2 * N];
        body[..N].copy_from_slice(&good);
        body[N..].copy_from_slice(&torn);
        let header = StoreHeader {
            crc: crc32(&body),
            magic: 0x451B,
            write_count: 2,
        };
        eeprom.write_at(0, &header.to_bytes()).unwrap();
        eeprom.write_at(HEADER_SIZE, &body).unwrap();

        let fallback = Mission {
            phase: FlightEvent::None,
            armed: false,
        };
        let mut secondary = sink();
        {
            let mut store = PersistentStore::new(codec, &mut eeprom, &mut secondary).unwrap();
            assert_eq!(
                store.initialize(fallback.clone()).unwrap(),
                BootOutcome::Fallback(Corruption::TornRecord)
            );
            assert_eq!(store.write_count(), Ok(2));
            assert_eq!(store.state(), Ok(&fallback));
        }

        // the good record survived, the fallback replaced the torn one
        assert_eq!(&eeprom.as_bytes()[HEADER_SIZE..HEADER_SIZE + N], &good);
        let mut store =
            PersistentStore::new(PostcardCodec::<Mission, N>::new(), &mut eeprom, &mut secondary)
                .unwrap();
        assert_eq!(
            store.initialize(Mission {
                phase: FlightEvent::Touchdown,
                armed: false,
            })
            .unwrap(),
            BootOutcome::Restored { write_count: 2 }
        );
        assert_eq!(store.state(), Ok(&fallback));
    }

    #[test]
    fn test_medium_too_small() {
        let mut eeprom = MemoryStorage::<8>::default();
        let mut secondary = sink();
        assert!(matches!(
            PersistentStore::new(RawCodec::<1>, &mut eeprom, &mut secondary),
            Err(StoreError::TooSmall { needed: 9 })
        ));
    }
}
