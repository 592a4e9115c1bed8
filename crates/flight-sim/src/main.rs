//! Desktop replay tool for the flight computer core.
//!
//! Replays a captured telemetry file through the frame decoder on a simulated
//! millisecond clock, logs every dispatched flight event, and persists the
//! mission phase through a file-backed EEPROM image that overflows into an
//! append-only SD card log.
//!
//! # Capture format
//!
//! One frame per line, prefixed with the arrival time in milliseconds:
//!
//! ```text
//! # comment
//! 200 C,0.2,150000,149997,0,0,1200000,...
//! ```
//!
//! # Options
//!
//! | Flag            | Environment              | Default             |
//! |-----------------|--------------------------|---------------------|
//! | `--eeprom`      | `FLIGHT_SIM_EEPROM`      | `flight-sim.eeprom` |
//! | `--eeprom-size` | `FLIGHT_SIM_EEPROM_SIZE` | `1024`              |
//! | `--sd-log`      | `FLIGHT_SIM_SD_LOG`      | `flight-sim.sdlog`  |
//! | `--stale-ms`    | `FLIGHT_SIM_STALE_MS`    | `75`                |
//! | `--silence-ms`  | `FLIGHT_SIM_SILENCE_MS`  | `2`                 |

use std::cell::Cell;
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{Error, WrapErr, bail, eyre};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use flight_computer::config::{DecoderConfig, SILENCE_AFTER, STALE_AFTER};
use flight_computer::io::{ByteSink, ByteSource, Clock};
use flight_computer::store::{BootOutcome, PersistentStore, PostcardCodec, PrimaryStorage};
use flight_computer::telemetry::{EVENT_CODES, FlightEvent, FrameDecoder, Reading};

// ---------------------------------------------------------------------------
// Persisted state
// ---------------------------------------------------------------------------

/// State kept across power cycles.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
struct MissionState {
    phase: FlightEvent,
    /// Frames confirmed when the phase was entered
    #[serde(with = "postcard::fixint::le")]
    frames: u32,
    /// Replay clock when the phase was entered
    #[serde(with = "postcard::fixint::le")]
    entered_ms: u32,
}

/// Phase variant index (1 byte) plus two fixed-width u32s
const MISSION_RECORD_SIZE: usize = 9;

type MissionCodec = PostcardCodec<MissionState, MISSION_RECORD_SIZE>;

// ---------------------------------------------------------------------------
// Simulated hardware
// ---------------------------------------------------------------------------

/// Replay clock, advanced by the replay loop.
#[derive(Default)]
struct SimClock {
    now: Cell<u32>,
}

impl SimClock {
    fn set(&self, ms: u32) {
        self.now.set(ms);
    }
}

impl Clock for SimClock {
    fn now_ms(&self) -> u32 {
        self.now.get()
    }
}

/// UART receive buffer filled from the capture file.
#[derive(Default)]
struct ReplaySource {
    pending: VecDeque<u8>,
}

impl ReplaySource {
    fn feed(&mut self, bytes: &[u8]) {
        self.pending.extend(bytes);
    }

    fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl ByteSource for ReplaySource {
    fn read_byte(&mut self) -> Option<u8> {
        self.pending.pop_front()
    }
}

/// EEPROM image mirrored to a file on every write.
struct FileEeprom {
    path: PathBuf,
    image: Vec<u8>,
}

impl FileEeprom {
    /// Load `path`, or start from an erased (0xFF) image of `size` bytes.
    fn open(path: PathBuf, size: usize) -> io::Result<Self> {
        let image = match fs::read(&path) {
            Ok(mut bytes) => {
                bytes.resize(size, 0xFF);
                bytes
            }
            Err(e) if e.kind() == ErrorKind::NotFound => vec![0xFF; size],
            Err(e) => return Err(e),
        };
        Ok(Self { path, image })
    }

    fn range(&self, offset: usize, len: usize) -> io::Result<std::ops::Range<usize>> {
        match offset.checked_add(len) {
            Some(end) if end <= self.image.len() => Ok(offset..end),
            _ => Err(io::Error::new(
                ErrorKind::InvalidInput,
                "access beyond the end of the EEPROM image",
            )),
        }
    }
}

impl PrimaryStorage for FileEeprom {
    type Error = io::Error;

    fn len(&self) -> usize {
        self.image.len()
    }

    fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> io::Result<()> {
        let range = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.image[range]);
        Ok(())
    }

    fn write_at(&mut self, offset: usize, bytes: &[u8]) -> io::Result<()> {
        let range = self.range(offset, bytes.len())?;
        self.image[range].copy_from_slice(bytes);
        fs::write(&self.path, &self.image)
    }
}

/// SD card log opened in append mode.
struct AppendLog {
    file: File,
}

impl AppendLog {
    fn open(path: &PathBuf) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl ByteSink for AppendLog {
    type Error = io::Error;

    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)?;
        self.file.sync_data()
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[clap(about = "Replay captured flight computer telemetry")]
struct Args {
    /// Capture file, one `<t_ms> <frame>` per line
    capture: PathBuf,

    /// EEPROM image, created erased if missing
    #[clap(long, env = "FLIGHT_SIM_EEPROM", default_value = "flight-sim.eeprom")]
    eeprom: PathBuf,

    /// EEPROM size in bytes
    #[clap(long, env = "FLIGHT_SIM_EEPROM_SIZE", default_value_t = 1024)]
    eeprom_size: usize,

    /// Append-only SD card log receiving flushed records
    #[clap(long, env = "FLIGHT_SIM_SD_LOG", default_value = "flight-sim.sdlog")]
    sd_log: PathBuf,

    /// Mid-frame gap after which a partial frame is dropped
    #[clap(long, env = "FLIGHT_SIM_STALE_MS", default_value_t = STALE_AFTER.as_millis() as u32)]
    stale_ms: u32,

    /// Quiet time that ends a frame
    #[clap(long, env = "FLIGHT_SIM_SILENCE_MS", default_value_t = SILENCE_AFTER.as_millis() as u32)]
    silence_ms: u32,
}

impl Args {
    fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig {
            stale_after_ms: self.stale_ms,
            silence_after_ms: self.silence_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

/// Parse capture lines into `(arrival_ms, frame_bytes)` pairs.
fn parse_capture(text: &str) -> Result<Vec<(u32, &[u8])>, Error> {
    let mut entries: Vec<(u32, &[u8])> = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (time, frame) = line
            .split_once(' ')
            .ok_or_else(|| eyre!("line {}: expected `<t_ms> <frame>`", number + 1))?;
        let time: u32 = time
            .parse()
            .wrap_err_with(|| format!("line {}: bad timestamp {time:?}", number + 1))?;
        if entries.last().is_some_and(|&(last, _)| time < last) {
            bail!("line {}: timestamps go backwards", number + 1);
        }
        entries.push((time, frame.as_bytes()));
    }
    Ok(entries)
}

/// What a replay did.
#[derive(Debug, Default, PartialEq, Eq)]
struct ReplaySummary {
    frames_decoded: u32,
    frames_corrupted: u32,
    frames_stale: u32,
    /// Events dispatched, per event in wire code order
    dispatched: [u32; FlightEvent::COUNT],
    /// Records committed to the store
    commits: u32,
}

/// Poll once per simulated millisecond until `target`, skipping idle time.
fn replay_until(
    decoder: &mut FrameDecoder<'_, ReplaySource, &SimClock>,
    clock: &SimClock,
    target: u32,
) -> Vec<Reading> {
    let mut confirmed = Vec::new();
    loop {
        if let Some(reading) = decoder.poll() {
            confirmed.push(reading);
        }

        let now = clock.now_ms();
        if now >= target {
            return confirmed;
        }
        let busy = decoder.partial_frame().in_progress() || !decoder.source_mut().is_empty();
        clock.set(if busy { now + 1 } else { target });
    }
}

/// Feed `capture` through a decoder and persist every phase change.
fn replay<P, W>(
    capture: &[(u32, &[u8])],
    config: DecoderConfig,
    store: &mut PersistentStore<MissionCodec, P, W>,
) -> ReplaySummary
where
    P: PrimaryStorage,
    W: ByteSink,
{
    let counts: [Cell<u32>; FlightEvent::COUNT] = Default::default();
    let clock = SimClock::default();
    if let Some(&(first, _)) = capture.first() {
        clock.set(first);
    }

    let mut decoder = FrameDecoder::with_config(ReplaySource::default(), &clock, config);
    for (code, event) in EVENT_CODES {
        let counts = &counts;
        decoder
            .dispatcher_mut()
            .register(event, move |reading: &Reading| {
                let slot = &counts[event.index()];
                slot.set(slot.get() + 1);
                info!(
                    "[{}] {} at t={} altitude={}",
                    code as char, event, reading.elapsed, reading.altitude
                );
            });
    }

    let mut summary = ReplaySummary::default();
    let mut on_confirmed = |readings: Vec<Reading>, decoded: u32, now: u32| {
        for reading in readings {
            let Ok(current) = store.state() else {
                return;
            };
            if reading.event == current.phase {
                continue;
            }

            let next = MissionState {
                phase: reading.event,
                frames: decoded,
                entered_ms: now,
            };
            match store.set_state(next) {
                Ok(()) => summary.commits += 1,
                Err(e) => error!("failed to persist phase {}: {}", next.phase, e),
            }
        }
    };

    for &(time, frame) in capture {
        let readings = replay_until(&mut decoder, &clock, time);
        on_confirmed(readings, decoder.stats().frames_decoded, clock.now_ms());
        decoder.source_mut().feed(frame);
    }

    // let the last frame fall silent
    let tail = clock.now_ms().wrapping_add(config.stale_after_ms);
    let readings = replay_until(&mut decoder, &clock, tail);
    on_confirmed(readings, decoder.stats().frames_decoded, clock.now_ms());

    let stats = decoder.stats();
    summary.frames_decoded = stats.frames_decoded;
    summary.frames_corrupted = stats.frames_corrupted;
    summary.frames_stale = stats.frames_stale;
    drop(decoder);
    for (slot, count) in summary.dispatched.iter_mut().zip(&counts) {
        *slot = count.get();
    }
    summary
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn run(args: Args) -> Result<(), Error> {
    let text = fs::read_to_string(&args.capture)
        .wrap_err_with(|| format!("reading capture {}", args.capture.display()))?;
    let capture = parse_capture(&text)?;
    info!(
        "Replaying {} frames from {}",
        capture.len(),
        args.capture.display()
    );

    let eeprom = FileEeprom::open(args.eeprom.clone(), args.eeprom_size)
        .wrap_err_with(|| format!("opening EEPROM image {}", args.eeprom.display()))?;
    let sd_log = AppendLog::open(&args.sd_log)
        .wrap_err_with(|| format!("opening SD log {}", args.sd_log.display()))?;

    let mut store = PersistentStore::new(MissionCodec::new(), eeprom, sd_log)
        .map_err(|e| eyre!("EEPROM image unusable: {e}"))?;
    match store.initialize(MissionState::default()) {
        Ok(BootOutcome::Restored { write_count }) => info!(
            "Resuming from {:?} ({} records on EEPROM)",
            store.state().map(|s| s.phase),
            write_count
        ),
        Ok(BootOutcome::Fallback(reason)) => warn!("EEPROM rejected ({}), starting fresh", reason),
        Err(e) => bail!("cannot initialize EEPROM store: {e}"),
    }

    let summary = replay(&capture, args.decoder_config(), &mut store);

    for (code, event) in EVENT_CODES {
        let count = summary.dispatched[event.index()];
        if count > 0 {
            info!("  {} {:<22} x{}", code as char, event.label(), count);
        }
    }
    info!(
        "Decoded {} frames ({} corrupted, {} stale), {} state commits",
        summary.frames_decoded, summary.frames_corrupted, summary.frames_stale, summary.commits
    );
    if let Ok(state) = store.state() {
        info!("Final phase: {} (entered at {} ms)", state.phase, state.entered_ms);
    }
    Ok(())
}

fn main() -> Result<(), Error> {
    color_eyre::install()?;
    env_logger::init();

    let args = Args::parse();
    run(args)
}
