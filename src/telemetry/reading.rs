//! Decoded telemetry snapshot and its wire field layout.

use super::event::FlightEvent;

/// Number of comma separated fields in one frame
pub const NUM_FIELDS: usize = 21;

/// Number of fixed-point integer fields (fields 1..=16)
pub const NUM_MICRO_FIELDS: usize = 16;

/// Number of flag fields (fields 17..=20)
pub const NUM_FLAG_FIELDS: usize = 4;

/// Wire index of the elapsed time field, the only one allowed to carry a `.`
pub const ELAPSED_FIELD: usize = 1;

/// One fully validated telemetry frame.
///
/// All quantities are fixed-point integers in micro-units, e.g.
/// 12.5 m of altitude is `12_500_000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Reading {
    pub event: FlightEvent,
    /// Milliseconds since boot of the flight computer
    pub elapsed: i64,
    /// Micrometers
    pub altitude: i64,
    /// Micrometers
    pub gps_altitude: i64,
    /// Micrometers per second
    pub vx: i64,
    pub vy: i64,
    pub vz: i64,
    /// Micrometers per second squared
    pub a_total: i64,
    pub ax: i64,
    pub ay: i64,
    pub az: i64,
    /// Microradians
    pub phi: i64,
    pub theta: i64,
    pub psi: i64,
    /// Microradians
    pub ang_x: i64,
    pub ang_y: i64,
    pub ang_z: i64,
    pub launch_imminent: bool,
    pub drogue_chute_imminent: bool,
    pub landing_imminent: bool,
    pub chute_fault_warning: bool,
}

type MicroField = fn(&mut Reading) -> &mut i64;
type FlagField = fn(&mut Reading) -> &mut bool;

/// Accessors for wire fields 1..=16, in wire order.
const MICRO_FIELDS: [MicroField; NUM_MICRO_FIELDS] = [
    |r| &mut r.elapsed,
    |r| &mut r.altitude,
    |r| &mut r.gps_altitude,
    |r| &mut r.vx,
    |r| &mut r.vy,
    |r| &mut r.vz,
    |r| &mut r.a_total,
    |r| &mut r.ax,
    |r| &mut r.ay,
    |r| &mut r.az,
    |r| &mut r.phi,
    |r| &mut r.theta,
    |r| &mut r.psi,
    |r| &mut r.ang_x,
    |r| &mut r.ang_y,
    |r| &mut r.ang_z,
];

/// Accessors for wire fields 17..=20, in wire order.
const FLAG_FIELDS: [FlagField; NUM_FLAG_FIELDS] = [
    |r| &mut r.launch_imminent,
    |r| &mut r.drogue_chute_imminent,
    |r| &mut r.landing_imminent,
    |r| &mut r.chute_fault_warning,
];

/// What a wire field index holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Event,
    Micro(usize),
    Flag(usize),
    /// Past the end of the frame layout
    Extra,
}

impl FieldKind {
    pub const fn of(field: usize) -> Self {
        if field == 0 {
            Self::Event
        } else if field <= NUM_MICRO_FIELDS {
            Self::Micro(field - 1)
        } else if field < NUM_FIELDS {
            Self::Flag(field - 1 - NUM_MICRO_FIELDS)
        } else {
            Self::Extra
        }
    }
}

impl Reading {
    /// Mutable access to the `n`th fixed-point field (0-based, wire order)
    pub fn micro_mut(&mut self, n: usize) -> Option<&mut i64> {
        MICRO_FIELDS.get(n).map(|field| field(self))
    }

    /// Mutable access to the `n`th flag (0-based, wire order)
    pub fn flag_mut(&mut self, n: usize) -> Option<&mut bool> {
        FLAG_FIELDS.get(n).map(|field| field(self))
    }

    /// All fixed-point fields in wire order
    pub fn micros(&self) -> [i64; NUM_MICRO_FIELDS] {
        let mut copy = *self;
        core::array::from_fn(|n| *MICRO_FIELDS[n](&mut copy))
    }

    /// All flags in wire order
    pub fn flags(&self) -> [bool; NUM_FLAG_FIELDS] {
        let mut copy = *self;
        core::array::from_fn(|n| *FLAG_FIELDS[n](&mut copy))
    }
}
