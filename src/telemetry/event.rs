//! Flight events and their one-character wire codes.

use serde::{Deserialize, Serialize};

/// Mission phase transition reported in field 0 of every telemetry frame.
///
/// Ordered by mission phase. The ordering carries no numeric meaning on the
/// wire; it is only used as a dispatch key.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum FlightEvent {
    #[default]
    None,
    EscapeEnabled,
    EscapeCommanded,
    Liftoff,
    MainEngineCutoff,
    SeparationCommanded,
    CoastStart,
    Apogee,
    CoastEnd,
    DrogueChutes,
    MainChutes,
    Touchdown,
    Safing,
    MissionEnd,
}

/// Wire code table (NanoRacks Feather Frame layout), in mission order.
///
/// Both the decoder and the dispatcher go through this table, so adding an
/// event is a one-line change.
pub const EVENT_CODES: [(u8, FlightEvent); FlightEvent::COUNT] = [
    (b'@', FlightEvent::None),
    (b'A', FlightEvent::EscapeEnabled),
    (b'B', FlightEvent::EscapeCommanded),
    (b'C', FlightEvent::Liftoff),
    (b'D', FlightEvent::MainEngineCutoff),
    (b'E', FlightEvent::SeparationCommanded),
    (b'F', FlightEvent::CoastStart),
    (b'G', FlightEvent::Apogee),
    (b'H', FlightEvent::CoastEnd),
    (b'I', FlightEvent::DrogueChutes),
    (b'J', FlightEvent::MainChutes),
    (b'K', FlightEvent::Touchdown),
    (b'L', FlightEvent::Safing),
    (b'M', FlightEvent::MissionEnd),
];

impl FlightEvent {
    /// Number of distinct events
    pub const COUNT: usize = 14;

    /// Look up the event for a wire code
    pub fn from_code(code: u8) -> Option<Self> {
        EVENT_CODES
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, event)| *event)
    }

    /// Wire code of this event
    pub fn code(self) -> u8 {
        EVENT_CODES[self.index()].0
    }

    /// Position in mission order, usable as a table index
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::EscapeEnabled => "escape enabled",
            Self::EscapeCommanded => "escape commanded",
            Self::Liftoff => "liftoff",
            Self::MainEngineCutoff => "main engine cutoff",
            Self::SeparationCommanded => "separation commanded",
            Self::CoastStart => "coast start",
            Self::Apogee => "apogee",
            Self::CoastEnd => "coast end",
            Self::DrogueChutes => "drogue chutes",
            Self::MainChutes => "main chutes",
            Self::Touchdown => "touchdown",
            Self::Safing => "safing",
            Self::MissionEnd => "mission end",
        }
    }
}

impl core::fmt::Display for FlightEvent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}
