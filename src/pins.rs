//! Pin addressing across heterogeneous I/O backends.
//!
//! Every role in the hardware configuration (pump, valves, level probes,
//! rain sensor) is wired to exactly one [`PinAddress`].  The address names
//! the backend family, the instance within that family and the pin on it:
//!
//! ```text
//!   Direct   gpio:13       host GPIO, reserved (operations are no-ops)
//!   Expander expander0:5   16-pin I2C port expander #0, pin 5
//!   AnalogIn adc1:2        8-channel ADC #1, channel 2 (read-only)
//! ```
//!
//! Resolution of an address to a backend call lives in
//! [`IoBus`](crate::drivers::io::IoBus).

use core::fmt;

use serde::{Deserialize, Serialize};

/// Pins per port expander.
pub const EXPANDER_PIN_COUNT: u8 = 16;
/// Channels per ADC.
pub const ADC_CHANNEL_COUNT: u8 = 8;

/// Backend family serving a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Direct,
    Expander,
    AnalogIn,
}

/// One addressable bit (or analog channel) in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PinAddress {
    pub kind: BackendKind,
    /// Instance index within the backend family.  Always 0 for `Direct`.
    #[serde(default)]
    pub index: u8,
    pub pin: u8,
}

impl PinAddress {
    pub const fn direct(pin: u8) -> Self {
        Self {
            kind: BackendKind::Direct,
            index: 0,
            pin,
        }
    }

    pub const fn expander(index: u8, pin: u8) -> Self {
        Self {
            kind: BackendKind::Expander,
            index,
            pin,
        }
    }

    pub const fn analog(index: u8, pin: u8) -> Self {
        Self {
            kind: BackendKind::AnalogIn,
            index,
            pin,
        }
    }

    pub fn is_analog(&self) -> bool {
        self.kind == BackendKind::AnalogIn
    }

    /// Number of pins the backend family exposes per instance.
    pub fn pin_limit(&self) -> Option<u8> {
        match self.kind {
            BackendKind::Direct => None,
            BackendKind::Expander => Some(EXPANDER_PIN_COUNT),
            BackendKind::AnalogIn => Some(ADC_CHANNEL_COUNT),
        }
    }
}

impl fmt::Display for PinAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            BackendKind::Direct => write!(f, "gpio:{}", self.pin),
            BackendKind::Expander => write!(f, "expander{}:{}", self.index, self.pin),
            BackendKind::AnalogIn => write!(f, "adc{}:{}", self.index, self.pin),
        }
    }
}

/// Pin direction for [`IoBus::configure`](crate::drivers::io::IoBus::configure).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDirection {
    Input,
    Output,
}
