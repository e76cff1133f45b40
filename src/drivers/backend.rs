//! Device backend contracts.
//!
//! Port expanders and ADCs are external collaborators: the controller only
//! needs their per-pin operations, not their bus protocols.  Concrete
//! chips (or the simulated rigs in [`adapters::sim`](crate::adapters::sim))
//! implement these traits and are handed to the HAL at startup.

use core::fmt;

use embedded_hal::digital::PinState;

use crate::pins::PinDirection;

/// Errors reported by a backend chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendError {
    /// Bus transaction failed (NACK, arbitration loss, short).
    Bus,
    /// The chip does not have this pin/channel.
    InvalidPin(u8),
    /// The chip did not answer in time.
    Timeout,
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus => write!(f, "bus error"),
            Self::InvalidPin(p) => write!(f, "invalid pin {p}"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// A 16-pin digital port expander.
pub trait ExpanderBackend: Send {
    fn configure(&mut self, pin: u8, direction: PinDirection) -> Result<(), BackendError>;

    fn write(&mut self, pin: u8, state: PinState) -> Result<(), BackendError>;

    fn read(&mut self, pin: u8) -> Result<PinState, BackendError>;

    fn set_pullup(&mut self, pin: u8, enabled: bool) -> Result<(), BackendError>;
}

/// A multi-channel analog-to-digital converter.
pub trait AdcBackend: Send {
    /// Raw conversion result for `channel`.
    fn read_raw(&mut self, channel: u8) -> Result<u16, BackendError>;

    /// Code corresponding to full-scale input (1023 for a 10-bit part).
    fn full_scale(&self) -> u16 {
        1023
    }
}

/// Backend instances in configuration order.  Index `i` of each vector
/// serves `PinAddress { index: i, .. }` of the matching kind.
#[derive(Default)]
pub struct Backends {
    pub expanders: Vec<Box<dyn ExpanderBackend>>,
    pub adcs: Vec<Box<dyn AdcBackend>>,
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backends")
            .field("expanders", &self.expanders.len())
            .field("adcs", &self.adcs.len())
            .finish()
    }
}
