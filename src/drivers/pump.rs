//! Source pump driver.
//!
//! The pump is a single digital output (relay or MOSFET gate).  High runs
//! the pump, low stops it.
//!
//! ## Safety contract
//!
//! The pump must never be left running unattended.  The fill sequence and
//! the shutdown path both call [`SourcePump::stop`]; this driver is a dumb
//! actuator and only tracks what it was last told.

use embedded_hal::digital::PinState;

use crate::drivers::io::IoBus;
use crate::error::HardwareError;
use crate::pins::{PinAddress, PinDirection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Stopped,
    Running,
}

pub struct SourcePump {
    pin: PinAddress,
    state: PumpState,
}

impl SourcePump {
    pub fn new(pin: PinAddress) -> Self {
        Self {
            pin,
            state: PumpState::Stopped,
        }
    }

    /// Configure the pin as output and drive it low.
    pub fn init(&mut self, io: &mut IoBus) -> Result<(), HardwareError> {
        io.configure(self.pin, PinDirection::Output)?;
        self.stop(io)
    }

    pub fn start(&mut self, io: &mut IoBus) -> Result<(), HardwareError> {
        io.set(self.pin, PinState::High)?;
        self.state = PumpState::Running;
        Ok(())
    }

    /// Drive the pin low.  The tracked state only becomes `Stopped` once
    /// the backend accepted the write.
    pub fn stop(&mut self, io: &mut IoBus) -> Result<(), HardwareError> {
        io.set(self.pin, PinState::Low)?;
        self.state = PumpState::Stopped;
        Ok(())
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == PumpState::Running
    }

    pub fn pin(&self) -> PinAddress {
        self.pin
    }
}
