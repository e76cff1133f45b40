//! Station valve driver.  High opens the valve, low closes it.

use embedded_hal::digital::PinState;

use crate::drivers::io::IoBus;
use crate::error::HardwareError;
use crate::pins::{PinAddress, PinDirection};

pub struct Valve {
    pin: PinAddress,
    open: bool,
}

impl Valve {
    pub fn new(pin: PinAddress) -> Self {
        Self { pin, open: false }
    }

    pub fn init(&mut self, io: &mut IoBus) -> Result<(), HardwareError> {
        io.configure(self.pin, PinDirection::Output)?;
        self.close(io)
    }

    pub fn open(&mut self, io: &mut IoBus) -> Result<(), HardwareError> {
        io.set(self.pin, PinState::High)?;
        self.open = true;
        Ok(())
    }

    pub fn close(&mut self, io: &mut IoBus) -> Result<(), HardwareError> {
        io.set(self.pin, PinState::Low)?;
        self.open = false;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}
