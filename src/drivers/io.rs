//! Pin address resolution.
//!
//! [`IoBus`] owns every backend instance and turns a [`PinAddress`] into a
//! call on the right chip.  Dispatch is purely by backend kind:
//!
//! | Kind       | configure | set | get                  | pull-up |
//! |------------|-----------|-----|----------------------|---------|
//! | `Direct`   | no-op     | no-op | `0.0`              | no-op   |
//! | `Expander` | chip      | chip  | `0.0` / `1.0`      | chip    |
//! | `AnalogIn` | no-op     | no-op | raw / full-scale   | no-op   |
//!
//! When no backends were registered at startup the bus runs in simulation
//! mode: every operation is a no-op and no chip is ever touched.

use embedded_hal::digital::PinState;

use crate::drivers::backend::{AdcBackend, Backends, ExpanderBackend};
use crate::error::HardwareError;
use crate::pins::{BackendKind, EXPANDER_PIN_COUNT, PinAddress, PinDirection};

pub struct IoBus {
    backends: Option<Backends>,
    /// Backend calls issued since construction.
    ops: u64,
}

impl IoBus {
    pub fn new(backends: Option<Backends>) -> Self {
        Self { backends, ops: 0 }
    }

    /// Bus without hardware: every operation takes the simulation path.
    pub fn simulated() -> Self {
        Self::new(None)
    }

    pub fn is_simulated(&self) -> bool {
        self.backends.is_none()
    }

    pub fn backend_ops(&self) -> u64 {
        self.ops
    }

    pub fn expander_count(&self) -> usize {
        self.backends.as_ref().map_or(0, |b| b.expanders.len())
    }

    /// Hand the backends back.  The bus is in simulation mode afterwards.
    pub fn release(&mut self) -> Option<Backends> {
        self.backends.take()
    }

    pub fn configure(&mut self, pin: PinAddress, direction: PinDirection) -> Result<(), HardwareError> {
        let Some(chip) = self.expander(pin)? else {
            return Ok(());
        };
        let res = chip.configure(pin.pin, direction);
        self.ops += 1;
        res.map_err(|error| HardwareError::Backend { pin, error })
    }

    pub fn set(&mut self, pin: PinAddress, state: PinState) -> Result<(), HardwareError> {
        let Some(chip) = self.expander(pin)? else {
            return Ok(());
        };
        let res = chip.write(pin.pin, state);
        self.ops += 1;
        res.map_err(|error| HardwareError::Backend { pin, error })
    }

    pub fn set_pullup(&mut self, pin: PinAddress, enabled: bool) -> Result<(), HardwareError> {
        let Some(chip) = self.expander(pin)? else {
            return Ok(());
        };
        let res = chip.set_pullup(pin.pin, enabled);
        self.ops += 1;
        res.map_err(|error| HardwareError::Backend { pin, error })
    }

    /// Read a pin.  Digital pins yield `0.0` or `1.0`, analog pins the
    /// normalized conversion ratio in `[0, 1]`.
    pub fn get(&mut self, pin: PinAddress) -> Result<f32, HardwareError> {
        match pin.kind {
            BackendKind::Direct => Ok(0.0),
            BackendKind::Expander => {
                let Some(chip) = self.expander(pin)? else {
                    return Ok(0.0);
                };
                let res = chip.read(pin.pin);
                self.ops += 1;
                match res {
                    Ok(PinState::High) => Ok(1.0),
                    Ok(PinState::Low) => Ok(0.0),
                    Err(error) => Err(HardwareError::Backend { pin, error }),
                }
            }
            BackendKind::AnalogIn => {
                let Some(adc) = self.adc(pin)? else {
                    return Ok(0.0);
                };
                let full = adc.full_scale().max(1);
                let res = adc.read_raw(pin.pin);
                self.ops += 1;
                let raw = res.map_err(|error| HardwareError::Backend { pin, error })?;
                Ok((f32::from(raw) / f32::from(full)).clamp(0.0, 1.0))
            }
        }
    }

    /// Digital read: `true` when the pin reads high.
    pub fn is_high(&mut self, pin: PinAddress) -> Result<bool, HardwareError> {
        Ok(self.get(pin)? > 0.5)
    }

    /// Startup default: every pin of every expander becomes an input.
    pub fn all_inputs(&mut self) -> Result<(), HardwareError> {
        for index in 0..self.expander_count() {
            for pin in 0..EXPANDER_PIN_COUNT {
                self.configure(PinAddress::expander(index as u8, pin), PinDirection::Input)?;
            }
        }
        Ok(())
    }

    // ── Internal ──────────────────────────────────────────────

    /// Expander serving `pin`, `None` for no-op kinds or simulation.
    fn expander(
        &mut self,
        pin: PinAddress,
    ) -> Result<Option<&mut (dyn ExpanderBackend + 'static)>, HardwareError> {
        if pin.kind != BackendKind::Expander {
            return Ok(None);
        }
        let Some(backends) = self.backends.as_mut() else {
            return Ok(None);
        };
        backends
            .expanders
            .get_mut(pin.index as usize)
            .map(|chip| Some(&mut **chip))
            .ok_or(HardwareError::NoSuchBackend(pin))
    }

    fn adc(&mut self, pin: PinAddress) -> Result<Option<&mut (dyn AdcBackend + 'static)>, HardwareError> {
        let Some(backends) = self.backends.as_mut() else {
            return Ok(None);
        };
        backends
            .adcs
            .get_mut(pin.index as usize)
            .map(|adc| Some(&mut **adc))
            .ok_or(HardwareError::NoSuchBackend(pin))
    }
}
