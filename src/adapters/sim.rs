//! In-memory backend chips for tests and bench runs.
//!
//! Both rigs are cheap handles over shared state: clone one, hand the
//! clone to the [`IoBus`](crate::drivers::io::IoBus), and keep the
//! original to set inputs and inspect outputs from the outside.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use embedded_hal::digital::PinState;

use crate::app::state::lock;
use crate::drivers::backend::{AdcBackend, BackendError, ExpanderBackend};
use crate::pins::{ADC_CHANNEL_COUNT, EXPANDER_PIN_COUNT, PinDirection};

// ───────────────────────────────────────────────────────────────
// Port expander
// ───────────────────────────────────────────────────────────────

#[derive(Clone)]
struct PinSim {
    direction: PinDirection,
    output: PinState,
    input: PinState,
    pullup: bool,
    writes: Vec<PinState>,
}

impl Default for PinSim {
    fn default() -> Self {
        Self {
            direction: PinDirection::Input,
            output: PinState::Low,
            input: PinState::Low,
            pullup: false,
            writes: Vec::new(),
        }
    }
}

#[derive(Default)]
struct ExpanderSim {
    pins: [PinSim; EXPANDER_PIN_COUNT as usize],
    fail_reads: bool,
    fail_writes: bool,
}

/// Simulated 16-pin port expander.  Every write is recorded per pin.
#[derive(Clone, Default)]
pub struct SimExpander {
    inner: Arc<Mutex<ExpanderSim>>,
}

impl SimExpander {
    pub fn new() -> Self {
        Self::default()
    }

    /// Level the chip reports when `pin` is read.
    pub fn set_input(&self, pin: u8, state: PinState) {
        if let Some(p) = lock(&self.inner).pins.get_mut(pin as usize) {
            p.input = state;
        }
    }

    /// Last level written to `pin`.
    pub fn output(&self, pin: u8) -> PinState {
        lock(&self.inner).pins.get(pin as usize).map_or(PinState::Low, |p| p.output)
    }

    pub fn direction(&self, pin: u8) -> PinDirection {
        lock(&self.inner)
            .pins
            .get(pin as usize)
            .map_or(PinDirection::Input, |p| p.direction)
    }

    pub fn pullup(&self, pin: u8) -> bool {
        lock(&self.inner).pins.get(pin as usize).is_some_and(|p| p.pullup)
    }

    /// Every level written to `pin`, oldest first.
    pub fn writes(&self, pin: u8) -> Vec<PinState> {
        lock(&self.inner)
            .pins
            .get(pin as usize)
            .map(|p| p.writes.clone())
            .unwrap_or_default()
    }

    /// Make every read fail with a bus error.
    pub fn fail_reads(&self, fail: bool) {
        lock(&self.inner).fail_reads = fail;
    }

    /// Make every write, configure and pull-up call fail with a bus error.
    pub fn fail_writes(&self, fail: bool) {
        lock(&self.inner).fail_writes = fail;
    }
}

fn pin_mut(sim: &mut ExpanderSim, pin: u8) -> Result<&mut PinSim, BackendError> {
    sim.pins.get_mut(pin as usize).ok_or(BackendError::InvalidPin(pin))
}

impl ExpanderBackend for SimExpander {
    fn configure(&mut self, pin: u8, direction: PinDirection) -> Result<(), BackendError> {
        let mut sim = lock(&self.inner);
        if sim.fail_writes {
            return Err(BackendError::Bus);
        }
        pin_mut(&mut sim, pin)?.direction = direction;
        Ok(())
    }

    fn write(&mut self, pin: u8, state: PinState) -> Result<(), BackendError> {
        let mut sim = lock(&self.inner);
        if sim.fail_writes {
            return Err(BackendError::Bus);
        }
        let p = pin_mut(&mut sim, pin)?;
        p.output = state;
        p.writes.push(state);
        Ok(())
    }

    fn read(&mut self, pin: u8) -> Result<PinState, BackendError> {
        let mut sim = lock(&self.inner);
        if sim.fail_reads {
            return Err(BackendError::Bus);
        }
        Ok(pin_mut(&mut sim, pin)?.input)
    }

    fn set_pullup(&mut self, pin: u8, enabled: bool) -> Result<(), BackendError> {
        let mut sim = lock(&self.inner);
        if sim.fail_writes {
            return Err(BackendError::Bus);
        }
        pin_mut(&mut sim, pin)?.pullup = enabled;
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// ADC
// ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct AdcSim {
    raw: [u16; ADC_CHANNEL_COUNT as usize],
    scripts: [VecDeque<u16>; ADC_CHANNEL_COUNT as usize],
    fail: bool,
}

/// Simulated 8-channel, 10-bit ADC.
#[derive(Clone, Default)]
pub struct SimAdc {
    inner: Arc<Mutex<AdcSim>>,
}

impl SimAdc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Steady conversion result for `channel`.
    pub fn set_raw(&self, channel: u8, raw: u16) {
        if let Some(v) = lock(&self.inner).raw.get_mut(channel as usize) {
            *v = raw;
        }
    }

    /// Results returned by the next conversions on `channel`, before the
    /// steady value takes over again.
    pub fn script(&self, channel: u8, values: &[u16]) {
        if let Some(q) = lock(&self.inner).scripts.get_mut(channel as usize) {
            q.extend(values.iter().copied());
        }
    }

    pub fn fail(&self, fail: bool) {
        lock(&self.inner).fail = fail;
    }
}

impl AdcBackend for SimAdc {
    fn read_raw(&mut self, channel: u8) -> Result<u16, BackendError> {
        let mut sim = lock(&self.inner);
        if sim.fail {
            return Err(BackendError::Timeout);
        }
        let i = channel as usize;
        if i >= sim.raw.len() {
            return Err(BackendError::InvalidPin(channel));
        }
        let steady = sim.raw[i];
        Ok(sim.scripts[i].pop_front().unwrap_or(steady))
    }
}
