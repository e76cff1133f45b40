//! Water-level probes for stations and the source.
//!
//! Five probe variants, matched exhaustively:
//!
//! | Variant    | Pins                 | Reports                       |
//! |------------|----------------------|-------------------------------|
//! | `None`     | none                 | always `0` (needs fill)       |
//! | `Min`      | switch               | `0` empty, `0.5` otherwise    |
//! | `Max`      | switch               | `1` full, `0.5` otherwise     |
//! | `MinMax`   | min + max switches   | `0`, `0.5` or `1`             |
//! | `Gradient` | analog value + enable| continuous `0..=1`            |
//!
//! Every read powers the probe (pull-ups or enable pin), waits
//! [`SENSOR_SETTLE`], samples, and returns the probe to rest whatever the
//! sample produced.  Power draw is bounded to the sampling window.
//!
//! Switch polarity as wired: a single `Min` switch reads low when dry, a
//! single `Max` switch reads high when full, the `MinMax` pair reads high
//! on the min switch when dry and low on the max switch when full.

use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::PinState;
use serde::{Deserialize, Serialize};

use crate::drivers::io::IoBus;
use crate::drivers::timebase::pause;
use crate::error::HardwareError;
use crate::pins::PinAddress;

/// Level reported by every probe when no hardware is present.
pub const SIMULATED_LEVEL: f32 = 0.05;

/// Stabilization delay between powering a probe and sampling it.
pub const SENSOR_SETTLE: Duration = Duration::from_millis(100);

/// Gradient samples averaged after the discarded first conversion.
pub const GRADIENT_SAMPLES: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WaterLevelSensor {
    None,
    Min {
        pin: PinAddress,
    },
    Max {
        pin: PinAddress,
    },
    MinMax {
        min_pin: PinAddress,
        max_pin: PinAddress,
    },
    Gradient {
        value_pin: PinAddress,
        enable_pin: PinAddress,
    },
}

impl WaterLevelSensor {
    /// Whether the probe can report a level above "not empty".
    pub fn detects_full(&self) -> bool {
        !matches!(self, Self::None | Self::Min { .. })
    }

    /// Output pin that powers the probe, if any.
    pub fn enable_pin(&self) -> Option<PinAddress> {
        match self {
            Self::Gradient { enable_pin, .. } => Some(*enable_pin),
            _ => None,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::None => "no sensor attached",
            Self::Min { .. } => "sensor detects station is empty",
            Self::Max { .. } => "sensor detects station is full",
            Self::MinMax { .. } => "sensor detects station is empty or full",
            Self::Gradient { .. } => "sensor detects level of water",
        }
    }
}

/// Read a probe.  Returns a level in `[0, 1]`; the probe is back at rest
/// when this returns, whether the sample succeeded or not.
pub fn read_level<D: DelayNs + ?Sized>(
    io: &mut IoBus,
    delay: &mut D,
    sensor: &WaterLevelSensor,
) -> Result<f32, HardwareError> {
    if io.is_simulated() {
        return Ok(SIMULATED_LEVEL);
    }
    if *sensor == WaterLevelSensor::None {
        return Ok(0.0);
    }

    let sampled = power(io, sensor, true).and_then(|()| {
        pause(delay, SENSOR_SETTLE);
        sample(io, delay, sensor)
    });
    let rested = power(io, sensor, false);

    let level = sampled?;
    rested?;
    Ok(level.clamp(0.0, 1.0))
}

/// Put a probe at rest.  Used at startup and on shutdown.
pub fn rest(io: &mut IoBus, sensor: &WaterLevelSensor) -> Result<(), HardwareError> {
    power(io, sensor, false)
}

fn power(io: &mut IoBus, sensor: &WaterLevelSensor, on: bool) -> Result<(), HardwareError> {
    match *sensor {
        WaterLevelSensor::None => Ok(()),
        WaterLevelSensor::Min { pin } | WaterLevelSensor::Max { pin } => io.set_pullup(pin, on),
        WaterLevelSensor::MinMax { min_pin, max_pin } => {
            let min = io.set_pullup(min_pin, on);
            let max = io.set_pullup(max_pin, on);
            min.and(max)
        }
        WaterLevelSensor::Gradient { enable_pin, .. } => io.set(enable_pin, PinState::from(on)),
    }
}

fn sample<D: DelayNs + ?Sized>(
    io: &mut IoBus,
    delay: &mut D,
    sensor: &WaterLevelSensor,
) -> Result<f32, HardwareError> {
    match *sensor {
        WaterLevelSensor::None => Ok(0.0),
        WaterLevelSensor::Min { pin } => Ok(if io.is_high(pin)? { 0.5 } else { 0.0 }),
        WaterLevelSensor::Max { pin } => Ok(if io.is_high(pin)? { 1.0 } else { 0.5 }),
        WaterLevelSensor::MinMax { min_pin, max_pin } => {
            if io.is_high(min_pin)? {
                Ok(0.0)
            } else if !io.is_high(max_pin)? {
                Ok(1.0)
            } else {
                Ok(0.5)
            }
        }
        WaterLevelSensor::Gradient { value_pin, .. } => {
            pause(delay, SENSOR_SETTLE);
            io.get(value_pin)?;
            let mut sum = 0.0;
            for _ in 0..GRADIENT_SAMPLES {
                sum += io.get(value_pin)?;
            }
            Ok(sum / f32::from(GRADIENT_SAMPLES))
        }
    }
}
