//! Ambient sensors: temperature, humidity, pressure, rain, illuminance.
//!
//! Chip drivers are external collaborators that only honour the
//! [`AmbientSensor::measure`] contract.  Any error, or an absent sensor,
//! surfaces as [`SENTINEL`] instead of propagating; a flaky weather sensor
//! must not abort a control-loop tick.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Out-of-range value reported for unavailable ambient readings.
pub const SENTINEL: f32 = -300.0;

/// Rain sensor ratio above which it counts as raining.
pub const RAIN_THRESHOLD: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// Reading outside the chip's physical range.
    Range,
    /// Frame failed its checksum.
    Checksum,
    /// Chip did not answer after all retries.
    RetryExhausted,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range => write!(f, "reading out of range"),
            Self::Checksum => write!(f, "checksum error"),
            Self::RetryExhausted => write!(f, "retries exhausted"),
        }
    }
}

/// One measurement.  Combined chips (humidity, pressure) also report the
/// temperature they measured on the side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub value: f32,
    pub temperature: Option<f32>,
}

impl Reading {
    pub fn plain(value: f32) -> Self {
        Self {
            value,
            temperature: None,
        }
    }
}

/// Measurement contract for an ambient sensor chip.
pub trait AmbientSensor: Send {
    fn measure(&mut self) -> Result<Reading, SensorError>;
}

/// Ambient quantity, also used as the history entity name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbientKind {
    Temperature,
    Humidity,
    Pressure,
    Rain,
    Illuminance,
}

impl AmbientKind {
    pub const ALL: [Self; 5] = [
        Self::Temperature,
        Self::Humidity,
        Self::Pressure,
        Self::Rain,
        Self::Illuminance,
    ];

    /// Short name used for history files.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Temperature => "temp",
            Self::Humidity => "humid",
            Self::Pressure => "press",
            Self::Rain => "rain",
            Self::Illuminance => "illum",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Pressure => "pressure",
            Self::Rain => "rain",
            Self::Illuminance => "illuminance",
        }
    }
}

impl fmt::Display for AmbientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Latest ambient readings; [`SENTINEL`] where unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AmbientReadings {
    pub temperature: f32,
    pub humidity: f32,
    pub pressure: f32,
    pub rain: f32,
    pub illuminance: f32,
}

impl Default for AmbientReadings {
    fn default() -> Self {
        Self {
            temperature: SENTINEL,
            humidity: SENTINEL,
            pressure: SENTINEL,
            rain: SENTINEL,
            illuminance: SENTINEL,
        }
    }
}

impl AmbientReadings {
    pub fn get(&self, kind: AmbientKind) -> f32 {
        match kind {
            AmbientKind::Temperature => self.temperature,
            AmbientKind::Humidity => self.humidity,
            AmbientKind::Pressure => self.pressure,
            AmbientKind::Rain => self.rain,
            AmbientKind::Illuminance => self.illuminance,
        }
    }

    pub fn is_available(&self, kind: AmbientKind) -> bool {
        self.get(kind) > SENTINEL
    }
}

/// Installed ambient chip drivers.
#[derive(Default)]
pub struct AmbientDrivers {
    pub humidity: Option<Box<dyn AmbientSensor>>,
    pub pressure: Option<Box<dyn AmbientSensor>>,
    pub illuminance: Option<Box<dyn AmbientSensor>>,
}

/// Measure `sensor`, mapping absence and errors to `None`.
pub fn measure(sensor: Option<&mut Box<dyn AmbientSensor>>) -> Option<Reading> {
    let sensor = sensor?;
    match sensor.measure() {
        Ok(r) => Some(r),
        Err(e) => {
            log::debug!("ambient sensor unavailable: {e}");
            None
        }
    }
}
