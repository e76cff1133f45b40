//! Sensor subsystem: water-level probes and the aggregating [`SensorHub`]
//! for ambient readings.
//!
//! The hub owns the ambient chip drivers and produces an
//! [`AmbientReadings`] each tick.  Individual failures surface as the
//! sentinel; a flaky weather sensor never fails the tick.

pub mod ambient;
pub mod water_level;

use crate::config::hardware::{AmbientConfig, TemperatureSource};
use crate::drivers::io::IoBus;
use ambient::{AmbientDrivers, AmbientReadings, RAIN_THRESHOLD, SENTINEL};

/// Aggregates the ambient sensor drivers.
pub struct SensorHub {
    config: AmbientConfig,
    drivers: AmbientDrivers,
}

impl SensorHub {
    /// Drivers for sensors the configuration does not list are ignored.
    pub fn new(config: AmbientConfig, drivers: AmbientDrivers) -> Self {
        Self { config, drivers }
    }

    pub fn config(&self) -> &AmbientConfig {
        &self.config
    }

    /// Read every installed ambient sensor.
    pub fn read_all(&mut self, io: &mut IoBus) -> AmbientReadings {
        let mut out = AmbientReadings::default();
        if io.is_simulated() {
            return out;
        }

        let humidity = if self.config.humidity.is_some() {
            ambient::measure(self.drivers.humidity.as_mut())
        } else {
            None
        };
        let pressure = if self.config.pressure {
            ambient::measure(self.drivers.pressure.as_mut())
        } else {
            None
        };

        if let Some(r) = humidity {
            out.humidity = r.value;
        }
        if let Some(r) = pressure {
            out.pressure = r.value;
        }
        let fused = match self.config.temperature {
            Some(TemperatureSource::Humidity) => humidity,
            Some(TemperatureSource::Pressure) => pressure,
            None => None,
        };
        out.temperature = fused.and_then(|r| r.temperature).unwrap_or(SENTINEL);

        if let Some(pin) = self.config.rain {
            out.rain = match io.get(pin) {
                Ok(ratio) if ratio > RAIN_THRESHOLD => 1.0,
                Ok(_) => 0.0,
                Err(e) => {
                    log::debug!("rain sensor unavailable: {e}");
                    SENTINEL
                }
            };
        }

        if self.config.illuminance.is_some() {
            if let Some(r) = ambient::measure(self.drivers.illuminance.as_mut()) {
                out.illuminance = r.value;
            }
        }
        out
    }
}
