//! Hardware configuration: what is wired where.
//!
//! Loaded once at startup from a JSON document and immutable afterwards.
//! [`HardwareConfig::validate`] runs the consistency checks in a fixed
//! order and reports the first one that fails:
//!
//! 1. no duplicate port expander addresses
//! 2. no duplicate ADC wiring tuples
//! 3. capacities, settle times and flow coefficients are sane
//! 4. every pin refers to a configured backend, is in range, is of a kind
//!    that can serve its role, and is claimed by exactly one role
//! 5. stations + 1 == water-level sensors (the extra one is the source's)
//! 6. the temperature fusion source, if any, is installed

use core::fmt;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::drivers::timebase::secs;
use crate::error::{ConfigError, HardwareError};
use crate::pins::{BackendKind, PinAddress};
use crate::sensors::water_level::WaterLevelSensor;

/// Longest pumping time the flow calibration may predict for a station.
pub const MAX_FILL_SECS: f64 = 6.0 * 3600.0;

/// Longest valve or source settle time.
pub const MAX_SETTLE_SECS: f64 = 600.0;

// ═══════════════════════════════════════════════════════════════
//  Document types
// ═══════════════════════════════════════════════════════════════

/// SPI wiring of one ADC.  The chip select is a direct GPIO and takes part
/// in the pin duplicate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdcWiring {
    pub clock: u8,
    pub miso: u8,
    pub mosi: u8,
    pub chip_select: u8,
}

impl fmt::Display for AdcWiring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(clk {}, miso {}, mosi {}, cs {})",
            self.clock, self.miso, self.mosi, self.chip_select
        )
    }
}

/// Which combined chip supplies the temperature reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureSource {
    Humidity,
    Pressure,
}

impl fmt::Display for TemperatureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Humidity => write!(f, "humidity sensor"),
            Self::Pressure => write!(f, "pressure sensor"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IlluminanceConfig {
    /// Address-select pin tied high.
    pub address_high: bool,
}

/// Installed ambient sensors.  Absent entries are not installed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbientConfig {
    pub temperature: Option<TemperatureSource>,
    /// Analog pin of the rain sensor.
    pub rain: Option<PinAddress>,
    /// Direct data pin of the humidity sensor.
    pub humidity: Option<PinAddress>,
    pub pressure: bool,
    pub illuminance: Option<IlluminanceConfig>,
}

/// `offset + linear·x + quadratic·x²`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowPolynomial {
    pub offset: f64,
    pub linear: f64,
    pub quadratic: f64,
}

impl FlowPolynomial {
    pub fn eval(&self, x: f64) -> f64 {
        self.offset + self.linear * x + self.quadratic * x * x
    }

    fn is_finite(&self) -> bool {
        self.offset.is_finite() && self.linear.is_finite() && self.quadratic.is_finite()
    }
}

fn settle_ok(s: f64) -> bool {
    s.is_finite() && (0.0..=MAX_SETTLE_SECS).contains(&s)
}

/// Shared water supply and its pump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Liters; `None` is an unlimited supply (mains, river).
    pub capacity_liters: Option<f64>,
    pub pin: PinAddress,
    /// Liters delivered after pumping for `x` seconds.
    pub flow_volume: FlowPolynomial,
    /// Seconds of pumping needed to deliver `x` liters.
    pub flow_time: FlowPolynomial,
    /// Time for flow to stop after the pump is switched off.
    pub settle_secs: f64,
}

impl SourceConfig {
    pub fn is_unlimited(&self) -> bool {
        self.capacity_liters.is_none()
    }

    /// Expected pumping time for `liters`.  Independent calibration from
    /// [`flow_volume_for`](Self::flow_volume_for); the two are not inverses.
    pub fn flow_time_for(&self, liters: f64) -> Result<Duration, HardwareError> {
        secs(self.flow_time.eval(liters))
    }

    /// Liters delivered in `elapsed` pumping time.
    pub fn flow_volume_for(&self, elapsed: Duration) -> f64 {
        self.flow_volume.eval(elapsed.as_secs_f64())
    }

    pub fn settle(&self) -> Result<Duration, HardwareError> {
        secs(self.settle_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
    pub capacity_liters: f64,
    /// Valve pin.
    pub pin: PinAddress,
    pub settle_secs: f64,
}

impl StationConfig {
    pub fn settle(&self) -> Result<Duration, HardwareError> {
        secs(self.settle_secs)
    }
}

/// The complete wiring description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareConfig {
    /// I2C addresses of the port expanders, in index order.
    pub expanders: Vec<u8>,
    /// ADC wiring, in index order.
    #[serde(default)]
    pub adcs: Vec<AdcWiring>,
    #[serde(default)]
    pub rtc: bool,
    #[serde(default)]
    pub ambient: AmbientConfig,
    pub source: SourceConfig,
    pub stations: Vec<StationConfig>,
    /// One per station, then one for the source.
    pub level_sensors: Vec<WaterLevelSensor>,
}

// ═══════════════════════════════════════════════════════════════
//  Loading and validation
// ═══════════════════════════════════════════════════════════════

/// What a pin is used for, as far as the kind check is concerned.
#[derive(Clone, Copy, PartialEq, Eq)]
enum PinUse {
    /// Driven output or switch input; needs a digital backend.
    Digital,
    Analog,
    Direct,
}

impl HardwareConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate the document at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    pub fn station_sensor(&self, station: usize) -> Option<&WaterLevelSensor> {
        if station < self.stations.len() {
            self.level_sensors.get(station)
        } else {
            None
        }
    }

    /// The source's probe is the last entry.
    pub fn source_sensor(&self) -> Option<&WaterLevelSensor> {
        self.level_sensors.last()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.check_expanders()?;
        self.check_adcs()?;
        self.check_numbers()?;
        self.check_pins()?;
        if self.stations.len() + 1 != self.level_sensors.len() {
            return Err(ConfigError::SensorCountMismatch {
                stations: self.stations.len(),
                sensors: self.level_sensors.len(),
            });
        }
        if let Some(src) = self.ambient.temperature {
            let present = match src {
                TemperatureSource::Humidity => self.ambient.humidity.is_some(),
                TemperatureSource::Pressure => self.ambient.pressure,
            };
            if !present {
                return Err(ConfigError::TemperatureSourceMissing(src));
            }
        }
        Ok(())
    }

    fn check_expanders(&self) -> Result<(), ConfigError> {
        for (i, addr) in self.expanders.iter().enumerate() {
            if self.expanders[..i].contains(addr) {
                return Err(ConfigError::DuplicateExpanderAddress(*addr));
            }
        }
        Ok(())
    }

    fn check_adcs(&self) -> Result<(), ConfigError> {
        for (i, wiring) in self.adcs.iter().enumerate() {
            if self.adcs[..i].contains(wiring) {
                return Err(ConfigError::DuplicateAdcWiring(*wiring));
            }
        }
        Ok(())
    }

    fn check_numbers(&self) -> Result<(), ConfigError> {
        let src = &self.source;
        if let Some(cap) = src.capacity_liters {
            if !(cap.is_finite() && cap > 0.0) {
                return Err(ConfigError::ValidationFailed("source capacity must be positive"));
            }
        }
        if !settle_ok(src.settle_secs) {
            return Err(ConfigError::ValidationFailed(
                "source settle time must be between 0 and 600 s",
            ));
        }
        if !src.flow_time.is_finite() || !src.flow_volume.is_finite() {
            return Err(ConfigError::ValidationFailed("flow coefficients must be finite"));
        }
        for st in &self.stations {
            if !(st.capacity_liters.is_finite() && st.capacity_liters > 0.0) {
                return Err(ConfigError::ValidationFailed("station capacity must be positive"));
            }
            if !settle_ok(st.settle_secs) {
                return Err(ConfigError::ValidationFailed(
                    "station settle time must be between 0 and 600 s",
                ));
            }
            let fill = src.flow_time.eval(st.capacity_liters);
            if !(fill.is_finite() && fill <= MAX_FILL_SECS) {
                return Err(ConfigError::ValidationFailed(
                    "predicted fill time must not exceed 6 hours",
                ));
            }
        }
        Ok(())
    }

    fn check_pins(&self) -> Result<(), ConfigError> {
        let mut claimed: HashMap<PinAddress, String> = HashMap::new();
        for (pin, role, usage) in self.pin_roles() {
            self.check_pin(pin, &role, usage)?;
            if claimed.contains_key(&pin) {
                return Err(ConfigError::DuplicatePin { pin, role });
            }
            claimed.insert(pin, role);
        }
        Ok(())
    }

    fn check_pin(&self, pin: PinAddress, role: &str, usage: PinUse) -> Result<(), ConfigError> {
        let instances = match pin.kind {
            BackendKind::Direct => 1,
            BackendKind::Expander => self.expanders.len(),
            BackendKind::AnalogIn => self.adcs.len(),
        };
        if pin.index as usize >= instances {
            return Err(ConfigError::UnknownBackend {
                pin,
                role: role.to_owned(),
            });
        }
        if pin.pin_limit().is_some_and(|limit| pin.pin >= limit) {
            return Err(ConfigError::PinOutOfRange {
                pin,
                role: role.to_owned(),
            });
        }
        let wrong = |expected| ConfigError::WrongPinKind {
            pin,
            role: role.to_owned(),
            expected,
        };
        match usage {
            PinUse::Digital if pin.is_analog() => Err(wrong("a digital pin")),
            PinUse::Analog if !pin.is_analog() => Err(wrong("an analog input")),
            PinUse::Direct if pin.kind != BackendKind::Direct => Err(wrong("a direct GPIO")),
            _ => Ok(()),
        }
    }

    /// Every pin claimed by a role, in duplicate-check order.
    fn pin_roles(&self) -> Vec<(PinAddress, String, PinUse)> {
        let mut roles = Vec::new();
        for (i, adc) in self.adcs.iter().enumerate() {
            roles.push((
                PinAddress::direct(adc.chip_select),
                format!("ADC {i} chip select"),
                PinUse::Direct,
            ));
        }
        if let Some(pin) = self.ambient.humidity {
            roles.push((pin, "humidity sensor".to_owned(), PinUse::Direct));
        }
        roles.push((self.source.pin, "source pump".to_owned(), PinUse::Digital));
        for (i, st) in self.stations.iter().enumerate() {
            roles.push((st.pin, format!("valve of station {i}"), PinUse::Digital));
        }
        for (i, sensor) in self.level_sensors.iter().enumerate() {
            let owner = if i < self.stations.len() {
                format!("station {i}")
            } else {
                "source".to_owned()
            };
            match *sensor {
                WaterLevelSensor::None => {}
                WaterLevelSensor::Min { pin } => {
                    roles.push((pin, format!("min switch of {owner}"), PinUse::Digital));
                }
                WaterLevelSensor::Max { pin } => {
                    roles.push((pin, format!("max switch of {owner}"), PinUse::Digital));
                }
                WaterLevelSensor::MinMax { min_pin, max_pin } => {
                    roles.push((min_pin, format!("min switch of {owner}"), PinUse::Digital));
                    roles.push((max_pin, format!("max switch of {owner}"), PinUse::Digital));
                }
                WaterLevelSensor::Gradient {
                    value_pin,
                    enable_pin,
                } => {
                    roles.push((enable_pin, format!("level enable of {owner}"), PinUse::Digital));
                    roles.push((value_pin, format!("level input of {owner}"), PinUse::Analog));
                }
            }
        }
        if let Some(pin) = self.ambient.rain {
            roles.push((pin, "rain sensor".to_owned(), PinUse::Analog));
        }
        roles
    }

    /// Bench setup used when no configuration document exists: two
    /// expanders, two ADCs, four stations with every probe variant.
    pub fn demo() -> Self {
        let exp = |pin| PinAddress::expander(0, pin);
        Self {
            expanders: vec![0x27, 0x21],
            adcs: vec![
                AdcWiring {
                    clock: 23,
                    miso: 19,
                    mosi: 21,
                    chip_select: 13,
                },
                AdcWiring {
                    clock: 23,
                    miso: 19,
                    mosi: 21,
                    chip_select: 24,
                },
            ],
            rtc: false,
            ambient: AmbientConfig::default(),
            source: SourceConfig {
                capacity_liters: Some(10.0),
                pin: exp(0),
                flow_volume: FlowPolynomial {
                    offset: 0.0,
                    linear: 0.021,
                    quadratic: 0.0,
                },
                flow_time: FlowPolynomial {
                    offset: 0.5,
                    linear: 48.0,
                    quadratic: 0.3,
                },
                settle_secs: 0.1,
            },
            stations: [(0.1, 1), (0.5, 2), (1.0, 3), (2.0, 4)]
                .into_iter()
                .map(|(capacity_liters, pin)| StationConfig {
                    capacity_liters,
                    pin: exp(pin),
                    settle_secs: 0.1,
                })
                .collect(),
            level_sensors: vec![
                WaterLevelSensor::None,
                WaterLevelSensor::Min { pin: exp(5) },
                WaterLevelSensor::Max { pin: exp(6) },
                WaterLevelSensor::MinMax {
                    min_pin: exp(7),
                    max_pin: exp(8),
                },
                WaterLevelSensor::Gradient {
                    value_pin: PinAddress::analog(0, 0),
                    enable_pin: exp(9),
                },
            ],
        }
    }
}
