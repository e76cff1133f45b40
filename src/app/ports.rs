//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ IrrigationService / ControlLoop (domain)
//! ```
//!
//! Driven adapters (the HAL, storage, history files, clocks, event sinks)
//! implement these traits.  The [`IrrigationService`](super::service::IrrigationService)
//! takes them as parameters at each call site, so the domain core never
//! touches hardware directly and every path runs against recording mocks
//! in tests.

use core::fmt;
use std::time::Duration;

use chrono::NaiveDateTime;

use crate::config::{GeneralSettings, HardwareSettings};
use crate::drivers::fill::FillReport;
use crate::error::HardwareError;
use crate::scheduler::Program;
use crate::sensors::ambient::{AmbientKind, AmbientReadings};

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Read-side port: levels and ambient readings.
pub trait SensorPort {
    fn station_count(&self) -> usize;

    /// No hardware present; every read takes the simulation path.
    fn is_simulated(&self) -> bool;

    /// Source level in `[0, 1]`; `1` for an unlimited source.
    fn source_level(&mut self) -> Result<f32, HardwareError>;

    fn station_level(&mut self, station: usize) -> Result<f32, HardwareError>;

    /// Unavailable quantities read as the sentinel.
    fn ambient(&mut self) -> AmbientReadings;

    /// Volume, expected fill time and sensing capability, for display.
    fn describe_station(&self, station: usize) -> Result<String, HardwareError>;
}

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port: fills and emergency stops.
pub trait ActuatorPort {
    /// Run one station fill.  The pump is off when this returns.
    fn fill_station(
        &mut self,
        station: usize,
        upper_threshold: f32,
        timeout_factor: f64,
    ) -> Result<FillReport, HardwareError>;

    /// Liters delivered in `elapsed` pumping time.
    fn filled_volume(&self, elapsed: Duration) -> f64;

    fn stop_pump(&mut self) -> Result<(), HardwareError>;

    /// Pump off, then every valve off.  Best effort; never fails.
    fn all_off(&mut self);

    /// Hand the backends back.  Later calls take the simulation path.
    fn release(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ disk)
// ───────────────────────────────────────────────────────────────

/// Namespaced key-value blob storage.
///
/// Writes are atomic: a reader sees either the old or the new value, never
/// a partial one.
pub trait StoragePort {
    fn read(&self, namespace: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    fn exists(&self, namespace: &str, key: &str) -> bool;
}

/// The three persisted records.  `Ok(None)` means "never saved".
pub trait StatePort {
    fn load_general(&self) -> Result<Option<GeneralSettings>, StorageError>;
    fn save_general(&mut self, settings: &GeneralSettings) -> Result<(), StorageError>;

    fn load_hardware(&self) -> Result<Option<HardwareSettings>, StorageError>;
    fn save_hardware(&mut self, settings: &HardwareSettings) -> Result<(), StorageError>;

    fn load_programs(&self) -> Result<Option<Vec<Program>>, StorageError>;
    fn save_programs(&mut self, programs: &[Program]) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// History and log archive
// ───────────────────────────────────────────────────────────────

/// Kind column of a history line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
    WaterLevel,
    FillVolume,
    Ambient(AmbientKind),
}

impl fmt::Display for HistoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaterLevel => f.write_str("water level"),
            Self::FillVolume => f.write_str("fill volume"),
            Self::Ambient(kind) => f.write_str(kind.label()),
        }
    }
}

/// Per-entity time series (`station0`, `source`, `temp`, ...).
pub trait HistorySink {
    fn record(
        &mut self,
        entity: &str,
        at: NaiveDateTime,
        value: f64,
        kind: HistoryKind,
    ) -> Result<(), StorageError>;
}

/// Append-only activity log file, trimmed to `limit` lines.
pub trait LogArchive {
    fn append(&mut self, lines: &[String], limit: usize) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Time
// ───────────────────────────────────────────────────────────────

/// Local wall-clock time.
pub trait ClockPort {
    fn now(&self) -> NaiveDateTime;
}

/// Battery-backed real-time clock.
pub trait RtcPort {
    fn is_present(&self) -> bool;

    fn battery_ok(&mut self) -> Result<bool, RtcError>;

    fn set_system_from_rtc(&mut self) -> Result<(), RtcError>;

    fn set_rtc_from_system(&mut self) -> Result<(), RtcError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`StoragePort`] and the adapters built on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Underlying I/O failed.
    Io(String),
    /// Record could not be serialized.
    Encode(String),
    /// Stored bytes are not a valid record.
    Decode(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::Encode(msg) => write!(f, "encode error: {msg}"),
            Self::Decode(msg) => write!(f, "decode error: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcError {
    /// The chip did not answer.
    Bus,
    /// The host refused to change the system clock.
    PermissionDenied,
}

impl fmt::Display for RtcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus => write!(f, "RTC not responding"),
            Self::PermissionDenied => write!(f, "not permitted to set the system clock"),
        }
    }
}
