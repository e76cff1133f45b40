//! Unified error types for the irrigation controller.
//!
//! A single [`Error`] enum that every subsystem converts into, keeping the
//! control loop's error handling uniform.  Each category maps onto one
//! recovery policy:
//!
//! | Category   | Policy                                              |
//! |------------|-----------------------------------------------------|
//! | `Config`   | fatal at startup, names the failing check           |
//! | `Hardware` | pump forced off, logged, loop continues             |
//! | `Schedule` | fatal to one program's evaluation only              |
//! | `Storage`  | logged, retried on the next save                    |

use core::fmt;

use crate::app::ports::StorageError;
use crate::config::hardware::AdcWiring;
use crate::config::hardware::TemperatureSource;
use crate::drivers::backend::BackendError;
use crate::pins::PinAddress;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the controller funnels into this type.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Hardware configuration or persisted settings are inconsistent.
    Config(ConfigError),
    /// A backend call failed or an unknown station/sensor was addressed.
    Hardware(HardwareError),
    /// A program's scheduling parameters are invalid.
    Schedule(ScheduleError),
    /// Persistent storage failed.
    Storage(StorageError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Hardware(e) => write!(f, "hardware: {e}"),
            Self::Schedule(e) => write!(f, "schedule: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// A configuration check failed.  Each variant names the check.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The configuration document could not be read.
    Io(String),
    /// The configuration document is not well-formed (includes unknown
    /// sensor variants).
    Parse(String),
    /// Two port expanders share an I2C address.
    DuplicateExpanderAddress(u8),
    /// Two ADCs share the same wiring tuple.
    DuplicateAdcWiring(AdcWiring),
    /// Two roles reference the same pin.
    DuplicatePin { pin: PinAddress, role: String },
    /// There must be exactly one water-level sensor per station plus one
    /// for the source.
    SensorCountMismatch { stations: usize, sensors: usize },
    /// Temperature fusion references a sensor that is not installed.
    TemperatureSourceMissing(TemperatureSource),
    /// A pin references an expander or ADC that is not configured.
    UnknownBackend { pin: PinAddress, role: String },
    /// A pin number is outside the backend's pin range.
    PinOutOfRange { pin: PinAddress, role: String },
    /// A role is wired to a backend kind that cannot serve it.
    WrongPinKind {
        pin: PinAddress,
        role: String,
        expected: &'static str,
    },
    /// A field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Persisted station settings do not match the hardware station count.
    StationSettingsMismatch { expected: usize, found: usize },
    /// A persisted program carries invalid scheduling parameters.
    InvalidProgram { name: String, error: ScheduleError },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "cannot read configuration: {msg}"),
            Self::Parse(msg) => write!(f, "malformed configuration: {msg}"),
            Self::DuplicateExpanderAddress(addr) => {
                write!(f, "duplicate port expander address 0x{addr:02x}")
            }
            Self::DuplicateAdcWiring(w) => write!(f, "duplicate ADC wiring {w}"),
            Self::DuplicatePin { pin, role } => write!(f, "pin {pin} of {role} is already in use"),
            Self::SensorCountMismatch { stations, sensors } => write!(
                f,
                "{stations} stations need {} water level sensors, found {sensors}",
                stations + 1
            ),
            Self::TemperatureSourceMissing(src) => {
                write!(f, "temperature source {src} is not installed")
            }
            Self::UnknownBackend { pin, role } => {
                write!(f, "pin {pin} of {role} refers to a backend that is not configured")
            }
            Self::PinOutOfRange { pin, role } => write!(f, "pin {pin} of {role} is out of range"),
            Self::WrongPinKind {
                pin,
                role,
                expected,
            } => write!(f, "pin {pin} of {role} must be {expected}"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::StationSettingsMismatch { expected, found } => write!(
                f,
                "stored settings describe {found} stations, hardware has {expected}"
            ),
            Self::InvalidProgram { name, error } => write!(f, "program \"{name}\": {error}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Hardware errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareError {
    /// The backend serving `pin` reported an error.
    Backend { pin: PinAddress, error: BackendError },
    /// A pin references a backend instance that does not exist.
    NoSuchBackend(PinAddress),
    /// Station index is out of range.
    NoSuchStation(usize),
    /// Water-level sensor index is out of range.
    NoSuchSensor(usize),
    /// A configured time does not fit in a `Duration`.
    TimingOutOfRange,
}

impl fmt::Display for HardwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend { pin, error } => write!(f, "{pin}: {error}"),
            Self::NoSuchBackend(pin) => write!(f, "{pin}: no such backend"),
            Self::NoSuchStation(i) => write!(f, "no station {i}"),
            Self::NoSuchSensor(i) => write!(f, "no water level sensor {i}"),
            Self::TimingOutOfRange => write!(f, "configured time is out of range"),
        }
    }
}

impl std::error::Error for HardwareError {}

impl From<HardwareError> for Error {
    fn from(e: HardwareError) -> Self {
        Self::Hardware(e)
    }
}

// ---------------------------------------------------------------------------
// Scheduler errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleError {
    /// Weekly mode with no weekday in 1..=7.
    NoValidWeekday,
    /// Repeat interval is zero, negative or a full day or more.
    NonPositiveRepeat,
    /// Day interval is zero.
    NonPositiveInterval,
    /// Negative water-level delay.
    NegativeDelay,
    /// Water-level delay longer than [`MAX_DELAY_HOURS`](crate::scheduler::MAX_DELAY_HOURS).
    DelayTooLong,
    /// Plan horizon outside 1..=[`MAX_PLAN_DAYS`](crate::scheduler::MAX_PLAN_DAYS) days.
    InvalidHorizon,
    /// A computed date falls outside the representable calendar.
    TimeOutOfRange,
    /// Window hours/minutes out of range or start after end.
    InvalidWindow,
    /// Program references a station that does not exist.
    StationOutOfRange(usize),
    /// Program name is empty.
    EmptyName,
    /// The run planner hit its iteration cap.
    PlanLimitExceeded,
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoValidWeekday => write!(f, "no valid day of week"),
            Self::NonPositiveRepeat => write!(f, "repeat interval must be between 0 and 24 hours"),
            Self::NonPositiveInterval => write!(f, "day interval must be positive"),
            Self::NegativeDelay => write!(f, "water level delays must not be negative"),
            Self::DelayTooLong => write!(f, "water level delays must not exceed one year"),
            Self::InvalidHorizon => write!(f, "plan horizon must be between 1 and 366 days"),
            Self::TimeOutOfRange => write!(f, "date out of range"),
            Self::InvalidWindow => write!(f, "invalid time-of-day window"),
            Self::StationOutOfRange(i) => write!(f, "station {i} does not exist"),
            Self::EmptyName => write!(f, "program name must not be empty"),
            Self::PlanLimitExceeded => write!(f, "too many planned runs"),
        }
    }
}

impl std::error::Error for ScheduleError {}

impl From<ScheduleError> for Error {
    fn from(e: ScheduleError) -> Self {
        Self::Schedule(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
