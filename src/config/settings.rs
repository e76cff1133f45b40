//! Operator-tunable settings, persisted between runs.
//!
//! Two of the three persisted records live here: [`GeneralSettings`] and
//! [`HardwareSettings`].  The third, the program list, lives in
//! [`scheduler`](crate::scheduler).  All three are loaded at startup,
//! defaulted if absent, and rewritten after every change and at shutdown.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sensors::ambient::AmbientKind;

/// Largest accepted fill safety factor.
pub const MAX_SAFETY_TIMEOUT_FACTOR: f64 = 10.0;
/// Largest accepted scheduler tolerance factor.
pub const MAX_SCHEDULE_TOLERANCE_FACTOR: f64 = 100.0;

/// Controller-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralSettings {
    pub name: String,
    /// Automatic program execution.
    pub enabled: bool,

    // --- Logging ---
    /// Append the activity log to the log file.
    pub logging: bool,
    /// Lines kept in the log file.
    pub logging_limit: u32,

    // --- Timing ---
    /// Control loop tick length (seconds).
    pub main_loop_interval_secs: u32,
    /// Fill safety limit as a multiple of the expected fill time.
    pub safety_timeout_factor: f64,
    /// Scheduler tolerance as a multiple of the main loop interval.
    pub schedule_tolerance_factor: f64,
    /// RTC housekeeping period (hours).
    pub clock_sync_interval_hours: u32,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            name: "irrigo".into(),
            enabled: false,

            logging: true,
            logging_limit: 1000,

            main_loop_interval_secs: 60,
            safety_timeout_factor: 1.1,
            schedule_tolerance_factor: 2.0,
            clock_sync_interval_hours: 168, // weekly
        }
    }
}

impl GeneralSettings {
    pub fn main_loop_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.main_loop_interval_secs))
    }

    /// Window within which a candidate slot counts as "now".
    pub fn schedule_tolerance(&self) -> Duration {
        let interval = self.main_loop_interval();
        Duration::try_from_secs_f64(interval.as_secs_f64() * self.schedule_tolerance_factor)
            .unwrap_or(interval)
    }

    pub fn clock_sync_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.clock_sync_interval_hours) * 3600)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::ValidationFailed("name must not be empty"));
        }
        if self.main_loop_interval_secs <= 1 {
            return Err(ConfigError::ValidationFailed(
                "main loop interval must be more than 1 second",
            ));
        }
        if !(1.0..=MAX_SAFETY_TIMEOUT_FACTOR).contains(&self.safety_timeout_factor) {
            return Err(ConfigError::ValidationFailed(
                "safety timeout factor must be between 1 and 10",
            ));
        }
        if !(self.schedule_tolerance_factor > 0.0
            && self.schedule_tolerance_factor <= MAX_SCHEDULE_TOLERANCE_FACTOR)
        {
            return Err(ConfigError::ValidationFailed(
                "schedule tolerance factor must be above 0 and at most 100",
            ));
        }
        if self.clock_sync_interval_hours == 0 {
            return Err(ConfigError::ValidationFailed("clock sync interval must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationSettings {
    pub name: String,
    /// Level at or below which the station counts as empty.
    pub low_threshold: f32,
    /// Level above which a fill stops.
    pub high_threshold: f32,
    /// Record levels and fill volumes in the history.
    pub save_data: bool,
}

impl StationSettings {
    pub fn new(index: usize) -> Self {
        Self {
            name: format!("station {index}"),
            low_threshold: 0.1,
            high_threshold: 0.9,
            save_data: false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::ValidationFailed("station name must not be empty"));
        }
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);
        if !in_unit(self.low_threshold) || !in_unit(self.high_threshold) {
            return Err(ConfigError::ValidationFailed("thresholds must be within 0..=1"));
        }
        if self.low_threshold > self.high_threshold {
            return Err(ConfigError::ValidationFailed(
                "low threshold must not exceed high threshold",
            ));
        }
        Ok(())
    }
}

/// Per-station and per-sensor runtime settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareSettings {
    pub stations: Vec<StationSettings>,
    pub source_save_data: bool,
    /// Ambient quantities whose readings are recorded.
    pub sensor_save_data: Vec<AmbientKind>,
}

impl HardwareSettings {
    pub fn for_stations(count: usize) -> Self {
        Self {
            stations: (0..count).map(StationSettings::new).collect(),
            source_save_data: false,
            sensor_save_data: Vec::new(),
        }
    }

    pub fn saves_sensor(&self, kind: AmbientKind) -> bool {
        self.sensor_save_data.contains(&kind)
    }

    /// Stored station count must match the wired hardware.
    pub fn validate(&self, station_count: usize) -> Result<(), ConfigError> {
        if self.stations.len() != station_count {
            return Err(ConfigError::StationSettingsMismatch {
                expected: station_count,
                found: self.stations.len(),
            });
        }
        self.stations.iter().try_for_each(StationSettings::validate)
    }
}
