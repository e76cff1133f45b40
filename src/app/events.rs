//! Outbound application events.
//!
//! The [`IrrigationService`](super::service::IrrigationService) and the
//! control loop emit these through the [`EventSink`](super::ports::EventSink)
//! port.  Adapters on the other side decide what to do with them.

use chrono::NaiveDateTime;

use crate::drivers::fill::FillReport;
use crate::error::{HardwareError, ScheduleError};
use crate::scheduler::{ProgramId, Reason};

/// Structured events emitted by the application core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Controller came up; `simulated` when no hardware was found.
    Started { stations: usize, simulated: bool },

    /// A station fill ran to one of its exits.
    FillFinished {
        name: String,
        report: FillReport,
        liters: f64,
    },

    /// A station fill faulted; the pump was forced off.
    FillFault { station: usize, error: HardwareError },

    /// A level read failed during the sensor refresh.
    SensorFault { what: String, error: HardwareError },

    /// Program evaluation outcome (not emitted for disabled programs).
    ProgramEvaluated {
        id: ProgramId,
        name: String,
        ready: bool,
        reason: Reason,
    },

    /// Program parameters are invalid; skipped this tick.
    ProgramFault {
        id: ProgramId,
        name: String,
        error: ScheduleError,
    },

    /// All stations of a triggered program have been filled.
    ProgramWatered { id: ProgramId, name: String, at: NaiveDateTime },

    /// Clock housekeeping result.
    ClockSync(ClockSyncOutcome),

    /// A persisted record could not be saved; retried later.
    SaveFailed { record: &'static str, error: String },

    /// Safe shutdown started.
    Shutdown { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSyncOutcome {
    /// No RTC installed.
    Skipped,
    /// System clock was implausible and was set from the RTC.
    SystemFromRtc,
    /// RTC was set from the system clock.
    RtcFromSystem,
    /// The RTC backup battery is low.
    BatteryLow,
    Failed,
}
