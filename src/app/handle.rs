//! Serving-side API.
//!
//! [`ControlHandle`] is what a front end (the console, a web layer) holds.
//! It is cheap to clone and safe to use from any thread.  Nothing reachable
//! through it touches hardware: manual actions are queued as commands for
//! the loop, edits go into the shared records and are picked up on the
//! loop's next read.

use core::fmt;
use std::sync::Arc;

use chrono::TimeDelta;
use log::info;

use crate::config::{GeneralSettings, StationSettings};
use crate::error::{ConfigError, ScheduleError};
use crate::scheduler::{self, PlannedRun, Program, ProgramId};
use crate::sensors::ambient::AmbientKind;

use super::commands::{Command, QueueFull};
use super::ports::ClockPort;
use super::state::{Record, RuntimeStatus, SharedState};

#[derive(Debug, Clone, PartialEq)]
pub enum HandleError {
    UnknownStation(usize),
    UnknownProgram(ProgramId),
    Invalid(ConfigError),
    Schedule(ScheduleError),
    QueueFull(Command),
}

impl fmt::Display for HandleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownStation(i) => write!(f, "no station {i}"),
            Self::UnknownProgram(id) => write!(f, "no program {id}"),
            Self::Invalid(e) => write!(f, "{e}"),
            Self::Schedule(e) => write!(f, "{e}"),
            Self::QueueFull(cmd) => write!(f, "busy, \"{cmd}\" not queued"),
        }
    }
}

impl std::error::Error for HandleError {}

impl From<ConfigError> for HandleError {
    fn from(e: ConfigError) -> Self {
        Self::Invalid(e)
    }
}

impl From<ScheduleError> for HandleError {
    fn from(e: ScheduleError) -> Self {
        Self::Schedule(e)
    }
}

impl From<QueueFull> for HandleError {
    fn from(e: QueueFull) -> Self {
        Self::QueueFull(e.0)
    }
}

#[derive(Clone)]
pub struct ControlHandle {
    shared: Arc<SharedState>,
    clock: Arc<dyn ClockPort + Send + Sync>,
}

impl ControlHandle {
    pub fn new(shared: Arc<SharedState>, clock: Arc<dyn ClockPort + Send + Sync>) -> Self {
        Self { shared, clock }
    }

    // ── Automation and manual actions ─────────────────────────

    pub fn set_automation(&self, enabled: bool) {
        self.shared.general().enabled = enabled;
        self.shared.mark_dirty(Record::General);
        info!("automation {} by user", if enabled { "enabled" } else { "disabled" });
    }

    pub fn automation_enabled(&self) -> bool {
        self.shared.general().enabled
    }

    /// Queue a manual fill; the loop picks it up within a second.
    pub fn run_station(&self, station: usize) -> Result<(), HandleError> {
        if station >= self.shared.station_count() {
            return Err(HandleError::UnknownStation(station));
        }
        self.shared.commands().push(Command::RunStationNow(station))?;
        info!("station {station} queued for manual watering");
        Ok(())
    }

    /// End the loop's current wait early.
    pub fn wake(&self) -> Result<(), HandleError> {
        self.shared.commands().push(Command::AbortWaitEarly)?;
        Ok(())
    }

    pub fn request_shutdown(&self, reason: &str) {
        self.shared.request_shutdown(reason);
        // The loop also polls the shutdown flag; a full queue is harmless.
        let _ = self.shared.commands().push(Command::AbortWaitEarly);
    }

    // ── Programs ──────────────────────────────────────────────

    pub fn programs(&self) -> Vec<Program> {
        self.shared.programs().clone()
    }

    pub fn program(&self, id: ProgramId) -> Result<Program, HandleError> {
        self.shared
            .programs()
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or(HandleError::UnknownProgram(id))
    }

    /// Append a program with default parameters.
    pub fn add_program(&self) -> ProgramId {
        let id = self.shared.allocate_program_id();
        let program = Program::new(id, self.clock.now());
        self.shared.programs().push(program);
        self.shared.mark_dirty(Record::Programs);
        info!("program {id} added by user");
        id
    }

    /// Replace a program's parameters.  Scheduling memory is kept, except
    /// that interval programs are re-anchored to today.
    pub fn update_program(&self, mut program: Program) -> Result<(), HandleError> {
        program.normalize();
        program.validate(self.shared.station_count())?;
        let now = self.clock.now();

        let mut programs = self.shared.programs();
        let slot = programs
            .iter_mut()
            .find(|p| p.id == program.id)
            .ok_or(HandleError::UnknownProgram(program.id))?;
        program.memory = slot.memory;
        program.reanchor(now)?;
        info!("settings of program {} ({}) changed by user", program.id, program.name);
        *slot = program;
        drop(programs);
        self.shared.mark_dirty(Record::Programs);
        Ok(())
    }

    pub fn remove_program(&self, id: ProgramId) -> Result<(), HandleError> {
        let mut programs = self.shared.programs();
        let index = programs
            .iter()
            .position(|p| p.id == id)
            .ok_or(HandleError::UnknownProgram(id))?;
        let removed = programs.remove(index);
        drop(programs);
        self.shared.mark_dirty(Record::Programs);
        info!("program {id} ({}) removed by user", removed.name);
        Ok(())
    }

    pub fn set_program_enabled(&self, id: ProgramId, enabled: bool) -> Result<(), HandleError> {
        let mut programs = self.shared.programs();
        let program = programs
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(HandleError::UnknownProgram(id))?;
        program.enabled = enabled;
        drop(programs);
        self.shared.mark_dirty(Record::Programs);
        Ok(())
    }

    /// Upcoming calendar runs over the next `days`, at most
    /// [`MAX_PLAN_DAYS`](scheduler::MAX_PLAN_DAYS).
    pub fn plan(&self, days: i64) -> Result<Vec<PlannedRun>, HandleError> {
        let horizon = (1..=scheduler::MAX_PLAN_DAYS)
            .contains(&days)
            .then(|| TimeDelta::try_days(days))
            .flatten()
            .ok_or(ScheduleError::InvalidHorizon)?;
        let programs = self.programs();
        Ok(scheduler::plan_runs(&programs, self.clock.now(), horizon)?)
    }

    // ── Settings ──────────────────────────────────────────────

    pub fn general(&self) -> GeneralSettings {
        self.shared.general().clone()
    }

    pub fn update_general(&self, settings: GeneralSettings) -> Result<(), HandleError> {
        settings.validate()?;
        *self.shared.general() = settings;
        self.shared.mark_dirty(Record::General);
        info!("general settings changed by user");
        Ok(())
    }

    pub fn station(&self, station: usize) -> Result<StationSettings, HandleError> {
        self.shared
            .hardware()
            .stations
            .get(station)
            .cloned()
            .ok_or(HandleError::UnknownStation(station))
    }

    pub fn update_station(&self, station: usize, settings: StationSettings) -> Result<(), HandleError> {
        settings.validate()?;
        let mut hw = self.shared.hardware();
        let slot = hw
            .stations
            .get_mut(station)
            .ok_or(HandleError::UnknownStation(station))?;
        *slot = settings;
        drop(hw);
        self.shared.mark_dirty(Record::Hardware);
        info!("settings of station {station} changed by user");
        Ok(())
    }

    pub fn set_source_save_data(&self, save: bool) {
        self.shared.hardware().source_save_data = save;
        self.shared.mark_dirty(Record::Hardware);
    }

    pub fn set_sensor_save_data(&self, kinds: Vec<AmbientKind>) {
        let mut kinds = kinds;
        kinds.sort_unstable();
        kinds.dedup();
        self.shared.hardware().sensor_save_data = kinds;
        self.shared.mark_dirty(Record::Hardware);
    }

    // ── Read-only views ───────────────────────────────────────

    pub fn status(&self) -> RuntimeStatus {
        self.shared.status()
    }

    pub fn activity(&self) -> Vec<String> {
        self.shared.activity().lines()
    }
}
