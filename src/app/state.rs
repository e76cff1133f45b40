//! State shared between the control loop and the serving context.
//!
//! ```text
//!                ┌──────────────────────── SharedState ─────────────────────┐
//!  ControlHandle │ general / hardware / programs   Mutex, last-write-wins   │
//!  (serving)  ──▶│ dirty flags                     AtomicBool               │◀── ControlLoop
//!                │ commands                        CommandQueue (FIFO)      │    (owns HW)
//!             ◀──│ status                          RwLock, loop writes only │
//!                │ activity                        bounded line buffer      │
//!                └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The hardware is not in here.  It is owned by the loop thread and never
//! reachable from the serving side.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use chrono::NaiveDateTime;
use log::info;
use serde::Serialize;

use crate::config::{GeneralSettings, HardwareSettings};
use crate::drivers::fill::FillReport;
use crate::error::{ConfigError, Error};
use crate::scheduler::{Program, ProgramId};
use crate::sensors::ambient::AmbientReadings;

use super::commands::CommandQueue;
use super::ports::StatePort;

/// Activity buffer capacity (lines).
pub const ACTIVITY_CAPACITY: usize = 512;

// ───────────────────────────────────────────────────────────────
// Runtime status
// ───────────────────────────────────────────────────────────────

/// Per-program display line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramStatus {
    pub id: ProgramId,
    pub name: String,
    /// "disabled", "not yet empty" or the time remaining.
    pub next_run: String,
}

/// Everything the serving side may display.  Written by the loop only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeStatus {
    pub source_level: f32,
    pub station_levels: Vec<f32>,
    pub ambient: AmbientReadings,
    /// What the loop is doing right now.
    pub activity: String,
    pub programs: Vec<ProgramStatus>,
    pub last_fill: Option<FillReport>,
    pub simulated: bool,
    pub last_tick: Option<NaiveDateTime>,
    pub next_tick: Option<NaiveDateTime>,
}

impl RuntimeStatus {
    pub fn new(station_count: usize, simulated: bool) -> Self {
        Self {
            source_level: 0.0,
            station_levels: vec![0.0; station_count],
            ambient: AmbientReadings::default(),
            activity: "starting".into(),
            programs: Vec::new(),
            last_fill: None,
            simulated,
            last_tick: None,
            next_tick: None,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Activity log buffer
// ───────────────────────────────────────────────────────────────

struct ActivityInner {
    lines: heapless::Deque<String, ACTIVITY_CAPACITY>,
    /// Trailing lines not yet written to the log archive.
    unarchived: usize,
}

/// Bounded buffer of recent log lines; the oldest line drops first.
pub struct ActivityLog {
    inner: Mutex<ActivityInner>,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityLog {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ActivityInner {
                lines: heapless::Deque::new(),
                unarchived: 0,
            }),
        }
    }

    pub fn push(&self, line: String) {
        let mut inner = lock(&self.inner);
        if inner.lines.is_full() {
            inner.lines.pop_front();
        }
        // Room was made above.
        let _ = inner.lines.push_back(line);
        inner.unarchived = (inner.unarchived + 1).min(ACTIVITY_CAPACITY);
    }

    pub fn lines(&self) -> Vec<String> {
        lock(&self.inner).lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).lines.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).lines.is_empty()
    }

    /// Lines added since the last call, oldest first.
    pub fn take_unarchived(&self) -> Vec<String> {
        let mut inner = lock(&self.inner);
        let skip = inner.lines.len() - inner.unarchived;
        let fresh = inner.lines.iter().skip(skip).cloned().collect();
        inner.unarchived = 0;
        fresh
    }
}

// ───────────────────────────────────────────────────────────────
// Shared state
// ───────────────────────────────────────────────────────────────

/// Which persisted record changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    General,
    Hardware,
    Programs,
}

impl Record {
    pub const ALL: [Self; 3] = [Self::General, Self::Hardware, Self::Programs];

    pub fn name(self) -> &'static str {
        match self {
            Self::General => "general settings",
            Self::Hardware => "hardware settings",
            Self::Programs => "programs",
        }
    }
}

pub struct SharedState {
    station_count: usize,
    general: Mutex<GeneralSettings>,
    hardware: Mutex<HardwareSettings>,
    programs: Mutex<Vec<Program>>,
    next_program_id: AtomicU32,
    status: RwLock<RuntimeStatus>,
    activity: ActivityLog,
    commands: CommandQueue,
    dirty: [AtomicBool; 3],
    shutdown: Mutex<Option<String>>,
    shutdown_requested: AtomicBool,
}

impl SharedState {
    pub fn new(
        general: GeneralSettings,
        hardware: HardwareSettings,
        programs: Vec<Program>,
        simulated: bool,
    ) -> Self {
        let station_count = hardware.stations.len();
        let next_id = programs.iter().map(|p| p.id.0 + 1).max().unwrap_or(1);
        Self {
            station_count,
            general: Mutex::new(general),
            hardware: Mutex::new(hardware),
            programs: Mutex::new(programs),
            next_program_id: AtomicU32::new(next_id),
            status: RwLock::new(RuntimeStatus::new(station_count, simulated)),
            activity: ActivityLog::new(),
            commands: CommandQueue::new(),
            dirty: [AtomicBool::new(false), AtomicBool::new(false), AtomicBool::new(false)],
            shutdown: Mutex::new(None),
            shutdown_requested: AtomicBool::new(false),
        }
    }

    /// Build the shared state from persisted records.  Missing records
    /// start from defaults and are marked dirty so the first tick saves
    /// them.  A station-count mismatch or an invalid program is fatal.
    pub fn restore(
        store: &impl StatePort,
        station_count: usize,
        simulated: bool,
    ) -> Result<Self, Error> {
        let general = store.load_general()?;
        let hardware = store.load_hardware()?;
        let programs = store.load_programs()?;
        let missing = [general.is_none(), hardware.is_none(), programs.is_none()];

        let general = general.unwrap_or_default();
        general.validate()?;
        let hardware = hardware.unwrap_or_else(|| HardwareSettings::for_stations(station_count));
        hardware.validate(station_count)?;
        let programs = programs.unwrap_or_default();
        for p in &programs {
            p.validate(station_count).map_err(|error| ConfigError::InvalidProgram {
                name: p.name.clone(),
                error,
            })?;
        }
        info!("restored {} programs for {station_count} stations", programs.len());

        let state = Self::new(general, hardware, programs, simulated);
        for (record, missing) in Record::ALL.into_iter().zip(missing) {
            if missing {
                state.mark_dirty(record);
            }
        }
        Ok(state)
    }

    pub fn station_count(&self) -> usize {
        self.station_count
    }

    // ── Records ───────────────────────────────────────────────

    pub fn general(&self) -> MutexGuard<'_, GeneralSettings> {
        lock(&self.general)
    }

    pub fn hardware(&self) -> MutexGuard<'_, HardwareSettings> {
        lock(&self.hardware)
    }

    pub fn programs(&self) -> MutexGuard<'_, Vec<Program>> {
        lock(&self.programs)
    }

    pub fn allocate_program_id(&self) -> ProgramId {
        ProgramId(self.next_program_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn mark_dirty(&self, record: Record) {
        self.dirty[record as usize].store(true, Ordering::Release);
    }

    /// Clears the flag; returns whether it was set.
    pub fn take_dirty(&self, record: Record) -> bool {
        self.dirty[record as usize].swap(false, Ordering::AcqRel)
    }

    pub fn is_dirty(&self, record: Record) -> bool {
        self.dirty[record as usize].load(Ordering::Acquire)
    }

    // ── Status ────────────────────────────────────────────────

    pub fn status(&self) -> RuntimeStatus {
        self.status.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Loop side only.
    pub(crate) fn update_status(&self, f: impl FnOnce(&mut RuntimeStatus)) {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut status);
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn commands(&self) -> &CommandQueue {
        &self.commands
    }

    // ── Shutdown ──────────────────────────────────────────────

    /// First reason wins.
    pub fn request_shutdown(&self, reason: impl Into<String>) {
        let mut slot = lock(&self.shutdown);
        if slot.is_none() {
            *slot = Some(reason.into());
        }
        self.shutdown_requested.store(true, Ordering::Release);
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    pub fn shutdown_reason(&self) -> Option<String> {
        lock(&self.shutdown).clone()
    }
}

/// Lock, recovering the data from a poisoned mutex.  A panicked writer
/// leaves at worst a partially edited record, which last-write-wins allows.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
