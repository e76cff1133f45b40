//! Mock adapters for integration tests.
//!
//! Records every actuator call so tests can assert on the full command
//! history without touching a port expander.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};

use irrigo::app::events::AppEvent;
use irrigo::app::ports::{
    ActuatorPort, EventSink, HistoryKind, HistorySink, LogArchive, SensorPort, StatePort, StorageError,
};
use irrigo::app::state::SharedState;
use irrigo::config::{GeneralSettings, HardwareSettings};
use irrigo::drivers::fill::{FillOutcome, FillReport};
use irrigo::error::HardwareError;
use irrigo::scheduler::Program;
use irrigo::sensors::ambient::AmbientReadings;

/// Liters per second of pumping.
pub const FLOW_RATE: f64 = 0.02;

/// Nominal fill time of every mock station.
pub const FILL_TIME: Duration = Duration::from_secs(30);

pub fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d)
        .unwrap()
        .and_hms_opt(h, mi, 0)
        .unwrap()
}

// ── Actuator call record ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum HwCall {
    Fill { station: usize, upper: f32 },
    StopPump,
    AllOff,
    Release,
}

// ── MockHardware ──────────────────────────────────────────────

pub struct MockHardware {
    pub calls: Vec<HwCall>,
    pub source: Result<f32, HardwareError>,
    pub levels: Vec<Result<f32, HardwareError>>,
    pub ambient: AmbientReadings,
    /// Stations whose fill faults.
    pub faulty: Vec<usize>,
    pub simulated: bool,
    /// Request shutdown once this many sensor refreshes happened.
    pub stop_after: Option<(Arc<SharedState>, usize)>,
    /// Panic on this sensor refresh.
    pub panic_at: Option<usize>,
    refreshes: usize,
}

#[allow(dead_code)]
impl MockHardware {
    pub fn new(stations: usize) -> Self {
        Self {
            calls: Vec::new(),
            source: Ok(1.0),
            levels: vec![Ok(0.5); stations],
            ambient: AmbientReadings::default(),
            faulty: Vec::new(),
            simulated: false,
            stop_after: None,
            panic_at: None,
            refreshes: 0,
        }
    }

    pub fn filled(&self) -> Vec<usize> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                HwCall::Fill { station, .. } => Some(*station),
                _ => None,
            })
            .collect()
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes
    }
}

impl SensorPort for MockHardware {
    fn station_count(&self) -> usize {
        self.levels.len()
    }

    fn is_simulated(&self) -> bool {
        self.simulated
    }

    fn source_level(&mut self) -> Result<f32, HardwareError> {
        self.refreshes += 1;
        if self.panic_at == Some(self.refreshes) {
            panic!("source sensor driver crashed");
        }
        if let Some((shared, n)) = &self.stop_after {
            if self.refreshes >= *n {
                shared.request_shutdown("tick limit");
            }
        }
        self.source
    }

    fn station_level(&mut self, station: usize) -> Result<f32, HardwareError> {
        self.levels
            .get(station)
            .copied()
            .unwrap_or(Err(HardwareError::NoSuchStation(station)))
    }

    fn ambient(&mut self) -> AmbientReadings {
        self.ambient
    }

    fn describe_station(&self, station: usize) -> Result<String, HardwareError> {
        if station < self.levels.len() {
            Ok(format!("mock station {station}"))
        } else {
            Err(HardwareError::NoSuchStation(station))
        }
    }
}

impl ActuatorPort for MockHardware {
    fn fill_station(
        &mut self,
        station: usize,
        upper_threshold: f32,
        timeout_factor: f64,
    ) -> Result<FillReport, HardwareError> {
        if station >= self.levels.len() {
            return Err(HardwareError::NoSuchStation(station));
        }
        self.calls.push(HwCall::Fill {
            station,
            upper: upper_threshold,
        });
        if self.faulty.contains(&station) {
            return Err(HardwareError::NoSuchSensor(station));
        }
        self.levels[station] = Ok(1.0);
        Ok(FillReport {
            station,
            outcome: FillOutcome::Completed { elapsed: FILL_TIME },
            expected: FILL_TIME,
            limit: FILL_TIME.mul_f64(timeout_factor),
        })
    }

    fn filled_volume(&self, elapsed: Duration) -> f64 {
        elapsed.as_secs_f64() * FLOW_RATE
    }

    fn stop_pump(&mut self) -> Result<(), HardwareError> {
        self.calls.push(HwCall::StopPump);
        Ok(())
    }

    fn all_off(&mut self) {
        self.calls.push(HwCall::AllOff);
    }

    fn release(&mut self) {
        self.calls.push(HwCall::Release);
        self.simulated = true;
    }
}

// ── MockStore ─────────────────────────────────────────────────

#[derive(Default)]
pub struct MockStore {
    pub general: Option<GeneralSettings>,
    pub hardware: Option<HardwareSettings>,
    pub programs: Option<Vec<Program>>,
    pub fail_writes: bool,
    pub saves: usize,
}

impl MockStore {
    fn check(&mut self) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::Io("disk full".into()));
        }
        self.saves += 1;
        Ok(())
    }
}

impl StatePort for MockStore {
    fn load_general(&self) -> Result<Option<GeneralSettings>, StorageError> {
        Ok(self.general.clone())
    }

    fn save_general(&mut self, settings: &GeneralSettings) -> Result<(), StorageError> {
        self.check()?;
        self.general = Some(settings.clone());
        Ok(())
    }

    fn load_hardware(&self) -> Result<Option<HardwareSettings>, StorageError> {
        Ok(self.hardware.clone())
    }

    fn save_hardware(&mut self, settings: &HardwareSettings) -> Result<(), StorageError> {
        self.check()?;
        self.hardware = Some(settings.clone());
        Ok(())
    }

    fn load_programs(&self) -> Result<Option<Vec<Program>>, StorageError> {
        Ok(self.programs.clone())
    }

    fn save_programs(&mut self, programs: &[Program]) -> Result<(), StorageError> {
        self.check()?;
        self.programs = Some(programs.to_vec());
        Ok(())
    }
}

// ── History, archive, events ──────────────────────────────────

#[derive(Default)]
pub struct MockHistory {
    pub rows: Vec<(String, f64, HistoryKind)>,
}

impl HistorySink for MockHistory {
    fn record(
        &mut self,
        entity: &str,
        _at: NaiveDateTime,
        value: f64,
        kind: HistoryKind,
    ) -> Result<(), StorageError> {
        self.rows.push((entity.to_owned(), value, kind));
        Ok(())
    }
}

#[derive(Default)]
pub struct MockArchive {
    pub lines: Vec<String>,
    pub limit: Option<usize>,
}

impl LogArchive for MockArchive {
    fn append(&mut self, lines: &[String], limit: usize) -> Result<(), StorageError> {
        self.lines.extend_from_slice(lines);
        self.limit = Some(limit);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}
