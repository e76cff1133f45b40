//! Application service: one control-loop iteration, step by step.
//!
//! [`IrrigationService`] holds the shared records and exposes the per-tick
//! steps (refresh sensors, run programs, fill a station, persist).  All I/O
//! flows through port traits injected at call sites, so the whole service
//! runs against mock adapters in tests.
//!
//! ```text
//!  SensorPort ──▶ ┌──────────────────────────┐ ──▶ EventSink
//!                 │    IrrigationService     │ ──▶ HistorySink
//! ActuatorPort ◀──│  levels · programs · fill│ ──▶ StatePort
//!                 └────────────┬─────────────┘
//!                              ▼
//!                   SharedState (status, records)
//! ```

use std::sync::Arc;

use chrono::{NaiveDateTime, TimeDelta};
use log::{error, info, warn};

use crate::drivers::fill::FillReport;
use crate::error::HardwareError;
use crate::scheduler::{self, Conditions, Program};
use crate::sensors::ambient::AmbientKind;

use super::commands::Command;
use super::events::AppEvent;
use super::ports::{
    ActuatorPort, ClockPort, EventSink, HistoryKind, HistorySink, LogArchive, SensorPort, StatePort,
};
use super::state::{ProgramStatus, Record, SharedState};

/// What the loop should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Keep waiting for the tick boundary.
    Continue,
    /// Stop waiting and start the next tick.
    Wake,
}

pub struct IrrigationService {
    shared: Arc<SharedState>,
    fills: u64,
}

impl IrrigationService {
    pub fn new(shared: Arc<SharedState>) -> Self {
        Self { shared, fills: 0 }
    }

    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    /// Fills performed since start, manual and scheduled.
    pub fn fill_count(&self) -> u64 {
        self.fills
    }

    pub fn set_activity(&self, label: impl Into<String>) {
        let label = label.into();
        self.shared.update_status(|s| s.activity = label);
    }

    pub fn start(&mut self, hw: &impl SensorPort, sink: &mut impl EventSink) {
        let simulated = hw.is_simulated();
        self.shared.update_status(|s| s.simulated = simulated);
        if simulated {
            info!("no hardware found, running in no-hardware mode");
        }
        sink.emit(&AppEvent::Started {
            stations: hw.station_count(),
            simulated,
        });
    }

    // ── Sensors ───────────────────────────────────────────────

    /// Read the source, every station and the ambient sensors into the
    /// runtime status, recording history where enabled.
    pub fn refresh_sensors(
        &mut self,
        hw: &mut impl SensorPort,
        history: &mut impl HistorySink,
        now: NaiveDateTime,
        sink: &mut impl EventSink,
    ) {
        self.set_activity("reading sensors");
        let settings = self.shared.hardware().clone();

        // An unreadable source counts as empty so nothing is scheduled.
        let source = hw.source_level().unwrap_or_else(|e| {
            sink.emit(&AppEvent::SensorFault {
                what: "source".into(),
                error: e,
            });
            0.0
        });
        info!("water source is {:.0}% full", source * 100.0);
        if settings.source_save_data {
            save(history, "source", now, f64::from(source), HistoryKind::WaterLevel);
        }

        let previous = self.shared.status().station_levels;
        let mut levels = Vec::with_capacity(settings.stations.len());
        for (i, station) in settings.stations.iter().enumerate() {
            let level = match hw.station_level(i) {
                Ok(v) => v,
                Err(e) => {
                    sink.emit(&AppEvent::SensorFault {
                        what: format!("station {i}"),
                        error: e,
                    });
                    previous.get(i).copied().unwrap_or(0.0)
                }
            };
            info!("station \"{}\" ({i}) is {:.0}% full", station.name, level * 100.0);
            if station.save_data {
                save(history, &station_entity(i), now, f64::from(level), HistoryKind::WaterLevel);
            }
            levels.push(level);
        }

        let ambient = hw.ambient();
        for kind in AmbientKind::ALL {
            if settings.saves_sensor(kind) && ambient.is_available(kind) {
                save(history, kind.slug(), now, f64::from(ambient.get(kind)), HistoryKind::Ambient(kind));
            }
        }

        self.shared.update_status(|s| {
            s.source_level = source;
            s.station_levels = levels;
            s.ambient = ambient;
        });
    }

    // ── Programs ──────────────────────────────────────────────

    /// Evaluate every program and water the triggered ones, stations in
    /// order, one at a time.
    pub fn run_programs(
        &mut self,
        hw: &mut (impl SensorPort + ActuatorPort),
        history: &mut impl HistorySink,
        clock: &impl ClockPort,
        sink: &mut impl EventSink,
    ) {
        let general = self.shared.general().clone();
        let programs = self.shared.programs().clone();
        if !general.enabled {
            let lines = programs
                .iter()
                .map(|p| ProgramStatus {
                    id: p.id,
                    name: p.name.clone(),
                    next_run: "automation disabled".into(),
                })
                .collect();
            self.shared.update_status(|s| s.programs = lines);
            return;
        }

        self.set_activity("evaluating programs");
        let tolerance =
            TimeDelta::from_std(general.schedule_tolerance()).unwrap_or(TimeDelta::seconds(120));
        let lows: Vec<f32> = self
            .shared
            .hardware()
            .stations
            .iter()
            .map(|s| s.low_threshold)
            .collect();

        let mut lines = Vec::with_capacity(programs.len());
        for mut program in programs {
            let before = program.memory;
            let status = self.shared.status();
            let now = clock.now();
            let cond = Conditions {
                now,
                source_level: status.source_level,
                station_levels: &status.station_levels,
                low_thresholds: &lows,
                tolerance,
            };
            let decision = match scheduler::evaluate(&mut program, &cond) {
                Ok(d) => d,
                Err(e) => {
                    sink.emit(&AppEvent::ProgramFault {
                        id: program.id,
                        name: program.name.clone(),
                        error: e,
                    });
                    lines.push(ProgramStatus {
                        id: program.id,
                        name: program.name.clone(),
                        next_run: format!("error: {e}"),
                    });
                    continue;
                }
            };
            if program.enabled {
                sink.emit(&AppEvent::ProgramEvaluated {
                    id: program.id,
                    name: program.name.clone(),
                    ready: decision.ready,
                    reason: decision.reason,
                });
            }

            if decision.ready {
                self.water(&program, hw, history, clock, sink);
                let at = clock.now();
                program.mark_watered(at);
                sink.emit(&AppEvent::ProgramWatered {
                    id: program.id,
                    name: program.name.clone(),
                    at,
                });
                self.store_memory(&program, before);
                self.shared.mark_dirty(Record::Programs);
            } else {
                self.store_memory(&program, before);
            }

            lines.push(ProgramStatus {
                id: program.id,
                name: program.name.clone(),
                next_run: decision.summary(now),
            });
        }
        self.shared.update_status(|s| s.programs = lines);
    }

    fn water(
        &mut self,
        program: &Program,
        hw: &mut (impl SensorPort + ActuatorPort),
        history: &mut impl HistorySink,
        clock: &impl ClockPort,
        sink: &mut impl EventSink,
    ) {
        for &station in &program.stations {
            if self.fill_station(station, hw, history, clock, sink).is_err() {
                warn!(
                    "program \"{}\" ({}): skipping remaining stations after fault",
                    program.name, program.id
                );
                break;
            }
        }
    }

    /// Write evaluation memory back, unless the program was edited or
    /// removed while it was being evaluated.
    fn store_memory(&self, program: &Program, before: scheduler::ScheduleMemory) {
        let mut programs = self.shared.programs();
        if let Some(slot) = programs.iter_mut().find(|p| p.id == program.id) {
            if slot.memory == before {
                slot.memory = program.memory;
            }
        }
    }

    // ── Filling ───────────────────────────────────────────────

    /// Fill one station up to its high threshold.  The pump is off when
    /// this returns.
    pub fn fill_station(
        &mut self,
        station: usize,
        hw: &mut (impl SensorPort + ActuatorPort),
        history: &mut impl HistorySink,
        clock: &impl ClockPort,
        sink: &mut impl EventSink,
    ) -> Result<FillReport, HardwareError> {
        let settings = self
            .shared
            .hardware()
            .stations
            .get(station)
            .cloned()
            .ok_or(HardwareError::NoSuchStation(station))?;
        let factor = self.shared.general().safety_timeout_factor;

        self.set_activity(format!("filling station {station}"));
        info!("preparing to fill station \"{}\" ({station})", settings.name);

        match hw.fill_station(station, settings.high_threshold, factor) {
            Ok(report) => {
                self.fills += 1;
                let liters = hw.filled_volume(report.outcome.elapsed());
                if settings.save_data {
                    save(history, &station_entity(station), clock.now(), liters, HistoryKind::FillVolume);
                }
                sink.emit(&AppEvent::FillFinished {
                    name: settings.name,
                    report,
                    liters,
                });
                self.shared.update_status(|s| s.last_fill = Some(report));
                Ok(report)
            }
            Err(e) => {
                if let Err(stop) = hw.stop_pump() {
                    error!("FILL | pump stop after fault failed: {stop}");
                }
                sink.emit(&AppEvent::FillFault { station, error: e });
                Err(e)
            }
        }
    }

    // ── Commands ──────────────────────────────────────────────

    pub fn handle_command(
        &mut self,
        command: Command,
        hw: &mut (impl SensorPort + ActuatorPort),
        history: &mut impl HistorySink,
        clock: &impl ClockPort,
        sink: &mut impl EventSink,
    ) -> CommandOutcome {
        match command {
            Command::AbortWaitEarly => CommandOutcome::Wake,
            Command::RunStationNow(station) => {
                info!("manual watering of station {station}");
                // Faults are reported through the sink.
                let _ = self.fill_station(station, hw, history, clock, sink);
                CommandOutcome::Continue
            }
        }
    }

    // ── Persistence ───────────────────────────────────────────

    /// Save every record flagged dirty.  A failed save stays dirty and is
    /// retried on the next call.
    pub fn persist_dirty(&self, store: &mut impl StatePort, sink: &mut impl EventSink) {
        for record in Record::ALL {
            if self.shared.take_dirty(record) {
                if let Err(e) = self.save_record(record, store) {
                    self.shared.mark_dirty(record);
                    sink.emit(&AppEvent::SaveFailed {
                        record: record.name(),
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    /// Save all three records regardless of dirty flags.
    pub fn persist_all(&self, store: &mut impl StatePort, sink: &mut impl EventSink) {
        for record in Record::ALL {
            self.shared.take_dirty(record);
            if let Err(e) = self.save_record(record, store) {
                sink.emit(&AppEvent::SaveFailed {
                    record: record.name(),
                    error: e.to_string(),
                });
            }
        }
    }

    fn save_record(
        &self,
        record: Record,
        store: &mut impl StatePort,
    ) -> Result<(), super::ports::StorageError> {
        match record {
            Record::General => {
                let general = self.shared.general().clone();
                store.save_general(&general)
            }
            Record::Hardware => {
                let hardware = self.shared.hardware().clone();
                store.save_hardware(&hardware)
            }
            Record::Programs => {
                let programs = self.shared.programs().clone();
                store.save_programs(&programs)
            }
        }
    }

    /// Append new activity lines to the log archive, if logging is on.
    pub fn archive_log(&self, archive: &mut impl LogArchive) {
        let lines = self.shared.activity().take_unarchived();
        let (logging, limit) = {
            let g = self.shared.general();
            (g.logging, g.logging_limit as usize)
        };
        if !logging || lines.is_empty() {
            return;
        }
        if let Err(e) = archive.append(&lines, limit) {
            warn!("log file not written: {e}");
        }
    }
}

fn station_entity(station: usize) -> String {
    format!("station{station}")
}

fn save(history: &mut impl HistorySink, entity: &str, at: NaiveDateTime, value: f64, kind: HistoryKind) {
    if let Err(e) = history.record(entity, at, value, kind) {
        warn!("history for {entity} not saved: {e}");
    }
}
