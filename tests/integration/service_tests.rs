//! Integration tests for the IrrigationService → ports pipeline.
//!
//! Sensors, programs and fills run against the recording mocks; every
//! assertion is on what reached the hardware, the history or the sink.

use std::sync::Arc;
use std::time::Duration;

use irrigo::adapters::time::SimClock;
use irrigo::app::events::AppEvent;
use irrigo::app::commands::Command;
use irrigo::app::ports::{ClockPort, HistoryKind};
use irrigo::app::service::{CommandOutcome, IrrigationService};
use irrigo::app::state::{Record, SharedState};
use irrigo::config::{GeneralSettings, HardwareSettings};
use irrigo::error::{HardwareError, ScheduleError};
use irrigo::scheduler::{Program, ProgramId, ProgramMode};
use irrigo::sensors::ambient::AmbientKind;

use crate::mock_hw::{
    FILL_TIME, FLOW_RATE, HwCall, MockArchive, MockHardware, MockHistory, MockStore, RecordingSink, at,
};

fn make_service(stations: usize, programs: Vec<Program>) -> (IrrigationService, MockHardware) {
    let general = GeneralSettings {
        enabled: true,
        ..GeneralSettings::default()
    };
    let shared = Arc::new(SharedState::new(
        general,
        HardwareSettings::for_stations(stations),
        programs,
        false,
    ));
    (IrrigationService::new(shared), MockHardware::new(stations))
}

fn water_level_program(id: u32, stations: Vec<usize>) -> Program {
    let mut p = Program::new(ProgramId(id), at(2024, 1, 1, 0, 0));
    p.name = format!("beds {id}");
    p.enabled = true;
    p.stations = stations;
    p.mode = ProgramMode::WaterLevel {
        min_delay_hours: 0.0,
        empty_delay_hours: 0.0,
    };
    p
}

// ── Sensor refresh ────────────────────────────────────────────

#[test]
fn refresh_publishes_levels_and_records_history() {
    let (mut svc, mut hw) = make_service(2, Vec::new());
    {
        let mut settings = svc.shared().hardware();
        settings.source_save_data = true;
        settings.stations[1].save_data = true;
        settings.sensor_save_data = vec![AmbientKind::Temperature];
    }
    hw.source = Ok(0.75);
    hw.levels = vec![Ok(0.2), Ok(0.4)];
    hw.ambient.temperature = 21.5;
    let mut history = MockHistory::default();
    let mut sink = RecordingSink::default();

    svc.refresh_sensors(&mut hw, &mut history, at(2024, 1, 1, 6, 0), &mut sink);

    let status = svc.shared().status();
    assert_eq!(status.source_level, 0.75);
    assert_eq!(status.station_levels, vec![0.2, 0.4]);
    assert_eq!(status.ambient.temperature, 21.5);

    let entities: Vec<&str> = history.rows.iter().map(|(e, _, _)| e.as_str()).collect();
    assert_eq!(entities, vec!["source", "station1", "temp"]);
    assert_eq!(history.rows[1].2, HistoryKind::WaterLevel);
    assert_eq!(history.rows[2].2, HistoryKind::Ambient(AmbientKind::Temperature));
}

#[test]
fn unreadable_source_counts_as_empty() {
    let (mut svc, mut hw) = make_service(1, Vec::new());
    hw.source = Err(HardwareError::NoSuchSensor(1));
    let mut sink = RecordingSink::default();
    svc.refresh_sensors(&mut hw, &mut MockHistory::default(), at(2024, 1, 1, 6, 0), &mut sink);

    assert_eq!(svc.shared().status().source_level, 0.0);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::SensorFault { .. })), 1);
}

#[test]
fn unreadable_station_keeps_previous_level() {
    let (mut svc, mut hw) = make_service(2, Vec::new());
    let mut sink = RecordingSink::default();
    hw.levels = vec![Ok(0.3), Ok(0.6)];
    svc.refresh_sensors(&mut hw, &mut MockHistory::default(), at(2024, 1, 1, 6, 0), &mut sink);

    hw.levels[1] = Err(HardwareError::NoSuchSensor(1));
    svc.refresh_sensors(&mut hw, &mut MockHistory::default(), at(2024, 1, 1, 6, 1), &mut sink);

    assert_eq!(svc.shared().status().station_levels, vec![0.3, 0.6]);
    assert!(sink.events.iter().any(|e| matches!(
        e,
        AppEvent::SensorFault { what, .. } if what == "station 1"
    )));
}

// ── Programs ──────────────────────────────────────────────────

#[test]
fn empty_stations_trigger_water_level_program() {
    let (mut svc, mut hw) = make_service(3, vec![water_level_program(1, vec![0, 2])]);
    hw.levels = vec![Ok(0.0), Ok(0.9), Ok(0.05)];
    let clock = SimClock::starting_at(at(2024, 1, 2, 8, 0));
    let mut history = MockHistory::default();
    let mut sink = RecordingSink::default();

    svc.refresh_sensors(&mut hw, &mut history, clock.now(), &mut sink);
    svc.run_programs(&mut hw, &mut history, &clock, &mut sink);

    assert_eq!(hw.filled(), vec![0, 2], "station 1 is not part of the program");
    assert_eq!(svc.fill_count(), 2);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::ProgramWatered { .. })), 1);

    let program = svc.shared().programs()[0].clone();
    assert_eq!(program.memory.time_last_run, clock.now());
    assert!(!program.memory.found_empty);
    assert!(svc.shared().is_dirty(Record::Programs));
}

#[test]
fn water_level_program_waits_while_a_station_holds_water() {
    let (mut svc, mut hw) = make_service(2, vec![water_level_program(1, vec![0, 1])]);
    hw.levels = vec![Ok(0.0), Ok(0.5)];
    let clock = SimClock::starting_at(at(2024, 1, 2, 8, 0));
    let mut sink = RecordingSink::default();
    let mut history = MockHistory::default();

    svc.refresh_sensors(&mut hw, &mut history, clock.now(), &mut sink);
    svc.run_programs(&mut hw, &mut history, &clock, &mut sink);

    assert!(hw.filled().is_empty());
    assert_eq!(svc.shared().status().programs[0].next_run, "not yet empty");
}

#[test]
fn fill_fault_skips_remaining_stations_but_marks_program_watered() {
    let (mut svc, mut hw) = make_service(3, vec![water_level_program(1, vec![0, 1, 2])]);
    hw.levels = vec![Ok(0.0); 3];
    hw.faulty = vec![1];
    let clock = SimClock::starting_at(at(2024, 1, 2, 8, 0));
    let mut history = MockHistory::default();
    let mut sink = RecordingSink::default();

    svc.refresh_sensors(&mut hw, &mut history, clock.now(), &mut sink);
    svc.run_programs(&mut hw, &mut history, &clock, &mut sink);

    assert_eq!(hw.filled(), vec![0, 1]);
    assert!(hw.calls.contains(&HwCall::StopPump), "pump forced off after fault");
    assert_eq!(sink.count(|e| matches!(e, AppEvent::FillFault { station: 1, .. })), 1);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::ProgramWatered { .. })), 1);
}

#[test]
fn disabled_automation_runs_nothing() {
    let (mut svc, mut hw) = make_service(1, vec![water_level_program(1, vec![0])]);
    svc.shared().general().enabled = false;
    hw.levels = vec![Ok(0.0)];
    let clock = SimClock::starting_at(at(2024, 1, 2, 8, 0));
    let mut sink = RecordingSink::default();

    svc.run_programs(&mut hw, &mut MockHistory::default(), &clock, &mut sink);

    assert!(hw.filled().is_empty());
    assert!(sink.events.is_empty());
    assert_eq!(svc.shared().status().programs[0].next_run, "automation disabled");
}

#[test]
fn unschedulable_program_does_not_stop_the_others() {
    let mut broken = water_level_program(1, vec![0]);
    broken.mode = ProgramMode::WaterLevel {
        min_delay_hours: 1.0e12,
        empty_delay_hours: 0.0,
    };
    let mut stuck = water_level_program(2, vec![1]);
    stuck.mode = ProgramMode::WaterLevel {
        min_delay_hours: 1.0,
        empty_delay_hours: 0.0,
    };
    stuck.memory.time_last_run = chrono::NaiveDateTime::MAX;
    let healthy = water_level_program(3, vec![2]);
    let (mut svc, mut hw) = make_service(3, vec![broken, stuck, healthy]);
    hw.levels = vec![Ok(0.0); 3];
    let clock = SimClock::starting_at(at(2024, 1, 2, 8, 0));
    let mut history = MockHistory::default();
    let mut sink = RecordingSink::default();

    svc.refresh_sensors(&mut hw, &mut history, clock.now(), &mut sink);
    svc.run_programs(&mut hw, &mut history, &clock, &mut sink);

    assert_eq!(hw.filled(), vec![2]);
    assert_eq!(
        sink.count(|e| matches!(
            e,
            AppEvent::ProgramFault { id: ProgramId(1), error: ScheduleError::DelayTooLong, .. }
        )),
        1
    );
    assert_eq!(
        sink.count(|e| matches!(
            e,
            AppEvent::ProgramFault { id: ProgramId(2), error: ScheduleError::TimeOutOfRange, .. }
        )),
        1
    );
    assert!(svc.shared().status().programs[0].next_run.starts_with("error: "));
}

#[test]
fn disabled_program_emits_no_evaluation() {
    let mut program = water_level_program(1, vec![0]);
    program.enabled = false;
    let (mut svc, mut hw) = make_service(1, vec![program]);
    let clock = SimClock::starting_at(at(2024, 1, 2, 8, 0));
    let mut sink = RecordingSink::default();

    svc.run_programs(&mut hw, &mut MockHistory::default(), &clock, &mut sink);

    assert_eq!(sink.count(|e| matches!(e, AppEvent::ProgramEvaluated { .. })), 0);
    assert_eq!(svc.shared().status().programs[0].next_run, "disabled");
}

#[test]
fn calendar_program_runs_inside_tolerance() {
    // Weekly on Mondays from 06:00; 2024-01-01 is a Monday.
    let mut program = Program::new(ProgramId(3), at(2024, 1, 1, 0, 0));
    program.name = "lawn".into();
    program.enabled = true;
    program.stations = vec![0];
    program.mode = ProgramMode::Weekly {
        days: heapless::Vec::from_slice(&[1]).unwrap(),
        repeat_hours: 12.0,
    };
    let (mut svc, mut hw) = make_service(1, vec![program]);
    let mut sink = RecordingSink::default();
    let early = SimClock::starting_at(at(2024, 1, 1, 5, 50));
    svc.refresh_sensors(&mut hw, &mut MockHistory::default(), early.now(), &mut sink);

    svc.run_programs(&mut hw, &mut MockHistory::default(), &early, &mut sink);
    assert!(hw.filled().is_empty());
    assert_eq!(svc.shared().status().programs[0].next_run, "10 minutes");

    let due = SimClock::starting_at(at(2024, 1, 1, 5, 59));
    svc.run_programs(&mut hw, &mut MockHistory::default(), &due, &mut sink);
    assert_eq!(hw.filled(), vec![0]);

    // Same slot again, one minute later: already ran within the tolerance.
    due.advance(Duration::from_secs(60));
    svc.run_programs(&mut hw, &mut MockHistory::default(), &due, &mut sink);
    assert_eq!(hw.filled(), vec![0]);
}

// ── Filling ───────────────────────────────────────────────────

#[test]
fn fill_records_volume_and_uses_high_threshold() {
    let (mut svc, mut hw) = make_service(2, Vec::new());
    {
        let mut settings = svc.shared().hardware();
        settings.stations[1].high_threshold = 0.8;
        settings.stations[1].save_data = true;
    }
    let clock = SimClock::default();
    let mut history = MockHistory::default();
    let mut sink = RecordingSink::default();

    let report = svc
        .fill_station(1, &mut hw, &mut history, &clock, &mut sink)
        .unwrap();

    assert_eq!(report.outcome.elapsed(), FILL_TIME);
    assert_eq!(hw.calls, vec![HwCall::Fill { station: 1, upper: 0.8 }]);
    let (entity, liters, kind) = &history.rows[0];
    assert_eq!(entity, "station1");
    assert_eq!(*kind, HistoryKind::FillVolume);
    assert!((liters - FILL_TIME.as_secs_f64() * FLOW_RATE).abs() < 1e-9);
    assert_eq!(svc.shared().status().last_fill, Some(report));
}

#[test]
fn fill_of_unknown_station_is_rejected_without_hardware_calls() {
    let (mut svc, mut hw) = make_service(1, Vec::new());
    let res = svc.fill_station(
        4,
        &mut hw,
        &mut MockHistory::default(),
        &SimClock::default(),
        &mut RecordingSink::default(),
    );
    assert_eq!(res, Err(HardwareError::NoSuchStation(4)));
    assert!(hw.calls.is_empty());
}

#[test]
fn commands_fill_or_wake() {
    let (mut svc, mut hw) = make_service(2, Vec::new());
    let clock = SimClock::default();
    let mut history = MockHistory::default();
    let mut sink = RecordingSink::default();

    let outcome = svc.handle_command(Command::RunStationNow(1), &mut hw, &mut history, &clock, &mut sink);
    assert_eq!(outcome, CommandOutcome::Continue);
    assert_eq!(hw.filled(), vec![1]);

    let outcome = svc.handle_command(Command::AbortWaitEarly, &mut hw, &mut history, &clock, &mut sink);
    assert_eq!(outcome, CommandOutcome::Wake);
}

// ── Persistence and log ───────────────────────────────────────

#[test]
fn failed_save_stays_dirty_until_it_succeeds() {
    let (svc, _) = make_service(1, Vec::new());
    svc.shared().mark_dirty(Record::Hardware);
    let mut store = MockStore {
        fail_writes: true,
        ..MockStore::default()
    };
    let mut sink = RecordingSink::default();

    svc.persist_dirty(&mut store, &mut sink);
    assert!(svc.shared().is_dirty(Record::Hardware));
    assert_eq!(sink.count(|e| matches!(e, AppEvent::SaveFailed { .. })), 1);

    store.fail_writes = false;
    svc.persist_dirty(&mut store, &mut sink);
    assert!(!svc.shared().is_dirty(Record::Hardware));
    assert_eq!(store.saves, 1);
    assert!(store.hardware.is_some());
    assert!(store.general.is_none(), "clean records are not rewritten");
}

#[test]
fn persist_all_writes_every_record() {
    let (svc, _) = make_service(1, vec![water_level_program(1, vec![0])]);
    let mut store = MockStore::default();
    svc.persist_all(&mut store, &mut RecordingSink::default());
    assert_eq!(store.saves, 3);
    assert_eq!(store.programs.as_ref().map(Vec::len), Some(1));
}

#[test]
fn archive_appends_only_new_lines() {
    let (svc, _) = make_service(1, Vec::new());
    let mut archive = MockArchive::default();
    svc.shared().activity().push("one".into());
    svc.shared().activity().push("two".into());
    svc.archive_log(&mut archive);
    svc.shared().activity().push("three".into());
    svc.archive_log(&mut archive);

    assert_eq!(archive.lines, vec!["one", "two", "three"]);
    assert_eq!(archive.limit, Some(1000));
}

#[test]
fn archive_is_skipped_when_logging_is_off() {
    let (svc, _) = make_service(1, Vec::new());
    svc.shared().general().logging = false;
    svc.shared().activity().push("one".into());
    let mut archive = MockArchive::default();
    svc.archive_log(&mut archive);
    assert!(archive.lines.is_empty());
}
