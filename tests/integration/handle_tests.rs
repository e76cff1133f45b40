//! Serving-side handle: validation, queueing, and record dirty flags.

use std::sync::Arc;

use irrigo::adapters::time::SimClock;
use irrigo::app::commands::{COMMAND_DEPTH, Command};
use irrigo::app::handle::{ControlHandle, HandleError};
use irrigo::app::state::{Record, SharedState};
use irrigo::config::{GeneralSettings, HardwareSettings, StationSettings};
use irrigo::console;
use irrigo::error::ScheduleError;
use irrigo::scheduler::{MAX_DELAY_HOURS, MAX_PLAN_DAYS, ProgramId, ProgramMode};
use irrigo::sensors::ambient::AmbientKind;

use crate::mock_hw::at;

fn make_handle(stations: usize) -> (ControlHandle, Arc<SharedState>, SimClock) {
    let shared = Arc::new(SharedState::new(
        GeneralSettings::default(),
        HardwareSettings::for_stations(stations),
        Vec::new(),
        true,
    ));
    // Wednesday.
    let clock = SimClock::starting_at(at(2024, 1, 3, 14, 30));
    let handle = ControlHandle::new(Arc::clone(&shared), Arc::new(clock.clone()));
    (handle, shared, clock)
}

// ── Manual actions ────────────────────────────────────────────

#[test]
fn run_station_validates_and_queues() {
    let (handle, shared, _) = make_handle(2);
    assert_eq!(handle.run_station(2), Err(HandleError::UnknownStation(2)));
    handle.run_station(1).unwrap();
    assert_eq!(shared.commands().pop(), Some(Command::RunStationNow(1)));
    assert_eq!(shared.commands().pop(), None);
}

#[test]
fn full_queue_is_reported_to_the_caller() {
    let (handle, _, _) = make_handle(1);
    for _ in 0..COMMAND_DEPTH {
        handle.wake().unwrap();
    }
    assert_eq!(handle.wake(), Err(HandleError::QueueFull(Command::AbortWaitEarly)));
}

#[test]
fn shutdown_request_records_reason() {
    let (handle, shared, _) = make_handle(1);
    handle.request_shutdown("quit from console");
    assert!(shared.shutdown_requested());
    assert_eq!(shared.shutdown_reason().as_deref(), Some("quit from console"));
}

#[test]
fn automation_toggle_marks_general_dirty() {
    let (handle, shared, _) = make_handle(1);
    assert!(!handle.automation_enabled());
    handle.set_automation(true);
    assert!(handle.automation_enabled());
    assert!(shared.take_dirty(Record::General));
}

// ── Programs ──────────────────────────────────────────────────

#[test]
fn added_program_is_disabled_with_fresh_id() {
    let (handle, shared, _) = make_handle(1);
    let a = handle.add_program();
    let b = handle.add_program();
    assert_ne!(a, b);
    assert!(!handle.program(a).unwrap().enabled);
    assert!(shared.take_dirty(Record::Programs));
}

#[test]
fn update_rejects_invalid_program_and_keeps_old_one() {
    let (handle, _, _) = make_handle(2);
    let id = handle.add_program();
    let mut p = handle.program(id).unwrap();
    p.stations = vec![0, 5];
    assert_eq!(
        handle.update_program(p),
        Err(HandleError::Schedule(ScheduleError::StationOutOfRange(5)))
    );
    assert!(handle.program(id).unwrap().stations.is_empty());
}

#[test]
fn update_normalizes_and_reanchors_interval_program() {
    let (handle, _, _) = make_handle(3);
    let id = handle.add_program();
    let mut p = handle.program(id).unwrap();
    p.name = "herbs".into();
    p.stations = vec![2, 0, 2];
    p.mode = ProgramMode::Interval {
        interval_days: 3,
        repeat_hours: 6.0,
    };
    handle.update_program(p).unwrap();

    let stored = handle.program(id).unwrap();
    assert_eq!(stored.stations, vec![0, 2]);
    // Today's window start minus the interval: next run is today 06:00.
    assert_eq!(stored.memory.time_last_run, at(2023, 12, 31, 6, 0));
}

#[test]
fn update_keeps_scheduling_memory_of_weekly_program() {
    let (handle, shared, _) = make_handle(1);
    let id = handle.add_program();
    let before = handle.program(id).unwrap().memory;
    let mut p = handle.program(id).unwrap();
    p.mode = ProgramMode::Weekly {
        days: heapless::Vec::from_slice(&[5, 1]).unwrap(),
        repeat_hours: 8.0,
    };
    p.memory.time_last_run = at(2000, 1, 1, 0, 0);
    handle.update_program(p).unwrap();

    let stored = handle.program(id).unwrap();
    assert_eq!(stored.memory, before, "memory is not editable");
    assert!(matches!(&stored.mode, ProgramMode::Weekly { days, .. } if days.as_slice() == [1, 5]));
    assert!(shared.is_dirty(Record::Programs));
}

#[test]
fn unknown_program_operations_fail() {
    let (handle, _, _) = make_handle(1);
    assert_eq!(handle.remove_program(ProgramId(42)), Err(HandleError::UnknownProgram(ProgramId(42))));
    assert_eq!(
        handle.set_program_enabled(ProgramId(42), true),
        Err(HandleError::UnknownProgram(ProgramId(42)))
    );
}

#[test]
fn plan_lists_weekly_runs_in_time_order() {
    let (handle, _, _) = make_handle(1);
    let id = handle.add_program();
    let mut p = handle.program(id).unwrap();
    p.name = "lawn".into();
    p.enabled = true;
    p.stations = vec![0];
    p.mode = ProgramMode::Weekly {
        days: heapless::Vec::from_slice(&[4]).unwrap(),
        repeat_hours: 23.0,
    };
    handle.update_program(p).unwrap();

    let runs = handle.plan(7).unwrap();
    // Thursday 2024-01-04 06:00 is the only Thursday in the next week.
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].time, at(2024, 1, 4, 6, 0));
    assert_eq!(runs[0].name, "lawn");
}

#[test]
fn plan_horizon_is_bounded() {
    let (handle, _, _) = make_handle(1);
    for days in [0, -3, MAX_PLAN_DAYS + 1, 1_000_000_000_000, i64::MAX, i64::MIN] {
        assert_eq!(
            handle.plan(days),
            Err(HandleError::Schedule(ScheduleError::InvalidHorizon)),
            "{days} days"
        );
    }
    assert_eq!(handle.plan(MAX_PLAN_DAYS), Ok(Vec::new()));
}

#[test]
fn console_plan_rejects_bad_day_counts() {
    let (handle, _, _) = make_handle(1);
    assert!(console::execute(&handle, "plan 1000000000000").text.starts_with("usage: plan"));
    assert!(console::execute(&handle, "plan 0").text.starts_with("usage: plan"));
    assert!(console::execute(&handle, "plan soon").text.starts_with("usage: plan"));
    assert_eq!(console::execute(&handle, "plan").text, "no runs planned");
    assert_eq!(console::execute(&handle, "plan 3").text, "no runs planned");
}

#[test]
fn water_level_delay_beyond_a_year_is_rejected() {
    let (handle, _, _) = make_handle(1);
    let id = handle.add_program();
    let mut p = handle.program(id).unwrap();
    p.mode = ProgramMode::WaterLevel {
        min_delay_hours: 1.0e12,
        empty_delay_hours: 0.0,
    };
    assert_eq!(
        handle.update_program(p.clone()),
        Err(HandleError::Schedule(ScheduleError::DelayTooLong))
    );

    p.mode = ProgramMode::WaterLevel {
        min_delay_hours: MAX_DELAY_HOURS,
        empty_delay_hours: 0.0,
    };
    handle.update_program(p).unwrap();
}

// ── Settings ──────────────────────────────────────────────────

#[test]
fn invalid_settings_are_rejected() {
    let (handle, shared, _) = make_handle(2);
    let general = GeneralSettings {
        main_loop_interval_secs: 1,
        ..GeneralSettings::default()
    };
    assert!(handle.update_general(general).is_err());
    assert!(!shared.is_dirty(Record::General));

    let station = StationSettings {
        low_threshold: 0.9,
        high_threshold: 0.2,
        ..StationSettings::new(0)
    };
    assert!(handle.update_station(0, station).is_err());
    assert_eq!(
        handle.update_station(7, StationSettings::new(7)),
        Err(HandleError::UnknownStation(7))
    );
}

#[test]
fn sensor_save_selection_is_deduplicated() {
    let (handle, shared, _) = make_handle(1);
    handle.set_sensor_save_data(vec![AmbientKind::Rain, AmbientKind::Temperature, AmbientKind::Rain]);
    assert_eq!(
        shared.hardware().sensor_save_data,
        vec![AmbientKind::Temperature, AmbientKind::Rain]
    );
    assert!(shared.is_dirty(Record::Hardware));
}
