//! Control loop against mock ports and a simulated clock.
//!
//! The simulated clock is both the wall clock and the delay, so a
//! one-minute wait completes instantly while the loop still sees a
//! minute pass.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;

use irrigo::adapters::time::{NoRtc, SimClock};
use irrigo::app::commands::Command;
use irrigo::app::events::{AppEvent, ClockSyncOutcome};
use irrigo::app::handle::ControlHandle;
use irrigo::app::ports::ClockPort;
use irrigo::app::state::SharedState;
use irrigo::config::{GeneralSettings, HardwareSettings};
use irrigo::control::{ControlLoop, Ports, WaitEnd};
use irrigo::scheduler::{Program, ProgramId, ProgramMode};

use crate::mock_hw::{HwCall, MockArchive, MockHardware, MockHistory, MockStore, RecordingSink, at};

type TestPorts = Ports<MockHardware, MockStore, MockHistory, MockArchive, NoRtc, RecordingSink>;

struct Rig {
    shared: Arc<SharedState>,
    clock: SimClock,
    control: ControlLoop<SimClock, SimClock>,
    ports: TestPorts,
}

fn rig(stations: usize, programs: Vec<Program>, start: chrono::NaiveDateTime) -> Rig {
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
    let clock = SimClock::starting_at(start);
    let control = ControlLoop::new(Arc::clone(&shared), clock.clone(), clock.clone());
    Rig {
        shared,
        clock,
        control,
        ports: Ports {
            hw: MockHardware::new(stations),
            store: MockStore::default(),
            history: MockHistory::default(),
            archive: MockArchive::default(),
            rtc: NoRtc,
            sink: RecordingSink::default(),
        },
    }
}

fn interval_program(start: chrono::NaiveDateTime) -> Program {
    let mut p = Program::new(ProgramId(1), start);
    p.name = "greenhouse".into();
    p.enabled = true;
    p.stations = vec![0, 1];
    p.mode = ProgramMode::Interval {
        interval_days: 1,
        repeat_hours: 5.0,
    };
    p
}

#[test]
fn wait_reaches_boundary_one_interval_after_first_tick() {
    let start = at(2024, 3, 1, 12, 0);
    let mut r = rig(1, Vec::new(), start);

    r.control.tick(&mut r.ports);
    assert_eq!(r.control.next_boundary(), Some(start + TimeDelta::seconds(60)));

    assert_eq!(r.control.wait(&mut r.ports), WaitEnd::Boundary);
    assert_eq!(r.clock.now(), start + TimeDelta::seconds(60));
    assert_eq!(r.control.next_boundary(), Some(start + TimeDelta::seconds(120)));
    assert_eq!(r.shared.status().next_tick, Some(start + TimeDelta::seconds(60)));
}

#[test]
fn wake_ends_wait_and_keeps_boundary() {
    let start = at(2024, 3, 1, 12, 0);
    let mut r = rig(1, Vec::new(), start);
    r.control.tick(&mut r.ports);

    r.shared.commands().push(Command::AbortWaitEarly).unwrap();
    assert_eq!(r.control.wait(&mut r.ports), WaitEnd::Woken);
    assert_eq!(r.clock.now(), start, "no time spent waiting");
    assert_eq!(r.control.next_boundary(), Some(start + TimeDelta::seconds(60)));
}

#[test]
fn manual_fill_is_served_during_wait() {
    let mut r = rig(3, Vec::new(), at(2024, 3, 1, 12, 0));
    r.control.tick(&mut r.ports);

    r.shared.commands().push(Command::RunStationNow(2)).unwrap();
    assert_eq!(r.control.wait(&mut r.ports), WaitEnd::Boundary);
    assert_eq!(r.ports.hw.filled(), vec![2]);
    assert!(r.shared.commands().is_empty());
}

#[test]
fn shutdown_request_ends_wait() {
    let mut r = rig(1, Vec::new(), at(2024, 3, 1, 12, 0));
    r.control.tick(&mut r.ports);
    r.shared.request_shutdown("test");
    assert_eq!(r.control.wait(&mut r.ports), WaitEnd::Shutdown);
}

#[test]
fn first_tick_runs_clock_housekeeping_once() {
    let mut r = rig(1, Vec::new(), at(2024, 3, 1, 12, 0));
    r.control.tick(&mut r.ports);
    r.control.tick(&mut r.ports);
    let syncs = r
        .ports
        .sink
        .count(|e| matches!(e, AppEvent::ClockSync(ClockSyncOutcome::Skipped)));
    assert_eq!(syncs, 1);
}

#[test]
fn run_shuts_down_safely_when_requested() {
    let mut r = rig(2, Vec::new(), at(2024, 3, 1, 12, 0));
    r.shared.request_shutdown("received SIGTERM");

    let reason = r.control.run(&mut r.ports);

    assert_eq!(reason, "received SIGTERM");
    assert_eq!(r.control.ticks(), 0);
    assert_eq!(r.ports.hw.calls, vec![HwCall::StopPump, HwCall::AllOff, HwCall::Release]);
    assert_eq!(r.ports.store.saves, 3, "every record flushed");
    assert!(r.ports.sink.events.iter().any(|e| matches!(
        e,
        AppEvent::Shutdown { reason } if reason == "received SIGTERM"
    )));
    assert_eq!(r.shared.status().activity, "shutting down");
}

#[test]
fn panicking_tick_still_shuts_down_safely() {
    let mut r = rig(2, Vec::new(), at(2024, 3, 1, 12, 0));
    r.ports.hw.panic_at = Some(2);

    let reason = r.control.run(&mut r.ports);

    assert!(reason.contains("panicked"), "{reason}");
    assert!(reason.contains("source sensor driver crashed"), "{reason}");
    assert!(r.shared.shutdown_requested());
    assert!(r.ports.hw.calls.ends_with(&[HwCall::StopPump, HwCall::AllOff, HwCall::Release]));
    assert_eq!(r.ports.store.saves, 3, "every record flushed");
    assert_eq!(
        r.ports
            .sink
            .count(|e| matches!(e, AppEvent::Shutdown { reason } if reason.contains("panicked"))),
        1
    );
}

#[test]
fn run_waters_interval_program_once_per_slot() {
    // First slot is today's 06:00; the loop starts just before it.
    let start = at(2024, 3, 1, 5, 57);
    let mut r = rig(2, vec![interval_program(start)], start);
    r.ports.hw.levels = vec![Ok(0.0), Ok(0.0)];
    r.ports.hw.stop_after = Some((Arc::clone(&r.shared), 6));

    let reason = r.control.run(&mut r.ports);

    assert_eq!(reason, "tick limit");
    assert_eq!(r.control.ticks(), 6);
    assert_eq!(r.ports.hw.filled(), vec![0, 1]);

    let saved = r.ports.store.programs.clone().unwrap();
    assert_eq!(saved[0].memory.time_last_run, at(2024, 3, 1, 5, 59));
    assert_eq!(r.shared.status().programs[0].next_run, "4 hours, 58 minutes");
}

#[test]
fn handle_on_another_thread_wakes_the_loop() {
    let start = at(2024, 3, 1, 12, 0);
    let mut r = rig(2, Vec::new(), start);
    r.control.tick(&mut r.ports);

    let handle = ControlHandle::new(Arc::clone(&r.shared), Arc::new(r.clock.clone()));
    std::thread::spawn(move || {
        handle.run_station(1).unwrap();
        handle.wake().unwrap();
    })
    .join()
    .unwrap();

    assert_eq!(r.control.wait(&mut r.ports), WaitEnd::Woken);
    assert_eq!(r.ports.hw.filled(), vec![1]);
}

#[test]
fn boundaries_do_not_drift_after_a_long_tick() {
    let start = at(2024, 3, 1, 12, 0);
    let mut r = rig(1, Vec::new(), start);
    r.control.tick(&mut r.ports);
    // Several fills took three and a half minutes.
    r.clock.advance(Duration::from_secs(210));
    assert_eq!(r.control.wait(&mut r.ports), WaitEnd::Boundary);
    assert_eq!(r.control.next_boundary(), Some(start + TimeDelta::seconds(240)));
}
