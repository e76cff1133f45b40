//! End to end: control loop → HAL → simulated expander and ADC, with the
//! file-backed adapters underneath.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use embedded_hal::digital::PinState;

use irrigo::adapters::hardware::HardwareAdapter;
use irrigo::adapters::history::{FileHistory, LogFile};
use irrigo::adapters::log_sink::LogEventSink;
use irrigo::adapters::sim::{SimAdc, SimExpander};
use irrigo::adapters::state_store::StateStore;
use irrigo::adapters::storage::FileStore;
use irrigo::adapters::time::{NoRtc, SimClock};
use irrigo::app::handle::ControlHandle;
use irrigo::app::ports::{ActuatorPort, SensorPort};
use irrigo::app::state::SharedState;
use irrigo::config::HardwareConfig;
use irrigo::control::{ControlLoop, Ports, WaitEnd};
use irrigo::drivers::backend::Backends;
use irrigo::drivers::fill::FillOutcome;
use irrigo::sensors::ambient::{AmbientDrivers, AmbientKind};
use irrigo::sensors::water_level::SIMULATED_LEVEL;

use crate::mock_hw::at;

static SEQ: AtomicU32 = AtomicU32::new(0);

fn scratch(tag: &str) -> PathBuf {
    let n = SEQ.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("irrigo-it-{}-{tag}-{n}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn bench_hw(clock: &SimClock) -> (HardwareAdapter, SimExpander, SimAdc) {
    let exp = SimExpander::new();
    let adc = SimAdc::new();
    let backends = Backends {
        expanders: vec![Box::new(exp.clone()), Box::new(SimExpander::new())],
        adcs: vec![Box::new(adc.clone()), Box::new(SimAdc::new())],
    };
    let mut hw = HardwareAdapter::new(
        HardwareConfig::demo(),
        Some(backends),
        AmbientDrivers::default(),
        Box::new(clock.clone()),
    );
    hw.init().unwrap();
    (hw, exp, adc)
}

type FilePorts<H> = Ports<H, StateStore<FileStore>, FileHistory, LogFile, NoRtc, LogEventSink>;

fn file_ports<H>(hw: H, dir: &std::path::Path) -> FilePorts<H> {
    Ports {
        hw,
        store: StateStore::new(FileStore::open(dir.join("state")).unwrap()),
        history: FileHistory::in_data_dir(dir),
        archive: LogFile::in_data_dir(dir),
        rtc: NoRtc,
        sink: LogEventSink::new(),
    }
}

#[test]
fn manual_fill_runs_through_the_hal() {
    let dir = scratch("manual");
    let clock = SimClock::starting_at(at(2024, 6, 1, 10, 0));
    let (hw, exp, adc) = bench_hw(&clock);
    // Source full, station 2's max switch closed.
    adc.set_raw(0, 1023);
    exp.set_input(6, PinState::High);

    let mut ports = file_ports(hw, &dir);
    let shared = Arc::new(SharedState::restore(&ports.store, 4, false).unwrap());
    let handle = ControlHandle::new(Arc::clone(&shared), Arc::new(clock.clone()));
    let mut control = ControlLoop::new(Arc::clone(&shared), clock.clone(), clock.clone());

    control.tick(&mut ports);
    assert_eq!(shared.status().source_level, 1.0);

    handle.run_station(2).unwrap();
    assert_eq!(control.wait(&mut ports), WaitEnd::Boundary);

    let report = shared.status().last_fill.unwrap();
    assert_eq!(report.station, 2);
    assert!(matches!(report.outcome, FillOutcome::Completed { .. }));
    assert_eq!(exp.output(0), PinState::Low, "pump off");
    assert_eq!(exp.output(3), PinState::Low, "valve closed");
    assert_eq!(exp.writes(0).last(), Some(&PinState::Low));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn no_hardware_mode_reports_simulated_levels() {
    let clock = SimClock::starting_at(at(2024, 6, 1, 10, 0));
    let mut hw = HardwareAdapter::new(HardwareConfig::demo(), None, AmbientDrivers::default(), Box::new(clock));
    hw.init().unwrap();
    assert!(hw.is_simulated());
    for i in 0..hw.station_count() {
        assert_eq!(hw.station_level(i).unwrap(), SIMULATED_LEVEL);
    }
    assert!(!hw.ambient().is_available(AmbientKind::Temperature));
}

#[test]
fn shutdown_releases_hardware_and_state_survives_restart() {
    let dir = scratch("restart");
    let clock = SimClock::starting_at(at(2024, 6, 1, 10, 0));
    let (hw, exp, adc) = bench_hw(&clock);
    adc.set_raw(0, 1023);

    let mut ports = file_ports(hw, &dir);
    let shared = Arc::new(SharedState::restore(&ports.store, 4, false).unwrap());
    let handle = ControlHandle::new(Arc::clone(&shared), Arc::new(clock.clone()));
    let id = handle.add_program();
    let mut program = handle.program(id).unwrap();
    program.name = "pots".into();
    program.stations = vec![1, 3];
    handle.update_program(program).unwrap();
    handle.set_automation(true);
    handle.request_shutdown("quit from console");

    let mut control = ControlLoop::new(Arc::clone(&shared), clock.clone(), clock.clone());
    let reason = control.run(&mut ports);
    assert_eq!(reason, "quit from console");
    assert!(ports.hw.is_simulated(), "backends handed back");
    assert_eq!(exp.output(0), PinState::Low);

    let restored = SharedState::restore(&ports.store, 4, false).unwrap();
    assert!(restored.general().enabled);
    let programs = restored.programs().clone();
    assert_eq!(programs.len(), 1);
    assert_eq!(programs[0].name, "pots");
    assert_eq!(programs[0].stations, vec![1, 3]);

    // A second release is harmless.
    ports.hw.release();
    let _ = std::fs::remove_dir_all(&dir);
}
