//! Irrigo: main entry point
//!
//! Hexagonal architecture: one loop thread owns the hardware, every other
//! context talks to it through the shared state.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter   LogEventSink   StateStore    SystemClock    │
//! │  (Sensor+Actuator) (EventSink)    (FileStore)   (ClockPort)    │
//! │  FileHistory       LogFile        NoRtc                        │
//! │  (HistorySink)     (LogArchive)   (RtcPort)                    │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │        ControlLoop ─▶ IrrigationService (logic)        │    │
//! │  │        fill state machine · program scheduler          │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  ControlHandle ◀── console thread · signal watcher thread      │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Environment:
//!
//! | Variable           | Default        | Meaning                         |
//! |--------------------|----------------|---------------------------------|
//! | `IRRIGO_HW_CONFIG` | `irrigo.json`  | hardware description            |
//! | `IRRIGO_STATE_DIR` | `state`        | persisted settings and programs |
//! | `IRRIGO_DATA_DIR`  | `data`         | history files and activity log  |
//! | `IRRIGO_BENCH`     | unset          | `1`: simulated chips            |
//! | `IRRIGO_LOG`       | `info`         | log level                       |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{LevelFilter, info, warn};

use irrigo::adapters::hardware::HardwareAdapter;
use irrigo::adapters::history::{FileHistory, LogFile};
use irrigo::adapters::log_sink::{ActivityLogger, LogEventSink};
use irrigo::adapters::signals::spawn_signal_watcher;
use irrigo::adapters::sim::{SimAdc, SimExpander};
use irrigo::adapters::state_store::StateStore;
use irrigo::adapters::storage::FileStore;
use irrigo::adapters::time::{NoRtc, SystemClock};
use irrigo::app::handle::ControlHandle;
use irrigo::app::ports::SensorPort;
use irrigo::app::state::SharedState;
use irrigo::config::HardwareConfig;
use irrigo::console::spawn_console;
use irrigo::control::{ControlLoop, Ports};
use irrigo::drivers::backend::{AdcBackend, Backends, ExpanderBackend};
use irrigo::drivers::timebase::StdTimebase;
use irrigo::sensors::ambient::AmbientDrivers;

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var_os(key).map_or_else(|| PathBuf::from(default), PathBuf::from)
}

fn log_level() -> LevelFilter {
    std::env::var("IRRIGO_LOG")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(LevelFilter::Info)
}

fn load_config(path: &Path) -> Result<HardwareConfig> {
    if path.exists() {
        let config = HardwareConfig::load(path)
            .with_context(|| format!("loading hardware configuration {}", path.display()))?;
        info!("Hardware configuration loaded from {}", path.display());
        Ok(config)
    } else {
        warn!("{} not found, using the demo hardware configuration", path.display());
        let config = HardwareConfig::demo();
        config.validate().context("demo hardware configuration")?;
        Ok(config)
    }
}

/// Simulated chips matching `config`, for bench runs without a board.
fn bench_backends(config: &HardwareConfig) -> Backends {
    Backends {
        expanders: config
            .expanders
            .iter()
            .map(|_| Box::new(SimExpander::new()) as Box<dyn ExpanderBackend>)
            .collect(),
        adcs: config
            .adcs
            .iter()
            .map(|_| Box::new(SimAdc::new()) as Box<dyn AdcBackend>)
            .collect(),
    }
}

fn main() -> Result<()> {
    // ── 1. Logging ────────────────────────────────────────────
    let logger = ActivityLogger::install(log_level()).context("installing logger")?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Irrigo v{:<28}║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Hardware configuration ─────────────────────────────
    let config = load_config(&env_path("IRRIGO_HW_CONFIG", "irrigo.json"))?;
    let station_count = config.station_count();

    // ── 3. Persistence ────────────────────────────────────────
    let state_dir = env_path("IRRIGO_STATE_DIR", "state");
    let store = StateStore::new(
        FileStore::open(&state_dir).with_context(|| format!("opening {}", state_dir.display()))?,
    );
    let data_dir = env_path("IRRIGO_DATA_DIR", "data");
    std::fs::create_dir_all(&data_dir).with_context(|| format!("creating {}", data_dir.display()))?;
    let history = FileHistory::in_data_dir(&data_dir);
    let archive = LogFile::in_data_dir(&data_dir);

    // ── 4. HAL ────────────────────────────────────────────────
    let bench = std::env::var("IRRIGO_BENCH").is_ok_and(|v| v == "1");
    let backends = bench.then(|| bench_backends(&config));
    if backends.is_none() {
        info!("No chip drivers installed, running in no-hardware mode");
    }
    let mut hw = HardwareAdapter::new(
        config.clone(),
        backends,
        AmbientDrivers::default(),
        Box::new(StdTimebase::new()),
    );
    if let Err(e) = hw.init() {
        warn!("Hardware init failed ({e}), continuing in no-hardware mode");
        hw = HardwareAdapter::new(config, None, AmbientDrivers::default(), Box::new(StdTimebase::new()));
    }

    // ── 5. Shared state ───────────────────────────────────────
    let shared = Arc::new(
        SharedState::restore(&store, station_count, SensorPort::is_simulated(&hw)).context("restoring persisted state")?,
    );
    logger.attach(Arc::clone(&shared));

    // ── 6. Serving side ───────────────────────────────────────
    let handle = ControlHandle::new(Arc::clone(&shared), Arc::new(SystemClock));
    spawn_signal_watcher(handle.clone()).context("spawning signal watcher")?;
    spawn_console(handle).context("spawning console")?;

    info!("System ready. Entering main loop.");

    // ── 7. Main loop ──────────────────────────────────────────
    let mut ports = Ports {
        hw,
        store,
        history,
        archive,
        rtc: NoRtc,
        sink: LogEventSink::new(),
    };
    let mut control = ControlLoop::new(shared, SystemClock, StdTimebase::new());
    let reason = control.run(&mut ports);
    info!("Stopped after {} iterations ({reason})", control.ticks());
    Ok(())
}
