//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter       | Implements                 | Connects to                  |
//! |---------------|----------------------------|------------------------------|
//! | `hardware`    | SensorPort, ActuatorPort   | IoBus, pump, valves, probes  |
//! | `sim`         | ExpanderBackend, AdcBackend| in-memory chips              |
//! | `storage`     | StoragePort                | files / in-memory map        |
//! | `state_store` | StatePort                  | postcard records on storage  |
//! | `history`     | HistorySink, LogArchive    | per-entity CSV, log file     |
//! | `log_sink`    | EventSink, `log::Log`      | stderr, activity buffer      |
//! | `time`        | ClockPort, Timebase, RtcPort | host clock / simulated     |
//! | `signals`     |                            | SIGINT / SIGTERM             |

pub mod hardware;
pub mod history;
pub mod log_sink;
pub mod signals;
pub mod sim;
pub mod state_store;
pub mod storage;
pub mod time;
