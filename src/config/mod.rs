//! Configuration: the immutable hardware wiring and the persisted,
//! operator-tunable settings.

pub mod hardware;
pub mod settings;

pub use hardware::HardwareConfig;
pub use settings::{GeneralSettings, HardwareSettings, StationSettings};
