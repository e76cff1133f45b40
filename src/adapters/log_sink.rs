//! Logging adapters.
//!
//! - [`LogEventSink`] implements [`EventSink`] by writing structured
//!   application events through the `log` facade.
//! - [`ActivityLogger`] is the `log` backend: every record goes to stderr,
//!   and records at `Info` or above are also appended to the shared
//!   activity buffer that the serving side displays and the loop archives.

use std::io::Write;
use std::sync::{Arc, OnceLock};

use chrono::Local;
use log::{error, info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::app::events::{AppEvent, ClockSyncOutcome};
use crate::app::ports::EventSink;
use crate::app::state::SharedState;
use crate::drivers::fill::FillOutcome;

// ───────────────────────────────────────────────────────────────
// Event sink
// ───────────────────────────────────────────────────────────────

/// Adapter that logs every [`AppEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { stations, simulated } => {
                info!("START | stations={stations} simulated={simulated}");
            }
            AppEvent::FillFinished { name, report, liters } => {
                let secs = report.outcome.elapsed().as_secs_f64();
                match report.outcome {
                    FillOutcome::Completed { .. } => info!(
                        "FILL | station \"{name}\" ({}) filled in {secs:.1} s, {liters:.2} l",
                        report.station
                    ),
                    FillOutcome::AbortedSourceEmpty { .. } => warn!(
                        "FILL | station \"{name}\" ({}) stopped after {secs:.1} s, source is empty",
                        report.station
                    ),
                    FillOutcome::TimedOut { .. } => warn!(
                        "FILL | station \"{name}\" ({}) stopped after {secs:.1} s, time limit exceeded",
                        report.station
                    ),
                }
            }
            AppEvent::FillFault { station, error } => {
                error!("FILL | station {station} fault: {error}, pump forced off");
            }
            AppEvent::SensorFault { what, error } => {
                warn!("SENSOR | {what} unreadable: {error}");
            }
            AppEvent::ProgramEvaluated { id, name, ready, reason } => {
                if *ready {
                    info!("PROGRAM | \"{name}\" ({id}) is ready to water: {reason}");
                } else {
                    info!("PROGRAM | \"{name}\" ({id}) not ready: {reason}");
                }
            }
            AppEvent::ProgramFault { id, name, error } => {
                error!("PROGRAM | \"{name}\" ({id}) skipped: {error}");
            }
            AppEvent::ProgramWatered { id, name, at } => {
                info!("PROGRAM | \"{name}\" ({id}) watered at {}", at.format("%H:%M:%S"));
            }
            AppEvent::ClockSync(outcome) => match outcome {
                ClockSyncOutcome::Skipped => {}
                ClockSyncOutcome::SystemFromRtc => info!("CLOCK | system time set from RTC"),
                ClockSyncOutcome::RtcFromSystem => info!("CLOCK | RTC set from system time"),
                ClockSyncOutcome::BatteryLow => warn!("CLOCK | RTC battery is low"),
                ClockSyncOutcome::Failed => error!("CLOCK | synchronization failed"),
            },
            AppEvent::SaveFailed { record, error } => {
                error!("STORE | {record} not saved: {error}");
            }
            AppEvent::Shutdown { reason } => {
                info!("quitting, reason: {reason}");
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// `log` backend
// ───────────────────────────────────────────────────────────────

pub struct ActivityLogger {
    level: LevelFilter,
    shared: OnceLock<Arc<SharedState>>,
}

impl ActivityLogger {
    /// Install as the global logger.  Lines only reach the activity buffer
    /// after [`attach`](Self::attach).
    pub fn install(level: LevelFilter) -> Result<&'static Self, SetLoggerError> {
        let logger: &'static Self = Box::leak(Box::new(Self {
            level,
            shared: OnceLock::new(),
        }));
        log::set_logger(logger)?;
        log::set_max_level(level);
        Ok(logger)
    }

    /// Start feeding the activity buffer of `shared`.  Only the first call
    /// has an effect.
    pub fn attach(&self, shared: Arc<SharedState>) {
        let _ = self.shared.set(shared);
    }
}

/// One activity line: local timestamp, level, message.
pub fn format_line(level: Level, message: &str) -> String {
    format!("{} {level:<5} {message}", Local::now().format("%Y-%m-%d %H:%M:%S"))
}

impl Log for ActivityLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(record.level(), &record.args().to_string());
        // Nothing sensible to do when stderr is gone.
        let _ = writeln!(std::io::stderr().lock(), "{line}");
        if record.level() <= Level::Info {
            if let Some(shared) = self.shared.get() {
                shared.activity().push(line);
            }
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_carries_level_and_message() {
        let line = format_line(Level::Warn, "source is empty");
        assert!(line.ends_with("WARN  source is empty"), "{line}");
        // "YYYY-mm-dd HH:MM:SS " prefix
        assert_eq!(line.as_bytes()[4], b'-');
        assert_eq!(line.as_bytes()[19], b' ');
    }
}
