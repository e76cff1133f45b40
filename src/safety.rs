//! Safe-shutdown sequence.
//!
//! Runs on every exit path of the control loop: a termination signal, a
//! console `quit`, a fatal error, or a panic caught inside a tick.  The steps are unconditional and
//! ordered; a failing step is logged and the next one still runs.
//!
//! 1. Pump off.  Never left running unattended.
//! 2. Every valve closed, probes at rest.
//! 3. Hardware handed back.
//! 4. All persisted records flushed.
//! 5. "quitting, reason: ..." logged and the activity log archived.

use log::error;

use crate::app::events::AppEvent;
use crate::app::ports::{ActuatorPort, EventSink, LogArchive, StatePort};
use crate::app::service::IrrigationService;

pub fn safe_shutdown(
    reason: &str,
    hw: &mut impl ActuatorPort,
    service: &IrrigationService,
    store: &mut impl StatePort,
    archive: &mut impl LogArchive,
    sink: &mut impl EventSink,
) {
    service.set_activity("shutting down");
    if let Err(e) = hw.stop_pump() {
        error!("SAFETY | pump stop failed: {e}");
    }
    hw.all_off();
    hw.release();

    service.persist_all(store, sink);
    sink.emit(&AppEvent::Shutdown {
        reason: reason.to_owned(),
    });
    service.archive_log(archive);
}
