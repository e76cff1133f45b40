//! The control loop.
//!
//! ```text
//!   ┌──────────────────────────── tick ────────────────────────────┐
//!   │ refresh sensors ─▶ run programs ─▶ clock sync ─▶ persist/log │
//!   └──────────────────────────────┬───────────────────────────────┘
//!                                  ▼
//!   wait for the boundary in 1 s steps, draining commands
//!     AbortWaitEarly   ─▶ next tick now, boundary kept
//!     RunStationNow(i) ─▶ fill i, keep waiting
//!     shutdown request ─▶ safe shutdown
//! ```
//!
//! A panic inside a tick or wait ends the loop the same way a shutdown
//! request does: the panic is logged, recorded as the shutdown reason and
//! the safe-shutdown sequence still runs.
//!
//! Boundaries are anchored at the loop start and advance by whole
//! intervals, so a long tick (several fills) does not shift the cadence:
//! boundaries that already passed are skipped.
//!
//! The loop thread exclusively owns the hardware.  The serving side only
//! reaches it through [`SharedState`](crate::app::state::SharedState).

pub mod clock_sync;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta};
use embedded_hal::delay::DelayNs;
use log::{error, info};

use crate::app::ports::{
    ActuatorPort, ClockPort, EventSink, HistorySink, LogArchive, RtcPort, SensorPort, StatePort,
};
use crate::app::service::{CommandOutcome, IrrigationService};
use crate::app::state::SharedState;
use crate::drivers::timebase::pause;
use crate::safety;
use crate::scheduler::format_remaining;

use clock_sync::ClockSync;

/// Granularity of the interruptible wait.
pub const WAIT_STEP: Duration = Duration::from_secs(1);

/// Every adapter the loop drives.
pub struct Ports<H, S, Y, A, R, E> {
    pub hw: H,
    pub store: S,
    pub history: Y,
    pub archive: A,
    pub rtc: R,
    pub sink: E,
}

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitEnd {
    /// The boundary was reached.
    Boundary,
    /// `AbortWaitEarly` was received.
    Woken,
    /// Shutdown was requested.
    Shutdown,
}

pub struct ControlLoop<C, D> {
    service: IrrigationService,
    clock: C,
    delay: D,
    clock_sync: ClockSync,
    next_boundary: Option<NaiveDateTime>,
    ticks: u64,
}

impl<C: ClockPort, D: DelayNs> ControlLoop<C, D> {
    pub fn new(shared: Arc<SharedState>, clock: C, delay: D) -> Self {
        Self {
            service: IrrigationService::new(shared),
            clock,
            delay,
            clock_sync: ClockSync::new(),
            next_boundary: None,
            ticks: 0,
        }
    }

    pub fn service(&self) -> &IrrigationService {
        &self.service
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn next_boundary(&self) -> Option<NaiveDateTime> {
        self.next_boundary
    }

    fn shared(&self) -> &Arc<SharedState> {
        self.service.shared()
    }

    fn interval(&self) -> TimeDelta {
        let secs = self.shared().general().main_loop_interval();
        TimeDelta::from_std(secs).unwrap_or(TimeDelta::seconds(60))
    }

    /// Run until shutdown is requested, then perform the safe-shutdown
    /// sequence.  Returns the shutdown reason.
    pub fn run<H, S, Y, A, R, E>(&mut self, ports: &mut Ports<H, S, Y, A, R, E>) -> String
    where
        H: SensorPort + ActuatorPort,
        S: StatePort,
        Y: HistorySink,
        A: LogArchive,
        R: RtcPort,
        E: EventSink,
    {
        self.service.start(&ports.hw, &mut ports.sink);
        while !self.shared().shutdown_requested() {
            let step = panic::catch_unwind(AssertUnwindSafe(|| {
                self.tick(ports);
                self.wait(ports)
            }));
            match step {
                Ok(WaitEnd::Shutdown) => break,
                Ok(_) => {}
                Err(payload) => {
                    let msg = panic_message(payload.as_ref());
                    error!("LOOP | panic: {msg}");
                    self.shared()
                        .request_shutdown(format!("control loop panicked: {msg}"));
                    break;
                }
            }
        }
        let reason = self
            .shared()
            .shutdown_reason()
            .unwrap_or_else(|| "loop ended".to_owned());
        safety::safe_shutdown(
            &reason,
            &mut ports.hw,
            &self.service,
            &mut ports.store,
            &mut ports.archive,
            &mut ports.sink,
        );
        reason
    }

    /// One iteration: sensors, programs, housekeeping.
    pub fn tick<H, S, Y, A, R, E>(&mut self, ports: &mut Ports<H, S, Y, A, R, E>)
    where
        H: SensorPort + ActuatorPort,
        S: StatePort,
        Y: HistorySink,
        A: LogArchive,
        R: RtcPort,
        E: EventSink,
    {
        let now = self.clock.now();
        self.ticks += 1;
        if self.next_boundary.is_none() {
            self.next_boundary = Some(now + self.interval());
        }
        self.shared().update_status(|s| s.last_tick = Some(now));

        self.service
            .refresh_sensors(&mut ports.hw, &mut ports.history, now, &mut ports.sink);
        self.service
            .run_programs(&mut ports.hw, &mut ports.history, &self.clock, &mut ports.sink);

        let sync_interval = TimeDelta::from_std(self.shared().general().clock_sync_interval())
            .unwrap_or(TimeDelta::hours(168));
        self.clock_sync
            .run_if_due(self.clock.now(), sync_interval, &mut ports.rtc, &mut ports.sink);

        self.service.persist_dirty(&mut ports.store, &mut ports.sink);
        self.service.archive_log(&mut ports.archive);
    }

    /// Wait for the next boundary in [`WAIT_STEP`] increments, serving
    /// commands as they arrive.
    pub fn wait<H, S, Y, A, R, E>(&mut self, ports: &mut Ports<H, S, Y, A, R, E>) -> WaitEnd
    where
        H: SensorPort + ActuatorPort,
        S: StatePort,
        Y: HistorySink,
        A: LogArchive,
        R: RtcPort,
        E: EventSink,
    {
        let interval = self.interval();
        let boundary = self
            .next_boundary
            .unwrap_or_else(|| self.clock.now() + interval);
        self.shared().update_status(|s| s.next_tick = Some(boundary));
        let remaining = boundary - self.clock.now();
        self.service.set_activity(format!(
            "waiting for next main loop iteration in {}",
            format_remaining(remaining)
        ));

        let shared = Arc::clone(self.shared());
        let end = loop {
            if shared.shutdown_requested() {
                break WaitEnd::Shutdown;
            }
            let mut woken = false;
            while let Some(command) = shared.commands().pop() {
                let outcome = self.service.handle_command(
                    command,
                    &mut ports.hw,
                    &mut ports.history,
                    &self.clock,
                    &mut ports.sink,
                );
                woken |= outcome == CommandOutcome::Wake;
            }
            self.service.persist_dirty(&mut ports.store, &mut ports.sink);
            if woken {
                info!("main loop woken early");
                break WaitEnd::Woken;
            }

            let now = self.clock.now();
            if now >= boundary {
                break WaitEnd::Boundary;
            }
            let left = (boundary - now).to_std().unwrap_or(WAIT_STEP);
            pause(&mut self.delay, left.min(WAIT_STEP));
        };

        if end == WaitEnd::Boundary {
            self.next_boundary = Some(advance(boundary, interval, self.clock.now()));
        }
        end
    }
}

/// First boundary after `now`, stepping from `boundary` in whole intervals.
pub fn advance(boundary: NaiveDateTime, interval: TimeDelta, now: NaiveDateTime) -> NaiveDateTime {
    if interval <= TimeDelta::zero() {
        return now;
    }
    let mut next = boundary + interval;
    if next <= now {
        let behind = (now - next).num_milliseconds();
        let step = interval.num_milliseconds().max(1);
        next += interval * i32::try_from(behind / step + 1).unwrap_or(i32::MAX);
    }
    next
}

/// Text of a caught panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
