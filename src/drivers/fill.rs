//! Station fill state machine.
//!
//! ```text
//!   Idle ──▶ ValveOpening ──▶ Pumping ──▶ ValveClosing ──▶ Idle
//!             open valve       start pump    stop pump
//!             valve settle     wait policy   source settle
//!                                            close valve
//!                                            valve settle
//! ```
//!
//! Wait policy while pumping:
//!
//! - **Fixed** (`None` / `Min` probes): the probe cannot report fullness,
//!   so the pump runs for exactly the expected time.
//! - **UntilFull** (all other probes): poll the station level every
//!   [`LEVEL_POLL_INTERVAL`] until it exceeds the upper threshold, the
//!   source runs dry, or the safety limit (`timeout_factor × expected`)
//!   elapses.
//!
//! The sequence is written against [`FillIo`] so the same code drives the
//! HAL and scripted test rigs.  On any fault the pump is commanded off
//! before the error leaves [`run_fill`].

use std::time::Duration;

use log::{error, warn};
use serde::Serialize;

use crate::error::HardwareError;

/// Station level polling period while pumping.
pub const LEVEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum FillPhase {
    #[default]
    Idle,
    ValveOpening,
    Pumping,
    ValveClosing,
}

/// How a fill ended.  Every variant carries the pumping time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FillOutcome {
    /// Level crossed the upper threshold, or the fixed run time elapsed.
    Completed { elapsed: Duration },
    /// The source ran dry while pumping.
    AbortedSourceEmpty { elapsed: Duration },
    /// The safety limit elapsed before the station reported full.
    TimedOut { elapsed: Duration },
}

impl FillOutcome {
    pub fn elapsed(&self) -> Duration {
        match *self {
            Self::Completed { elapsed }
            | Self::AbortedSourceEmpty { elapsed }
            | Self::TimedOut { elapsed } => elapsed,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::AbortedSourceEmpty { .. } => "source empty",
            Self::TimedOut { .. } => "time limit exceeded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    Fixed,
    UntilFull,
}

/// Everything the sequence needs to know about one fill.
#[derive(Debug, Clone)]
pub struct FillPlan {
    pub station: usize,
    pub upper_threshold: f32,
    /// Pumping time expected for the station's capacity.
    pub expected: Duration,
    pub policy: WaitPolicy,
    pub valve_settle: Duration,
    pub source_settle: Duration,
    /// Safety limit as a multiple of `expected`.
    pub timeout_factor: f64,
}

impl FillPlan {
    pub fn time_limit(&self) -> Duration {
        let factor = if self.timeout_factor.is_finite() && self.timeout_factor > 0.0 {
            self.timeout_factor
        } else {
            1.0
        };
        Duration::try_from_secs_f64(self.expected.as_secs_f64() * factor).unwrap_or(self.expected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FillReport {
    pub station: usize,
    pub outcome: FillOutcome,
    pub expected: Duration,
    pub limit: Duration,
}

impl FillReport {
    /// Pumping took longer than the safety limit allows.
    pub fn exceeded_limit(&self) -> bool {
        self.outcome.elapsed() > self.limit
    }
}

/// Hardware operations used by the fill sequence.
pub trait FillIo {
    /// Observe a phase transition.
    fn enter_phase(&mut self, phase: FillPhase);

    fn open_valve(&mut self, station: usize) -> Result<(), HardwareError>;

    fn close_valve(&mut self, station: usize) -> Result<(), HardwareError>;

    fn start_pump(&mut self) -> Result<(), HardwareError>;

    fn stop_pump(&mut self) -> Result<(), HardwareError>;

    fn station_level(&mut self, station: usize) -> Result<f32, HardwareError>;

    fn source_level(&mut self) -> Result<f32, HardwareError>;

    fn pause(&mut self, duration: Duration);

    /// Monotonic time.
    fn elapsed(&self) -> Duration;
}

/// Run one fill.  The pump is off when this returns, `Ok` or `Err`.
pub fn run_fill<I: FillIo + ?Sized>(io: &mut I, plan: &FillPlan) -> Result<FillReport, HardwareError> {
    let result = sequence(io, plan);
    if let Err(fault) = &result {
        error!("FILL | station={} fault: {fault}, forcing pump off", plan.station);
        if let Err(e) = io.stop_pump() {
            error!("FILL | forced pump stop failed: {e}");
        }
        if let Err(e) = io.close_valve(plan.station) {
            warn!("FILL | valve {} close after fault failed: {e}", plan.station);
        }
        io.enter_phase(FillPhase::Idle);
    }
    result
}

enum Ending {
    Full,
    SourceEmpty,
    Timeout,
}

fn sequence<I: FillIo + ?Sized>(io: &mut I, plan: &FillPlan) -> Result<FillReport, HardwareError> {
    let limit = plan.time_limit();

    io.enter_phase(FillPhase::ValveOpening);
    io.open_valve(plan.station)?;
    io.pause(plan.valve_settle);

    io.enter_phase(FillPhase::Pumping);
    io.start_pump()?;
    let started = io.elapsed();
    let ending = match plan.policy {
        WaitPolicy::Fixed => {
            io.pause(plan.expected);
            Ending::Full
        }
        WaitPolicy::UntilFull => wait_until_full(io, plan, started, limit)?,
    };
    io.stop_pump()?;
    let elapsed = io.elapsed().saturating_sub(started);

    io.enter_phase(FillPhase::ValveClosing);
    io.pause(plan.source_settle);
    io.close_valve(plan.station)?;
    io.pause(plan.valve_settle);
    io.enter_phase(FillPhase::Idle);

    let outcome = match ending {
        Ending::Full => FillOutcome::Completed { elapsed },
        Ending::SourceEmpty => FillOutcome::AbortedSourceEmpty { elapsed },
        Ending::Timeout => FillOutcome::TimedOut { elapsed },
    };
    Ok(FillReport {
        station: plan.station,
        outcome,
        expected: plan.expected,
        limit,
    })
}

fn wait_until_full<I: FillIo + ?Sized>(
    io: &mut I,
    plan: &FillPlan,
    started: Duration,
    limit: Duration,
) -> Result<Ending, HardwareError> {
    loop {
        if io.elapsed().saturating_sub(started) >= limit {
            return Ok(Ending::Timeout);
        }
        if io.station_level(plan.station)? > plan.upper_threshold {
            return Ok(Ending::Full);
        }
        if io.source_level()? <= 0.0 {
            return Ok(Ending::SourceEmpty);
        }
        io.pause(LEVEL_POLL_INTERVAL);
    }
}
