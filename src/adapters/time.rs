//! Clock adapters.
//!
//! - [`SystemClock`]: wall time from the host's local clock.
//! - [`SimClock`]: simulated wall and monotonic time that only moves when
//!   somebody delays on it.  Implements [`ClockPort`], `DelayNs` and
//!   [`Timebase`], so one instance drives both the scheduler and the HAL in
//!   tests.
//! - [`NoRtc`]: the RTC port when no battery-backed clock is fitted.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime, TimeDelta};
use embedded_hal::delay::DelayNs;

use crate::app::ports::{ClockPort, RtcError, RtcPort};
use crate::app::state::lock;
use crate::drivers::timebase::Timebase;

/// Local wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockPort for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

struct SimInner {
    origin: NaiveDateTime,
    elapsed: Duration,
}

/// Deterministic clock.  Clones share the same time.
#[derive(Clone)]
pub struct SimClock {
    inner: Arc<Mutex<SimInner>>,
}

impl Default for SimClock {
    /// Starts at Monday 2024-01-01 00:00.
    fn default() -> Self {
        let origin = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or_default();
        Self::starting_at(origin)
    }
}

impl SimClock {
    pub fn starting_at(origin: NaiveDateTime) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimInner {
                origin,
                elapsed: Duration::ZERO,
            })),
        }
    }

    pub fn advance(&self, by: Duration) {
        lock(&self.inner).elapsed += by;
    }

    /// Jump the wall clock to `now`.  Monotonic time is unaffected.
    pub fn set_now(&self, now: NaiveDateTime) {
        let mut inner = lock(&self.inner);
        let since = TimeDelta::from_std(inner.elapsed).unwrap_or(TimeDelta::MAX);
        inner.origin = now.checked_sub_signed(since).unwrap_or(now);
    }

    pub fn elapsed(&self) -> Duration {
        lock(&self.inner).elapsed
    }
}

impl ClockPort for SimClock {
    fn now(&self) -> NaiveDateTime {
        let inner = lock(&self.inner);
        let since = TimeDelta::from_std(inner.elapsed).unwrap_or(TimeDelta::MAX);
        inner.origin.checked_add_signed(since).unwrap_or(inner.origin)
    }
}

impl DelayNs for SimClock {
    fn delay_ns(&mut self, ns: u32) {
        self.advance(Duration::from_nanos(u64::from(ns)));
    }

    fn delay_us(&mut self, us: u32) {
        self.advance(Duration::from_micros(u64::from(us)));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.advance(Duration::from_millis(u64::from(ms)));
    }
}

impl Timebase for SimClock {
    fn elapsed(&self) -> Duration {
        SimClock::elapsed(self)
    }
}

/// RTC port without an RTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRtc;

impl RtcPort for NoRtc {
    fn is_present(&self) -> bool {
        false
    }

    fn battery_ok(&mut self) -> Result<bool, RtcError> {
        Ok(true)
    }

    fn set_system_from_rtc(&mut self) -> Result<(), RtcError> {
        Err(RtcError::Bus)
    }

    fn set_rtc_from_system(&mut self) -> Result<(), RtcError> {
        Err(RtcError::Bus)
    }
}
