//! Delay and monotonic time source for settle/poll timing.
//!
//! HAL code blocks through [`embedded_hal::delay::DelayNs`] and measures
//! pumping time through [`Timebase::elapsed`].  Production uses
//! [`StdTimebase`]; tests substitute
//! [`SimClock`](crate::adapters::time::SimClock), which advances instantly
//! on every delay.

use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;

use crate::error::HardwareError;

/// Delay provider with a monotonic clock.
pub trait Timebase: DelayNs {
    /// Monotonic time since an arbitrary origin.
    fn elapsed(&self) -> Duration;
}

/// Block for `duration`, splitting it into `DelayNs`-sized chunks.
pub fn pause<D: DelayNs + ?Sized>(delay: &mut D, duration: Duration) {
    let mut ms = duration.as_millis();
    while ms > 0 {
        let chunk = ms.min(u128::from(u32::MAX)) as u32;
        delay.delay_ms(chunk);
        ms -= u128::from(chunk);
    }
    let us = duration.subsec_micros() % 1000;
    if us > 0 {
        delay.delay_us(us);
    }
    let ns = duration.subsec_nanos() % 1000;
    if ns > 0 {
        delay.delay_ns(ns);
    }
}

/// `Duration` from fractional seconds.  Negative and NaN become zero; a
/// value too large for a `Duration` is an error.
pub fn secs(value: f64) -> Result<Duration, HardwareError> {
    if value.is_nan() || value <= 0.0 {
        return Ok(Duration::ZERO);
    }
    Duration::try_from_secs_f64(value).map_err(|_| HardwareError::TimingOutOfRange)
}

/// Thread-sleeping timebase backed by [`Instant`].
pub struct StdTimebase {
    origin: Instant,
}

impl StdTimebase {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for StdTimebase {
    fn default() -> Self {
        Self::new()
    }
}

impl DelayNs for StdTimebase {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(u64::from(ns)));
    }

    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(u64::from(us)));
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

impl Timebase for StdTimebase {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}
