//! RTC housekeeping.
//!
//! Runs on the first tick and then every `clock_sync_interval`.  A system
//! clock earlier than [`PLAUSIBLE_EPOCH`] is taken to be unset (no network
//! time after a power cut) and is restored from the RTC; otherwise the
//! system clock is authoritative and the RTC is corrected from it.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use crate::app::events::{AppEvent, ClockSyncOutcome};
use crate::app::ports::{EventSink, RtcPort};

/// Earliest system time considered valid.
pub const PLAUSIBLE_EPOCH: (i32, u32, u32) = (2000, 1, 1);

fn plausible(now: NaiveDateTime) -> bool {
    let (y, m, d) = PLAUSIBLE_EPOCH;
    NaiveDate::from_ymd_opt(y, m, d).is_none_or(|epoch| now.date() >= epoch)
}

#[derive(Debug, Default)]
pub struct ClockSync {
    last: Option<NaiveDateTime>,
}

impl ClockSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_due(&self, now: NaiveDateTime, interval: TimeDelta) -> bool {
        self.last.is_none_or(|last| now - last >= interval || now < last)
    }

    /// Synchronize if due.  Returns `None` when not due.
    pub fn run_if_due(
        &mut self,
        now: NaiveDateTime,
        interval: TimeDelta,
        rtc: &mut impl RtcPort,
        sink: &mut impl EventSink,
    ) -> Option<ClockSyncOutcome> {
        if !self.is_due(now, interval) {
            return None;
        }
        self.last = Some(now);
        let outcome = sync(now, rtc, sink);
        sink.emit(&AppEvent::ClockSync(outcome));
        Some(outcome)
    }
}

fn sync(now: NaiveDateTime, rtc: &mut impl RtcPort, sink: &mut impl EventSink) -> ClockSyncOutcome {
    if !rtc.is_present() {
        return ClockSyncOutcome::Skipped;
    }
    match rtc.battery_ok() {
        Ok(true) => {}
        Ok(false) => sink.emit(&AppEvent::ClockSync(ClockSyncOutcome::BatteryLow)),
        Err(e) => {
            log::error!("CLOCK | RTC battery check failed: {e}");
            return ClockSyncOutcome::Failed;
        }
    }
    let res = if plausible(now) {
        rtc.set_rtc_from_system().map(|()| ClockSyncOutcome::RtcFromSystem)
    } else {
        rtc.set_system_from_rtc().map(|()| ClockSyncOutcome::SystemFromRtc)
    };
    res.unwrap_or_else(|e| {
        log::error!("CLOCK | {e}");
        ClockSyncOutcome::Failed
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::RtcError;

    #[derive(Default)]
    struct Rtc {
        battery_low: bool,
        system_set: u32,
        rtc_set: u32,
    }

    impl RtcPort for Rtc {
        fn is_present(&self) -> bool {
            true
        }
        fn battery_ok(&mut self) -> Result<bool, RtcError> {
            Ok(!self.battery_low)
        }
        fn set_system_from_rtc(&mut self) -> Result<(), RtcError> {
            self.system_set += 1;
            Ok(())
        }
        fn set_rtc_from_system(&mut self) -> Result<(), RtcError> {
            self.rtc_set += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct Events(Vec<ClockSyncOutcome>);

    impl EventSink for Events {
        fn emit(&mut self, event: &AppEvent) {
            if let AppEvent::ClockSync(o) = event {
                self.0.push(*o);
            }
        }
    }

    fn at(y: i32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, 1, d).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    #[test]
    fn plausible_clock_sets_rtc_weekly() {
        let mut sync = ClockSync::new();
        let mut rtc = Rtc::default();
        let mut events = Events::default();
        let week = TimeDelta::hours(168);
        assert_eq!(
            sync.run_if_due(at(2024, 1), week, &mut rtc, &mut events),
            Some(ClockSyncOutcome::RtcFromSystem)
        );
        assert_eq!(sync.run_if_due(at(2024, 7), week, &mut rtc, &mut events), None);
        assert!(sync.run_if_due(at(2024, 8), week, &mut rtc, &mut events).is_some());
        assert_eq!(rtc.rtc_set, 2);
        assert_eq!(rtc.system_set, 0);
    }

    #[test]
    fn unset_clock_is_restored_from_rtc() {
        let mut rtc = Rtc::default();
        let outcome = ClockSync::new().run_if_due(at(1970, 1), TimeDelta::hours(1), &mut rtc, &mut Events::default());
        assert_eq!(outcome, Some(ClockSyncOutcome::SystemFromRtc));
        assert_eq!(rtc.system_set, 1);
    }

    #[test]
    fn low_battery_is_reported_and_sync_continues() {
        let mut rtc = Rtc {
            battery_low: true,
            ..Default::default()
        };
        let mut events = Events::default();
        ClockSync::new().run_if_due(at(2024, 1), TimeDelta::hours(1), &mut rtc, &mut events);
        assert_eq!(events.0, vec![ClockSyncOutcome::BatteryLow, ClockSyncOutcome::RtcFromSystem]);
    }

    #[test]
    fn missing_rtc_is_skipped() {
        let mut rtc = crate::adapters::time::NoRtc;
        let outcome = ClockSync::new().run_if_due(at(2024, 1), TimeDelta::hours(1), &mut rtc, &mut Events::default());
        assert_eq!(outcome, Some(ClockSyncOutcome::Skipped));
    }
}
