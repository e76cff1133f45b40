//! Program scheduler: "should watering start now?"
//!
//! Pure decision logic.  The control loop calls [`evaluate`] once per
//! tick for every program and runs the triggered ones; the scheduler never
//! touches hardware.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Trigger modes                         │
//! │                                                              │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐      │
//! │  │ WaterLevel   │   │ Weekly       │   │ Interval     │      │
//! │  │ all stations │   │ weekday set  │   │ every N days │      │
//! │  │ empty long   │   │ + repeat h   │   │ + repeat h   │      │
//! │  │ enough       │   │ in window    │   │ in window    │      │
//! │  └──────┬───────┘   └──────┬───────┘   └──────┬───────┘      │
//! │         │                  │   next slot ≥ now│              │
//! │         │                  ▼                  ▼              │
//! │         │          ┌─────────────────────────────────┐       │
//! │         │          │ tolerance: |slot − now| < tol   │       │
//! │         │          │ and now > last run + tol        │       │
//! │         │          └───────────────┬─────────────────┘       │
//! │         ▼                          ▼                         │
//! │                     Decision { ready, reason, next_run }     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The tolerance is `schedule_tolerance_factor × main loop interval`
//! (2 × 60 s by default).  Programs are only evaluated once per tick, so
//! exact matching would miss runs.
//!
//! Calendar arithmetic is local wall-clock time ([`NaiveDateTime`]).

use core::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

/// Default planning horizon of [`plan_runs`].
pub const PLAN_HORIZON_DAYS: i64 = 14;

/// Longest horizon a caller may ask [`plan_runs`] for.
pub const MAX_PLAN_DAYS: i64 = 366;

/// Iteration cap per program in [`plan_runs`].
pub const PLAN_LIMIT: usize = 1400;

/// Upper bound of both water-level delays.
pub const MAX_DELAY_HOURS: f32 = 24.0 * 365.0;

// ═══════════════════════════════════════════════════════════════
//  Program types
// ═══════════════════════════════════════════════════════════════

/// Stable program identity; survives reordering and concurrent edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProgramId(pub u32);

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProgramMode {
    /// Water when every assigned station is empty.
    WaterLevel {
        /// Minimum hours since the last run.
        min_delay_hours: f32,
        /// Hours the stations must have been continuously empty.
        empty_delay_hours: f32,
    },
    /// Water on selected weekdays (1 = Monday .. 7 = Sunday).
    Weekly {
        days: heapless::Vec<u8, 7>,
        repeat_hours: f32,
    },
    /// Water every `interval_days`, anchored at the last run's day.
    Interval { interval_days: u16, repeat_hours: f32 },
}

impl ProgramMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::WaterLevel { .. } => "water level",
            Self::Weekly { .. } => "weekly",
            Self::Interval { .. } => "interval",
        }
    }

    pub fn is_calendar(&self) -> bool {
        !matches!(self, Self::WaterLevel { .. })
    }
}

/// Daily time-of-day window a program may start in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from_hour: u8,
    pub from_minute: u8,
    pub to_hour: u8,
    pub to_minute: u8,
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self {
            from_hour: 6,
            from_minute: 0,
            to_hour: 19,
            to_minute: 0,
        }
    }
}

impl TimeWindow {
    pub fn start_on(&self, date: NaiveDate) -> Result<NaiveDateTime, ScheduleError> {
        date.and_hms_opt(self.from_hour.into(), self.from_minute.into(), 0)
            .ok_or(ScheduleError::InvalidWindow)
    }

    pub fn end_on(&self, date: NaiveDate) -> Result<NaiveDateTime, ScheduleError> {
        date.and_hms_opt(self.to_hour.into(), self.to_minute.into(), 0)
            .ok_or(ScheduleError::InvalidWindow)
    }

    fn validate(&self) -> Result<(), ScheduleError> {
        let valid = self.from_hour < 24
            && self.to_hour < 24
            && self.from_minute < 60
            && self.to_minute < 60
            && (self.from_hour, self.from_minute) <= (self.to_hour, self.to_minute);
        if valid { Ok(()) } else { Err(ScheduleError::InvalidWindow) }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}-{:02}:{:02}",
            self.from_hour, self.from_minute, self.to_hour, self.to_minute
        )
    }
}

/// Scheduling memory carried between evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleMemory {
    pub time_last_run: NaiveDateTime,
    /// All stations were found empty and have not been seen non-empty since.
    pub found_empty: bool,
    /// Meaningful only while `found_empty` is set.
    pub time_found_empty: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub id: ProgramId,
    pub name: String,
    pub enabled: bool,
    /// Station indices, sorted and unique.
    pub stations: Vec<usize>,
    pub mode: ProgramMode,
    pub window: TimeWindow,
    pub memory: ScheduleMemory,
}

impl Program {
    /// A disabled interval program (daily, every 5 h, 06:00-19:00) that
    /// last ran a day ago.
    pub fn new(id: ProgramId, now: NaiveDateTime) -> Self {
        Self {
            id,
            name: "new program".into(),
            enabled: false,
            stations: Vec::new(),
            mode: ProgramMode::Interval {
                interval_days: 1,
                repeat_hours: 5.0,
            },
            window: TimeWindow::default(),
            memory: ScheduleMemory {
                time_last_run: now - TimeDelta::days(1),
                found_empty: false,
                time_found_empty: now,
            },
        }
    }

    /// Sort and deduplicate station indices and weekdays.
    pub fn normalize(&mut self) {
        self.stations.sort_unstable();
        self.stations.dedup();
        if let ProgramMode::Weekly { days, .. } = &mut self.mode {
            days.sort_unstable();
            let mut unique: heapless::Vec<u8, 7> = heapless::Vec::new();
            for d in days.iter() {
                if !unique.contains(d) {
                    // Capacity equals the source's; cannot overflow.
                    let _ = unique.push(*d);
                }
            }
            *days = unique;
        }
    }

    pub fn validate(&self, station_count: usize) -> Result<(), ScheduleError> {
        if self.name.trim().is_empty() {
            return Err(ScheduleError::EmptyName);
        }
        if let Some(&st) = self.stations.iter().find(|&&st| st >= station_count) {
            return Err(ScheduleError::StationOutOfRange(st));
        }
        self.window.validate()?;
        check_mode(&self.mode)
    }

    /// Re-anchor an interval program after an edit so the next run falls on
    /// today's window start.
    pub fn reanchor(&mut self, now: NaiveDateTime) -> Result<(), ScheduleError> {
        if let ProgramMode::Interval { interval_days, .. } = self.mode {
            let start = self.window.start_on(now.date())?;
            self.memory.time_last_run = start - TimeDelta::days(i64::from(interval_days));
        }
        Ok(())
    }

    /// Record a completed run.  The empty latch restarts so a water-level
    /// program needs a fresh empty period before it can run again.
    pub fn mark_watered(&mut self, now: NaiveDateTime) {
        self.memory.time_last_run = now;
        self.memory.found_empty = false;
        self.memory.time_found_empty = now - TimeDelta::days(1);
    }
}

fn check_mode(mode: &ProgramMode) -> Result<(), ScheduleError> {
    let repeat_ok = |h: f32| h.is_finite() && h > 0.0 && h < 24.0;
    match mode {
        ProgramMode::WaterLevel {
            min_delay_hours,
            empty_delay_hours,
        } => {
            let ok = |h: f32| h.is_finite() && h >= 0.0;
            if !(ok(*min_delay_hours) && ok(*empty_delay_hours)) {
                return Err(ScheduleError::NegativeDelay);
            }
            if *min_delay_hours > MAX_DELAY_HOURS || *empty_delay_hours > MAX_DELAY_HOURS {
                return Err(ScheduleError::DelayTooLong);
            }
            Ok(())
        }
        ProgramMode::Weekly { days, repeat_hours } => {
            if days.is_empty() || days.iter().any(|d| !(1..=7).contains(d)) {
                return Err(ScheduleError::NoValidWeekday);
            }
            if repeat_ok(*repeat_hours) { Ok(()) } else { Err(ScheduleError::NonPositiveRepeat) }
        }
        ProgramMode::Interval {
            interval_days,
            repeat_hours,
        } => {
            if *interval_days == 0 {
                return Err(ScheduleError::NonPositiveInterval);
            }
            if repeat_ok(*repeat_hours) { Ok(()) } else { Err(ScheduleError::NonPositiveRepeat) }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Evaluation
// ═══════════════════════════════════════════════════════════════

/// Why a program is, or is not, ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Reason {
    Ready,
    Disabled,
    SourceEmpty,
    StationsNotEmpty,
    TooSoonSinceLastRun,
    NotEmptyLongEnough,
    NotValidDay,
    NotValidWeekday,
    NotValidTimeOfDay,
    LaterThanWindowEnd,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ready => "ready for watering",
            Self::Disabled => "disabled",
            Self::SourceEmpty => "source is empty",
            Self::StationsNotEmpty => "some stations still not empty",
            Self::TooSoonSinceLastRun => "not long enough from last watering",
            Self::NotEmptyLongEnough => "stations not empty long enough",
            Self::NotValidDay => "not valid day",
            Self::NotValidWeekday => "not valid day of week",
            Self::NotValidTimeOfDay => "not valid time of a day",
            Self::LaterThanWindowEnd => "later than the end of the window",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub ready: bool,
    pub reason: Reason,
    /// Estimated next run; `None` when it cannot be known yet.
    pub next_run: Option<NaiveDateTime>,
}

impl Decision {
    fn not_ready(reason: Reason, next_run: Option<NaiveDateTime>) -> Self {
        Self {
            ready: false,
            reason,
            next_run,
        }
    }

    /// Display text: "disabled", "not yet empty", or the time remaining.
    pub fn summary(&self, now: NaiveDateTime) -> String {
        match (self.reason, self.next_run) {
            (Reason::Disabled, _) => "disabled".into(),
            (Reason::SourceEmpty, _) => "source is empty".into(),
            (_, None) => "not yet empty".into(),
            (_, Some(next)) => format_remaining(next - now),
        }
    }
}

/// Everything [`evaluate`] needs besides the program.
#[derive(Debug, Clone, Copy)]
pub struct Conditions<'a> {
    pub now: NaiveDateTime,
    pub source_level: f32,
    /// Current level per station index.
    pub station_levels: &'a [f32],
    /// Low threshold per station index.
    pub low_thresholds: &'a [f32],
    pub tolerance: TimeDelta,
}

/// Decide whether `program` should run now.
///
/// Mutates only the water-level empty latch.  Errors are fatal to this
/// program's evaluation only.
pub fn evaluate(program: &mut Program, cond: &Conditions<'_>) -> Result<Decision, ScheduleError> {
    if !program.enabled {
        return Ok(Decision::not_ready(Reason::Disabled, None));
    }
    if cond.source_level <= 0.0 {
        return Ok(Decision::not_ready(Reason::SourceEmpty, None));
    }
    check_mode(&program.mode)?;

    match program.mode {
        ProgramMode::WaterLevel {
            min_delay_hours,
            empty_delay_hours,
        } => water_level(program, cond, hours(min_delay_hours), hours(empty_delay_hours)),
        ProgramMode::Weekly { .. } | ProgramMode::Interval { .. } => {
            let (next, reason) = next_slot(program, cond.now)?;
            let ready = in_time_span(cond.now, next, program.memory.time_last_run, cond.tolerance);
            Ok(Decision {
                ready,
                reason: if ready { Reason::Ready } else { reason },
                next_run: Some(next),
            })
        }
    }
}

fn water_level(
    program: &mut Program,
    cond: &Conditions<'_>,
    min_delay: TimeDelta,
    empty_delay: TimeDelta,
) -> Result<Decision, ScheduleError> {
    let mut all_empty = true;
    for &st in &program.stations {
        let level = cond
            .station_levels
            .get(st)
            .ok_or(ScheduleError::StationOutOfRange(st))?;
        let low = cond
            .low_thresholds
            .get(st)
            .ok_or(ScheduleError::StationOutOfRange(st))?;
        if level > low {
            all_empty = false;
        }
    }

    let mem = &mut program.memory;
    if !all_empty {
        // Someone may have watered by hand; the empty period restarts.
        mem.found_empty = false;
        return Ok(Decision::not_ready(Reason::StationsNotEmpty, None));
    }
    if !mem.found_empty {
        mem.found_empty = true;
        mem.time_found_empty = cond.now;
    }

    let earliest = shifted(mem.time_last_run, min_delay)?;
    if cond.now <= earliest {
        return Ok(Decision::not_ready(Reason::TooSoonSinceLastRun, Some(earliest)));
    }
    let empty_long_enough = shifted(mem.time_found_empty, empty_delay)?;
    if cond.now < empty_long_enough {
        return Ok(Decision::not_ready(Reason::NotEmptyLongEnough, Some(empty_long_enough)));
    }
    Ok(Decision {
        ready: true,
        reason: Reason::Ready,
        next_run: Some(cond.now),
    })
}

/// `slot` counts as "now" when it lies within `tolerance` of `now` and the
/// program did not run within the last `tolerance`.
pub fn in_time_span(
    now: NaiveDateTime,
    slot: NaiveDateTime,
    last_run: NaiveDateTime,
    tolerance: TimeDelta,
) -> bool {
    let (Some(cooled), Some(lo), Some(hi)) = (
        last_run.checked_add_signed(tolerance),
        now.checked_sub_signed(tolerance),
        now.checked_add_signed(tolerance),
    ) else {
        return false;
    };
    now > cooled && slot > lo && slot < hi
}

fn shifted(t: NaiveDateTime, by: TimeDelta) -> Result<NaiveDateTime, ScheduleError> {
    t.checked_add_signed(by).ok_or(ScheduleError::TimeOutOfRange)
}

/// Next calendar slot at or after `from`, with the reason `from` itself is
/// not a slot.  Water-level programs have no calendar slot.
pub fn next_slot(
    program: &Program,
    from: NaiveDateTime,
) -> Result<(NaiveDateTime, Reason), ScheduleError> {
    match &program.mode {
        ProgramMode::Weekly { days, repeat_hours } => {
            next_weekly(days, hours(*repeat_hours), &program.window, from)
        }
        ProgramMode::Interval {
            interval_days,
            repeat_hours,
        } => next_interval(
            i64::from(*interval_days),
            hours(*repeat_hours),
            &program.window,
            program.memory.time_last_run,
            from,
        ),
        ProgramMode::WaterLevel { .. } => Err(ScheduleError::NonPositiveInterval),
    }
}

fn next_weekly(
    days: &[u8],
    repeat: TimeDelta,
    window: &TimeWindow,
    from: NaiveDateTime,
) -> Result<(NaiveDateTime, Reason), ScheduleError> {
    if !days.iter().any(|d| (1..=7).contains(d)) {
        return Err(ScheduleError::NoValidWeekday);
    }
    let valid = |date: NaiveDate| days.contains(&(date.weekday().number_from_monday() as u8));

    let today = from.date();
    let mut date = today;
    let mut reason = Reason::NotValidWeekday;
    if valid(today) {
        let slot = first_slot_from(window.start_on(today)?, repeat, from)?;
        if slot.date() == today && slot <= window.end_on(today)? {
            return Ok((slot, Reason::NotValidTimeOfDay));
        }
        reason = Reason::LaterThanWindowEnd;
        date = next_day(date)?;
    }
    while !valid(date) {
        date = next_day(date)?;
    }
    Ok((window.start_on(date)?, reason))
}

fn next_interval(
    interval_days: i64,
    repeat: TimeDelta,
    window: &TimeWindow,
    last_run: NaiveDateTime,
    from: NaiveDateTime,
) -> Result<(NaiveDateTime, Reason), ScheduleError> {
    if interval_days <= 0 {
        return Err(ScheduleError::NonPositiveInterval);
    }
    let today = from.date();
    let mut day = last_run.date();
    let gap = (today - day).num_days();
    if gap > 0 {
        let periods = (gap + interval_days - 1) / interval_days;
        day += TimeDelta::days(periods * interval_days);
    }
    let start = window.start_on(day)?;
    if day != today {
        return Ok((start, Reason::NotValidDay));
    }
    let slot = first_slot_from(start, repeat, from)?;
    if slot > window.end_on(today)? {
        let next_day = day + TimeDelta::days(interval_days);
        return Ok((window.start_on(next_day)?, Reason::LaterThanWindowEnd));
    }
    Ok((slot, Reason::NotValidTimeOfDay))
}

/// First `start + k·repeat` (k ≥ 0) at or after `from`.
fn first_slot_from(
    start: NaiveDateTime,
    repeat: TimeDelta,
    from: NaiveDateTime,
) -> Result<NaiveDateTime, ScheduleError> {
    let step = repeat.num_milliseconds();
    if step <= 0 {
        return Err(ScheduleError::NonPositiveRepeat);
    }
    if start >= from {
        return Ok(start);
    }
    let behind = (from - start).num_milliseconds();
    let mut slot = start + TimeDelta::milliseconds((behind + step - 1) / step * step);
    while slot < from {
        slot += repeat;
    }
    Ok(slot)
}

fn next_day(date: NaiveDate) -> Result<NaiveDate, ScheduleError> {
    date.succ_opt().ok_or(ScheduleError::InvalidWindow)
}

fn hours(h: f32) -> TimeDelta {
    TimeDelta::milliseconds((f64::from(h) * 3_600_000.0).round() as i64)
}

// ═══════════════════════════════════════════════════════════════
//  Display helpers and planning
// ═══════════════════════════════════════════════════════════════

/// "2 hours, 5 minutes".  Seconds are not shown.
pub fn format_remaining(delta: TimeDelta) -> String {
    const PERIODS: [(&str, i64); 5] = [
        ("year", 365 * 86_400),
        ("month", 30 * 86_400),
        ("day", 86_400),
        ("hour", 3_600),
        ("minute", 60),
    ];
    let mut secs = delta.num_seconds();
    let mut parts = Vec::new();
    for (name, len) in PERIODS {
        if secs >= len {
            let n = secs / len;
            secs %= len;
            parts.push(if n == 1 { format!("1 {name}") } else { format!("{n} {name}s") });
        }
    }
    if parts.is_empty() {
        "less than a minute".into()
    } else {
        parts.join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedRun {
    pub time: NaiveDateTime,
    pub program: ProgramId,
    pub name: String,
}

/// Upcoming runs of enabled calendar programs before `from + horizon`,
/// sorted by time.  Water-level programs cannot be planned.
pub fn plan_runs(
    programs: &[Program],
    from: NaiveDateTime,
    horizon: TimeDelta,
) -> Result<Vec<PlannedRun>, ScheduleError> {
    let until = shifted(from, horizon)?;
    let mut runs = Vec::new();
    for program in programs.iter().filter(|p| p.enabled && p.mode.is_calendar()) {
        check_mode(&program.mode)?;
        let mut t = from;
        let mut count = 0;
        loop {
            let (next, _) = next_slot(program, t)?;
            if next >= until {
                break;
            }
            count += 1;
            if count > PLAN_LIMIT {
                return Err(ScheduleError::PlanLimitExceeded);
            }
            runs.push(PlannedRun {
                time: next,
                program: program.id,
                name: program.name.clone(),
            });
            t = shifted(next, TimeDelta::seconds(1))?;
        }
    }
    runs.sort_by(|a, b| a.time.cmp(&b.time).then(a.program.cmp(&b.program)));
    Ok(runs)
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
