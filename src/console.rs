//! Line-oriented operator console.
//!
//! Reads commands from stdin on its own thread and drives the
//! [`ControlHandle`].  Nothing here touches hardware; manual watering is
//! queued for the loop like any other serving-side request.
//!
//! | Command    | Effect                                   |
//! |------------|------------------------------------------|
//! | `status`   | levels, ambient readings, program lines  |
//! | `log [n]`  | last `n` activity lines (default 20)     |
//! | `programs` | program parameters                       |
//! | `plan [d]` | calendar runs over the next `d` days     |
//! | `run <i>`  | water station `i` now                    |
//! | `wake`     | start the next loop iteration now        |
//! | `enable`   | turn automation on                       |
//! | `disable`  | turn automation off                      |
//! | `quit`     | safe shutdown                            |

use std::fmt::Write as _;
use std::io::{self, BufRead};
use std::thread::JoinHandle;

use log::info;

use crate::app::handle::ControlHandle;
use crate::scheduler::{MAX_PLAN_DAYS, PLAN_HORIZON_DAYS, ProgramMode};
use crate::sensors::ambient::AmbientKind;

const HELP: &str = "commands: status, log [n], programs, plan [days], run <station>, wake, enable, disable, quit";

/// Result of one console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    /// Stop reading input.
    pub quit: bool,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quit: false,
        }
    }
}

fn percent(level: f32) -> String {
    format!("{:.0}%", level * 100.0)
}

/// Execute one console line.
pub fn execute(handle: &ControlHandle, line: &str) -> Reply {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Reply::text("");
    };
    let arg = words.next();

    match command {
        "status" => Reply::text(status(handle)),
        "log" => {
            let n = arg.and_then(|a| a.parse::<usize>().ok()).unwrap_or(20);
            let lines = handle.activity();
            let skip = lines.len().saturating_sub(n);
            Reply::text(lines[skip..].join("\n"))
        }
        "programs" => Reply::text(programs(handle)),
        "plan" => {
            let days = match arg.map(str::parse::<i64>) {
                None => PLAN_HORIZON_DAYS,
                Some(Ok(days)) if (1..=MAX_PLAN_DAYS).contains(&days) => days,
                Some(_) => return Reply::text(format!("usage: plan [days, 1 to {MAX_PLAN_DAYS}]")),
            };
            match handle.plan(days) {
                Ok(runs) if runs.is_empty() => Reply::text("no runs planned"),
                Ok(runs) => Reply::text(
                    runs.iter()
                        .map(|r| format!("{}  {} ({})", r.time.format("%a %Y-%m-%d %H:%M"), r.name, r.program))
                        .collect::<Vec<_>>()
                        .join("\n"),
                ),
                Err(e) => Reply::text(format!("error: {e}")),
            }
        }
        "run" => match arg.map(str::parse::<usize>) {
            Some(Ok(station)) => match handle.run_station(station) {
                Ok(()) => Reply::text(format!("station {station} queued")),
                Err(e) => Reply::text(format!("error: {e}")),
            },
            _ => Reply::text("usage: run <station>"),
        },
        "wake" => match handle.wake() {
            Ok(()) => Reply::text("ok"),
            Err(e) => Reply::text(format!("error: {e}")),
        },
        "enable" | "disable" => {
            handle.set_automation(command == "enable");
            Reply::text(format!("automation {command}d"))
        }
        "quit" | "exit" => {
            handle.request_shutdown("quit from console");
            Reply {
                text: "shutting down".into(),
                quit: true,
            }
        }
        "help" => Reply::text(HELP),
        other => Reply::text(format!("unknown command \"{other}\"; {HELP}")),
    }
}

fn status(handle: &ControlHandle) -> String {
    let s = handle.status();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "automation {}{}",
        if handle.automation_enabled() { "enabled" } else { "disabled" },
        if s.simulated { " (no hardware)" } else { "" }
    );
    let _ = writeln!(out, "activity: {}", s.activity);
    let _ = writeln!(out, "source: {}", percent(s.source_level));
    for (i, level) in s.station_levels.iter().enumerate() {
        let name = handle.station(i).map(|st| st.name).unwrap_or_default();
        let _ = writeln!(out, "station {i} \"{name}\": {}", percent(*level));
    }
    for kind in AmbientKind::ALL {
        if s.ambient.is_available(kind) {
            let _ = writeln!(out, "{kind}: {}", s.ambient.get(kind));
        }
    }
    for p in &s.programs {
        let _ = writeln!(out, "program {} \"{}\": {}", p.id, p.name, p.next_run);
    }
    if let Some(next) = s.next_tick {
        let _ = write!(out, "next iteration at {}", next.format("%H:%M:%S"));
    }
    out.trim_end().to_owned()
}

fn programs(handle: &ControlHandle) -> String {
    let programs = handle.programs();
    if programs.is_empty() {
        return "no programs".into();
    }
    programs
        .iter()
        .map(|p| {
            let mode = match &p.mode {
                ProgramMode::WaterLevel {
                    min_delay_hours,
                    empty_delay_hours,
                } => format!("water level, min delay {min_delay_hours} h, empty for {empty_delay_hours} h"),
                ProgramMode::Weekly { days, repeat_hours } => {
                    format!("weekly on {days:?}, every {repeat_hours} h")
                }
                ProgramMode::Interval {
                    interval_days,
                    repeat_hours,
                } => format!("every {interval_days} days, every {repeat_hours} h"),
            };
            format!(
                "{} \"{}\" [{}] stations {:?}, {mode}, window {}",
                p.id,
                p.name,
                if p.enabled { "on" } else { "off" },
                p.stations,
                p.window
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Read stdin until end of input or `quit`.
pub fn spawn_console(handle: ControlHandle) -> io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                let reply = execute(&handle, &line);
                if !reply.text.is_empty() {
                    println!("{}", reply.text);
                }
                if reply.quit {
                    return;
                }
            }
            info!("console input closed");
        })
}
