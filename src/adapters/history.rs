//! Plain-text archives under the data directory.
//!
//! ```text
//!   <data_dir>/history/station0.csv   2024-05-01 06:00:12; 0.45; water level
//!   <data_dir>/history/source.csv     2024-05-01 06:00:12; 0.80; water level
//!   <data_dir>/history/temp.csv       2024-05-01 06:00:12; 21.5; temperature
//!   <data_dir>/activity.log           one activity line per line, newest last
//! ```

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::app::ports::{HistoryKind, HistorySink, LogArchive, StorageError};

/// Subdirectory of the data directory holding the history files.
pub const HISTORY_DIR: &str = "history";
/// Activity log file name inside the data directory.
pub const ACTIVITY_LOG: &str = "activity.log";

/// Timestamp format of history lines.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn io_err(e: &std::io::Error) -> StorageError {
    StorageError::Io(e.to_string())
}

/// Format one history line (without the newline).
pub fn history_line(at: NaiveDateTime, value: f64, kind: HistoryKind) -> String {
    format!("{}; {value}; {kind}", at.format(TIMESTAMP_FORMAT))
}

/// Appends history lines to `<dir>/<entity>.csv`.
pub struct FileHistory {
    dir: PathBuf,
}

impl FileHistory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// History files at their place under `data_dir`.
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(HISTORY_DIR))
    }

    pub fn path_for(&self, entity: &str) -> PathBuf {
        self.dir.join(format!("{entity}.csv"))
    }
}

impl HistorySink for FileHistory {
    fn record(
        &mut self,
        entity: &str,
        at: NaiveDateTime,
        value: f64,
        kind: HistoryKind,
    ) -> Result<(), StorageError> {
        if entity.is_empty() || !entity.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
            return Err(StorageError::Io(format!("invalid history entity \"{entity}\"")));
        }
        fs::create_dir_all(&self.dir).map_err(|e| io_err(&e))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(entity))
            .map_err(|e| io_err(&e))?;
        writeln!(file, "{}", history_line(at, value, kind)).map_err(|e| io_err(&e))
    }
}

/// Activity log file, trimmed to the newest `limit` lines on every append.
pub struct LogFile {
    path: PathBuf,
}

impl LogFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Activity log at its place under `data_dir`.
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(ACTIVITY_LOG))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogArchive for LogFile {
    fn append(&mut self, lines: &[String], limit: usize) -> Result<(), StorageError> {
        let existing = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(io_err(&e)),
        };
        let all: Vec<&str> = existing
            .lines()
            .chain(lines.iter().map(String::as_str))
            .collect();
        let keep = &all[all.len().saturating_sub(limit)..];

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| io_err(&e))?;
        }
        let tmp = self.path.with_extension("log.tmp");
        let mut text = keep.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        fs::write(&tmp, text).map_err(|e| io_err(&e))?;
        fs::rename(&tmp, &self.path).map_err(|e| io_err(&e))
    }
}
