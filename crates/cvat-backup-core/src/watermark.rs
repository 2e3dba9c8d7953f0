//! Durable per-task watermarks.
//!
//! The record is a newline-delimited text file, one
//! `task_id<TAB>task_name<TAB>last_update_time` line per task. It is read once
//! when a run starts and replaced once when the run completes; nothing in
//! between touches the file, so an aborted run leaves the previous record
//! intact.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::debug;

use crate::error::BackupError;
use crate::remote::TaskId;

/// Last state seen for a task that was backed up successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watermark {
    pub task_name: String,
    pub last_update_time: String,
}

/// In-memory view of the watermark record, keyed by task id.
#[derive(Debug)]
pub struct WatermarkStore {
    path: PathBuf,
    entries: BTreeMap<TaskId, Watermark>,
}

impl WatermarkStore {
    /// An empty store that will flush to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Read the record at `path`. A missing file yields an empty store.
    ///
    /// Any line that does not split into exactly three tab-separated fields,
    /// or whose first field is not an unsigned integer, fails the load with
    /// [`BackupError::CorruptState`]. Blank lines are ignored.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, BackupError> {
        let mut store = Self::new(path);
        let text = match fs::read_to_string(&store.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %store.path.display(), "no watermark record yet, starting empty");
                return Ok(store);
            }
            Err(e) => return Err(e.into()),
        };

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let corrupt = |reason: String| BackupError::CorruptState {
                path: store.path.clone(),
                line: idx + 1,
                reason,
            };

            let fields: Vec<&str> = line.split('\t').collect();
            let [id, name, time] = fields.as_slice() else {
                return Err(corrupt(format!(
                    "expected 3 tab-separated fields, found {}",
                    fields.len()
                )));
            };
            let task_id: TaskId = id
                .trim()
                .parse()
                .map_err(|_| corrupt(format!("task id {id:?} is not an unsigned integer")))?;

            store.entries.insert(
                task_id,
                Watermark {
                    task_name: name.to_string(),
                    last_update_time: time.to_string(),
                },
            );
        }

        debug!(
            path = %store.path.display(),
            tasks = store.entries.len(),
            "watermark record loaded"
        );
        Ok(store)
    }

    /// Whether `candidate_time` is newer than what was last recorded for the task.
    ///
    /// Unknown tasks are always pending.
    pub fn is_change_pending(&self, task_id: TaskId, candidate_time: &str) -> bool {
        match self.entries.get(&task_id) {
            Some(mark) => is_newer(candidate_time, &mark.last_update_time),
            None => true,
        }
    }

    /// Insert or replace the watermark of a task. Not persisted until [`flush`](Self::flush).
    pub fn record(&mut self, task_id: TaskId, task_name: &str, update_time: &str) {
        self.entries.insert(
            task_id,
            Watermark {
                task_name: single_line(task_name),
                last_update_time: single_line(update_time),
            },
        );
    }

    /// Replace the durable record with the current entries.
    ///
    /// The content goes to a hidden sibling file first and is renamed over
    /// the target, so a crash never leaves a truncated record behind.
    pub fn flush(&self) -> Result<(), BackupError> {
        let mut body = String::new();
        for (task_id, mark) in &self.entries {
            body.push_str(&format!(
                "{}\t{}\t{}\n",
                task_id, mark.task_name, mark.last_update_time
            ));
        }

        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => {
                fs::create_dir_all(p)?;
                p.to_path_buf()
            }
            _ => PathBuf::from("."),
        };
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| BackupError::InvalidConfig {
                message: format!("watermark path has no file name: {}", self.path.display()),
            })?
            .to_string_lossy();
        let tmp = parent.join(format!(".{}.tmp.{}", file_name, std::process::id()));

        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(body.as_bytes())?;
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        debug!(
            path = %self.path.display(),
            tasks = self.entries.len(),
            "watermark record written"
        );
        Ok(())
    }

    pub fn get(&self, task_id: TaskId) -> Option<&Watermark> {
        self.entries.get(&task_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TaskId, &Watermark)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Compare two server timestamps.
///
/// Both sides are read as UTC instants when possible (RFC 3339, or a naive
/// ISO-8601 date-time taken as UTC). If either side does not parse the raw
/// strings are compared byte-wise, which orders fixed-width ISO-8601 values
/// correctly.
pub(crate) fn is_newer(candidate: &str, stored: &str) -> bool {
    match (parse_instant(candidate), parse_instant(stored)) {
        (Some(c), Some(s)) => c > s,
        _ => candidate > stored,
    }
}

fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

// Tabs and line breaks would split the record line.
fn single_line(s: &str) -> String {
    s.replace(['\t', '\r', '\n'], " ")
}
