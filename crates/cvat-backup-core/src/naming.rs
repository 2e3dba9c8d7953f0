//! Collision-free names for backup files.
//!
//! A task saved on 2024-05-01 lands in `<name>_20240501.xml`. When that file
//! already exists the resolver tries `<name>_20240501_00.xml`,
//! `<name>_20240501_01.xml`, ... and keeps counting past `_99` (`_100`, ...)
//! up to the configured bound.
//!
//! The existence check is not atomic across processes. Only one backup
//! instance may write into a directory at a time.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::BackupError;

pub const DEFAULT_MAX_SUFFIX: u32 = 9_999;

const EXTENSION: &str = "xml";

#[derive(Debug, Clone, Copy)]
pub struct NamingResolver {
    max_suffix: u32,
}

impl Default for NamingResolver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SUFFIX)
    }
}

impl NamingResolver {
    /// `max_suffix` is the largest `_NN` number tried before giving up.
    pub fn new(max_suffix: u32) -> Self {
        Self { max_suffix }
    }

    /// Return a path under `base_dir` that does not exist yet.
    pub fn resolve(
        &self,
        base_dir: &Path,
        task_name: &str,
        today: NaiveDate,
    ) -> Result<PathBuf, BackupError> {
        let stem = format!("{}_{}", sanitize(task_name), today.format("%Y%m%d"));

        let first = base_dir.join(format!("{stem}.{EXTENSION}"));
        if !first.exists() {
            return Ok(first);
        }

        for n in 0..=self.max_suffix {
            let candidate = base_dir.join(format!("{stem}_{n:02}.{EXTENSION}"));
            if !candidate.exists() {
                return Ok(candidate);
            }
        }

        Err(BackupError::NamingExhausted {
            base: first,
            bound: self.max_suffix,
        })
    }
}

/// Make a task name usable as a single path component.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "task".to_string(),
        _ => cleaned,
    }
}
