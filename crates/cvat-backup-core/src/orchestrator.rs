//! Drives one incremental backup run.
//!
//! Tasks are handled one at a time, in listing order:
//!
//! ```text
//! Pending ──(unchanged)──────────────────────────▶ Unchanged
//!    │
//!    └─(changed)─▶ Downloading ─(entries written)─▶ Succeeded
//!                      │ ▲
//!                      └─┘ transient failure, backoff, retry
//!                      │
//!                      └──(attempts exhausted)────▶ Failed  (aborts the run)
//! ```
//!
//! The watermark record is flushed only after every task reached a terminal
//! state. Any error returns before the flush, so the next run starts from the
//! previous record and downloads again whatever this run already saved.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::config::BackupConfig;
use crate::detector::ChangeDetector;
use crate::error::BackupError;
use crate::naming::NamingResolver;
use crate::remote::{ArchiveEntry, RemoteSession, RemoteTask};
use crate::watermark::WatermarkStore;

/// Terminal state of a task that did not abort the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskOutcome {
    Unchanged,
    Succeeded,
}

/// Outcome of a completed run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Tasks reported by the service.
    pub examined: usize,
    /// Tasks skipped because nothing changed since the last backup.
    pub unchanged: usize,
    /// Tasks whose annotations were downloaded and saved.
    pub downloaded: usize,
    /// Every backup file written, in creation order.
    pub files: Vec<PathBuf>,
}

pub struct BackupOrchestrator<S> {
    session: S,
    store: WatermarkStore,
    resolver: NamingResolver,
    config: BackupConfig,
}

impl<S: RemoteSession> BackupOrchestrator<S> {
    /// Load the watermark record named by `config` and prepare a run.
    pub fn new(session: S, config: BackupConfig) -> Result<Self, BackupError> {
        config.validate()?;
        let store = WatermarkStore::load(&config.state_file)?;
        Ok(Self::with_store(session, store, config))
    }

    /// Use an already loaded store instead of reading `config.state_file`.
    pub fn with_store(session: S, store: WatermarkStore, config: BackupConfig) -> Self {
        Self {
            session,
            store,
            resolver: NamingResolver::new(config.max_suffix),
            config,
        }
    }

    pub fn store(&self) -> &WatermarkStore {
        &self.store
    }

    /// Tasks that the next run would download, without touching anything.
    pub async fn plan(&self) -> Result<Vec<RemoteTask>, BackupError> {
        let tasks = self.session.list_tasks().await?;
        let detector = ChangeDetector::new(&self.store);
        Ok(detector.pending(&tasks).into_iter().cloned().collect())
    }

    /// Run a backup dated with the local calendar day.
    pub async fn run(&mut self) -> Result<RunSummary, BackupError> {
        let today = chrono::Local::now().date_naive();
        self.run_on(today).await
    }

    /// Run a backup whose file names carry `today`.
    pub async fn run_on(&mut self, today: NaiveDate) -> Result<RunSummary, BackupError> {
        let tasks = self.session.list_tasks().await?;
        info!(tasks = tasks.len(), "task list received");

        let mut summary = RunSummary {
            examined: tasks.len(),
            ..RunSummary::default()
        };

        for task in &tasks {
            match self.process_task(task, today, &mut summary).await? {
                TaskOutcome::Unchanged => summary.unchanged += 1,
                TaskOutcome::Succeeded => summary.downloaded += 1,
            }
        }

        self.store.flush()?;
        info!(
            examined = summary.examined,
            unchanged = summary.unchanged,
            downloaded = summary.downloaded,
            files = summary.files.len(),
            "backup complete"
        );
        Ok(summary)
    }

    async fn process_task(
        &mut self,
        task: &RemoteTask,
        today: NaiveDate,
        summary: &mut RunSummary,
    ) -> Result<TaskOutcome, BackupError> {
        if !ChangeDetector::new(&self.store).requires_download(task) {
            info!(task_id = task.id, task_name = %task.name, "unchanged");
            return Ok(TaskOutcome::Unchanged);
        }

        let attempts = self.config.retry.max_attempts;
        let mut attempt = 0;
        let entries = loop {
            attempt += 1;
            debug!(task_id = task.id, attempt, "downloading");

            match self.session.fetch_annotations(task.id).await {
                Ok(entries) => break entries,
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(
                        task_id = task.id,
                        task_name = %task.name,
                        attempt,
                        error = %e,
                        "download failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry.backoff).await;
                }
                Err(e) if e.is_transient() => {
                    return Err(BackupError::RetryExhausted {
                        task_id: task.id,
                        task_name: task.name.clone(),
                        attempts,
                        last_error: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        };

        for entry in &entries {
            let path = self.write_entry(task, entry, today)?;
            info!(
                task_id = task.id,
                task_name = %task.name,
                path = %path.display(),
                "saved"
            );
            summary.files.push(path);
        }
        if entries.is_empty() {
            warn!(task_id = task.id, task_name = %task.name, "annotation archive was empty");
        }

        self.store.record(task.id, &task.name, &task.updated_date);
        Ok(TaskOutcome::Succeeded)
    }

    fn write_entry(
        &self,
        task: &RemoteTask,
        entry: &ArchiveEntry,
        today: NaiveDate,
    ) -> Result<PathBuf, BackupError> {
        let path = self
            .resolver
            .resolve(&self.config.output_dir, &task.name, today)?;
        // create_new: never clobber a file that appeared after the name check.
        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        file.write_all(&entry.data)?;
        file.sync_all()?;
        debug!(entry = %entry.name, bytes = entry.data.len(), path = %path.display(), "entry written");
        Ok(path)
    }
}
