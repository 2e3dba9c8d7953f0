use std::path::PathBuf;

use thiserror::Error;

use crate::remote::TaskId;

/// Errors that can be returned by cvat-backup-core operations.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Login or credential exchange with the service failed.
    #[error("cannot log in to CVAT: {reason}")]
    Authentication { reason: String },

    /// A single annotation download attempt failed; the orchestrator retries these.
    #[error("download of task #{task_id} failed: {reason}")]
    TransientDownload { task_id: TaskId, reason: String },

    /// Every download attempt for one task failed. Fatal for the whole run.
    #[error("giving up on task {task_name}[#{task_id}] after {attempts} attempts: {last_error}")]
    RetryExhausted {
        task_id: TaskId,
        task_name: String,
        attempts: u32,
        last_error: Box<BackupError>,
    },

    /// The durable watermark record could not be parsed.
    #[error("corrupt watermark record {}:{line}: {reason}", .path.display())]
    CorruptState {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// No unused file name was found below the configured suffix bound.
    #[error("no free file name for {} within {bound} suffixes", .base.display())]
    NamingExhausted { base: PathBuf, bound: u32 },

    /// An HTTP request failed at the transport level.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A filesystem I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to deserialize a JSON response.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The annotation archive could not be read.
    #[error("ZIP extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The service answered with an unexpected status or body shape.
    #[error("invalid CVAT API response: {message}")]
    InvalidResponse { message: String },

    /// A configuration value is missing or out of range.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl BackupError {
    /// Whether a download attempt that failed with this error may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientDownload { .. } | Self::Http(_))
    }
}
