//! Engine configuration, passed explicitly into the client and orchestrator.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::BackupError;
use crate::naming::DEFAULT_MAX_SUFFIX;

/// Export format requested from the annotation endpoint.
pub const DEFAULT_EXPORT_FORMAT: &str = "CVAT for images 1.1";

/// File name of the watermark record when none is configured.
pub const DEFAULT_STATE_FILE: &str = "cvat_task_timestamp.csv";

/// Fixed-interval retry policy for annotation downloads.
///
/// The delay is constant between attempts (no exponential growth) and is not
/// applied after the final attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Connection settings for [`crate::client::CvatClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root, including the `/api/v1` suffix.
    pub base_url: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub export_format: String,
    /// Applied to every request, including the annotation download.
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            username: username.into(),
            email: String::new(),
            password: password.into(),
            export_format: DEFAULT_EXPORT_FORMAT.to_string(),
            request_timeout: Duration::from_secs(300),
        }
    }

    pub fn validate(&self) -> Result<(), BackupError> {
        for (field, value) in [
            ("base URL", &self.base_url),
            ("user name", &self.username),
            ("password", &self.password),
            ("export format", &self.export_format),
        ] {
            if value.trim().is_empty() {
                return Err(BackupError::InvalidConfig {
                    message: format!("{field} must not be empty"),
                });
            }
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(BackupError::InvalidConfig {
                message: format!("base URL must be http(s): {}", self.base_url),
            });
        }
        Ok(())
    }
}

/// Settings of a single backup run.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Directory receiving the backup files. Must exist before the run.
    pub output_dir: PathBuf,
    /// Location of the watermark record.
    pub state_file: PathBuf,
    pub retry: RetryPolicy,
    /// Largest collision suffix the naming resolver will try.
    pub max_suffix: u32,
}

impl BackupConfig {
    pub fn new(output_dir: impl Into<PathBuf>, state_file: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            state_file: state_file.into(),
            retry: RetryPolicy::default(),
            max_suffix: DEFAULT_MAX_SUFFIX,
        }
    }

    pub fn validate(&self) -> Result<(), BackupError> {
        if self.retry.max_attempts == 0 {
            return Err(BackupError::InvalidConfig {
                message: "at least one download attempt is required".into(),
            });
        }
        if self.state_file.file_name().is_none() {
            return Err(BackupError::InvalidConfig {
                message: format!("state file has no file name: {}", self.state_file.display()),
            });
        }
        Ok(())
    }
}
