//! Layered configuration: defaults, then the TOML file, then `CVAT_*`
//! environment variables, then command-line flags.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use cvat_backup_core::config::{DEFAULT_EXPORT_FORMAT, DEFAULT_STATE_FILE};
use cvat_backup_core::naming::DEFAULT_MAX_SUFFIX;
use cvat_backup_core::{BackupConfig, ClientConfig, RetryPolicy};
use serde::Deserialize;

use crate::cli::Cli;

const DEFAULT_CONFIG_FILE: &str = "cvat-backup.toml";

/// Every knob of the tool. Field names double as TOML keys.
#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub url: String,
    pub user: String,
    pub email: String,
    pub password: String,
    pub output_dir: PathBuf,
    pub state_file: Option<PathBuf>,
    pub export_format: String,
    pub max_retry: u32,
    pub retry_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub max_suffix: u32,
    /// `tracing` filter string, e.g. `"info"` or `"debug,reqwest=warn"`.
    pub log_level: String,
    pub log_json: bool,

    /// Directory of the configuration file; relative default paths hang off it.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            url: String::new(),
            user: String::new(),
            email: String::new(),
            password: String::new(),
            output_dir: PathBuf::from("."),
            state_file: None,
            export_format: DEFAULT_EXPORT_FORMAT.to_owned(),
            max_retry: 3,
            retry_delay_ms: 1_000,
            request_timeout_secs: 300,
            max_suffix: DEFAULT_MAX_SUFFIX,
            log_level: "info".to_owned(),
            log_json: false,
            base_dir: PathBuf::from("."),
        }
    }
}

impl Settings {
    /// Build the effective settings for this process.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let mut settings = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.apply_cli(cli);
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut settings: Settings = toml::from_str(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        settings.base_dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(settings)
    }

    /// Overlay `CVAT_*` variables as returned by `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = var("CVAT_API_URL") {
            self.url = v;
        }
        if let Some(v) = var("CVAT_USER") {
            self.user = v;
        }
        if let Some(v) = var("CVAT_EMAIL") {
            self.email = v;
        }
        if let Some(v) = var("CVAT_PASSWORD") {
            self.password = v;
        }
        if let Some(v) = var("CVAT_BACKUP_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = var("CVAT_STATE_FILE") {
            self.state_file = Some(PathBuf::from(v));
        }
        if let Some(v) = var("CVAT_EXPORT_FORMAT") {
            self.export_format = v;
        }
        if let Some(v) = var("CVAT_MAX_RETRY") {
            self.max_retry = parse_var("CVAT_MAX_RETRY", &v)?;
        }
        if let Some(v) = var("CVAT_RETRY_DELAY_MS") {
            self.retry_delay_ms = parse_var("CVAT_RETRY_DELAY_MS", &v)?;
        }
        if let Some(v) = var("CVAT_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_var("CVAT_REQUEST_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("CVAT_LOG") {
            self.log_level = v;
        }
        if let Some(v) = var("CVAT_LOG_JSON") {
            self.log_json = v == "1" || v.eq_ignore_ascii_case("true");
        }
        Ok(())
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(v) = &cli.url {
            self.url = v.clone();
        }
        if let Some(v) = &cli.user {
            self.user = v.clone();
        }
        if let Some(v) = &cli.email {
            self.email = v.clone();
        }
        if let Some(v) = &cli.output_dir {
            self.output_dir = v.clone();
        }
        if let Some(v) = &cli.state_file {
            self.state_file = Some(v.clone());
        }
        if let Some(v) = cli.max_retry {
            self.max_retry = v;
        }
        if let Some(v) = cli.retry_delay_ms {
            self.retry_delay_ms = v;
        }
        if let Some(v) = &cli.format {
            self.export_format = v.clone();
        }
        if let Some(v) = &cli.log_level {
            self.log_level = v.clone();
        }
        if cli.log_json {
            self.log_json = true;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            bail!("no CVAT API URL configured (set `url`, CVAT_API_URL or --url)");
        }
        if self.user.trim().is_empty() {
            bail!("no login user configured (set `user`, CVAT_USER or --user)");
        }
        if self.password.is_empty() {
            bail!("no password configured (set `password` or CVAT_PASSWORD)");
        }
        if self.max_retry == 0 {
            bail!("max_retry must be at least 1");
        }
        Ok(())
    }

    /// Watermark record location; defaults to a file beside the configuration.
    pub fn state_file(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| self.base_dir.join(DEFAULT_STATE_FILE))
    }

    pub fn client_config(&self) -> ClientConfig {
        let mut cfg = ClientConfig::new(self.url.clone(), self.user.clone(), self.password.clone());
        cfg.email = self.email.clone();
        cfg.export_format = self.export_format.clone();
        cfg.request_timeout = Duration::from_secs(self.request_timeout_secs);
        cfg
    }

    pub fn backup_config(&self) -> BackupConfig {
        let mut cfg = BackupConfig::new(self.output_dir.clone(), self.state_file());
        cfg.retry = RetryPolicy {
            max_attempts: self.max_retry,
            backoff: Duration::from_millis(self.retry_delay_ms),
        };
        cfg.max_suffix = self.max_suffix;
        cfg
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("{key}={value:?} is not a valid number"))
}
