use std::path::PathBuf;

use clap::Parser;

/// cvat-backup - incremental backup of CVAT task annotations
///
/// Downloads the annotations of every task updated since the previous run
/// and stores them as `<task>_<YYYYMMDD>.xml` (with a `_NN` suffix on name
/// collisions). Only one instance may run against the same output directory
/// and state file at a time.
#[derive(Parser, Debug)]
#[command(name = "cvat-backup")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file [default: cvat-backup.toml, if present]
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// CVAT API root, including the trailing `/api/v1`
    #[arg(long)]
    pub url: Option<String>,

    /// Login user name
    #[arg(long)]
    pub user: Option<String>,

    /// Login e-mail address
    #[arg(long)]
    pub email: Option<String>,

    /// Directory receiving the backup files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Watermark record [default: cvat_task_timestamp.csv next to the config file]
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    /// Download attempts per task before the run is aborted
    #[arg(long)]
    pub max_retry: Option<u32>,

    /// Delay between download attempts, in milliseconds
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,

    /// Annotation export format
    #[arg(long)]
    pub format: Option<String>,

    /// List the tasks that would be downloaded, then exit
    #[arg(long)]
    pub dry_run: bool,

    /// Log filter (trace, debug, info, warn, error or a tracing directive)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit logs as newline-delimited JSON
    #[arg(long)]
    pub log_json: bool,
}
