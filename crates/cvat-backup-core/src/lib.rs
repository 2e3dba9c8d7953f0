//! Incremental backup of CVAT annotation tasks.
//!
//! A run lists the tasks visible to an authenticated [`RemoteSession`],
//! downloads the annotations of every task updated since the last successful
//! run, writes each archive entry to a fresh `<task>_<YYYYMMDD>[_NN].xml`
//! file and finally records the new per-task watermarks.
//!
//! ```rust,no_run
//! # async fn demo() -> Result<(), cvat_backup_core::BackupError> {
//! use cvat_backup_core::{BackupConfig, BackupOrchestrator, ClientConfig, CvatClient};
//!
//! let client = CvatClient::login(&ClientConfig::new(
//!     "https://cvat.example.com/api/v1",
//!     "alice",
//!     "secret",
//! ))
//! .await?;
//! let config = BackupConfig::new("/srv/backup/cvat", "cvat_task_timestamp.csv");
//! let summary = BackupOrchestrator::new(client, config)?.run().await?;
//! println!("{} task(s) saved", summary.downloaded);
//! # Ok(())
//! # }
//! ```
//!
//! Only one run may use a given output directory and watermark record at a
//! time; there is no inter-process locking.

pub mod archive;
pub mod client;
pub mod config;
pub mod detector;
pub mod error;
pub mod naming;
pub mod orchestrator;
pub mod remote;
pub mod watermark;

pub use client::CvatClient;
pub use config::{BackupConfig, ClientConfig, RetryPolicy};
pub use detector::ChangeDetector;
pub use error::BackupError;
pub use naming::NamingResolver;
pub use orchestrator::{BackupOrchestrator, RunSummary};
pub use remote::{ArchiveEntry, RemoteSession, RemoteTask, TaskId};
pub use watermark::{Watermark, WatermarkStore};
