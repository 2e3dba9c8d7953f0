//! Interface to the remote annotation service.
//!
//! [`RemoteSession`] is the seam between the synchronization engine and the
//! network. The default implementation is [`crate::client::CvatClient`]; tests
//! substitute scripted in-memory sessions.
//!
//! Trait methods use `impl Future` in their signatures so no `async-trait`
//! crate is required.

use std::future::Future;

use serde::Deserialize;

use crate::error::BackupError;

/// Stable identifier the service assigns to a task.
pub type TaskId = u64;

/// One task as reported by the service's task listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteTask {
    pub id: TaskId,
    pub name: String,
    /// Server-side last modification time, kept verbatim.
    pub updated_date: String,
}

impl RemoteTask {
    pub fn new(id: TaskId, name: impl Into<String>, updated_date: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            updated_date: updated_date.into(),
        }
    }
}

/// A single file unpacked from a downloaded annotation archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Name of the entry inside the archive, e.g. `"annotations.xml"`.
    pub name: String,
    pub data: Vec<u8>,
}

/// An authenticated session against the annotation service.
pub trait RemoteSession: Send + Sync {
    /// Enumerate every task visible to the session.
    fn list_tasks(&self) -> impl Future<Output = Result<Vec<RemoteTask>, BackupError>> + Send;

    /// Download and unpack the annotation archive of one task.
    ///
    /// A not-yet-ready or failed export must be reported as
    /// [`BackupError::TransientDownload`] so the caller can retry it.
    fn fetch_annotations(
        &self,
        task_id: TaskId,
    ) -> impl Future<Output = Result<Vec<ArchiveEntry>, BackupError>> + Send;
}
