use crate::remote::RemoteTask;
use crate::watermark::WatermarkStore;

/// Decides which tasks need their annotations downloaded again.
///
/// A task needs a download when it has never been backed up, or when the
/// server reports an update newer than the recorded watermark.
#[derive(Debug, Clone, Copy)]
pub struct ChangeDetector<'a> {
    store: &'a WatermarkStore,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(store: &'a WatermarkStore) -> Self {
        Self { store }
    }

    pub fn requires_download(&self, task: &RemoteTask) -> bool {
        self.store.is_change_pending(task.id, &task.updated_date)
    }

    /// The subset of `tasks` that requires a download, in listing order.
    pub fn pending<'t>(&self, tasks: &'t [RemoteTask]) -> Vec<&'t RemoteTask> {
        tasks.iter().filter(|t| self.requires_download(t)).collect()
    }
}
