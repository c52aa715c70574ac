use std::sync::{Arc, Mutex};

/// Snapshot of the observable batch state: one status line plus completed
/// and total job counts. Purely observational; results never flow through
/// here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub status: String,
    pub completed: usize,
    pub total: usize,
}

/// Clone-shareable progress surface. The scheduler is the only writer;
/// presentation code polls `snapshot()`.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    inner: Arc<Mutex<ProgressSnapshot>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, total: usize) {
        let mut state = self.lock();
        state.status.clear();
        state.completed = 0;
        state.total = total;
    }

    pub fn set_status(&self, status: impl Into<String>) {
        self.lock().status = status.into();
    }

    pub fn add_completed(&self, count: usize) {
        self.lock().completed += count;
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProgressSnapshot> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
