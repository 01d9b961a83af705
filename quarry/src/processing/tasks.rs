use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::models::{IngestStage, TaskRecord};

/// How long terminal task records stay queryable.
const TASK_TTL_HOURS: i64 = 1;

/// In-process ingestion status table: a mutex-guarded map, updated only by
/// the worker that owns the task, swept hourly. Sufficient for a
/// single-process deployment; the `task:` KV namespace is reserved for a
/// horizontally scaled variant.
#[derive(Clone, Default)]
pub struct TaskTracker {
    inner: Arc<Mutex<HashMap<Uuid, TaskRecord>>>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, document_id: Uuid) -> TaskRecord {
        let record = TaskRecord::new(document_id);
        self.inner
            .lock()
            .expect("task tracker poisoned")
            .insert(document_id, record.clone());
        record
    }

    pub fn get(&self, document_id: Uuid) -> Option<TaskRecord> {
        self.inner
            .lock()
            .expect("task tracker poisoned")
            .get(&document_id)
            .cloned()
    }

    /// Advance to `stage`. Terminal records are never reopened.
    pub fn set_stage(&self, document_id: Uuid, stage: IngestStage, message: &str) {
        let mut guard = self.inner.lock().expect("task tracker poisoned");
        if let Some(record) = guard.get_mut(&document_id) {
            if record.stage.is_terminal() {
                return;
            }
            record.stage = stage;
            record.progress = stage.progress();
            record.message = message.to_string();
            record.updated_at = Utc::now();
        }
    }

    pub fn complete(&self, document_id: Uuid) {
        self.set_stage(document_id, IngestStage::Completed, "indexed");
    }

    pub fn fail(&self, document_id: Uuid, error: &str) {
        let mut guard = self.inner.lock().expect("task tracker poisoned");
        if let Some(record) = guard.get_mut(&document_id) {
            record.stage = IngestStage::Failed;
            record.progress = IngestStage::Failed.progress();
            record.message = "ingestion failed".to_string();
            record.error = Some(error.to_string());
            record.updated_at = Utc::now();
        }
    }

    /// Drop terminal records older than the TTL. Returns how many were
    /// removed.
    pub fn sweep(&self) -> usize {
        let cutoff = Utc::now() - Duration::hours(TASK_TTL_HOURS);
        let mut guard = self.inner.lock().expect("task tracker poisoned");
        let before = guard.len();
        guard.retain(|_, record| !(record.stage.is_terminal() && record.updated_at < cutoff));
        before - guard.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_advance() {
        let tracker = TaskTracker::new();
        let id = Uuid::new_v4();
        tracker.create(id);

        tracker.set_stage(id, IngestStage::Extracting, "extracting text");
        let record = tracker.get(id).unwrap();
        assert_eq!(record.stage, IngestStage::Extracting);
        assert_eq!(record.progress, 10);
    }

    #[test]
    fn failed_tasks_keep_their_error() {
        let tracker = TaskTracker::new();
        let id = Uuid::new_v4();
        tracker.create(id);
        tracker.fail(id, "upload too large");

        let record = tracker.get(id).unwrap();
        assert_eq!(record.stage, IngestStage::Failed);
        assert_eq!(record.error.as_deref(), Some("upload too large"));

        // Terminal records never move again.
        tracker.set_stage(id, IngestStage::Embedding, "nope");
        assert_eq!(tracker.get(id).unwrap().stage, IngestStage::Failed);
    }

    #[test]
    fn sweep_removes_only_stale_terminal_records() {
        let tracker = TaskTracker::new();
        let live = Uuid::new_v4();
        let stale = Uuid::new_v4();
        tracker.create(live);
        tracker.create(stale);
        tracker.complete(stale);

        // Backdate the completed record past the TTL.
        {
            let mut guard = tracker.inner.lock().unwrap();
            guard.get_mut(&stale).unwrap().updated_at = Utc::now() - Duration::hours(2);
        }

        assert_eq!(tracker.sweep(), 1);
        assert!(tracker.get(live).is_some());
        assert!(tracker.get(stale).is_none());
    }
}
