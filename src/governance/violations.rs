//! Violation Log (C3).
//!
//! Concurrency-safe, append-only, per-task list of rule-violation records.
//! Read-only iteration is exposed to the finalizer.

use crate::error::ViolationKind;
use crate::policy::Stage;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// One recorded policy violation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ViolationRecord {
    pub timestamp: DateTime<Utc>,
    pub task_id: uuid::Uuid,
    pub kind: ViolationKind,
    pub stage: Stage,
    pub details: serde_json::Value,
}

/// Append-only, per-task violation log.
#[derive(Default)]
pub struct ViolationLog {
    by_task: Mutex<HashMap<uuid::Uuid, Vec<ViolationRecord>>>,
}

impl ViolationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &self,
        task_id: uuid::Uuid,
        kind: ViolationKind,
        stage: Stage,
        details: serde_json::Value,
    ) {
        let record = ViolationRecord {
            timestamp: Utc::now(),
            task_id,
            kind,
            stage,
            details,
        };
        let mut by_task = self.by_task.lock().expect("violation log lock poisoned");
        by_task.entry(task_id).or_default().push(record);
    }

    /// All violations recorded for a task, in append order.
    pub fn for_task(&self, task_id: uuid::Uuid) -> Vec<ViolationRecord> {
        self.by_task
            .lock()
            .expect("violation log lock poisoned")
            .get(&task_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Drop the task's entry. Called during governance finalization cleanup.
    pub fn clear_task(&self, task_id: uuid::Uuid) {
        self.by_task
            .lock()
            .expect("violation log lock poisoned")
            .remove(&task_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn records_append_in_order_per_task() {
        let log = ViolationLog::new();
        let task = uuid::Uuid::new_v4();
        log.record(
            task,
            ViolationKind::ApiCallLimitExceeded,
            Stage::Drafter,
            json!({"max": 1}),
        );
        log.record(
            task,
            ViolationKind::UnauthorizedCorpusAccess,
            Stage::Drafter,
            json!({"corpus": "personal"}),
        );

        let recorded = log.for_task(task);
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].kind, ViolationKind::ApiCallLimitExceeded);
        assert_eq!(recorded[1].kind, ViolationKind::UnauthorizedCorpusAccess);
    }

    #[test]
    fn tasks_do_not_share_violation_lists() {
        let log = ViolationLog::new();
        let task_a = uuid::Uuid::new_v4();
        let task_b = uuid::Uuid::new_v4();
        log.record(
            task_a,
            ViolationKind::EmptyOutput,
            Stage::Ideator,
            json!({}),
        );
        assert_eq!(log.for_task(task_a).len(), 1);
        assert_eq!(log.for_task(task_b).len(), 0);
    }
}
