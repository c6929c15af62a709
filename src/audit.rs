//! Audit Trail (C11).
//!
//! Append-only sink for stage completions, tool executions, governance
//! violations, and final metadata bundles. The reference implementation
//! serializes every event to a structured log line via `tracing` (C13); a
//! WORM or external sink may be substituted without changing call sites,
//! since nothing downstream of [`AuditTrail`] inspects the event beyond its
//! `kind`.

use crate::metadata::MetadataBundle;
use crate::policy::Stage;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// One event kind accepted by the audit sink (§4.10, §6 "Audit sink").
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    ToolExecution {
        timestamp: DateTime<Utc>,
        task_id: uuid::Uuid,
        stage: Stage,
        tool: String,
        outcome: ToolOutcome,
        duration_ms: Option<u128>,
    },
    StageCompletion {
        timestamp: DateTime<Utc>,
        task_id: uuid::Uuid,
        stage: Stage,
        outcome: StageCompletionOutcome,
    },
    GovernanceViolation {
        timestamp: DateTime<Utc>,
        task_id: uuid::Uuid,
        stage: Stage,
        violation_kind: String,
        detail: serde_json::Value,
    },
    MetadataBundle {
        timestamp: DateTime<Utc>,
        bundle: Box<MetadataBundle>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    Started,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageCompletionOutcome {
    Success,
    Fail,
}

/// Append-only audit sink. Writes are best-effort: a failed write does not
/// disrupt the pipeline (§7), so this type has no fallible operations — the
/// underlying `tracing` subscriber owns its own delivery guarantees.
#[derive(Default)]
pub struct AuditTrail;

impl AuditTrail {
    pub fn new() -> Self {
        Self
    }

    pub fn record(&self, event: AuditEvent) {
        match &event {
            AuditEvent::ToolExecution { outcome: ToolOutcome::Error, .. } => {
                tracing::error!(event = ?event, "tool execution error");
            }
            AuditEvent::GovernanceViolation { .. } => {
                tracing::warn!(event = ?event, "governance violation");
            }
            AuditEvent::StageCompletion { outcome: StageCompletionOutcome::Fail, .. } => {
                tracing::error!(event = ?event, "stage completion (fail)");
            }
            _ => {
                tracing::debug!(event = ?event, "audit event");
            }
        }
    }

    pub fn tool_execution_started(&self, task_id: uuid::Uuid, stage: Stage, tool: impl Into<String>) {
        self.record(AuditEvent::ToolExecution {
            timestamp: Utc::now(),
            task_id,
            stage,
            tool: tool.into(),
            outcome: ToolOutcome::Started,
            duration_ms: None,
        });
    }

    pub fn tool_execution_success(&self, task_id: uuid::Uuid, stage: Stage, tool: impl Into<String>, duration: Duration) {
        self.record(AuditEvent::ToolExecution {
            timestamp: Utc::now(),
            task_id,
            stage,
            tool: tool.into(),
            outcome: ToolOutcome::Success,
            duration_ms: Some(duration.as_millis()),
        });
    }

    pub fn tool_execution_error(&self, task_id: uuid::Uuid, stage: Stage, tool: impl Into<String>, duration: Duration) {
        self.record(AuditEvent::ToolExecution {
            timestamp: Utc::now(),
            task_id,
            stage,
            tool: tool.into(),
            outcome: ToolOutcome::Error,
            duration_ms: Some(duration.as_millis()),
        });
    }

    pub fn stage_completion(&self, task_id: uuid::Uuid, stage: Stage, outcome: StageCompletionOutcome) {
        self.record(AuditEvent::StageCompletion {
            timestamp: Utc::now(),
            task_id,
            stage,
            outcome,
        });
    }

    pub fn governance_violation(&self, task_id: uuid::Uuid, stage: Stage, violation_kind: impl Into<String>, detail: serde_json::Value) {
        self.record(AuditEvent::GovernanceViolation {
            timestamp: Utc::now(),
            task_id,
            stage,
            violation_kind: violation_kind.into(),
            detail,
        });
    }

    pub fn metadata_bundle(&self, bundle: MetadataBundle) {
        self.record(AuditEvent::MetadataBundle {
            timestamp: Utc::now(),
            bundle: Box::new(bundle),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::TokenStats;

    #[test]
    fn recording_every_event_kind_does_not_panic() {
        let trail = AuditTrail::new();
        let task = uuid::Uuid::new_v4();
        trail.tool_execution_started(task, Stage::Ideator, "search_personal");
        trail.tool_execution_success(task, Stage::Ideator, "search_personal", Duration::from_millis(5));
        trail.tool_execution_error(task, Stage::Drafter, "call_external_model", Duration::from_millis(1));
        trail.stage_completion(task, Stage::Ideator, StageCompletionOutcome::Success);
        trail.governance_violation(task, Stage::Drafter, "unauthorized_corpus_access", serde_json::json!({}));
        trail.metadata_bundle(MetadataBundle {
            task_id: task,
            role: Stage::Summarizer,
            input_sources: vec![],
            attribution: vec![],
            tone_flags: vec![],
            change_log: vec![],
            long_tail_keywords: vec![],
            token_stats: TokenStats::default(),
            trimmed_sections: vec![],
            final_output: "done".to_string(),
        });
    }
}
