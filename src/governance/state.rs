//! Task Governance State (§3).
//!
//! Per-task bookkeeping that the Policy Enforcer (C4) mutates through its
//! own operations. Held by the pipeline driver for the lifetime of one task
//! and handed to `finalize` at the end.

use chrono::{DateTime, Utc};

/// Created on prompt receipt, finalized on pipeline completion.
#[derive(Debug, Clone)]
pub struct TaskGovernanceState {
    pub task_id: uuid::Uuid,
    pub user_id: String,
    pub classification: PromptClass,
    pub created_at: DateTime<Utc>,
    pub corpus_access_count: u32,
    pub retrieval_query_count: u32,
}

impl TaskGovernanceState {
    pub fn new(task_id: uuid::Uuid, user_id: impl Into<String>, classification: PromptClass) -> Self {
        Self {
            task_id,
            user_id: user_id.into(),
            classification,
            created_at: Utc::now(),
            corpus_access_count: 0,
            retrieval_query_count: 0,
        }
    }
}

/// Classification of a prompt, carried in the governance context but never
/// altering stage order (§4.9 step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptClass {
    Chat,
    Writing,
}

impl PromptClass {
    /// Simple length threshold: >= 80 chars is `writing`, otherwise `chat`.
    pub fn classify(prompt: &str) -> Self {
        if prompt.chars().count() >= 80 {
            PromptClass::Writing
        } else {
            PromptClass::Chat
        }
    }
}
