//! Metadata bundle, change log, and attribution types (§3).

use crate::policy::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Origin of a piece of produced or consumed content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Corpus,
    Retrieval,
    Generated,
    UserInput,
}

/// Immutable record binding a piece of content to its source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionRecord {
    pub attribution_id: uuid::Uuid,
    pub source_type: SourceType,
    pub source_id: Option<String>,
    pub content_hash: String,
    pub producing_stage: Stage,
    pub task_id: uuid::Uuid,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl AttributionRecord {
    pub fn new(
        source_type: SourceType,
        source_id: Option<String>,
        content_hash: impl Into<String>,
        producing_stage: Stage,
        task_id: uuid::Uuid,
    ) -> Self {
        Self {
            attribution_id: uuid::Uuid::new_v4(),
            source_type,
            source_id,
            content_hash: content_hash.into(),
            producing_stage,
            task_id,
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }
}

/// One entry in the change log threaded through stage metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub change_id: uuid::Uuid,
    pub original_text: String,
    pub revised_text: String,
    pub reason: String,
    pub applied_by: Stage,
    pub rules: Vec<String>,
}

impl ChangeLogEntry {
    pub fn new(
        original_text: impl Into<String>,
        revised_text: impl Into<String>,
        reason: impl Into<String>,
        applied_by: Stage,
        rules: Vec<String>,
    ) -> Self {
        Self {
            change_id: uuid::Uuid::new_v4(),
            original_text: original_text.into(),
            revised_text: revised_text.into(),
            reason: reason.into(),
            applied_by,
            rules,
        }
    }
}

/// Metadata accumulated monotonically across stages. Passed in and grows as
/// each stage finishes; never shrinks or loses entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageMetadata {
    pub change_log: Vec<ChangeLogEntry>,
    pub tone_flags: Vec<String>,
    pub long_tail_keywords: Vec<String>,
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The final, immutable metadata bundle emitted at the end of a task (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataBundle {
    pub task_id: uuid::Uuid,
    pub role: Stage,
    pub input_sources: Vec<String>,
    pub attribution: Vec<AttributionRecord>,
    pub tone_flags: Vec<String>,
    pub change_log: Vec<ChangeLogEntry>,
    pub long_tail_keywords: Vec<String>,
    pub token_stats: TokenStats,
    pub trimmed_sections: Vec<String>,
    pub final_output: String,
}

/// Approximate token accounting for the final output, used for reporting
/// only (no downstream truncation decision depends on it).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenStats {
    pub input_tokens_approx: u32,
    pub output_tokens_approx: u32,
}

impl TokenStats {
    /// Whitespace-split approximation, good enough for reporting.
    pub fn approx_tokens(text: &str) -> u32 {
        text.split_whitespace().count() as u32
    }
}
