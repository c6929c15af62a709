//! Search Layer (C6): three corpus connectors sharing one shape, a
//! schema-provisioning helper, and the request-level cache (C6 cache, see
//! [`cache`]).

pub mod cache;
pub mod personal;
pub mod published;
pub mod schema;
pub mod social;

pub use personal::{PersonalConnector, PersonalFilters};
pub use published::{PublishedConnector, PublishedFilters};
pub use social::{SocialConnector, SocialFilters};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A projected, attributed row from one corpus, already trimmed to its
/// corpus-specific character budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSnippet {
    pub text: String,
    pub date: String,
    pub tags: Vec<String>,
    pub voice_terms: Vec<String>,
    pub attribution: String,
    pub notes: String,
    /// Corpus-specific fields (thread_id/message_id, platform, author) that
    /// do not belong on the common shape.
    pub extra: serde_json::Value,
}

/// Result of one connector query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResult {
    pub snippets: Vec<SearchSnippet>,
}

/// Trims `text` to `max_len` characters, substituting an ellipsis on
/// truncation, matching the source connectors' `_trim` helper exactly.
pub fn trim(text: &str, max_len: usize) -> String {
    let char_count = text.chars().count();
    if char_count <= max_len {
        text.to_string()
    } else {
        let mut truncated: String = text.chars().take(max_len.saturating_sub(1)).collect();
        truncated.push('\u{2026}');
        truncated
    }
}

pub(crate) fn today_iso() -> String {
    Utc::now().date_naive().to_string()
}

pub(crate) fn date_or_today(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.date_naive().to_string()).unwrap_or_else(today_iso)
}
