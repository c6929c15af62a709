//! Shared types for the Provider Contract (C8).

use serde::{Deserialize, Serialize};

/// Which of the three provider operations produced a piece of text. Carried
/// in [`ProviderInfo`] so the audit trail can attribute every transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderOperation {
    Generate,
    Revise,
    Summarize,
}

/// Parameters for an open-ended `generate` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateParams {
    pub max_tokens: Option<u32>,
    pub context: Option<String>,
}

/// Returned alongside every provider operation's output text, so the audit
/// trail (C11) can attribute every transformation to a provider, model, and
/// operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub provider: String,
    pub model: String,
    pub operation: ProviderOperation,
    /// Rule ids applied, when this info came from the transformer-only
    /// provider; empty for the HTTP provider.
    pub applied_rules: Vec<String>,
}

impl ProviderInfo {
    pub fn new(provider: impl Into<String>, model: impl Into<String>, operation: ProviderOperation) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            operation,
            applied_rules: Vec::new(),
        }
    }

    pub fn with_applied_rules(mut self, rules: Vec<String>) -> Self {
        self.applied_rules = rules;
        self
    }
}
