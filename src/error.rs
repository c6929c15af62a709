//! Error types for mcg-core.

use thiserror::Error;

/// Result type alias using mcg-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// A single kind of governance violation. Kept as a closed, serializable
/// enum rather than nested error variants, so the violation log (C3) and the
/// error taxonomy can share one vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    ApiCallLimitExceeded,
    UnauthorizedCorpusAccess,
    UnauthorizedRetrievalAccess,
    TransformerRequiredUnavailable,
    CorpusRateLimitExceeded,
    InvalidStageRole,
    MissingPermission,
    EmptyOutput,
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ViolationKind::ApiCallLimitExceeded => "api_call_limit_exceeded",
            ViolationKind::UnauthorizedCorpusAccess => "unauthorized_corpus_access",
            ViolationKind::UnauthorizedRetrievalAccess => "unauthorized_retrieval_access",
            ViolationKind::TransformerRequiredUnavailable => "transformer_required_unavailable",
            ViolationKind::CorpusRateLimitExceeded => "corpus_rate_limit_exceeded",
            ViolationKind::InvalidStageRole => "invalid_stage_role",
            ViolationKind::MissingPermission => "missing_permission",
            ViolationKind::EmptyOutput => "empty_output",
        };
        f.write_str(s)
    }
}

/// Errors that can occur while running the governed pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// A policy check rejected an attempted tool invocation.
    #[error("governance violation at {stage}: {kind} ({detail})")]
    GovernanceViolation {
        kind: ViolationKind,
        stage: String,
        detail: String,
    },

    /// A stage required the deterministic transformer but it was
    /// unavailable and no fallback was authorized.
    #[error("transformer required at {stage} but unavailable: {reason}")]
    TransformerRequired { stage: String, reason: String },

    /// The external provider failed: HTTP error, timeout, or schema
    /// mismatch.
    #[error("provider error ({provider}): {message}")]
    ProviderError { provider: String, message: String },

    /// Missing, expired, or invalid bearer token. Raised by the outer
    /// shell; the core only categorizes it.
    #[error("authentication error: {0}")]
    AuthError(String),

    /// Corpus database error. Connectors fail closed on this and never
    /// propagate it to callers; it exists so the failure can be logged.
    #[error("data error: {0}")]
    DataError(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Missing or malformed runtime configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal invariant violation not covered by the taxonomy above.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a governance violation error.
    pub fn governance_violation(
        kind: ViolationKind,
        stage: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::GovernanceViolation {
            kind,
            stage: stage.into(),
            detail: detail.into(),
        }
    }

    pub fn unauthorized_corpus_access(
        stage: impl Into<String>,
        corpus: impl std::fmt::Display,
        allowed: impl std::fmt::Display,
    ) -> Self {
        Self::governance_violation(
            ViolationKind::UnauthorizedCorpusAccess,
            stage,
            format!("corpus={corpus}, allowed_corpora={allowed}"),
        )
    }

    pub fn unauthorized_retrieval_access(
        stage: impl Into<String>,
        authorized_stages: impl std::fmt::Display,
    ) -> Self {
        Self::governance_violation(
            ViolationKind::UnauthorizedRetrievalAccess,
            stage,
            format!("authorized_stages={authorized_stages}"),
        )
    }

    pub fn api_call_limit_exceeded(stage: impl Into<String>, max: u32, attempted: u32) -> Self {
        Self::governance_violation(
            ViolationKind::ApiCallLimitExceeded,
            stage,
            format!("max={max}, attempted={attempted}"),
        )
    }

    pub fn corpus_rate_limit_exceeded(
        stage: impl Into<String>,
        corpus: impl std::fmt::Display,
    ) -> Self {
        Self::governance_violation(
            ViolationKind::CorpusRateLimitExceeded,
            stage,
            format!("corpus={corpus}"),
        )
    }

    pub fn missing_permission(stage: impl Into<String>, permission: impl Into<String>) -> Self {
        Self::governance_violation(ViolationKind::MissingPermission, stage, permission.into())
    }

    pub fn empty_output(stage: impl Into<String>) -> Self {
        Self::governance_violation(ViolationKind::EmptyOutput, stage, "content was empty")
    }

    /// Create a transformer-required error.
    pub fn transformer_required(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransformerRequired {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    /// Create a provider error.
    pub fn provider_error(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
