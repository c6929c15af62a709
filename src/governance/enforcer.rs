//! Policy Enforcer (C4).
//!
//! Stateless except via C2 (call tracker), the corpus rate tracker, and C3
//! (violation log). Every check writes a violation through C3 before
//! raising.

use crate::error::{Error, Result, ViolationKind};
use crate::governance::state::{PromptClass, TaskGovernanceState};
use crate::governance::tracker::{CallTracker, CorpusRateTracker};
use crate::governance::violations::ViolationLog;
use crate::policy::{format_corpus_set, Corpus, NamedPermission, PolicyCatalog, Stage};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How a stage should produce its text for this invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformerMethod {
    TransformerOnly,
    TransformerPrimary,
    ApiFallback,
}

/// Result of [`GovernanceEnforcer::validate_transformer_requirement`].
#[derive(Debug, Clone, Copy)]
pub struct TransformerDecision {
    pub use_transformer: bool,
    pub can_fallback_to_api: bool,
    pub method: TransformerMethod,
}

/// Totals returned by [`GovernanceEnforcer::finalize`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct GovernanceSummary {
    pub task_id: uuid::Uuid,
    pub user_id: String,
    pub classification: PromptClass,
    pub calls_by_stage: HashMap<Stage, u32>,
    pub corpus_access_count: u32,
    pub retrieval_query_count: u32,
    pub violation_count: usize,
}

/// Default grace age after which stale per-task tracking is swept, mirroring
/// the original governance protocol's 24-hour default.
pub const DEFAULT_MAX_TASK_AGE: Duration = Duration::from_secs(24 * 60 * 60);

pub struct GovernanceEnforcer {
    catalog: PolicyCatalog,
    calls: CallTracker,
    corpus_rate: CorpusRateTracker,
    violations: ViolationLog,
    task_started: Mutex<HashMap<uuid::Uuid, Instant>>,
    task_states: Mutex<HashMap<uuid::Uuid, TaskGovernanceState>>,
    finalized: Mutex<HashMap<uuid::Uuid, GovernanceSummary>>,
}

impl GovernanceEnforcer {
    pub fn new(catalog: PolicyCatalog) -> Self {
        Self {
            catalog,
            calls: CallTracker::new(),
            corpus_rate: CorpusRateTracker::new(),
            violations: ViolationLog::new(),
            task_started: Mutex::new(HashMap::new()),
            task_states: Mutex::new(HashMap::new()),
            finalized: Mutex::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &PolicyCatalog {
        &self.catalog
    }

    pub fn violations(&self) -> &ViolationLog {
        &self.violations
    }

    /// Creates the task governance state (§3) for a freshly-received prompt:
    /// `user_id`, `classification`, and zeroed corpus/retrieval counters.
    /// Also marks the task as started for the age sweeper in
    /// [`Self::cleanup_task_tracking`].
    pub fn register_task(&self, task: uuid::Uuid, user_id: impl Into<String>, classification: PromptClass) {
        self.task_started
            .lock()
            .expect("task_started lock poisoned")
            .entry(task)
            .or_insert_with(Instant::now);
        self.task_states
            .lock()
            .expect("task_states lock poisoned")
            .entry(task)
            .or_insert_with(|| TaskGovernanceState::new(task, user_id, classification));
    }

    fn with_task_state(&self, task: uuid::Uuid, f: impl FnOnce(&mut TaskGovernanceState)) {
        if let Some(state) = self
            .task_states
            .lock()
            .expect("task_states lock poisoned")
            .get_mut(&task)
        {
            f(state);
        }
    }

    fn record_violation(&self, task: uuid::Uuid, kind: ViolationKind, stage: Stage, detail: serde_json::Value) {
        self.violations.record(task, kind, stage, detail);
    }

    /// Checks the stage's permission record against a named permission set.
    pub fn validate_stage_permissions(
        &self,
        stage: Stage,
        required: &[NamedPermission],
        task: uuid::Uuid,
    ) -> Result<()> {
        let perms = self.catalog.permissions_for(stage);
        for permission in required {
            if !permission.granted_to(stage, perms) {
                self.record_violation(
                    task,
                    ViolationKind::MissingPermission,
                    stage,
                    json!({"permission": format!("{permission:?}")}),
                );
                return Err(Error::missing_permission(
                    stage.to_string(),
                    format!("{permission:?}"),
                ));
            }
        }
        Ok(())
    }

    /// Checks corpus access and enforces the per-stage, per-corpus rate
    /// limit.
    pub fn validate_corpus_access(&self, stage: Stage, corpus: Corpus, task: uuid::Uuid) -> Result<()> {
        let perms = self.catalog.permissions_for(stage);
        if !perms.corpus_access.contains(&corpus) {
            self.record_violation(
                task,
                ViolationKind::UnauthorizedCorpusAccess,
                stage,
                json!({"corpus": corpus.to_string(), "allowed_corpora": format_corpus_set(&perms.corpus_access)}),
            );
            return Err(Error::unauthorized_corpus_access(
                stage.to_string(),
                corpus,
                format_corpus_set(&perms.corpus_access),
            ));
        }

        let limit = self.catalog.corpus_rate_limit_per_min();
        if !self.corpus_rate.check_and_record(task, stage, corpus, limit) {
            self.record_violation(
                task,
                ViolationKind::CorpusRateLimitExceeded,
                stage,
                json!({"corpus": corpus.to_string(), "limit_per_min": limit}),
            );
            return Err(Error::corpus_rate_limit_exceeded(stage.to_string(), corpus));
        }
        self.with_task_state(task, |s| s.corpus_access_count += 1);
        Ok(())
    }

    /// Retrieval access is restricted to the Critic stage.
    pub fn validate_retrieval_access(&self, stage: Stage, task: uuid::Uuid) -> Result<()> {
        let perms = self.catalog.permissions_for(stage);
        if !perms.retrieval_access {
            self.record_violation(
                task,
                ViolationKind::UnauthorizedRetrievalAccess,
                stage,
                json!({"authorized_stages": ["Critic"]}),
            );
            return Err(Error::unauthorized_retrieval_access(
                stage.to_string(),
                "[Critic]",
            ));
        }
        self.with_task_state(task, |s| s.retrieval_query_count += 1);
        Ok(())
    }

    /// Atomically checks `count(task, stage) < max_api_calls` and
    /// increments on pass. The increment-on-pass semantic means granting
    /// permission consumes the slot in the same step.
    pub fn validate_api_call(&self, stage: Stage, task: uuid::Uuid) -> Result<u32> {
        let max = self.catalog.permissions_for(stage).max_api_calls;
        match self.calls.try_increment(task, stage, max) {
            Ok(count) => Ok(count),
            Err(current) => {
                let attempted = current + 1;
                self.record_violation(
                    task,
                    ViolationKind::ApiCallLimitExceeded,
                    stage,
                    json!({"max": max, "attempted": attempted}),
                );
                Err(Error::api_call_limit_exceeded(stage.to_string(), max, attempted))
            }
        }
    }

    pub fn api_call_count(&self, stage: Stage, task: uuid::Uuid) -> u32 {
        self.calls.count(task, stage)
    }

    /// Hook that always returns false. The activation mechanism is not
    /// defined by this crate; callers consult it and the outcome is
    /// recorded here so the audit trail can observe every consultation.
    pub fn check_emergency_authorization(&self, stage: Stage, task: uuid::Uuid) -> bool {
        tracing::debug!(%task, %stage, "emergency authorization consulted, hard-coded false");
        false
    }

    /// Whether a stage may fall back to the external provider when the
    /// transformer is unavailable or insufficient.
    pub fn can_fallback_to_api(&self, stage: Stage, task: uuid::Uuid) -> bool {
        match stage {
            Stage::Revisor => self.catalog.permissions_for(stage).max_api_calls > 0,
            Stage::Summarizer => self.check_emergency_authorization(stage, task),
            _ => self.api_call_count(stage, task) < self.catalog.permissions_for(stage).max_api_calls,
        }
    }

    /// Decides whether a stage should use the transformer, fall back to the
    /// provider, or raise [`Error::TransformerRequired`].
    pub fn validate_transformer_requirement(
        &self,
        stage: Stage,
        task: uuid::Uuid,
        transformer_available: bool,
    ) -> Result<TransformerDecision> {
        let perms = self.catalog.permissions_for(stage);

        if perms.transformer_required {
            if transformer_available {
                return Ok(TransformerDecision {
                    use_transformer: true,
                    can_fallback_to_api: false,
                    method: TransformerMethod::TransformerOnly,
                });
            }
            return if self.can_fallback_to_api(stage, task) {
                Ok(TransformerDecision {
                    use_transformer: false,
                    can_fallback_to_api: true,
                    method: TransformerMethod::ApiFallback,
                })
            } else {
                self.record_violation(
                    task,
                    ViolationKind::TransformerRequiredUnavailable,
                    stage,
                    json!({"reason": "transformer required but unavailable and no API fallback permission"}),
                );
                Err(Error::transformer_required(
                    stage.to_string(),
                    "transformer required but unavailable and no API fallback permission",
                ))
            };
        }

        if perms.transformer_preferred {
            return if transformer_available {
                Ok(TransformerDecision {
                    use_transformer: true,
                    can_fallback_to_api: self.can_fallback_to_api(stage, task),
                    method: TransformerMethod::TransformerPrimary,
                })
            } else {
                Ok(TransformerDecision {
                    use_transformer: false,
                    can_fallback_to_api: true,
                    method: TransformerMethod::ApiFallback,
                })
            };
        }

        Ok(TransformerDecision {
            use_transformer: transformer_available,
            can_fallback_to_api: true,
            method: if transformer_available {
                TransformerMethod::TransformerOnly
            } else {
                TransformerMethod::ApiFallback
            },
        })
    }

    /// Finalizes a task: totals and violation count, idempotent — a second
    /// call for the same task returns the same summary rather than
    /// recomputing.
    pub fn finalize(&self, task: uuid::Uuid) -> GovernanceSummary {
        let mut finalized = self.finalized.lock().expect("finalized lock poisoned");
        if let Some(existing) = finalized.get(&task) {
            return existing.clone();
        }

        let mut calls_by_stage = HashMap::new();
        for stage in Stage::ALL {
            calls_by_stage.insert(stage, self.calls.count(task, stage));
        }
        let violation_count = self.violations.for_task(task).len();

        let (user_id, classification, corpus_access_count, retrieval_query_count) = self
            .task_states
            .lock()
            .expect("task_states lock poisoned")
            .get(&task)
            .map(|s| (s.user_id.clone(), s.classification, s.corpus_access_count, s.retrieval_query_count))
            .unwrap_or_else(|| (String::new(), PromptClass::Chat, 0, 0));

        let summary = GovernanceSummary {
            task_id: task,
            user_id,
            classification,
            calls_by_stage,
            corpus_access_count,
            retrieval_query_count,
            violation_count,
        };
        finalized.insert(task, summary.clone());
        summary
    }

    /// Sweeps tracking for tasks older than `max_age`. Call periodically;
    /// the driver does not call this per-task.
    pub fn cleanup_task_tracking(&self, max_age: Duration) {
        let now = Instant::now();
        let stale: Vec<uuid::Uuid> = {
            let started = self.task_started.lock().expect("task_started lock poisoned");
            started
                .iter()
                .filter(|(_, t)| now.duration_since(**t) > max_age)
                .map(|(id, _)| *id)
                .collect()
        };
        for task in stale {
            self.calls.reset(task);
            self.corpus_rate.reset(task);
            self.violations.clear_task(task);
            self.finalized.lock().expect("finalized lock poisoned").remove(&task);
            self.task_started
                .lock()
                .expect("task_started lock poisoned")
                .remove(&task);
            self.task_states
                .lock()
                .expect("task_states lock poisoned")
                .remove(&task);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enforcer() -> GovernanceEnforcer {
        GovernanceEnforcer::new(PolicyCatalog::default())
    }

    #[test]
    fn validate_corpus_access_denies_out_of_scope_corpus() {
        let gov = enforcer();
        let task = uuid::Uuid::new_v4();
        let err = gov
            .validate_corpus_access(Stage::Drafter, Corpus::Personal, task)
            .unwrap_err();
        assert!(err.to_string().contains("unauthorized_corpus_access"));
        assert_eq!(gov.violations().for_task(task).len(), 1);
    }

    #[test]
    fn validate_corpus_access_allows_permitted_corpus() {
        let gov = enforcer();
        let task = uuid::Uuid::new_v4();
        gov.validate_corpus_access(Stage::Drafter, Corpus::Social, task)
            .unwrap();
    }

    #[test]
    fn validate_retrieval_access_only_allows_critic() {
        let gov = enforcer();
        let task = uuid::Uuid::new_v4();
        assert!(gov.validate_retrieval_access(Stage::Ideator, task).is_err());
        assert!(gov.validate_retrieval_access(Stage::Critic, task).is_ok());
    }

    #[test]
    fn validate_api_call_allows_exactly_max_then_fails() {
        let gov = enforcer();
        let task = uuid::Uuid::new_v4();
        assert_eq!(gov.validate_api_call(Stage::Drafter, task).unwrap(), 1);
        let err = gov.validate_api_call(Stage::Drafter, task).unwrap_err();
        assert!(err.to_string().contains("max=1"));
        assert!(err.to_string().contains("attempted=2"));
    }

    #[test]
    fn can_fallback_to_api_for_summarizer_is_always_false() {
        let gov = enforcer();
        let task = uuid::Uuid::new_v4();
        assert!(!gov.can_fallback_to_api(Stage::Summarizer, task));
    }

    #[test]
    fn can_fallback_to_api_for_revisor_depends_on_max_calls() {
        let gov = enforcer();
        let task = uuid::Uuid::new_v4();
        assert!(gov.can_fallback_to_api(Stage::Revisor, task));
    }

    #[test]
    fn transformer_required_unavailable_without_fallback_raises() {
        let gov = enforcer();
        let task = uuid::Uuid::new_v4();
        // Summarizer is transformer_required and can never fall back.
        let err = gov
            .validate_transformer_requirement(Stage::Summarizer, task, false)
            .unwrap_err();
        assert!(err.to_string().contains("transformer required"));
    }

    #[test]
    fn transformer_required_available_uses_transformer_only() {
        let gov = enforcer();
        let task = uuid::Uuid::new_v4();
        let decision = gov
            .validate_transformer_requirement(Stage::Summarizer, task, true)
            .unwrap();
        assert!(decision.use_transformer);
        assert_eq!(decision.method, TransformerMethod::TransformerOnly);
    }

    #[test]
    fn finalize_surfaces_registered_task_state() {
        let gov = enforcer();
        let task = uuid::Uuid::new_v4();
        gov.register_task(task, "user-42", PromptClass::Writing);
        gov.validate_corpus_access(Stage::Drafter, Corpus::Social, task).unwrap();
        gov.validate_retrieval_access(Stage::Critic, task).unwrap();

        let summary = gov.finalize(task);
        assert_eq!(summary.user_id, "user-42");
        assert_eq!(summary.classification, PromptClass::Writing);
        assert_eq!(summary.corpus_access_count, 1);
        assert_eq!(summary.retrieval_query_count, 1);
    }

    #[test]
    fn finalize_without_registration_defaults_to_chat_and_zeroed_counts() {
        let gov = enforcer();
        let task = uuid::Uuid::new_v4();
        let summary = gov.finalize(task);
        assert_eq!(summary.user_id, "");
        assert_eq!(summary.classification, PromptClass::Chat);
        assert_eq!(summary.corpus_access_count, 0);
        assert_eq!(summary.retrieval_query_count, 0);
    }

    #[test]
    fn finalize_is_idempotent() {
        let gov = enforcer();
        let task = uuid::Uuid::new_v4();
        gov.validate_api_call(Stage::Ideator, task).unwrap();
        let first = gov.finalize(task);
        gov.validate_api_call(Stage::Ideator, task).ok();
        let second = gov.finalize(task);
        assert_eq!(first.calls_by_stage, second.calls_by_stage);
        assert_eq!(first.violation_count, second.violation_count);
    }
}
