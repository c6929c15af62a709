//! Tool Wrapper (C5).
//!
//! The cross-cutting decorator that binds a tool invocation — a
//! `search_personal`/`search_social`/`search_published`/`call_external_model`/
//! `call_retrieval_endpoint` call — to a declarative policy (required
//! permissions, allowed corpora, per-task call budget, retrieval/transformer
//! requirements) and runs the Policy Enforcer (C4) checks before and after
//! execution. This is the only legitimate call path to the Search Layer (C6)
//! and the Provider Contract (C8): tools themselves stay pure, and policy
//! stays declarative in the [`ToolSpec`] each stage-specific wrapper
//! pre-fills (§4.4, §9 "Policy table + decorator idiom").

use crate::audit::AuditTrail;
use crate::error::{Error, Result};
use crate::governance::enforcer::{GovernanceEnforcer, TransformerDecision};
use crate::policy::{Corpus, NamedPermission, Stage};
use std::collections::HashSet;
use std::future::Future;
use std::time::Instant;

/// The "current stage + task id" the Tool Wrapper needs without every caller
/// threading them through by hand (§9 "Ambient run context"). An explicit
/// value passed down the call chain from the pipeline driver — never mutable
/// global state.
#[derive(Debug, Clone, Copy)]
pub struct InvocationContext {
    pub task_id: uuid::Uuid,
    pub stage: Stage,
}

impl InvocationContext {
    pub fn new(task_id: uuid::Uuid, stage: Stage) -> Self {
        Self { task_id, stage }
    }
}

/// Declarative policy a tool is registered with (§4.4).
#[derive(Debug, Clone, Default)]
pub struct ToolSpec {
    pub required_permissions: Vec<NamedPermission>,
    pub allowed_corpora: Option<HashSet<Corpus>>,
    pub max_calls_per_task: u32,
    pub requires_retrieval: bool,
    pub requires_transformer_primary: bool,
}

/// Minimum-shape output validation (§4.4 step 9): "non-null, minimum shape".
/// Implemented per return type rather than reflectively, since Rust has no
/// generic null to check against.
pub trait ToolOutputShape {
    fn is_valid_tool_output(&self) -> bool;
}

impl ToolOutputShape for crate::search::SearchResult {
    /// Search results fail closed to empty on DB error (§4.5), so an empty
    /// result is a valid shape, not a violation.
    fn is_valid_tool_output(&self) -> bool {
        true
    }
}

impl ToolOutputShape for String {
    fn is_valid_tool_output(&self) -> bool {
        !self.trim().is_empty()
    }
}

impl<T> ToolOutputShape for (String, T) {
    fn is_valid_tool_output(&self) -> bool {
        !self.0.trim().is_empty()
    }
}

/// Runs the enforcement steps around one tool invocation (§4.4, steps 1-10).
pub struct ToolWrapper<'a> {
    enforcer: &'a GovernanceEnforcer,
    audit: &'a AuditTrail,
}

impl<'a> ToolWrapper<'a> {
    pub fn new(enforcer: &'a GovernanceEnforcer, audit: &'a AuditTrail) -> Self {
        Self { enforcer, audit }
    }

    /// Executes `tool_name` under `ctx`, governed by `spec`. `corpus` is the
    /// corpus argument discovered from the call, if any (§4.4: "by name
    /// ... or, failing that, by a positional string"). `transformer_available`
    /// is only consulted when `spec.requires_transformer_primary` is set.
    pub async fn execute<T, Fut>(
        &self,
        ctx: InvocationContext,
        spec: &ToolSpec,
        tool_name: &str,
        corpus: Option<Corpus>,
        transformer_available: Option<bool>,
        run: impl FnOnce() -> Fut,
    ) -> Result<(T, Option<TransformerDecision>)>
    where
        Fut: Future<Output = Result<T>>,
        T: ToolOutputShape,
    {
        if let Err(e) = self
            .enforcer
            .validate_stage_permissions(ctx.stage, &spec.required_permissions, ctx.task_id)
        {
            self.log_violation(ctx, &e);
            return Err(e);
        }

        if spec.allowed_corpora.is_some() {
            if let Some(c) = corpus {
                if let Err(e) = self.enforcer.validate_corpus_access(ctx.stage, c, ctx.task_id) {
                    self.log_violation(ctx, &e);
                    return Err(e);
                }
            }
        }

        if spec.requires_retrieval {
            if let Err(e) = self.enforcer.validate_retrieval_access(ctx.stage, ctx.task_id) {
                self.log_violation(ctx, &e);
                return Err(e);
            }
        }

        if spec.max_calls_per_task > 0 {
            if let Err(e) = self.enforcer.validate_api_call(ctx.stage, ctx.task_id) {
                self.log_violation(ctx, &e);
                return Err(e);
            }
        }

        let transformer_decision = if spec.requires_transformer_primary {
            match self.enforcer.validate_transformer_requirement(
                ctx.stage,
                ctx.task_id,
                transformer_available.unwrap_or(false),
            ) {
                Ok(decision) => Some(decision),
                Err(e) => {
                    self.log_violation(ctx, &e);
                    return Err(e);
                }
            }
        } else {
            None
        };

        self.audit.tool_execution_started(ctx.task_id, ctx.stage, tool_name);
        let started = Instant::now();

        match run().await {
            Ok(value) => {
                if !value.is_valid_tool_output() {
                    let err = Error::empty_output(ctx.stage.to_string());
                    self.audit
                        .tool_execution_error(ctx.task_id, ctx.stage, tool_name, started.elapsed());
                    return Err(err);
                }
                self.audit
                    .tool_execution_success(ctx.task_id, ctx.stage, tool_name, started.elapsed());
                Ok((value, transformer_decision))
            }
            Err(e) => {
                self.audit
                    .tool_execution_error(ctx.task_id, ctx.stage, tool_name, started.elapsed());
                Err(e)
            }
        }
    }

    fn log_violation(&self, ctx: InvocationContext, err: &Error) {
        if let Error::GovernanceViolation { kind, detail, .. } = err {
            self.audit
                .governance_violation(ctx.task_id, ctx.stage, kind.to_string(), serde_json::json!({"detail": detail}));
        }
    }
}

/// Pre-set tool specs per stage, so each stage's tool declarations read like
/// a stage-specific DSL (§4.4, last paragraph).
pub mod specs {
    use super::*;

    pub fn ideator_search(corpus: Corpus) -> ToolSpec {
        let _ = corpus;
        ToolSpec {
            required_permissions: vec![NamedPermission::CorpusAccess],
            allowed_corpora: Some([Corpus::Personal, Corpus::Social, Corpus::Published].into_iter().collect()),
            max_calls_per_task: 0,
            requires_retrieval: false,
            requires_transformer_primary: false,
        }
    }

    pub fn drafter_generate() -> ToolSpec {
        ToolSpec {
            required_permissions: vec![NamedPermission::ApiAccess, NamedPermission::DraftExpansion],
            allowed_corpora: Some([Corpus::Social, Corpus::Published].into_iter().collect()),
            max_calls_per_task: 1,
            requires_retrieval: false,
            requires_transformer_primary: false,
        }
    }

    pub fn critic_generate() -> ToolSpec {
        ToolSpec {
            required_permissions: vec![NamedPermission::ApiAccess, NamedPermission::TruthValidation],
            allowed_corpora: Some([Corpus::Personal, Corpus::Social, Corpus::Published].into_iter().collect()),
            max_calls_per_task: 2,
            requires_retrieval: false,
            requires_transformer_primary: false,
        }
    }

    pub fn critic_retrieval() -> ToolSpec {
        ToolSpec {
            required_permissions: vec![NamedPermission::RetrievalAccess, NamedPermission::TruthValidation],
            allowed_corpora: None,
            max_calls_per_task: 0,
            requires_retrieval: true,
            requires_transformer_primary: false,
        }
    }

    /// Revisor and Summarizer bypass this wrapper: their API-call budget is
    /// only consumed on the fallback branch, which the generic all-or-nothing
    /// `max_calls_per_task` check can't express. The pipeline driver calls
    /// [`GovernanceEnforcer::validate_stage_permissions`] and
    /// [`GovernanceEnforcer::validate_transformer_requirement`] directly for
    /// those two stages instead.
    pub fn revisor_permissions() -> Vec<NamedPermission> {
        vec![NamedPermission::TransformerAccess, NamedPermission::CorrectionApplication]
    }

    pub fn summarizer_permissions() -> Vec<NamedPermission> {
        vec![
            NamedPermission::TransformerAccess,
            NamedPermission::ContentCompression,
            NamedPermission::KeywordExtraction,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyCatalog;
    use crate::search::SearchResult;

    fn wrapper(enforcer: &GovernanceEnforcer, audit: &AuditTrail) -> ToolWrapper<'_> {
        ToolWrapper::new(enforcer, audit)
    }

    #[tokio::test]
    async fn drafter_search_personal_is_denied() {
        let enforcer = GovernanceEnforcer::new(PolicyCatalog::default());
        let audit = AuditTrail::new();
        let wrapper = wrapper(&enforcer, &audit);
        let ctx = InvocationContext::new(uuid::Uuid::new_v4(), Stage::Drafter);

        let result = wrapper
            .execute(
                ctx,
                &specs::ideator_search(Corpus::Personal),
                "search_personal",
                Some(Corpus::Personal),
                None,
                || async { Ok(SearchResult::default()) },
            )
            .await;

        assert!(result.is_err());
        assert_eq!(enforcer.violations().for_task(ctx.task_id).len(), 1);
    }

    #[tokio::test]
    async fn drafter_generate_allows_exactly_one_call() {
        let enforcer = GovernanceEnforcer::new(PolicyCatalog::default());
        let audit = AuditTrail::new();
        let wrapper = wrapper(&enforcer, &audit);
        let ctx = InvocationContext::new(uuid::Uuid::new_v4(), Stage::Drafter);

        let first = wrapper
            .execute(
                ctx,
                &specs::drafter_generate(),
                "call_external_model",
                Some(Corpus::Social),
                None,
                || async { Ok(("draft text".to_string(), ())) },
            )
            .await;
        assert!(first.is_ok());

        let second = wrapper
            .execute(
                ctx,
                &specs::drafter_generate(),
                "call_external_model",
                Some(Corpus::Social),
                None,
                || async { Ok(("draft text 2".to_string(), ())) },
            )
            .await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn retrieval_tool_is_gated_to_critic() {
        let enforcer = GovernanceEnforcer::new(PolicyCatalog::default());
        let audit = AuditTrail::new();
        let wrapper = wrapper(&enforcer, &audit);

        let ideator_ctx = InvocationContext::new(uuid::Uuid::new_v4(), Stage::Ideator);
        let denied = wrapper
            .execute(
                ideator_ctx,
                &specs::critic_retrieval(),
                "call_retrieval_endpoint",
                None,
                None,
                || async { Ok("retrieved".to_string()) },
            )
            .await;
        assert!(denied.is_err());

        let critic_ctx = InvocationContext::new(uuid::Uuid::new_v4(), Stage::Critic);
        let allowed = wrapper
            .execute(
                critic_ctx,
                &specs::critic_retrieval(),
                "call_retrieval_endpoint",
                None,
                None,
                || async { Ok("retrieved".to_string()) },
            )
            .await;
        assert!(allowed.is_ok());
    }

    #[tokio::test]
    async fn empty_tool_output_is_rejected_as_invalid_shape() {
        let enforcer = GovernanceEnforcer::new(PolicyCatalog::default());
        let audit = AuditTrail::new();
        let wrapper = wrapper(&enforcer, &audit);
        let ctx = InvocationContext::new(uuid::Uuid::new_v4(), Stage::Drafter);

        let result = wrapper
            .execute(
                ctx,
                &specs::drafter_generate(),
                "call_external_model",
                Some(Corpus::Social),
                None,
                || async { Ok((String::new(), ())) },
            )
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn summarizer_permissions_include_keyword_extraction() {
        assert!(specs::summarizer_permissions().contains(&NamedPermission::KeywordExtraction));
        assert!(specs::summarizer_permissions().contains(&NamedPermission::ContentCompression));
    }
}
