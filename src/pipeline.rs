//! Pipeline Driver (C10).
//!
//! Drives a single task from prompt to final output in strict stage order
//! (§4.9): Ideator → Drafter → Critic → Revisor → Summarizer. Threads the
//! context pack and metadata bundle, applies the deterministic transformer
//! (C7) at Revisor and Summarizer, and records stage outcomes through C11
//! (audit) and C14 (stats).

use crate::audit::{AuditTrail, StageCompletionOutcome};
use crate::context_assembler::{ContextAssembler, ContextPack};
use crate::error::{Error, Result};
use crate::governance::enforcer::{GovernanceEnforcer, TransformerMethod};
use crate::governance::state::PromptClass;
use crate::metadata::{AttributionRecord, ChangeLogEntry, MetadataBundle, SourceType, StageMetadata, TokenStats};
use crate::policy::{Corpus, Stage};
use crate::provider::{GenerateParams, Provider, ProviderInfo, TransformerOnlyProvider};
use crate::stats::{PipelineStats, StageOutcome};
use crate::tools::{specs, InvocationContext, ToolWrapper};
use crate::transformer::DeterministicTransformer;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn render_context(pack: &ContextPack) -> String {
    pack.snippets
        .iter()
        .map(|s| format!("[{}] {}", s.attribution, s.text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Word-overlap (Jaccard similarity) between the draft and the Critic's
/// output: truth validation should retain the draft's factual content, so a
/// heavily rewritten critic pass scores lower than a lightly corrected one.
fn truth_score(draft: &str, critic: &str) -> f64 {
    let a = word_set(draft);
    let b = word_set(critic);
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(&b).count() as f64;
    let union = a.union(&b).count().max(1) as f64;
    intersection / union
}

/// Markers that pull a safety score down. Deliberately small and
/// deterministic rather than a full classifier.
const UNSAFE_MARKERS: &[&str] = &["kill", "exploit", "weapon", "attack", "hate"];

/// Fraction of a text's words that are not on the unsafe-marker list,
/// following the same keyword-matching approach as the original tone
/// validator (keyword hits over word count, clamped to `[0, 1]`).
fn safety_score(text: &str) -> f64 {
    let words = word_set(text);
    if words.is_empty() {
        return 1.0;
    }
    let flagged = words.iter().filter(|w| UNSAFE_MARKERS.contains(&w.as_str())).count() as f64;
    (1.0 - flagged / words.len() as f64).max(0.0)
}

fn avg_sentence_len(text: &str) -> f64 {
    let sentences: Vec<&str> = text
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if sentences.is_empty() {
        return 0.0;
    }
    sentences.iter().map(|s| s.split_whitespace().count() as f64).sum::<f64>() / sentences.len() as f64
}

/// Average-sentence-length consistency between draft and critic: a critic
/// pass that preserves the draft's voice keeps sentence structure similar,
/// the same signal the original tone validator checks per expected style.
fn voice_score(draft: &str, critic: &str) -> f64 {
    let a = avg_sentence_len(draft);
    let b = avg_sentence_len(critic);
    if a == 0.0 && b == 0.0 {
        return 1.0;
    }
    let diff = (a - b).abs();
    let scale = a.max(b).max(1.0);
    (1.0 - diff / scale).max(0.0)
}

const KEYWORD_STOPWORDS: &[&str] = &[
    "that", "this", "with", "from", "they", "been", "have", "their", "said", "each", "which", "these", "about",
    "would", "there",
];

/// Deterministic long-tail keyword extraction for the Summarizer stage:
/// words of four or more letters, lowercased, stopwords dropped, ranked by
/// frequency (ties broken alphabetically) and capped at five. No stochastic
/// generation, consistent with the rest of this stage.
fn extract_long_tail_keywords(text: &str) -> Vec<String> {
    let word_re = Regex::new(r"\b[a-zA-Z]{4,}\b").expect("valid regex");
    let mut counts: Vec<(String, usize)> = Vec::new();
    for m in word_re.find_iter(text) {
        let word = m.as_str().to_lowercase();
        if KEYWORD_STOPWORDS.contains(&word.as_str()) {
            continue;
        }
        match counts.iter_mut().find(|(w, _)| *w == word) {
            Some(entry) => entry.1 += 1,
            None => counts.push((word, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts.into_iter().map(|(w, _)| w).take(5).collect()
}

/// The result of a completed task.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub task_id: uuid::Uuid,
    pub final_stage: Stage,
    pub content: String,
    pub metadata: MetadataBundle,
}

pub struct PipelineDriver {
    enforcer: Arc<GovernanceEnforcer>,
    audit: Arc<AuditTrail>,
    stats: Arc<PipelineStats>,
    context_assembler: Arc<ContextAssembler>,
    provider: Arc<dyn Provider>,
    transformer_only: Arc<TransformerOnlyProvider>,
    transformer: Arc<DeterministicTransformer>,
}

impl PipelineDriver {
    pub fn new(
        enforcer: Arc<GovernanceEnforcer>,
        audit: Arc<AuditTrail>,
        stats: Arc<PipelineStats>,
        context_assembler: Arc<ContextAssembler>,
        provider: Arc<dyn Provider>,
        transformer_only: Arc<TransformerOnlyProvider>,
        transformer: Arc<DeterministicTransformer>,
    ) -> Self {
        Self {
            enforcer,
            audit,
            stats,
            context_assembler,
            provider,
            transformer_only,
            transformer,
        }
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Runs one task end to end. Governance is finalized whether the task
    /// succeeds or fails, so accumulated violations are always recorded
    /// (§5, "a task cancelled mid-flight must still finalize governance").
    pub async fn run(&self, user_id: &str, prompt: &str) -> Result<PipelineOutput> {
        let task_id = uuid::Uuid::new_v4();
        let classification = PromptClass::classify(prompt);
        self.enforcer.register_task(task_id, user_id, classification);

        let outcome = self.run_inner(task_id, prompt).await;
        let _summary = self.enforcer.finalize(task_id);
        outcome
    }

    fn fail_stage(&self, task_id: uuid::Uuid, stage: Stage) {
        self.stats.inc(stage, StageOutcome::Fail);
        self.audit.stage_completion(task_id, stage, StageCompletionOutcome::Fail);
    }

    fn succeed_stage(&self, task_id: uuid::Uuid, stage: Stage) {
        self.stats.inc(stage, StageOutcome::Success);
        self.audit.stage_completion(task_id, stage, StageCompletionOutcome::Success);
    }

    /// Stage output validation (§4.9, "Stage output validation"): content
    /// must be non-empty after trimming whitespace.
    fn validate_stage_output(&self, stage: Stage, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(Error::empty_output(stage.to_string()));
        }
        Ok(())
    }

    fn note_provider_info(&self, metadata: &mut StageMetadata, info: &ProviderInfo) {
        metadata.extra.insert(
            format!("provider_{:?}", info.operation),
            serde_json::json!({"provider": info.provider, "model": info.model}),
        );
    }

    async fn run_inner(&self, task_id: uuid::Uuid, prompt: &str) -> Result<PipelineOutput> {
        let mut metadata = StageMetadata::default();
        let mut attribution = Vec::new();
        let mut input_sources = Vec::new();

        // --- Ideator: assemble context, pass prompt through unchanged. ---
        let context_pack = match self.context_assembler.assemble(task_id, prompt).await {
            Ok(pack) => pack,
            Err(e) => {
                self.fail_stage(task_id, Stage::Ideator);
                return Err(e);
            }
        };
        for snippet in &context_pack.snippets {
            attribution.push(AttributionRecord::new(
                SourceType::Corpus,
                Some(snippet.attribution.clone()),
                content_hash(&snippet.text),
                Stage::Ideator,
                task_id,
            ));
            input_sources.push(snippet.attribution.clone());
        }
        let ideator_output = prompt.to_string();
        if let Err(e) = self.validate_stage_output(Stage::Ideator, &ideator_output) {
            self.fail_stage(task_id, Stage::Ideator);
            return Err(e);
        }
        self.succeed_stage(task_id, Stage::Ideator);

        let wrapper = ToolWrapper::new(&self.enforcer, &self.audit);
        let context_text = render_context(&context_pack);

        // --- Drafter: one generate call, expanding the outline into a draft. ---
        let draft_text = {
            let ctx = InvocationContext::new(task_id, Stage::Drafter);
            let provider = self.provider.clone();
            let prompt_owned = ideator_output.clone();
            let context_owned = context_text.clone();
            let result = wrapper
                .execute(
                    ctx,
                    &specs::drafter_generate(),
                    "call_external_model",
                    Some(Corpus::Social),
                    None,
                    || async move {
                        provider
                            .generate(
                                &prompt_owned,
                                &GenerateParams {
                                    max_tokens: None,
                                    context: Some(context_owned),
                                },
                            )
                            .await
                    },
                )
                .await;
            match result {
                Ok(((text, info), _)) => {
                    attribution.push(AttributionRecord::new(
                        SourceType::Generated,
                        None,
                        content_hash(&text),
                        Stage::Drafter,
                        task_id,
                    ));
                    self.note_provider_info(&mut metadata, &info);
                    text
                }
                Err(e) => {
                    self.fail_stage(task_id, Stage::Drafter);
                    return Err(e);
                }
            }
        };
        if let Err(e) = self.validate_stage_output(Stage::Drafter, &draft_text) {
            self.fail_stage(task_id, Stage::Drafter);
            return Err(e);
        }
        self.succeed_stage(task_id, Stage::Drafter);

        // --- Critic: validates the draft, retrieves corroborating material,
        // records truth/safety/voice scores and any resulting revision as a
        // change-log entry. This is the only stage allowed to query
        // retrieval. ---
        let mut critic_text = draft_text.clone();
        {
            let ctx = InvocationContext::new(task_id, Stage::Critic);
            let provider = self.provider.clone();
            let draft_owned = draft_text.clone();
            let result = wrapper
                .execute(
                    ctx,
                    &specs::critic_generate(),
                    "call_external_model",
                    Some(Corpus::Published),
                    None,
                    || async move { provider.generate(&draft_owned, &GenerateParams::default()).await },
                )
                .await;
            match result {
                Ok(((text, info), _)) => {
                    self.note_provider_info(&mut metadata, &info);
                    if text.trim() != draft_text.trim() {
                        metadata.change_log.push(ChangeLogEntry::new(
                            draft_text.clone(),
                            text.clone(),
                            "truth_validation",
                            Stage::Critic,
                            Vec::new(),
                        ));
                        critic_text = text;
                    }
                }
                Err(e) => {
                    self.fail_stage(task_id, Stage::Critic);
                    return Err(e);
                }
            }

            let provider = self.provider.clone();
            let query_owned = critic_text.clone();
            let retrieval = wrapper
                .execute(
                    ctx,
                    &specs::critic_retrieval(),
                    "call_retrieval_endpoint",
                    None,
                    None,
                    || async move {
                        provider
                            .generate(
                                &format!("Identify corroborating facts for: {query_owned}"),
                                &GenerateParams::default(),
                            )
                            .await
                    },
                )
                .await;
            if let Ok(((retrieved, _), _)) = retrieval {
                if !retrieved.trim().is_empty() {
                    attribution.push(AttributionRecord::new(
                        SourceType::Retrieval,
                        None,
                        content_hash(&retrieved),
                        Stage::Critic,
                        task_id,
                    ));
                    input_sources.push("retrieval://critic".to_string());
                }
            }

            metadata.tone_flags.push(format!("truth_score:{:.2}", truth_score(&draft_text, &critic_text)));
            metadata.tone_flags.push(format!("safety_score:{:.2}", safety_score(&critic_text)));
            metadata.tone_flags.push(format!("voice_score:{:.2}", voice_score(&draft_text, &critic_text)));
        }
        if let Err(e) = self.validate_stage_output(Stage::Critic, &critic_text) {
            self.fail_stage(task_id, Stage::Critic);
            return Err(e);
        }
        self.succeed_stage(task_id, Stage::Critic);

        // --- Revisor: revise (preferring the transformer), then always apply
        // the deterministic transformer to the result. ---
        let revisor_text = {
            if let Err(e) =
                self.enforcer
                    .validate_stage_permissions(Stage::Revisor, &specs::revisor_permissions(), task_id)
            {
                self.fail_stage(task_id, Stage::Revisor);
                return Err(e);
            }

            let decision = match self.enforcer.validate_transformer_requirement(Stage::Revisor, task_id, true) {
                Ok(d) => d,
                Err(e) => {
                    self.fail_stage(task_id, Stage::Revisor);
                    return Err(e);
                }
            };

            let (revised, provider_info) = match decision.method {
                TransformerMethod::TransformerOnly | TransformerMethod::TransformerPrimary => {
                    match self.transformer_only.revise(&critic_text, None).await {
                        Ok(r) => r,
                        Err(e) => {
                            self.fail_stage(task_id, Stage::Revisor);
                            return Err(e);
                        }
                    }
                }
                TransformerMethod::ApiFallback => {
                    if let Err(e) = self.enforcer.validate_api_call(Stage::Revisor, task_id) {
                        self.fail_stage(task_id, Stage::Revisor);
                        return Err(e);
                    }
                    match self.provider.revise(&critic_text, None).await {
                        Ok(r) => r,
                        Err(e) => {
                            self.fail_stage(task_id, Stage::Revisor);
                            return Err(e);
                        }
                    }
                }
            };
            self.note_provider_info(&mut metadata, &provider_info);

            let (normalized, second_pass_rules) = self.transformer.apply(&revised);
            if normalized != critic_text {
                let mut rules = provider_info.applied_rules.clone();
                for rule in second_pass_rules {
                    if !rules.contains(&rule) {
                        rules.push(rule);
                    }
                }
                metadata.change_log.push(ChangeLogEntry::new(
                    critic_text.clone(),
                    normalized.clone(),
                    "punctuation_normalization",
                    Stage::Revisor,
                    rules,
                ));
            }
            normalized
        };
        if let Err(e) = self.validate_stage_output(Stage::Revisor, &revisor_text) {
            self.fail_stage(task_id, Stage::Revisor);
            return Err(e);
        }
        self.succeed_stage(task_id, Stage::Revisor);

        // --- Summarizer: transformer-only by default (emergency authorization
        // is always false), then apply the transformer again. ---
        let final_text = {
            if let Err(e) =
                self.enforcer
                    .validate_stage_permissions(Stage::Summarizer, &specs::summarizer_permissions(), task_id)
            {
                self.fail_stage(task_id, Stage::Summarizer);
                return Err(e);
            }

            let decision = match self
                .enforcer
                .validate_transformer_requirement(Stage::Summarizer, task_id, true)
            {
                Ok(d) => d,
                Err(e) => {
                    self.fail_stage(task_id, Stage::Summarizer);
                    return Err(e);
                }
            };
            debug_assert_eq!(decision.method, TransformerMethod::TransformerOnly);

            let (summarized, provider_info) = match self.transformer_only.summarize(&revisor_text, None).await {
                Ok(r) => r,
                Err(e) => {
                    self.fail_stage(task_id, Stage::Summarizer);
                    return Err(e);
                }
            };
            self.note_provider_info(&mut metadata, &provider_info);

            let (normalized, rules) = self.transformer.apply(&summarized);
            if normalized != summarized {
                metadata.extra.insert(
                    "punctuation_normalization".to_string(),
                    serde_json::json!({"applied": true, "rules": rules}),
                );
            }

            metadata.long_tail_keywords = extract_long_tail_keywords(&normalized);

            normalized
        };
        if let Err(e) = self.validate_stage_output(Stage::Summarizer, &final_text) {
            self.fail_stage(task_id, Stage::Summarizer);
            return Err(e);
        }
        self.succeed_stage(task_id, Stage::Summarizer);

        let token_stats = TokenStats {
            input_tokens_approx: TokenStats::approx_tokens(prompt),
            output_tokens_approx: TokenStats::approx_tokens(&final_text),
        };

        let bundle = MetadataBundle {
            task_id,
            role: Stage::Summarizer,
            input_sources,
            attribution,
            tone_flags: metadata.tone_flags,
            change_log: metadata.change_log,
            long_tail_keywords: metadata.long_tail_keywords,
            token_stats,
            trimmed_sections: Vec::new(),
            final_output: final_text.clone(),
        };
        self.audit.metadata_bundle(bundle.clone());

        Ok(PipelineOutput {
            task_id,
            final_stage: Stage::Summarizer,
            content: final_text,
            metadata: bundle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyCatalog;
    use crate::provider::TransformerOnlyProvider;
    use crate::search::cache::NoOpCache;
    use crate::search::schema::initialize_schema;
    use crate::search::{PersonalConnector, PublishedConnector, SocialConnector};
    use rusqlite::Connection;
    use std::time::Duration;

    struct EchoProvider;

    #[async_trait::async_trait]
    impl Provider for EchoProvider {
        async fn generate(&self, prompt: &str, _params: &GenerateParams) -> Result<(String, ProviderInfo)> {
            Ok((prompt.to_string(), ProviderInfo::new("echo", "echo-1", crate::provider::ProviderOperation::Generate)))
        }

        async fn revise(&self, text: &str, _metadata: Option<&serde_json::Value>) -> Result<(String, ProviderInfo)> {
            Ok((text.to_string(), ProviderInfo::new("echo", "echo-1", crate::provider::ProviderOperation::Revise)))
        }

        async fn summarize(&self, text: &str, _metadata: Option<&serde_json::Value>) -> Result<(String, ProviderInfo)> {
            Ok((text.to_string(), ProviderInfo::new("echo", "echo-1", crate::provider::ProviderOperation::Summarize)))
        }
    }

    fn driver() -> PipelineDriver {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        let shared = Arc::new(std::sync::Mutex::new(conn));
        let enforcer = Arc::new(GovernanceEnforcer::new(PolicyCatalog::default()));
        let audit = Arc::new(AuditTrail::new());
        let assembler = Arc::new(ContextAssembler::new(
            enforcer.clone(),
            audit.clone(),
            Arc::new(PersonalConnector::new(shared.clone(), Arc::new(NoOpCache), Duration::from_secs(60))),
            Arc::new(SocialConnector::new(shared.clone(), Arc::new(NoOpCache), Duration::from_secs(60))),
            Arc::new(PublishedConnector::new(shared, Arc::new(NoOpCache), Duration::from_secs(60))),
        ));
        let transformer = Arc::new(DeterministicTransformer::new(crate::policy::PunctuationPolicy::default()));
        PipelineDriver::new(
            enforcer,
            audit,
            Arc::new(PipelineStats::new()),
            assembler,
            Arc::new(EchoProvider),
            Arc::new(TransformerOnlyProvider::new(transformer.clone())),
            transformer,
        )
    }

    #[tokio::test]
    async fn happy_path_chat_prompt_completes_with_no_violations() {
        let driver = driver();
        let output = driver.run("user-1", "Hello world!").await.unwrap();
        assert_eq!(output.final_stage, Stage::Summarizer);
        assert_eq!(output.content, "Hello world!");
        assert!(output.metadata.change_log.is_empty());

        let snap = driver.stats().snapshot();
        for stage in Stage::ALL {
            assert_eq!(snap[&stage].fail, 0, "stage {stage} should not have failed");
        }
    }

    #[tokio::test]
    async fn punctuation_scenario_is_normalized_by_revisor() {
        let driver = driver();
        let output = driver
            .run("user-1", "Wow!!! This is \u{201C}great\u{201D}\u{2026} right??!")
            .await
            .unwrap();
        assert_eq!(output.content, "Wow! This is \"great\"... right?!");
        assert!(output
            .metadata
            .change_log
            .iter()
            .any(|e| e.applied_by == Stage::Revisor && e.reason == "punctuation_normalization"));
    }

    #[tokio::test]
    async fn empty_prompt_fails_at_ideator_output_validation() {
        let driver = driver();
        let err = driver.run("user-1", "   ").await.unwrap_err();
        assert!(matches!(err, Error::GovernanceViolation { .. }));
        let snap = driver.stats().snapshot();
        assert_eq!(snap[&Stage::Ideator].fail, 1);
    }

    #[tokio::test]
    async fn critic_retrieval_runs_for_every_prompt_and_is_attributed() {
        let driver = driver();
        let output = driver.run("user-1", "Hello world!").await.unwrap();
        assert_eq!(output.final_stage, Stage::Summarizer);
        assert!(output
            .metadata
            .attribution
            .iter()
            .any(|a| matches!(a.source_type, SourceType::Retrieval) && a.producing_stage == Stage::Critic));
        assert!(output
            .metadata
            .input_sources
            .iter()
            .any(|s| s == "retrieval://critic"));
    }

    #[tokio::test]
    async fn summarizer_extracts_long_tail_keywords() {
        let driver = driver();
        let output = driver
            .run(
                "user-1",
                "Governance pipelines enforce strict corpus access while governance pipelines remain auditable.",
            )
            .await
            .unwrap();
        assert!(!output.metadata.long_tail_keywords.is_empty());
        assert!(output.metadata.long_tail_keywords.contains(&"governance".to_string()));
    }
}
