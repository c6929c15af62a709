//! Policy Catalog (C1).
//!
//! Static, process-wide, read-only after construction. Declares per-stage
//! API-call ceilings, the corpus access matrix, retrieval access, and the
//! punctuation policy. No other component may hard-code a limit, access set,
//! or stage order — everything is looked up here.

use std::collections::HashSet;
use std::fmt;

/// One of the five ordered roles in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ideator,
    Drafter,
    Critic,
    Revisor,
    Summarizer,
}

impl Stage {
    /// Stage execution order. The pipeline driver (C10) must follow this
    /// order exactly.
    pub const ALL: [Stage; 5] = [
        Stage::Ideator,
        Stage::Drafter,
        Stage::Critic,
        Stage::Revisor,
        Stage::Summarizer,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Ideator => "Ideator",
            Stage::Drafter => "Drafter",
            Stage::Critic => "Critic",
            Stage::Revisor => "Revisor",
            Stage::Summarizer => "Summarizer",
        };
        f.write_str(s)
    }
}

/// A labeled body of stored text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corpus {
    Personal,
    Social,
    Published,
}

impl fmt::Display for Corpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Corpus::Personal => "personal",
            Corpus::Social => "social",
            Corpus::Published => "published",
        };
        f.write_str(s)
    }
}

impl Corpus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "personal" | "Personal" => Some(Corpus::Personal),
            "social" | "Social" => Some(Corpus::Social),
            "published" | "Published" => Some(Corpus::Published),
            _ => None,
        }
    }
}

/// Formats a set of corpora as `{Personal, Social}` for error messages, in a
/// stable order.
pub fn format_corpus_set(set: &HashSet<Corpus>) -> String {
    let mut ordered: Vec<&Corpus> = set.iter().collect();
    ordered.sort_by_key(|c| format!("{c}"));
    let inner = ordered
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{inner}}}")
}

/// Immutable per-stage permission record.
#[derive(Debug, Clone)]
pub struct StagePermissions {
    pub max_api_calls: u32,
    pub corpus_access: HashSet<Corpus>,
    pub retrieval_access: bool,
    pub transformer_access: bool,
    pub transformer_preferred: bool,
    pub transformer_required: bool,
}

impl StagePermissions {
    fn new(
        max_api_calls: u32,
        corpus_access: &[Corpus],
        retrieval_access: bool,
        transformer_access: bool,
        transformer_preferred: bool,
        transformer_required: bool,
    ) -> Self {
        assert!(
            !transformer_required || transformer_access,
            "transformer_required implies transformer_access"
        );
        assert!(
            !transformer_preferred || transformer_access,
            "transformer_preferred implies transformer_access"
        );
        Self {
            max_api_calls,
            corpus_access: corpus_access.iter().copied().collect(),
            retrieval_access,
            transformer_access,
            transformer_preferred,
            transformer_required,
        }
    }
}

/// Named permissions checked by [`crate::governance::enforcer::GovernanceEnforcer::validate_stage_permissions`].
/// Stage-identity permissions mirror the original governance protocol's
/// role-keyed permission map exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedPermission {
    CorpusAccess,
    RetrievalAccess,
    TransformerAccess,
    ApiAccess,
    OutlineGeneration,
    DraftExpansion,
    TruthValidation,
    CorrectionApplication,
    ContentCompression,
    KeywordExtraction,
    TonePreservation,
}

impl NamedPermission {
    /// True if `stage` holds this named permission, under the exact mapping
    /// the governance protocol uses.
    pub fn granted_to(self, stage: Stage, perms: &StagePermissions) -> bool {
        match self {
            NamedPermission::CorpusAccess => !perms.corpus_access.is_empty(),
            NamedPermission::RetrievalAccess => perms.retrieval_access,
            NamedPermission::TransformerAccess => perms.transformer_access,
            NamedPermission::ApiAccess => perms.max_api_calls > 0,
            NamedPermission::OutlineGeneration => stage == Stage::Ideator,
            NamedPermission::DraftExpansion => stage == Stage::Drafter,
            NamedPermission::TruthValidation => stage == Stage::Critic,
            NamedPermission::CorrectionApplication => stage == Stage::Revisor,
            NamedPermission::ContentCompression => stage == Stage::Summarizer,
            NamedPermission::KeywordExtraction => stage == Stage::Summarizer,
            NamedPermission::TonePreservation => {
                matches!(stage, Stage::Drafter | Stage::Revisor)
            }
        }
    }
}

/// Punctuation normalization policy (§4.6), with defaults matching the
/// original punctuation protocol.
#[derive(Debug, Clone)]
pub struct PunctuationPolicy {
    pub allowed_sentence_terminators: Vec<char>,
    pub collapse_repeated_terminators: bool,
    pub normalize_ellipsis: bool,
    pub max_exclamations_per_100_words: u32,
    pub enforce_space_after_punctuation: bool,
    pub normalize_quotes: bool,
}

impl Default for PunctuationPolicy {
    fn default() -> Self {
        Self {
            allowed_sentence_terminators: vec!['.', '?', '!'],
            collapse_repeated_terminators: true,
            normalize_ellipsis: true,
            max_exclamations_per_100_words: 2,
            enforce_space_after_punctuation: true,
            normalize_quotes: true,
        }
    }
}

/// Static, process-wide policy tables.
pub struct PolicyCatalog {
    permissions: [StagePermissions; 5],
    punctuation: PunctuationPolicy,
    corpus_rate_limit_per_min: u32,
}

impl PolicyCatalog {
    /// Build the catalog with the §3 defaults. `corpus_rate_limit_per_min`
    /// is the configurable override for the 10/min default (Open Question 1).
    pub fn new(corpus_rate_limit_per_min: u32) -> Self {
        use Corpus::*;
        let permissions = [
            StagePermissions::new(2, &[Personal, Social, Published], false, true, false, false),
            StagePermissions::new(1, &[Social, Published], false, true, false, false),
            StagePermissions::new(2, &[Personal, Social, Published], true, true, false, false),
            StagePermissions::new(1, &[], false, true, true, false),
            StagePermissions::new(0, &[], false, true, false, true),
        ];
        Self {
            permissions,
            punctuation: PunctuationPolicy::default(),
            corpus_rate_limit_per_min,
        }
    }

    pub fn permissions_for(&self, stage: Stage) -> &StagePermissions {
        &self.permissions[stage as usize]
    }

    pub fn stages_in_order(&self) -> [Stage; 5] {
        Stage::ALL
    }

    pub fn punctuation_policy(&self) -> &PunctuationPolicy {
        &self.punctuation
    }

    pub fn corpus_rate_limit_per_min(&self) -> u32 {
        self.corpus_rate_limit_per_min
    }

    /// A fixed templated instruction used by the Ideator's revise-on-failure
    /// path.
    pub fn revise_call_template(&self) -> &'static str {
        "Revise the following outline to address the noted issues while preserving all attributed sources: {content}"
    }
}

impl Default for PolicyCatalog {
    fn default() -> Self {
        Self::new(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_matches_spec() {
        assert_eq!(
            Stage::ALL,
            [
                Stage::Ideator,
                Stage::Drafter,
                Stage::Critic,
                Stage::Revisor,
                Stage::Summarizer
            ]
        );
    }

    #[test]
    fn catalog_permissions_match_table_exactly() {
        let catalog = PolicyCatalog::default();

        let ideator = catalog.permissions_for(Stage::Ideator);
        assert_eq!(ideator.max_api_calls, 2);
        assert_eq!(ideator.corpus_access.len(), 3);
        assert!(!ideator.retrieval_access);

        let drafter = catalog.permissions_for(Stage::Drafter);
        assert_eq!(drafter.max_api_calls, 1);
        assert!(drafter.corpus_access.contains(&Corpus::Social));
        assert!(drafter.corpus_access.contains(&Corpus::Published));
        assert!(!drafter.corpus_access.contains(&Corpus::Personal));

        let critic = catalog.permissions_for(Stage::Critic);
        assert_eq!(critic.max_api_calls, 2);
        assert!(critic.retrieval_access);

        let revisor = catalog.permissions_for(Stage::Revisor);
        assert_eq!(revisor.max_api_calls, 1);
        assert!(revisor.corpus_access.is_empty());
        assert!(revisor.transformer_preferred);

        let summarizer = catalog.permissions_for(Stage::Summarizer);
        assert_eq!(summarizer.max_api_calls, 0);
        assert!(summarizer.transformer_required);
    }

    #[test]
    fn only_critic_has_retrieval_access() {
        let catalog = PolicyCatalog::default();
        for stage in Stage::ALL {
            let has_retrieval = catalog.permissions_for(stage).retrieval_access;
            assert_eq!(has_retrieval, stage == Stage::Critic);
        }
    }

    #[test]
    fn tone_preservation_granted_to_drafter_and_revisor_only() {
        let catalog = PolicyCatalog::default();
        for stage in Stage::ALL {
            let perms = catalog.permissions_for(stage);
            let granted = NamedPermission::TonePreservation.granted_to(stage, perms);
            assert_eq!(
                granted,
                matches!(stage, Stage::Drafter | Stage::Revisor),
                "stage {stage} tone_preservation mismatch"
            );
        }
    }

    #[test]
    fn punctuation_policy_defaults_match_source() {
        let policy = PunctuationPolicy::default();
        assert_eq!(policy.allowed_sentence_terminators, vec!['.', '?', '!']);
        assert_eq!(policy.max_exclamations_per_100_words, 2);
        assert!(policy.normalize_quotes);
        assert!(policy.normalize_ellipsis);
        assert!(policy.collapse_repeated_terminators);
        assert!(policy.enforce_space_after_punctuation);
    }

    #[test]
    fn format_corpus_set_is_stable() {
        let set: HashSet<Corpus> = [Corpus::Published, Corpus::Social].into_iter().collect();
        assert_eq!(format_corpus_set(&set), "{published, social}");
    }
}
