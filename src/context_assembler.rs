//! Context Assembler (C9).
//!
//! Runs the three search connectors through the Tool Wrapper (C5) under the
//! Ideator stage identity, preserving insertion order `[Personal, Social,
//! Published]`, and bundles the results into a [`ContextPack`]. Never invokes
//! a provider; its output is purely retrieval (§4.8).

use crate::audit::AuditTrail;
use crate::governance::enforcer::GovernanceEnforcer;
use crate::policy::{Corpus, Stage};
use crate::search::{
    PersonalConnector, PersonalFilters, PublishedConnector, PublishedFilters, SearchSnippet,
    SocialConnector, SocialFilters,
};
use crate::tools::{specs, InvocationContext, ToolWrapper};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How many rows each connector contributes per task, at most.
const SNIPPETS_PER_CORPUS: usize = 3;

/// Where a context snippet came from. A superset of [`Corpus`]: context may
/// also carry `External` snippets contributed outside the search layer
/// (retrieval results attached by the Critic stage), though the assembler
/// itself only ever produces the three corpus origins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Personal,
    Social,
    Published,
    External,
}

impl From<Corpus> for Origin {
    fn from(corpus: Corpus) -> Self {
        match corpus {
            Corpus::Personal => Origin::Personal,
            Corpus::Social => Origin::Social,
            Corpus::Published => Origin::Published,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnippet {
    pub text: String,
    pub origin: Origin,
    pub date: String,
    pub tags: Vec<String>,
    pub voice_terms: Vec<String>,
    pub attribution: String,
    pub notes: String,
}

impl ContextSnippet {
    fn from_search(origin: Origin, snippet: SearchSnippet) -> Self {
        Self {
            text: snippet.text,
            origin,
            date: snippet.date,
            tags: snippet.tags,
            voice_terms: snippet.voice_terms,
            attribution: snippet.attribution,
            notes: snippet.notes,
        }
    }
}

/// An ordered, attributed snippet sequence built once per task. Snippets are
/// never mutated after construction; new snippets may only be added by this
/// assembler inside the Ideator stage (§3, Context pack).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextPack {
    pub snippets: Vec<ContextSnippet>,
    pub coverage_score: f64,
    pub tone_score: f64,
    pub diversity_ok: bool,
}

impl ContextPack {
    fn empty() -> Self {
        Self {
            snippets: Vec::new(),
            coverage_score: 0.0,
            tone_score: 1.0,
            diversity_ok: false,
        }
    }
}

pub struct ContextAssembler {
    enforcer: Arc<GovernanceEnforcer>,
    audit: Arc<AuditTrail>,
    personal: Arc<PersonalConnector>,
    social: Arc<SocialConnector>,
    published: Arc<PublishedConnector>,
}

impl ContextAssembler {
    pub fn new(
        enforcer: Arc<GovernanceEnforcer>,
        audit: Arc<AuditTrail>,
        personal: Arc<PersonalConnector>,
        social: Arc<SocialConnector>,
        published: Arc<PublishedConnector>,
    ) -> Self {
        Self {
            enforcer,
            audit,
            personal,
            social,
            published,
        }
    }

    /// Queries all three corpora for `prompt` under `task_id`, acting as the
    /// Ideator stage, and assembles a [`ContextPack`] in corpus order.
    pub async fn assemble(&self, task_id: uuid::Uuid, prompt: &str) -> crate::error::Result<ContextPack> {
        let wrapper = ToolWrapper::new(&self.enforcer, &self.audit);
        let ctx = InvocationContext::new(task_id, Stage::Ideator);

        let mut snippets = Vec::new();

        let personal = self.personal.clone();
        let prompt_owned = prompt.to_string();
        let (result, _) = wrapper
            .execute(
                ctx,
                &specs::ideator_search(Corpus::Personal),
                "search_personal",
                Some(Corpus::Personal),
                None,
                || async move { personal.query(&prompt_owned, &PersonalFilters::default(), SNIPPETS_PER_CORPUS).await },
            )
            .await?;
        snippets.extend(result.snippets.into_iter().map(|s| ContextSnippet::from_search(Origin::Personal, s)));

        let social = self.social.clone();
        let prompt_owned = prompt.to_string();
        let (result, _) = wrapper
            .execute(
                ctx,
                &specs::ideator_search(Corpus::Social),
                "search_social",
                Some(Corpus::Social),
                None,
                || async move { social.query(&prompt_owned, &SocialFilters::default(), SNIPPETS_PER_CORPUS).await },
            )
            .await?;
        snippets.extend(result.snippets.into_iter().map(|s| ContextSnippet::from_search(Origin::Social, s)));

        let published = self.published.clone();
        let prompt_owned = prompt.to_string();
        let (result, _) = wrapper
            .execute(
                ctx,
                &specs::ideator_search(Corpus::Published),
                "search_published",
                Some(Corpus::Published),
                None,
                || async move { published.query(&prompt_owned, &PublishedFilters::default(), SNIPPETS_PER_CORPUS).await },
            )
            .await?;
        snippets.extend(result.snippets.into_iter().map(|s| ContextSnippet::from_search(Origin::Published, s)));

        if snippets.is_empty() {
            return Ok(ContextPack::empty());
        }

        let distinct_origins = [Origin::Personal, Origin::Social, Origin::Published]
            .into_iter()
            .filter(|origin| snippets.iter().any(|s| s.origin == *origin))
            .count();

        let coverage_score = (snippets.len() as f64 / (SNIPPETS_PER_CORPUS * 3) as f64).min(1.0);

        Ok(ContextPack {
            snippets,
            coverage_score,
            tone_score: 1.0,
            diversity_ok: distinct_origins >= 2,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyCatalog;
    use crate::search::cache::NoOpCache;
    use crate::search::schema::initialize_schema;
    use rusqlite::Connection;
    use std::sync::Mutex;
    use std::time::Duration;

    fn seeded_assembler() -> ContextAssembler {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO messages (id, thread_id, role, content, ts) VALUES (1, 't1', 'user', 'hello world', '2024-01-01T00:00:00+00:00')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO posts (id, platform, content, ts, engagement) VALUES (1, 'x', 'hello world', '2024-01-01T00:00:00+00:00', 10)",
            [],
        )
        .unwrap();
        let shared = Arc::new(Mutex::new(conn));
        ContextAssembler::new(
            Arc::new(GovernanceEnforcer::new(PolicyCatalog::default())),
            Arc::new(AuditTrail::new()),
            Arc::new(PersonalConnector::new(shared.clone(), Arc::new(NoOpCache), Duration::from_secs(60))),
            Arc::new(SocialConnector::new(shared.clone(), Arc::new(NoOpCache), Duration::from_secs(60))),
            Arc::new(PublishedConnector::new(shared, Arc::new(NoOpCache), Duration::from_secs(60))),
        )
    }

    #[tokio::test]
    async fn assembles_snippets_in_corpus_order() {
        let assembler = seeded_assembler();
        let task = uuid::Uuid::new_v4();
        let pack = assembler.assemble(task, "hello").await.unwrap();

        assert_eq!(pack.snippets.len(), 2);
        assert_eq!(pack.snippets[0].origin, Origin::Personal);
        assert_eq!(pack.snippets[1].origin, Origin::Social);
        assert!(pack.diversity_ok);
    }

    #[tokio::test]
    async fn empty_corpora_yield_an_empty_pack_without_error() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        let shared = Arc::new(Mutex::new(conn));
        let assembler = ContextAssembler::new(
            Arc::new(GovernanceEnforcer::new(PolicyCatalog::default())),
            Arc::new(AuditTrail::new()),
            Arc::new(PersonalConnector::new(shared.clone(), Arc::new(NoOpCache), Duration::from_secs(60))),
            Arc::new(SocialConnector::new(shared.clone(), Arc::new(NoOpCache), Duration::from_secs(60))),
            Arc::new(PublishedConnector::new(shared, Arc::new(NoOpCache), Duration::from_secs(60))),
        );
        let pack = assembler.assemble(uuid::Uuid::new_v4(), "nothing matches").await.unwrap();
        assert!(pack.snippets.is_empty());
        assert!(!pack.diversity_ok);
    }
}
