//! # mcg-core
//!
//! A governed five-stage content pipeline: a prompt is routed through
//! Ideator → Drafter → Critic → Revisor → Summarizer, with every corpus
//! query, provider call, and retrieval query first passing a declarative
//! policy check so rule violations are architecturally impossible rather
//! than merely discouraged.
//!
//! ## Core components
//!
//! - [`policy`] — the static Policy Catalog (C1): per-stage call ceilings,
//!   corpus/retrieval access matrices, punctuation policy, stage order.
//! - [`governance`] — the Call Tracker, Violation Log, and Policy Enforcer
//!   (C2-C4) that mutate and validate per-task governance state.
//! - [`tools`] — the Tool Wrapper (C5): the only legitimate call path to the
//!   search layer and the provider, binding each invocation to its policy.
//! - [`search`] — the three corpus connectors and the request-level cache
//!   (C6).
//! - [`transformer`] — the Deterministic Transformer (C7), a pure,
//!   idempotent punctuation normalizer.
//! - [`provider`] — the Provider Contract (C8): an external HTTP
//!   implementation and a transformer-only implementation.
//! - [`context_assembler`] — the Context Assembler (C9), which runs the
//!   three connectors under the Ideator stage identity and builds a context
//!   pack.
//! - [`pipeline`] — the Pipeline Driver (C10) that sequences the five
//!   stages end to end.
//! - [`audit`] — the append-only Audit Trail (C11).
//! - [`metadata`] — the attribution record and final metadata bundle shapes.
//! - [`config`], [`logging`], [`stats`], [`health`] — the ambient stack:
//!   environment-driven configuration, structured logging, per-stage
//!   pipeline statistics, and a memory pressure monitor.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mcg_core::policy::PolicyCatalog;
//! use mcg_core::governance::GovernanceEnforcer;
//! use mcg_core::pipeline::PipelineDriver;
//!
//! let enforcer = GovernanceEnforcer::new(PolicyCatalog::default());
//! // ... wire up search connectors, a provider, and an audit trail, then:
//! // let output = driver.run("user-123", "Hello world!").await?;
//! ```

pub mod audit;
pub mod config;
pub mod context_assembler;
pub mod error;
pub mod governance;
pub mod health;
pub mod logging;
pub mod metadata;
pub mod pipeline;
pub mod policy;
pub mod provider;
pub mod search;
pub mod stats;
pub mod tools;
pub mod transformer;

// Re-exports for convenience.
pub use audit::{AuditEvent, AuditTrail, StageCompletionOutcome, ToolOutcome};
pub use config::{CacheBackendKind, RuntimeConfig, TransformerMode};
pub use context_assembler::{ContextAssembler, ContextPack, ContextSnippet, Origin};
pub use error::{Error, Result, ViolationKind};
pub use governance::{
    CallTracker, CorpusRateTracker, GovernanceEnforcer, GovernanceSummary, PromptClass,
    TaskGovernanceState, TransformerDecision, TransformerMethod, ViolationLog, ViolationRecord,
};
pub use health::{HealthState, MemoryMonitor};
pub use logging::{init_logging, LogFormat};
pub use metadata::{
    AttributionRecord, ChangeLogEntry, MetadataBundle, SourceType, StageMetadata, TokenStats,
};
pub use pipeline::{PipelineDriver, PipelineOutput};
pub use policy::{Corpus, NamedPermission, PolicyCatalog, PunctuationPolicy, Stage, StagePermissions};
pub use provider::{GenerateParams, HttpProvider, Provider, ProviderInfo, ProviderOperation, TransformerOnlyProvider};
pub use search::{
    cache::{CacheBackend, InMemoryCache, NoOpCache, RemoteCache},
    PersonalConnector, PersonalFilters, PublishedConnector, PublishedFilters, SearchResult,
    SearchSnippet, SocialConnector, SocialFilters,
};
pub use stats::{PipelineStats, StageCounts, StageOutcome};
pub use tools::{InvocationContext, ToolSpec, ToolWrapper};
pub use transformer::DeterministicTransformer;
