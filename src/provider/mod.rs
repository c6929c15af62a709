//! Provider Contract (C8): an abstraction over an external text generator,
//! plus a transformer-only implementation that never leaves the process.

pub mod http;
pub mod transformer_only;
pub mod types;

pub use http::HttpProvider;
pub use transformer_only::TransformerOnlyProvider;
pub use types::{GenerateParams, ProviderInfo, ProviderOperation};

use crate::error::Result;
use async_trait::async_trait;

/// `Provider` interface with three async operations, each returning
/// `(text, info)`. One implementation calls a remote chat-completions
/// endpoint; a second is transformer-only, for stages that must run without
/// any external call (§4.7).
#[async_trait]
pub trait Provider: Send + Sync {
    /// Open-ended generation from a prompt.
    async fn generate(&self, prompt: &str, params: &GenerateParams) -> Result<(String, ProviderInfo)>;

    /// Rewrite `text` for clarity without semantic change.
    async fn revise(&self, text: &str, metadata: Option<&serde_json::Value>) -> Result<(String, ProviderInfo)>;

    /// Faithfully compress `text`.
    async fn summarize(&self, text: &str, metadata: Option<&serde_json::Value>) -> Result<(String, ProviderInfo)>;
}
