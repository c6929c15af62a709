//! Transformer-only [`Provider`] implementation (§4.7): `revise` and
//! `summarize` both invoke the deterministic transformer (C7) and never make
//! an external call. `generate` has no transformer-based equivalent and is
//! unsupported here — stages requiring open-ended generation must use
//! [`super::HttpProvider`] instead.

use super::types::{GenerateParams, ProviderInfo, ProviderOperation};
use super::Provider;
use crate::error::{Error, Result};
use crate::transformer::DeterministicTransformer;
use async_trait::async_trait;
use std::sync::Arc;

pub struct TransformerOnlyProvider {
    transformer: Arc<DeterministicTransformer>,
}

impl TransformerOnlyProvider {
    pub fn new(transformer: Arc<DeterministicTransformer>) -> Self {
        Self { transformer }
    }
}

#[async_trait]
impl Provider for TransformerOnlyProvider {
    async fn generate(&self, _prompt: &str, _params: &GenerateParams) -> Result<(String, ProviderInfo)> {
        Err(Error::provider_error(
            "transformer_only",
            "generate is not supported by the transformer-only provider",
        ))
    }

    async fn revise(&self, text: &str, _metadata: Option<&serde_json::Value>) -> Result<(String, ProviderInfo)> {
        let (out, applied) = self.transformer.apply(text);
        let info = ProviderInfo::new("transformer_only", "punctuation_only", ProviderOperation::Revise)
            .with_applied_rules(applied);
        Ok((out, info))
    }

    async fn summarize(&self, text: &str, _metadata: Option<&serde_json::Value>) -> Result<(String, ProviderInfo)> {
        let (out, applied) = self.transformer.apply(text);
        let info = ProviderInfo::new("transformer_only", "punctuation_only", ProviderOperation::Summarize)
            .with_applied_rules(applied);
        Ok((out, info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PunctuationPolicy;

    fn provider() -> TransformerOnlyProvider {
        TransformerOnlyProvider::new(Arc::new(DeterministicTransformer::new(PunctuationPolicy::default())))
    }

    #[tokio::test]
    async fn revise_applies_the_deterministic_transformer() {
        let (out, info) = provider().revise("Wow!!!", None).await.unwrap();
        assert_eq!(out, "Wow!");
        assert!(info.applied_rules.contains(&"collapse_repeated_terminators".to_string()));
    }

    #[tokio::test]
    async fn summarize_applies_the_deterministic_transformer() {
        let (out, _) = provider().summarize("Hello\u{2026}", None).await.unwrap();
        assert_eq!(out, "Hello...");
    }

    #[tokio::test]
    async fn generate_is_unsupported() {
        assert!(provider().generate("x", &GenerateParams::default()).await.is_err());
    }
}
