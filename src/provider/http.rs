//! Reference [`Provider`](super::Provider) implementation: a chat-completions
//! HTTP endpoint (§6 "Provider endpoint"), with a fixed system prompt per
//! operation and a temperature of 0.3.

use super::types::{GenerateParams, ProviderInfo, ProviderOperation};
use super::Provider;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

const TEMPERATURE: f64 = 0.3;

const GENERATE_SYSTEM_PROMPT: &str =
    "You are a careful writing assistant. Produce a faithful, well-organized draft from the given prompt and context. Do not invent facts not present in the supplied context.";
const REVISE_SYSTEM_PROMPT: &str =
    "Rewrite the following text for clarity and flow. Preserve its meaning exactly; do not add or remove facts.";
const SUMMARIZE_SYSTEM_PROMPT: &str =
    "Produce a faithful, compressed summary of the following text. Preserve all material facts; do not add claims that are not present in the source.";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

fn build_http_client(timeout: Duration) -> Client {
    // Some sandboxed environments panic during proxy auto-detection in
    // reqwest's default client builder; fall back to no-proxy in that case.
    match catch_unwind(AssertUnwindSafe(|| Client::builder().timeout(timeout).build())) {
        Ok(Ok(client)) => client,
        Ok(Err(_)) | Err(_) => Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client"),
    }
}

/// Calls a remote chat-completions endpoint configured with a base URL,
/// bearer key, and model name (§6).
pub struct HttpProvider {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: build_http_client(timeout),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    async fn chat(&self, system_prompt: &str, content: &str, operation: ProviderOperation) -> Result<(String, ProviderInfo)> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: content.to_string(),
                },
            ],
            temperature: TEMPERATURE,
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::provider_error("http", format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider_error(
                "http",
                format!("non-2xx response ({status}): {body}"),
            ));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::provider_error("http", format!("schema mismatch: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::provider_error("http", "empty choices array"))?;

        Ok((text, ProviderInfo::new("http", self.model.clone(), operation)))
    }
}

#[async_trait]
impl Provider for HttpProvider {
    async fn generate(&self, prompt: &str, params: &GenerateParams) -> Result<(String, ProviderInfo)> {
        let content = match &params.context {
            Some(ctx) if !ctx.is_empty() => format!("Context:\n{ctx}\n\nPrompt:\n{prompt}"),
            _ => prompt.to_string(),
        };
        self.chat(GENERATE_SYSTEM_PROMPT, &content, ProviderOperation::Generate).await
    }

    async fn revise(&self, text: &str, _metadata: Option<&serde_json::Value>) -> Result<(String, ProviderInfo)> {
        self.chat(REVISE_SYSTEM_PROMPT, text, ProviderOperation::Revise).await
    }

    async fn summarize(&self, text: &str, _metadata: Option<&serde_json::Value>) -> Result<(String, ProviderInfo)> {
        self.chat(SUMMARIZE_SYSTEM_PROMPT, text, ProviderOperation::Summarize).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn generate_against_an_unreachable_endpoint_surfaces_a_provider_error() {
        let provider = HttpProvider::new(
            "https://127.0.0.1:1",
            "key",
            "model-x",
            Duration::from_millis(200),
        );
        let err = provider
            .generate("hello", &GenerateParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProviderError { .. }));
    }
}
