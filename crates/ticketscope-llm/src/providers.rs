//! Chat completion against external LLM providers.
//!
//! OpenAI and Groq share one request format. Anthropic uses a different one
//! and takes the system prompt as a top-level field.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::LLMConfig;
use crate::types::{ChatMessage, CompletionOptions, LLMProvider};
use ticketscope_core::{Error, Result};

/// A single-shot chat completion. Implementations return the assistant text
/// or an error; they never retry.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], options: CompletionOptions) -> Result<String>;

    /// Identifier used in logs and run metadata.
    fn model(&self) -> String;
}

/// HTTP client for the configured provider.
pub struct HttpChatClient {
    client: Client,
    provider: LLMProvider,
    model: String,
    api_key: String,
}

impl HttpChatClient {
    pub fn new(provider: LLMProvider, model: String, api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            client,
            provider,
            model,
            api_key,
        })
    }

    /// Build a client for the resolved provider, or `None` when no key is set.
    pub fn from_config(config: &LLMConfig, timeout: Duration) -> Result<Option<Self>> {
        match config.resolve_provider() {
            Some((provider, model, key)) => Ok(Some(Self::new(provider, model, key, timeout)?)),
            None => Ok(None),
        }
    }

    async fn post(&self, request: reqwest::RequestBuilder, body: &Value) -> Result<Value> {
        let response = request
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Http(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Http(format!("API error {}: {}", status, body)));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| Error::Parse(format!("Invalid response body: {}", e)))
    }
}

#[async_trait]
impl ChatCompletion for HttpChatClient {
    async fn complete(&self, messages: &[ChatMessage], options: CompletionOptions) -> Result<String> {
        debug!(
            "Completion via {} with model {} ({} messages)",
            self.provider,
            self.model,
            messages.len()
        );
        match self.provider {
            LLMProvider::OpenAI | LLMProvider::Groq => {
                let body = openai_body(&self.model, messages, options);
                let request = self
                    .client
                    .post(self.provider.endpoint())
                    .header("Authorization", format!("Bearer {}", self.api_key));
                let response = self.post(request, &body).await?;
                parse_openai_response(&response)
            }
            LLMProvider::Anthropic => {
                let body = anthropic_body(&self.model, messages, options);
                let request = self
                    .client
                    .post(self.provider.endpoint())
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", "2023-06-01");
                let response = self.post(request, &body).await?;
                parse_anthropic_response(&response)
            }
        }
    }

    fn model(&self) -> String {
        format!("{}/{}", self.provider, self.model)
    }
}

fn openai_body(model: &str, messages: &[ChatMessage], options: CompletionOptions) -> Value {
    let msgs: Vec<Value> = messages
        .iter()
        .map(|m| json!({"role": m.role, "content": m.content}))
        .collect();
    json!({
        "model": model,
        "messages": msgs,
        "temperature": options.temperature,
        "max_tokens": options.max_tokens,
    })
}

fn anthropic_body(model: &str, messages: &[ChatMessage], options: CompletionOptions) -> Value {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == "system")
        .map(|m| m.content.as_str())
        .collect();
    let conv: Vec<Value> = messages
        .iter()
        .filter(|m| m.role != "system")
        .map(|m| json!({"role": m.role, "content": m.content}))
        .collect();

    let mut body = json!({
        "model": model,
        "messages": conv,
        "temperature": options.temperature,
        "max_tokens": options.max_tokens,
    });
    if !system.is_empty() {
        body["system"] = json!(system.join("\n\n"));
    }
    body
}

/// Extract the assistant text. Filtered or empty completions are errors so
/// callers take their fallback path.
pub fn parse_openai_response(response: &Value) -> Result<String> {
    let choice = &response["choices"][0];
    if choice["finish_reason"].as_str() == Some("content_filter") {
        return Err(Error::Http("Completion blocked by content filter".into()));
    }
    non_empty(choice["message"]["content"].as_str())
}

pub fn parse_anthropic_response(response: &Value) -> Result<String> {
    if response["type"].as_str() == Some("error") {
        let msg = response["error"]["message"].as_str().unwrap_or("Unknown error");
        return Err(Error::Http(format!("Anthropic error: {}", msg)));
    }
    let text: String = response["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|b| b["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();
    non_empty(Some(text.as_str()))
}

fn non_empty(text: Option<&str>) -> Result<String> {
    match text.map(str::trim) {
        Some(t) if !t.is_empty() => Ok(t.to_string()),
        _ => Err(Error::Parse("Empty completion".into())),
    }
}
