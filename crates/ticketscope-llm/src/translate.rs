//! Machine translation client (DeepL-compatible HTTP API).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::LLMConfig;
use ticketscope_core::{Error, Result};

#[async_trait]
pub trait TranslationService: Send + Sync {
    /// Translate `text` into `target_lang` (e.g. `EN-US`).
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String>;
}

pub struct DeepLClient {
    client: Client,
    url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct DeepLResponse {
    translations: Vec<DeepLTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeepLTranslation {
    #[serde(default)]
    detected_source_language: Option<String>,
    text: String,
}

impl DeepLClient {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
        })
    }

    /// `None` when no translation key is configured.
    pub fn from_config(config: &LLMConfig, timeout: Duration) -> Result<Option<Self>> {
        match &config.deepl_api_key {
            Some(key) => Ok(Some(Self::new(config.deepl_url.clone(), key.clone(), timeout)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl TranslationService for DeepLClient {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .json(&json!({"text": [text], "target_lang": target_lang}))
            .send()
            .await
            .map_err(|e| Error::Http(format!("Translation request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Http(format!("Translation API error {}: {}", status, body)));
        }
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        parse_deepl_response(&body)
    }
}

fn parse_deepl_response(body: &str) -> Result<String> {
    let parsed: DeepLResponse =
        serde_json::from_str(body).map_err(|e| Error::Parse(format!("Translation response: {}", e)))?;
    let first = parsed
        .translations
        .into_iter()
        .next()
        .ok_or_else(|| Error::Parse("Translation response had no translations".into()))?;
    if let Some(lang) = &first.detected_source_language {
        debug!("Translated from {}", lang);
    }
    Ok(first.text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_deepl_response() {
        let body = r#"{"translations":[{"detected_source_language":"DE","text":"Hello"}]}"#;
        assert_eq!(parse_deepl_response(body).unwrap(), "Hello");
        assert!(parse_deepl_response(r#"{"translations":[]}"#).is_err());
        assert!(parse_deepl_response("<html>").is_err());
    }

    #[test]
    fn test_disabled_without_key() {
        let config = LLMConfig::default();
        assert!(DeepLClient::from_config(&config, Duration::from_secs(5))
            .unwrap()
            .is_none());
    }
}
