//! Topic labeling with bounded retry and a keyword fallback.
//!
//! Every topic ends up with a non-empty label. The chat model is tried up
//! to `max_attempts` times with exponential backoff between attempts; if
//! all attempts fail, the label is built from the topic's top keywords.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::types::TopicLabel;
use ticketscope_core::{Error, Outcome, Result, OUTLIER_TOPIC};
use ticketscope_llm::{ChatCompletion, ChatMessage, CompletionOptions};

/// Label of the outlier topic. Assigned locally, never requested.
pub const UNCLUSTERED_LABEL: &str = "Unclustered";

const SNIPPET_CHARS: usize = 300;
const FALLBACK_KEYWORDS: usize = 3;

const SYSTEM_PROMPT: &str = "You name clusters of customer support tickets. \
Reply with a JSON object {\"label\": \"...\", \"description\": \"...\"}. \
The label is at most five words; the description is one sentence.";

pub struct TopicLabeler {
    chat: Option<Arc<dyn ChatCompletion>>,
    max_attempts: u32,
    base_delay: Duration,
    keyword_count: usize,
    snippet_count: usize,
}

#[derive(Deserialize)]
struct LabelReply {
    label: String,
    #[serde(default)]
    description: Option<String>,
}

impl TopicLabeler {
    /// `chat = None` labels every topic from its keywords.
    pub fn new(chat: Option<Arc<dyn ChatCompletion>>) -> Self {
        Self {
            chat,
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            keyword_count: 12,
            snippet_count: 10,
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_prompt_sizes(mut self, keywords: usize, snippets: usize) -> Self {
        self.keyword_count = keywords;
        self.snippet_count = snippets;
        self
    }

    /// Label one topic. Never fails; inspect the outcome for the path taken.
    pub async fn label(&self, topic_id: i64, keywords: &[String], snippets: &[&str]) -> Outcome<TopicLabel> {
        if topic_id == OUTLIER_TOPIC {
            return Outcome::fallback(
                TopicLabel {
                    label: UNCLUSTERED_LABEL.into(),
                    description: "Documents not assigned to any topic".into(),
                },
                "outlier topic",
            );
        }
        let Some(chat) = &self.chat else {
            return Outcome::fallback(keyword_label(topic_id, keywords), "labeling disabled");
        };

        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(self.prompt(keywords, snippets)),
        ];
        let options = CompletionOptions {
            temperature: 0.2,
            max_tokens: 256,
        };

        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            let result = match chat.complete(&messages, options).await {
                Ok(text) => parse_label(&text),
                Err(e) => Err(e),
            };
            match result {
                Ok(label) => {
                    debug!("Topic {} labeled on attempt {}: {}", topic_id, attempt, label.label);
                    return Outcome::Remote(label);
                }
                Err(e) => {
                    warn!(
                        "Labeling topic {} failed (attempt {}/{}): {}",
                        topic_id, attempt, self.max_attempts, e
                    );
                    last_error = e.to_string();
                    if attempt < self.max_attempts {
                        tokio::time::sleep(backoff_delay(self.base_delay, attempt)).await;
                    }
                }
            }
        }

        Outcome::fallback(keyword_label(topic_id, keywords), last_error)
    }

    fn prompt(&self, keywords: &[String], snippets: &[&str]) -> String {
        let keywords: Vec<&str> = keywords
            .iter()
            .take(self.keyword_count)
            .map(String::as_str)
            .collect();
        let mut prompt = format!("Keywords: {}\n\nExample tickets:\n", keywords.join(", "));
        for snippet in snippets.iter().take(self.snippet_count) {
            let snippet: String = snippet.chars().take(SNIPPET_CHARS).collect();
            prompt.push_str("- ");
            prompt.push_str(&snippet.replace('\n', " "));
            prompt.push('\n');
        }
        prompt
    }
}

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt - 1)`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
}

/// Label from the top keywords, for when the model is unavailable.
pub fn keyword_label(topic_id: i64, keywords: &[String]) -> TopicLabel {
    if keywords.is_empty() {
        return TopicLabel {
            label: format!("Topic {}", topic_id),
            description: String::new(),
        };
    }
    let top: Vec<&str> = keywords
        .iter()
        .take(FALLBACK_KEYWORDS)
        .map(String::as_str)
        .collect();
    TopicLabel {
        label: top.join("/"),
        description: format!("Keywords: {}", keywords.join(", ")),
    }
}

/// Parse `{label, description}` from a reply that may wrap the JSON in a
/// code fence or surrounding prose.
pub fn parse_label(text: &str) -> Result<TopicLabel> {
    let start = text.find('{');
    let end = text.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &text[s..=e],
        _ => return Err(Error::Parse(format!("No JSON object in reply: {}", text.trim()))),
    };
    let reply: LabelReply =
        serde_json::from_str(json).map_err(|e| Error::Parse(format!("Invalid label JSON: {}", e)))?;
    let label = reply.label.trim();
    if label.is_empty() {
        return Err(Error::Parse("Empty label".into()));
    }
    Ok(TopicLabel {
        label: label.to_string(),
        description: reply.description.unwrap_or_default().trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Replays scripted replies; `None` is a transport error.
    struct ScriptedChat {
        replies: Mutex<Vec<Option<&'static str>>>,
        calls: AtomicUsize,
    }

    impl ScriptedChat {
        fn new(mut replies: Vec<Option<&'static str>>) -> Arc<Self> {
            replies.reverse();
            Arc::new(Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ChatCompletion for ScriptedChat {
        async fn complete(&self, _messages: &[ChatMessage], options: CompletionOptions) -> Result<String> {
            assert_eq!(options.temperature, 0.2);
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.replies.lock().pop().flatten() {
                Some(reply) => Ok(reply.to_string()),
                None => Err(Error::Http("429 Too Many Requests".into())),
            }
        }

        fn model(&self) -> String {
            "scripted".into()
        }
    }

    fn keywords() -> Vec<String> {
        ["license", "activation", "serial", "offline"].iter().map(|s| s.to_string()).collect()
    }

    fn labeler(chat: Arc<ScriptedChat>) -> TopicLabeler {
        TopicLabeler::new(Some(chat)).with_base_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_exhaustion_falls_back_to_keywords() {
        let chat = ScriptedChat::new(vec![None, None, None]);
        let outcome = labeler(chat.clone()).label(0, &keywords(), &["cannot activate"]).await;

        assert_eq!(chat.calls.load(Ordering::SeqCst), 3);
        assert!(outcome.is_fallback());
        assert_eq!(outcome.value().label, "license/activation/serial");
        assert!(outcome.value().description.contains("offline"));
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let chat = ScriptedChat::new(vec![
            None,
            Some("I think this is it:\n```json\n{\"label\": \"Licensing\", \"description\": \"Activation problems.\"}\n```"),
        ]);
        let outcome = labeler(chat.clone()).label(1, &keywords(), &[]).await;
        assert_eq!(chat.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            outcome,
            Outcome::Remote(TopicLabel {
                label: "Licensing".into(),
                description: "Activation problems.".into()
            })
        );
    }

    #[tokio::test]
    async fn test_unparseable_reply_is_retried() {
        let chat = ScriptedChat::new(vec![Some("no json here"), Some("{\"label\": \"  \"}"), Some("{\"label\": \"Sync\"}")]);
        let outcome = labeler(chat.clone()).label(2, &keywords(), &[]).await;
        assert_eq!(chat.calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.value().label, "Sync");
    }

    #[tokio::test]
    async fn test_outlier_and_disabled_never_call_model() {
        let chat = ScriptedChat::new(vec![]);
        let outcome = labeler(chat.clone()).label(OUTLIER_TOPIC, &keywords(), &[]).await;
        assert_eq!(outcome.value().label, UNCLUSTERED_LABEL);
        assert_eq!(chat.calls.load(Ordering::SeqCst), 0);

        let disabled = TopicLabeler::new(None).label(3, &[], &[]).await;
        assert_eq!(disabled.value().label, "Topic 3");
        assert_eq!(disabled.fallback_reason(), Some("labeling disabled"));
    }

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(2000));
    }

    #[test]
    fn test_prompt_truncates_snippets() {
        let long = "x".repeat(1000);
        let prompt = TopicLabeler::new(None).with_prompt_sizes(2, 1).prompt(&keywords(), &[&long, "second"]);
        assert!(prompt.starts_with("Keywords: license, activation\n"));
        assert!(!prompt.contains("second"));
        assert!(prompt.contains(&"x".repeat(300)));
        assert!(!prompt.contains(&"x".repeat(301)));
    }
}
