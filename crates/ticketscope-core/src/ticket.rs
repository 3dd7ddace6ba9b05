//! Support ticket record as fetched from the source view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One support ticket.
///
/// `translated_body`, `preprocessed_body` and `product_label` are filled
/// progressively by the pipeline and are never part of the source row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preprocessed_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_label: Option<String>,
}

impl Ticket {
    /// Bare ticket with only an id and a body.
    pub fn new(ticket_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            created_at: None,
            region: None,
            body: body.into(),
            status: None,
            subject: None,
            product_context: None,
            translated_body: None,
            preprocessed_body: None,
            product_label: None,
        }
    }

    pub fn with_product_context(mut self, context: impl Into<String>) -> Self {
        self.product_context = Some(context.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Body the cleanser should work on: translation if present, raw body otherwise.
    pub fn cleaning_input(&self) -> &str {
        match self.translated_body.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => &self.body,
        }
    }
}
