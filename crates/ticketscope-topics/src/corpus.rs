//! Corpus construction from processed tickets.

use ticketscope_core::Ticket;

/// Text a ticket contributes to the corpus: the first non-blank of
/// preprocessed body, translated body and raw body.
pub fn modeling_text(ticket: &Ticket) -> Option<&str> {
    [
        ticket.preprocessed_body.as_deref(),
        ticket.translated_body.as_deref(),
        Some(ticket.body.as_str()),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|t| !t.is_empty())
}

/// Modeling texts plus, for each, the index of its ticket in the input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Corpus {
    pub docs: Vec<String>,
    pub ticket_indices: Vec<usize>,
}

impl Corpus {
    /// Tickets without any text are left out.
    pub fn build(tickets: &[Ticket]) -> Self {
        let mut corpus = Corpus::default();
        for (i, ticket) in tickets.iter().enumerate() {
            if let Some(text) = modeling_text(ticket) {
                corpus.docs.push(text.to_string());
                corpus.ticket_indices.push(i);
            }
        }
        corpus
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}
