//! Deterministic ticket cleaning and configurable token stripping.

use once_cell::sync::Lazy;
use regex::Regex;

/// Replacement for URLs and email addresses.
pub const REDACTED: &str = "[REDACTED]";

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").unwrap());
static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(?:nbsp|amp|lt|gt|quot|#\d+);").unwrap());
static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\b(?:https?://|www\.)[^\s<>"']+"#).unwrap());
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap());
static CREDENTIAL_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^[^\n]*\b(?:password|passwd|pwd|passcode|api[ _-]?key|secret|access[ _-]?token|serial(?: number)?|license key)\b\s*[:=][^\n]*$",
    )
    .unwrap()
});
static EMOJI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\x{1F000}-\x{1FAFF}\x{2600}-\x{27BF}\x{2B00}-\x{2BFF}\x{FE0F}\x{200D}]").unwrap()
});
static GREETING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^\s*(?:hi|hello|hey|dear|greetings|good (?:morning|afternoon|evening))(?:\s+[\w.]+){0,2}\s*[,!:]",
    )
    .unwrap()
});
static SIGNOFF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^\s*(?:thanks(?: in advance)?|thank you(?: in advance)?|many thanks|regards|best regards|kind regards|best|cheers|sincerely)\s*[,!.]?[ \t]*$",
    )
    .unwrap()
});
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Rule-based cleaning used when the cleaning model is unavailable or fails.
///
/// Steps, in order: markup, URLs and emails, credential lines, emoji,
/// greeting and sign-off boilerplate, whitespace.
pub fn deterministic_clean(text: &str) -> String {
    let text = TAG_RE.replace_all(text, " ");
    let text = ENTITY_RE.replace_all(&text, " ");
    // URLs first: an address inside a URL must not be redacted twice.
    let text = URL_RE.replace_all(&text, REDACTED);
    let text = EMAIL_RE.replace_all(&text, REDACTED);
    let text = CREDENTIAL_LINE_RE.replace_all(&text, "");
    let text = EMOJI_RE.replace_all(&text, "");
    let text = GREETING_RE.replace_all(&text, "");
    let text = cut_signoff(&text);
    collapse_whitespace(&text)
}

/// Drop everything from the first sign-off line onwards, unless the sign-off
/// is the whole message.
fn cut_signoff(text: &str) -> &str {
    match SIGNOFF_RE.find(text) {
        Some(m) if !text[..m.start()].trim().is_empty() => &text[..m.start()],
        _ => text,
    }
}

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text, " ").trim().to_string()
}

/// Removes configured tokens, case-insensitively, with one compiled pattern.
#[derive(Debug, Clone)]
pub struct TokenStripper {
    pattern: Option<Regex>,
}

impl TokenStripper {
    pub fn new<S: AsRef<str>>(tokens: &[S]) -> Self {
        let alternatives: Vec<String> = tokens
            .iter()
            .map(|t| t.as_ref().trim())
            .filter(|t| !t.is_empty())
            .map(regex::escape)
            .collect();
        let pattern = if alternatives.is_empty() {
            None
        } else {
            Regex::new(&format!("(?i)(?:{})", alternatives.join("|"))).ok()
        };
        Self { pattern }
    }

    pub fn strip(&self, text: &str) -> String {
        match &self.pattern {
            Some(re) => collapse_whitespace(&re.replace_all(text, " ")),
            None => text.to_string(),
        }
    }
}
