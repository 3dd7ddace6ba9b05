//! Class-based TF-IDF keyword ranking.
//!
//! All documents of one topic are treated as a single class document. The
//! weight of term `t` in class `c` is `tf(t, c) / |c| * ln(1 + A / f(t))`,
//! where `A` is the average class length in words and `f(t)` the frequency
//! of `t` across all classes.

use std::collections::{BTreeMap, HashMap, HashSet};

use once_cell::sync::Lazy;

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
        "one", "our", "out", "has", "have", "him", "his", "how", "its", "may", "new", "now", "old",
        "see", "two", "way", "who", "did", "get", "got", "let", "say", "she", "too", "use", "this",
        "that", "with", "from", "they", "will", "would", "there", "their", "what", "about", "which",
        "when", "make", "like", "time", "just", "know", "take", "into", "your", "some", "could",
        "them", "than", "then", "look", "only", "come", "over", "also", "back", "after", "work",
        "first", "well", "even", "want", "because", "these", "give", "most", "been", "were", "being",
        "does", "doing", "here", "where", "why", "while", "should", "very", "more", "each", "other",
        "such", "same", "both", "few", "own", "again", "further", "once", "during", "before", "under",
        "above", "below", "between", "through", "until", "off", "down", "upon", "still", "please",
        "thanks", "thank", "hello", "dear", "regards", "team", "hi", "issue", "problem", "help",
        "able", "need", "using", "used", "trying", "tried", "try", "keep", "keeps", "cannot", "can't",
        "don't", "doesn't", "isn't", "i'm", "it's", "we're", "i've", "redacted",
    ]
    .into_iter()
    .collect()
});

/// Lowercased word tokens worth ranking: alphabetic, at least three
/// characters, not a stop word.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '_'))
        .map(|t| t.trim_matches('\''))
        .filter(|t| t.chars().count() >= 3)
        .filter(|t| t.chars().any(|c| c.is_alphabetic()))
        .filter(|t| !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Top `top_n` keywords with weights for every class in `labels`.
/// Classes are keyed by label; keyword ties break alphabetically.
pub fn rank_keywords(docs: &[String], labels: &[i64], top_n: usize) -> BTreeMap<i64, Vec<(String, f64)>> {
    let mut class_tf: BTreeMap<i64, HashMap<String, usize>> = BTreeMap::new();
    for (doc, &label) in docs.iter().zip(labels) {
        let tf = class_tf.entry(label).or_default();
        for token in tokenize(doc) {
            *tf.entry(token).or_default() += 1;
        }
    }

    let mut global: HashMap<&str, usize> = HashMap::new();
    let mut total_words = 0usize;
    for tf in class_tf.values() {
        for (term, count) in tf {
            *global.entry(term.as_str()).or_default() += count;
            total_words += count;
        }
    }
    let avg_words = total_words as f64 / class_tf.len().max(1) as f64;

    class_tf
        .iter()
        .map(|(&label, tf)| {
            let class_words: usize = tf.values().sum();
            let mut scored: Vec<(String, f64)> = tf
                .iter()
                .map(|(term, &count)| {
                    let f_t = global.get(term.as_str()).copied().unwrap_or(1) as f64;
                    let weight = (count as f64 / class_words.max(1) as f64) * (1.0 + avg_words / f_t).ln();
                    (term.clone(), weight)
                })
                .collect();
            scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            scored.truncate(top_n);
            (label, scored)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_stop_words_and_short_tokens() {
        assert_eq!(
            tokenize("Hi, the License key won't activate on v2!"),
            vec!["license", "key", "won't", "activate"]
        );
    }

    #[test]
    fn test_distinctive_terms_rank_first() {
        let docs: Vec<String> = [
            "license activation failed",
            "license activation error",
            "export pdf crash",
            "export pdf blank page",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let ranked = rank_keywords(&docs, &[0, 0, 1, 1], 2);

        let top0: Vec<&str> = ranked[&0].iter().map(|(w, _)| w.as_str()).collect();
        let top1: Vec<&str> = ranked[&1].iter().map(|(w, _)| w.as_str()).collect();
        assert_eq!(top0, vec!["activation", "license"]);
        assert_eq!(top1, vec!["export", "pdf"]);
    }
}
