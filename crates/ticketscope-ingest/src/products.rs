//! Rule-based product labels and per-product grouping.

use std::collections::BTreeMap;

use tracing::info;

use ticketscope_core::Ticket;

/// Label for tickets no rule matches.
pub const UNCLEAR_PRODUCT: &str = "Unclear Product";

/// Ordered `(substring, label)` rules. First match wins, so more specific
/// substrings come before generic ones. A substring only matches when it
/// is not glued to further letters, see [`rule_matches`].
const PRODUCT_RULES: &[(&str, &str)] = &[
    ("ai_plugin", "IllustratorPlugin"),
    ("illustrator", "IllustratorPlugin"),
    ("ps_plugin", "PhotoshopPlugin"),
    ("photoshop", "PhotoshopPlugin"),
    ("id_plugin", "InDesignPlugin"),
    ("indesign", "InDesignPlugin"),
    ("figma", "FigmaPlugin"),
    ("sketch", "SketchPlugin"),
    ("office", "OfficeAddIn"),
    ("word", "OfficeAddIn"),
    ("desktop", "DesktopApp"),
    ("macos", "DesktopApp"),
    ("mac", "DesktopApp"),
    ("windows", "DesktopApp"),
    ("web", "WebApp"),
    ("browser", "WebApp"),
    ("ios", "MobileApp"),
    ("android", "MobileApp"),
    ("mobile", "MobileApp"),
    ("api", "API"),
    ("license", "Licensing"),
    ("licensing", "Licensing"),
    ("billing", "Billing"),
];

/// Case-insensitive substring match (`haystack` already lowercased) whose
/// neighbours are not letters: `word` matches `Word_AddIn` but not
/// `password`, `ai_plugin` matches `AI_Plugin_v2`.
pub fn rule_matches(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphabetic) && !after.is_some_and(char::is_alphabetic)
    })
}

pub struct ProductGrouper {
    min_group_size: usize,
}

impl ProductGrouper {
    pub fn new(min_group_size: usize) -> Self {
        Self { min_group_size }
    }

    /// Label derived from a product-context hint.
    pub fn label_for(context: Option<&str>) -> &'static str {
        let Some(context) = context else {
            return UNCLEAR_PRODUCT;
        };
        let lower = context.to_lowercase();
        PRODUCT_RULES
            .iter()
            .find(|(needle, _)| rule_matches(&lower, needle))
            .map(|(_, label)| *label)
            .unwrap_or(UNCLEAR_PRODUCT)
    }

    /// Set `product_label` on every ticket.
    pub fn assign_labels(tickets: &mut [Ticket]) {
        for ticket in tickets.iter_mut() {
            ticket.product_label = Some(Self::label_for(ticket.product_context.as_deref()).to_string());
        }
    }

    /// Partition labeled tickets by product, dropping groups below the
    /// minimum size. Keys are sorted, so group order is stable across runs.
    pub fn group(&self, tickets: Vec<Ticket>) -> BTreeMap<String, Vec<Ticket>> {
        let mut groups: BTreeMap<String, Vec<Ticket>> = BTreeMap::new();
        for mut ticket in tickets {
            let label = match &ticket.product_label {
                Some(l) => l.clone(),
                None => {
                    let l = Self::label_for(ticket.product_context.as_deref()).to_string();
                    ticket.product_label = Some(l.clone());
                    l
                }
            };
            groups.entry(label).or_default().push(ticket);
        }

        let before = groups.len();
        groups.retain(|label, members| {
            let keep = members.len() >= self.min_group_size;
            if !keep {
                info!(
                    "Dropping product group {} ({} < {} tickets)",
                    label,
                    members.len(),
                    self.min_group_size
                );
            }
            keep
        });
        info!("Product groups: {} of {} kept", groups.len(), before);
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_rules() {
        assert_eq!(ProductGrouper::label_for(Some("AI_Plugin_v2")), "IllustratorPlugin");
        assert_eq!(ProductGrouper::label_for(Some("nothing_matching")), UNCLEAR_PRODUCT);
        assert_eq!(ProductGrouper::label_for(None), UNCLEAR_PRODUCT);
        // First match wins.
        assert_eq!(ProductGrouper::label_for(Some("Photoshop web")), "PhotoshopPlugin");
    }

    #[test]
    fn test_rules_do_not_fire_inside_words() {
        assert_eq!(ProductGrouper::label_for(Some("password reset")), UNCLEAR_PRODUCT);
        assert_eq!(ProductGrouper::label_for(Some("machine_learning")), UNCLEAR_PRODUCT);
        assert_eq!(ProductGrouper::label_for(Some("rapid export")), UNCLEAR_PRODUCT);
        assert_eq!(ProductGrouper::label_for(Some("BIOS update")), UNCLEAR_PRODUCT);

        assert_eq!(ProductGrouper::label_for(Some("Word_AddIn")), "OfficeAddIn");
        assert_eq!(ProductGrouper::label_for(Some("macOS 14")), "DesktopApp");
        assert_eq!(ProductGrouper::label_for(Some("Windows10")), "DesktopApp");
        assert_eq!(ProductGrouper::label_for(Some("public API v3")), "API");
    }

    #[test]
    fn test_small_groups_dropped_not_merged() {
        let mut tickets = Vec::new();
        for i in 0..3 {
            tickets.push(Ticket::new(format!("ai-{}", i), "x").with_product_context("AI_Plugin_v2"));
        }
        for i in 0..6 {
            tickets.push(Ticket::new(format!("ps-{}", i), "x").with_product_context("photoshop 2024"));
        }

        let groups = ProductGrouper::new(5).group(tickets);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups["PhotoshopPlugin"].len(), 6);
        assert!(!groups.contains_key("IllustratorPlugin"));
        assert!(!groups.contains_key(UNCLEAR_PRODUCT));
    }

    #[test]
    fn test_assign_labels() {
        let mut tickets = vec![Ticket::new("1", "x").with_product_context("Figma sync")];
        ProductGrouper::assign_labels(&mut tickets);
        assert_eq!(tickets[0].product_label.as_deref(), Some("FigmaPlugin"));
    }
}
