//! ticketscope ingest: per-ticket text normalization and product grouping.
//!
//! Translation and cleaning share the [`ticketscope_store::TicketCache`] and
//! never fail a run: every remote error degrades to a deterministic value
//! reported as [`ticketscope_core::Outcome::Fallback`].

pub mod cleanser;
pub mod products;
pub mod rules;
mod stage;
pub mod translator;

pub use cleanser::Cleanser;
pub use products::{ProductGrouper, UNCLEAR_PRODUCT};
pub use rules::{deterministic_clean, TokenStripper, REDACTED};
pub use stage::StageReport;
pub use translator::Translator;
