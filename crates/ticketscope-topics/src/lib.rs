//! Topic runs over a ticket set.
//!
//! [`TopicModelRunner`] turns tickets into a corpus and a fitted topic
//! model; [`TopicLabeler`] names each topic, retrying the chat model with
//! exponential backoff and falling back to keywords.

pub mod corpus;
pub mod labeler;
pub mod runner;
pub mod types;

pub use corpus::{modeling_text, Corpus};
pub use labeler::{TopicLabeler, UNCLUSTERED_LABEL};
pub use runner::TopicModelRunner;
pub use types::*;
