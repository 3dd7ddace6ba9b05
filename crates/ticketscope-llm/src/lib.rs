//! Remote adapters for the pipeline's external services.
//!
//! Chat completion backs both ticket cleaning and topic labeling; the
//! translation client normalizes ticket bodies to one language. Callers
//! hold these behind the [`ChatCompletion`] and [`TranslationService`]
//! traits so tests can substitute counting mocks.

pub mod config;
pub mod providers;
pub mod translate;
pub mod types;

pub use config::LLMConfig;
pub use providers::{ChatCompletion, HttpChatClient};
pub use translate::{DeepLClient, TranslationService};
pub use types::*;
