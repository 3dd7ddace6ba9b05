//! Runtime orchestrator: runs the ticket pipeline end to end.
//!
//! [`Pipeline`] fetches (through the raw snapshot), translates, cleans,
//! optionally partitions by product, models and labels each group, then
//! hands every run to the single [`ResultWriter`] and the
//! [`ArtifactWriter`].

pub mod artifacts;
pub mod orchestrator;
pub mod types;
pub mod writer;

pub use artifacts::ArtifactWriter;
pub use orchestrator::{Pipeline, Services};
pub use types::*;
pub use writer::{ResultWriter, WriterTask};
