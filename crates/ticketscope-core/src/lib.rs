//! ticketscope core: ticket model, configuration, errors, fallback outcomes.

pub mod config;
pub mod error;
pub mod outcome;
pub mod params;
pub mod ticket;

pub use config::{DataPaths, PipelineConfig};
pub use error::{Error, Result};
pub use outcome::Outcome;
pub use params::{ClusterParams, ModelParams, ReductionParams, OUTLIER_TOPIC};
pub use ticket::Ticket;
