//! ticketscope store: result tables, ticket cache, raw snapshot, source reader.

pub mod migrate;
pub mod raw_cache;
pub mod results;
pub mod schema;
pub mod source;
pub mod sqlite;
pub mod ticket_cache;
pub mod types;

pub use raw_cache::{RawFetchCache, RawSnapshot};
pub use results::ResultStore;
pub use source::{SqliteTicketSource, TicketSource, SOURCE_COLUMNS};
pub use ticket_cache::{TicketCache, TicketLock};
pub use types::*;
