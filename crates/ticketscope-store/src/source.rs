//! Read-only access to the relational view the tickets come from.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info, warn};

use crate::migrate::check_identifier;
use ticketscope_core::{Error, Result, Ticket};

/// Anything that can produce the full raw ticket set.
pub trait TicketSource: Send + Sync {
    /// Fetch every ticket. Called at most once per run.
    fn fetch_all(&self) -> Result<Vec<Ticket>>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// Columns the source view must expose, in select order.
pub const SOURCE_COLUMNS: &[&str] = &[
    "ticket_id",
    "created_at",
    "region",
    "body",
    "status",
    "subject",
    "product_context",
];

/// Reads tickets from a view (or table) in a SQLite database exposing
/// [`SOURCE_COLUMNS`].
pub struct SqliteTicketSource {
    db_path: PathBuf,
    view: String,
}

impl SqliteTicketSource {
    pub fn new(db_path: impl AsRef<Path>, view: impl Into<String>) -> Result<Self> {
        let view = view.into();
        check_identifier(&view)?;
        Ok(Self {
            db_path: db_path.as_ref().to_path_buf(),
            view,
        })
    }
}

impl TicketSource for SqliteTicketSource {
    fn fetch_all(&self) -> Result<Vec<Ticket>> {
        if !self.db_path.exists() {
            return Err(Error::Fetch(format!(
                "Source database not found: {}",
                self.db_path.display()
            )));
        }
        let conn = Connection::open_with_flags(&self.db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| Error::Fetch(e.to_string()))?;

        let sql = format!(
            "SELECT {} FROM {} ORDER BY created_at DESC",
            SOURCE_COLUMNS.join(", "),
            self.view
        );
        let mut stmt = conn.prepare(&sql).map_err(|e| Error::Fetch(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                let created: Option<String> = row.get(1)?;
                Ok(Ticket {
                    ticket_id: row.get::<_, rusqlite::types::Value>(0).map(value_to_string)?,
                    created_at: created.as_deref().and_then(parse_timestamp),
                    region: row.get(2)?,
                    body: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    status: row.get(4)?,
                    subject: row.get(5)?,
                    product_context: row.get(6)?,
                    translated_body: None,
                    preprocessed_body: None,
                    product_label: None,
                })
            })
            .map_err(|e| Error::Fetch(e.to_string()))?;

        let mut tickets = Vec::new();
        let mut skipped = 0;
        for row in rows {
            match row {
                Ok(ticket) => tickets.push(ticket),
                Err(e) => {
                    skipped += 1;
                    warn!("Skipping unreadable source row: {}", e);
                }
            }
        }
        info!(
            "Fetched {} tickets from {} ({} rows skipped)",
            tickets.len(),
            self.describe(),
            skipped
        );
        Ok(tickets)
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.db_path.display(), self.view)
    }
}

/// Ticket ids may be stored as integers in the source.
fn value_to_string(value: rusqlite::types::Value) -> String {
    use rusqlite::types::Value;
    match value {
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s,
        Value::Blob(b) => String::from_utf8_lossy(&b).into_owned(),
        Value::Null => String::new(),
    }
}

pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    debug!("Unparseable created_at: {}", s);
    None
}
