//! TTL-bounded snapshot of the full raw ticket set.
//!
//! The snapshot is one JSON file replaced wholesale: written to a sibling
//! temp file, then renamed over the old one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::source::TicketSource;
use ticketscope_core::{Error, Result, Ticket};

/// One fetched ticket set and when it was fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSnapshot {
    pub fetched_at: DateTime<Utc>,
    pub tickets: Vec<Ticket>,
}

impl RawSnapshot {
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.fetched_at);
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => age < ttl,
            Err(_) => true,
        }
    }
}

pub struct RawFetchCache {
    path: PathBuf,
}

impl RawFetchCache {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the cached snapshot when younger than `ttl`, otherwise fetch.
    ///
    /// A failed fetch falls back to a stale snapshot; it is only fatal when
    /// no snapshot exists at all.
    pub fn get_or_fetch(
        &self,
        source: &dyn TicketSource,
        ttl: Duration,
    ) -> Result<(Vec<Ticket>, DateTime<Utc>)> {
        self.get_or_fetch_at(source, ttl, Utc::now())
    }

    pub fn get_or_fetch_at(
        &self,
        source: &dyn TicketSource,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Ticket>, DateTime<Utc>)> {
        let cached = self.load();
        if let Some(snapshot) = &cached {
            if snapshot.is_fresh(ttl, now) {
                info!(
                    "Using cached raw snapshot: {} tickets fetched at {}",
                    snapshot.tickets.len(),
                    snapshot.fetched_at
                );
                return Ok((snapshot.tickets.clone(), snapshot.fetched_at));
            }
        }

        match source.fetch_all() {
            Ok(tickets) => {
                let snapshot = RawSnapshot {
                    fetched_at: now,
                    tickets,
                };
                self.store(&snapshot)?;
                Ok((snapshot.tickets, snapshot.fetched_at))
            }
            Err(e) => match cached {
                Some(stale) => {
                    warn!(
                        "Fetch from {} failed ({}); using stale snapshot from {}",
                        source.describe(),
                        e,
                        stale.fetched_at
                    );
                    Ok((stale.tickets, stale.fetched_at))
                }
                None => Err(Error::Fetch(format!(
                    "{} (no cached snapshot at {})",
                    e,
                    self.path.display()
                ))),
            },
        }
    }

    /// Read the snapshot. Missing or unreadable snapshots count as absent.
    pub fn load(&self) -> Option<RawSnapshot> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("Ignoring corrupt raw snapshot {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn store(&self, snapshot: &RawSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(snapshot)?)?;
        std::fs::rename(&tmp, &self.path)?;
        info!(
            "Stored raw snapshot: {} tickets at {}",
            snapshot.tickets.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Remove the snapshot so the next run fetches.
    pub fn invalidate(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
